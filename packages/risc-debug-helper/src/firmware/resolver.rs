// Copyright (c) 2026 MCU-Debug Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Name -> (address, size, type) oracle over a set of firmware images.
//!
//! Paths are written `image.variable(.member|->member|[index])*`, optionally
//! prefixed with `@`. Anything behind a pointer needs a memory reader to be
//! located; without one, resolution still walks the types but the address is
//! unknown.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Instant;

use regex::Regex;

use crate::error::{LoadError, SymbolError, TransportError};
use crate::firmware::access_path::{AccessPath, IndexExpr, Step};
use crate::firmware::dwarf::DwarfParser;
use crate::firmware::image::{ExtraVar, FirmwareImage, ImageParser};
use crate::firmware::types::{TypeId, TypeKind, POINTER_SIZE};

/// Reads `size` bytes of target memory at an address.
pub type MemReader<'a> = &'a dyn Fn(u64, usize) -> Result<Vec<u8>, TransportError>;

/// Member trees stop growing below this depth.
pub const MAX_MEMBER_DEPTH: usize = 32;

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@[_@.a-zA-Z0-9\[\]]+").expect("static pattern"));

/// One node of the tree returned by [`Firmware::get_member_paths`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberPath {
    pub full_name: String,
    /// `None` when the node lies behind a pointer that could not be read.
    pub address: Option<u64>,
    pub size: Option<u64>,
    pub type_id: TypeId,
    pub type_name: String,
    pub children: Vec<MemberPath>,
}

#[derive(Debug, Clone, Copy)]
struct Place {
    address: Option<u64>,
    ty: TypeId,
    /// Elements covered; more than one after partially indexing a multi-dimensional array.
    count: u64,
}

pub struct Firmware {
    images: BTreeMap<String, FirmwareImage>,
}

impl Firmware {
    /// Load every `prefix -> path` image with the DWARF reader, then inject `extra_vars` into each.
    pub fn load(
        files: &BTreeMap<String, PathBuf>,
        extra_vars: Option<&BTreeMap<String, ExtraVar>>,
    ) -> Result<Self, LoadError> {
        Self::load_with(&DwarfParser, files, extra_vars)
    }

    pub fn load_with(
        parser: &dyn ImageParser,
        files: &BTreeMap<String, PathBuf>,
        extra_vars: Option<&BTreeMap<String, ExtraVar>>,
    ) -> Result<Self, LoadError> {
        let mut images = Vec::with_capacity(files.len());
        for (prefix, path) in files {
            let start = Instant::now();
            let image = parser.parse(prefix, path)?;
            log::info!(
                "Loaded '{}' as {prefix} in {:.2}s",
                path.display(),
                start.elapsed().as_secs_f64()
            );
            images.push(image);
        }
        Self::from_images(images, extra_vars)
    }

    pub fn from_images(
        images: Vec<FirmwareImage>,
        extra_vars: Option<&BTreeMap<String, ExtraVar>>,
    ) -> Result<Self, LoadError> {
        let mut by_prefix = BTreeMap::new();
        for mut image in images {
            if let Some(extra) = extra_vars {
                image.inject_synthetic(extra)?;
            }
            by_prefix.insert(image.prefix().to_string(), image);
        }
        Ok(Self { images: by_prefix })
    }

    pub fn image(&self, prefix: &str) -> Option<&FirmwareImage> {
        self.images.get(prefix)
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.images.keys().map(String::as_str)
    }

    fn image_for(&self, prefix: &str) -> Result<&FirmwareImage, SymbolError> {
        self.images
            .get(prefix)
            .ok_or_else(|| SymbolError::UnknownImage(prefix.to_string()))
    }

    /// Returns every enumerator under `image.Enum` keyed by value, with the enclosing scope stripped.
    pub fn get_enum_mapping(&self, enum_path: &str) -> Result<BTreeMap<i64, String>, SymbolError> {
        let (prefix, enum_path) = split_prefix(enum_path)?;
        let image = self.image_for(prefix)?;
        let scope = format!("{enum_path}::");
        Ok(image
            .enumerators()
            .iter()
            .filter(|(name, _)| name.starts_with(&scope))
            .map(|(name, value)| {
                let short = name.rsplit("::").next().unwrap_or(name);
                (*value, short.to_string())
            })
            .collect())
    }

    pub fn parse_addr_size(
        &self,
        path: &str,
        mem_reader: Option<MemReader<'_>>,
    ) -> Result<(u64, u64), SymbolError> {
        let (address, size, _) = self.parse_addr_size_type(path, mem_reader)?;
        Ok((address, size))
    }

    pub fn parse_addr_size_type(
        &self,
        path: &str,
        mem_reader: Option<MemReader<'_>>,
    ) -> Result<(u64, u64, TypeId), SymbolError> {
        let (prefix, rest) = split_prefix(path)?;
        let image = self.image_for(prefix)?;
        let (place, size) = self.resolve_in(image, rest, mem_reader)?;
        let address = place
            .address
            .ok_or_else(|| SymbolError::MemoryReaderRequired(path.to_string()))?;
        Ok((address, size, place.ty))
    }

    /// Resolve `path` and read its current value.
    pub fn read_path(&self, path: &str, mem_reader: MemReader<'_>) -> Result<Vec<u8>, SymbolError> {
        let (address, size, _) = self.parse_addr_size_type(path, Some(mem_reader))?;
        mem_reader(address, size as usize).map_err(|e| SymbolError::ReadFailed {
            address,
            reason: e.to_string(),
        })
    }

    /// Recursive member tree of the value at `access_path` inside image `prefix`.
    ///
    /// Children are named `parent.member`, or `parent->member` when the parent is a pointer.
    /// Anonymous struct/union members are flattened into their parent. A type already being
    /// expanded further up the tree is not expanded again.
    pub fn get_member_paths(
        &self,
        prefix: &str,
        access_path: &str,
        mem_reader: Option<MemReader<'_>>,
    ) -> Result<MemberPath, SymbolError> {
        let image = self.image_for(prefix)?;
        let access_path = access_path.strip_prefix('@').unwrap_or(access_path);
        let access_path = access_path
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(access_path);
        let (place, _) = self.resolve_in(image, access_path, mem_reader)?;
        let mut visited = Vec::new();
        self.member_tree(
            image,
            access_path.to_string(),
            place.address,
            place.ty,
            mem_reader,
            0,
            &mut visited,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn member_tree(
        &self,
        image: &FirmwareImage,
        full_name: String,
        address: Option<u64>,
        ty: TypeId,
        mem_reader: Option<MemReader<'_>>,
        depth: usize,
        visited: &mut Vec<TypeId>,
    ) -> Result<MemberPath, SymbolError> {
        let types = image.types();
        let ty = types.resolve(ty);
        let mut node = MemberPath {
            full_name,
            address,
            size: types.size_of(ty),
            type_id: ty,
            type_name: types.display_name(ty),
            children: Vec::new(),
        };
        if depth >= MAX_MEMBER_DEPTH {
            log::debug!("{}: member tree depth limit reached", node.full_name);
            return Ok(node);
        }

        let (separator, composite) = if types.is_pointer(ty) {
            match types.pointee(ty) {
                Some(target) => ("->", target),
                None => return Ok(node),
            }
        } else {
            (".", ty)
        };
        if !types.get(composite).is_composite() || visited.contains(&composite) {
            return Ok(node);
        }
        let base = if separator == "->" {
            read_pointer(address, mem_reader)?
        } else {
            address
        };

        visited.push(composite);
        for (member_name, member) in types.flattened_members(composite) {
            let child = self.member_tree(
                image,
                format!("{}{separator}{member_name}", node.full_name),
                base.map(|b| b + member.offset),
                member.ty,
                mem_reader,
                depth + 1,
                visited,
            )?;
            node.children.push(child);
        }
        visited.pop();
        Ok(node)
    }

    /// Best `limit` completions for a partial path, most similar first.
    pub fn fuzzy_find_multiple(&self, path: &str, limit: usize) -> Vec<String> {
        let (at, path) = match path.strip_prefix('@') {
            Some(rest) => ("@", rest),
            None => ("", path),
        };
        match path.split_once('.') {
            Some((prefix, suffix)) => match self.images.get(prefix) {
                Some(image) => rank(suffix, image.variables().names(), limit)
                    .into_iter()
                    .map(|name| format!("{at}{prefix}.{name}"))
                    .collect(),
                None => rank(prefix, self.prefixes(), limit),
            },
            None => rank(path, self.prefixes(), limit),
        }
    }

    /// Replace every `@image.path` in `text` with the path's address as `0x%08x`.
    pub fn substitute_names_with_values(&self, text: &str) -> Result<String, SymbolError> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for m in NAME_PATTERN.find_iter(text) {
            out.push_str(&text[last..m.start()]);
            let (address, _) = self.parse_addr_size(m.as_str(), None)?;
            out.push_str(&format!("0x{address:08x}"));
            last = m.end();
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    fn resolve_in(
        &self,
        image: &FirmwareImage,
        text: &str,
        mem_reader: Option<MemReader<'_>>,
    ) -> Result<(Place, u64), SymbolError> {
        let path = AccessPath::parse(text)?;
        let types = image.types();
        let qualified = |name: &str| format!("{}.{name}", image.prefix());

        let symbol = image
            .variables()
            .get_by_name(&path.root)
            .ok_or_else(|| SymbolError::NotFound(qualified(&path.root)))?;
        let ty = symbol
            .ty
            .ok_or_else(|| SymbolError::UnknownSize(qualified(&path.root)))?;
        let address = symbol
            .address
            .ok_or_else(|| SymbolError::NoAddress(qualified(&path.root)))?;
        let mut place = Place {
            address: Some(address),
            ty: types.resolve(ty),
            count: 1,
        };
        let mut described = path.root.clone();

        let mut steps = path.steps.iter().peekable();
        while let Some(step) = steps.next() {
            if place.count > 1 {
                return Err(SymbolError::NotSingleValue(qualified(&described)));
            }
            match step {
                Step::Member(name) => {
                    place = deref_reference(image, place, mem_reader)?;
                    place = member(image, place, name)?;
                    described = format!("{described}.{name}");
                }
                Step::Arrow(name) => {
                    if !types.is_pointer(place.ty) {
                        return Err(SymbolError::NotAPointer(types.display_name(place.ty)));
                    }
                    let target = types
                        .pointee(place.ty)
                        .ok_or_else(|| SymbolError::NotFound(qualified(&described)))?;
                    let pointed = Place {
                        address: read_pointer(place.address, mem_reader)?,
                        ty: target,
                        count: 1,
                    };
                    place = member(image, pointed, name)?;
                    described = format!("{described}->{name}");
                }
                Step::Index(first) => {
                    let mut indices = vec![self.eval_index(image, first, mem_reader)?];
                    while let Some(Step::Index(next)) = steps.peek() {
                        indices.push(self.eval_index(image, next, mem_reader)?);
                        steps.next();
                    }
                    place = index(image, place, &indices, mem_reader)?;
                    described = format!("{described}[..]");
                }
            }
        }

        for _ in 0..path.dereferences {
            if !types.is_pointer(place.ty) {
                return Err(SymbolError::NotAPointer(types.display_name(place.ty)));
            }
            let target = types
                .pointee(place.ty)
                .ok_or_else(|| SymbolError::NotFound(qualified(&described)))?;
            place = Place {
                address: read_pointer(place.address, mem_reader)?,
                ty: target,
                count: place.count,
            };
        }
        place = deref_reference(image, place, mem_reader)?;

        let element_size = types
            .size_of(place.ty)
            .ok_or_else(|| SymbolError::UnknownSize(qualified(&described)))?;
        let size = element_size
            .checked_mul(place.count)
            .ok_or_else(|| SymbolError::AddressOverflow(qualified(&described)))?;
        Ok((place, size))
    }

    /// `None` when the index is a runtime value and no reader was given.
    fn eval_index(
        &self,
        image: &FirmwareImage,
        expr: &IndexExpr,
        mem_reader: Option<MemReader<'_>>,
    ) -> Result<Option<u64>, SymbolError> {
        let path = match expr {
            IndexExpr::Literal(value) => return Ok(Some(*value)),
            IndexExpr::Path(path) => path,
            IndexExpr::Add(lhs, rhs) | IndexExpr::Sub(lhs, rhs) => {
                let lhs = self.eval_index(image, lhs, mem_reader)?;
                let rhs = self.eval_index(image, rhs, mem_reader)?;
                let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
                    return Ok(None);
                };
                let value = match expr {
                    IndexExpr::Add(..) => lhs.checked_add(rhs),
                    _ => lhs.checked_sub(rhs),
                };
                return value
                    .map(Some)
                    .ok_or_else(|| SymbolError::AddressOverflow(format!("index {expr:?}")));
            }
        };
        let (place, size) = match path.strip_prefix('@') {
            Some(full) => {
                let (prefix, rest) = split_prefix(full)?;
                self.resolve_in(self.image_for(prefix)?, rest, mem_reader)?
            }
            None => self.resolve_in(image, path, mem_reader)?,
        };
        match (place.address, mem_reader) {
            (Some(address), Some(reader)) => Ok(Some(read_uint(reader, address, size.min(8))?)),
            _ => Ok(None),
        }
    }
}

/// Split `@?image.rest` at the first `.`.
fn split_prefix(path: &str) -> Result<(&str, &str), SymbolError> {
    let path = path.strip_prefix('@').unwrap_or(path);
    path.split_once('.')
        .ok_or_else(|| SymbolError::NotFound(format!("{path} (expected <image>.<name>)")))
}

fn member(image: &FirmwareImage, place: Place, name: &str) -> Result<Place, SymbolError> {
    let types = image.types();
    let found = types.find_member(place.ty, name).ok_or_else(|| {
        SymbolError::NotFound(format!("{}::{name}", types.display_name(place.ty)))
    })?;
    let address = match place.address {
        Some(a) => Some(
            a.checked_add(found.offset)
                .ok_or_else(|| SymbolError::AddressOverflow(name.to_string()))?,
        ),
        None => None,
    };
    Ok(Place {
        address,
        ty: types.resolve(found.ty),
        count: 1,
    })
}

fn deref_reference(
    image: &FirmwareImage,
    place: Place,
    mem_reader: Option<MemReader<'_>>,
) -> Result<Place, SymbolError> {
    let types = image.types();
    if !types.is_reference(place.ty) {
        return Ok(place);
    }
    match types.pointee(place.ty) {
        Some(target) => Ok(Place {
            address: read_pointer(place.address, mem_reader)?,
            ty: target,
            count: place.count,
        }),
        None => Ok(place),
    }
}

fn index(
    image: &FirmwareImage,
    mut place: Place,
    indices: &[Option<u64>],
    mem_reader: Option<MemReader<'_>>,
) -> Result<Place, SymbolError> {
    let types = image.types();
    let mut remaining = indices;
    while !remaining.is_empty() {
        if place.count > 1 {
            return Err(SymbolError::NotSingleValue(types.display_name(place.ty)));
        }
        let overflow = || SymbolError::AddressOverflow(types.display_name(place.ty));
        let element_size = |ty: TypeId| {
            types
                .size_of(ty)
                .ok_or_else(|| SymbolError::UnknownSize(types.display_name(ty)))
        };
        match &types.get(types.resolve(place.ty)).kind {
            TypeKind::Array {
                element,
                dimensions,
            } => {
                let used = remaining.len().min(dimensions.len());
                if used == 0 {
                    return Err(SymbolError::NotIndexable(types.display_name(place.ty)));
                }
                // elements per step of each index: int a[2][3] -> [3, 1]
                let mut strides = vec![1u64; dimensions.len()];
                for i in (0..dimensions.len().saturating_sub(1)).rev() {
                    strides[i] = strides[i + 1]
                        .checked_mul(dimensions[i + 1])
                        .ok_or_else(overflow)?;
                }
                let mut offset = Some(0u64);
                for (i, idx) in remaining[..used].iter().enumerate() {
                    match idx {
                        // a zero dimension is a flexible array member
                        Some(v) if dimensions[i] != 0 && *v >= dimensions[i] => {
                            return Err(SymbolError::IndexOutOfBounds {
                                index: *v,
                                bound: dimensions[i],
                            });
                        }
                        Some(v) => {
                            offset = match offset {
                                Some(o) => Some(
                                    v.checked_mul(strides[i])
                                        .and_then(|step| o.checked_add(step))
                                        .ok_or_else(overflow)?,
                                ),
                                None => None,
                            }
                        }
                        None => offset = None,
                    }
                }
                let size = element_size(*element)?;
                let address = match place.address.zip(offset) {
                    Some((a, o)) => Some(
                        o.checked_mul(size)
                            .and_then(|bytes| a.checked_add(bytes))
                            .ok_or_else(overflow)?,
                    ),
                    None => None,
                };
                place = Place {
                    address,
                    ty: types.resolve(*element),
                    count: strides[used - 1],
                };
                remaining = &remaining[used..];
            }
            TypeKind::Pointer {
                target: Some(target),
            } => {
                let target = types.resolve(*target);
                let size = element_size(target)?;
                let base = read_pointer(place.address, mem_reader)?;
                let address = match base.zip(remaining[0]) {
                    Some((b, i)) => Some(
                        i.checked_mul(size)
                            .and_then(|bytes| b.checked_add(bytes))
                            .ok_or_else(overflow)?,
                    ),
                    None => None,
                };
                place = Place {
                    address,
                    ty: target,
                    count: 1,
                };
                remaining = &remaining[1..];
            }
            _ => return Err(SymbolError::NotIndexable(types.display_name(place.ty))),
        }
    }
    Ok(place)
}

fn read_uint(mem_reader: MemReader<'_>, address: u64, size: u64) -> Result<u64, SymbolError> {
    let bytes = mem_reader(address, size as usize).map_err(|e| SymbolError::ReadFailed {
        address,
        reason: e.to_string(),
    })?;
    if (bytes.len() as u64) < size {
        return Err(SymbolError::ReadFailed {
            address,
            reason: format!("short read: {} of {size} bytes", bytes.len()),
        });
    }
    let mut word = [0u8; 8];
    word[..size as usize].copy_from_slice(&bytes[..size as usize]);
    Ok(u64::from_le_bytes(word))
}

/// Follow a pointer stored at `address`. Unknown when either the address or the reader is missing.
fn read_pointer(
    address: Option<u64>,
    mem_reader: Option<MemReader<'_>>,
) -> Result<Option<u64>, SymbolError> {
    match (address, mem_reader) {
        (Some(address), Some(reader)) => Ok(Some(read_uint(reader, address, POINTER_SIZE)?)),
        _ => Ok(None),
    }
}

fn rank<'a>(query: &str, choices: impl Iterator<Item = &'a str>, limit: usize) -> Vec<String> {
    let query = query.to_lowercase();
    let mut scored: Vec<(f64, &str)> = choices
        .map(|choice| {
            let score = strsim::normalized_levenshtein(&query, &choice.to_lowercase());
            (score, choice)
        })
        .collect();
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.cmp(b.1))
    });
    scored
        .into_iter()
        .take(limit)
        .map(|(_, choice)| choice.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::types::{Member, TypeDef};
    use pretty_assertions::assert_eq;

    fn counter_image() -> FirmwareImage {
        let mut image = FirmwareImage::new("brisc");
        let u32_t = image.add_type(TypeDef::base("uint32_t", 4));
        let counter = image.add_type(TypeDef::structure(
            "counter_t",
            8,
            vec![Member::new("hits", 0, u32_t), Member::new("misses", 4, u32_t)],
        ));
        image.add_variable("g_counter", 0x100, counter);
        image.add_variable("g_slot", 0x200, u32_t);
        let table = image.add_type(TypeDef::array(u32_t, vec![8]));
        image.add_variable("g_table", 0x300, table);
        image.add_enumerator("ResetState::Idle", 0);
        image.add_enumerator("ResetState::Busy", 1);
        image.add_enumerator("ResetStateExt::Other", 7);
        image
    }

    fn firmware() -> Firmware {
        Firmware::from_images(vec![counter_image()], None).unwrap()
    }

    #[test]
    fn member_offsets() {
        let fw = firmware();
        assert_eq!(fw.parse_addr_size("brisc.g_counter.misses", None), Ok((0x104, 4)));
        assert_eq!(fw.parse_addr_size("@brisc.g_counter", None), Ok((0x100, 8)));
    }

    #[test]
    fn enum_mapping_respects_scope_boundary() {
        let fw = firmware();
        let mapping = fw.get_enum_mapping("brisc.ResetState").unwrap();
        assert_eq!(
            mapping,
            BTreeMap::from([(0, "Idle".to_string()), (1, "Busy".to_string())])
        );
    }

    #[test]
    fn runtime_index_reads_through_reader() {
        let fw = firmware();
        let reader = |addr: u64, size: usize| -> Result<Vec<u8>, TransportError> {
            assert_eq!((addr, size), (0x200, 4));
            Ok(3u32.to_le_bytes().to_vec())
        };
        assert_eq!(
            fw.parse_addr_size("brisc.g_table[g_slot]", Some(&reader)),
            Ok((0x30C, 4))
        );
        assert_eq!(
            fw.parse_addr_size("brisc.g_table[g_slot]", None),
            Err(SymbolError::MemoryReaderRequired(
                "brisc.g_table[g_slot]".to_string()
            ))
        );
    }

    #[test]
    fn substitution_and_completion() {
        let fw = firmware();
        assert_eq!(
            fw.substitute_names_with_values("wr @brisc.g_counter.misses 1").unwrap(),
            "wr 0x00000104 1"
        );
        assert_eq!(
            fw.fuzzy_find_multiple("@brisc.g_countr", 1),
            vec!["@brisc.g_counter".to_string()]
        );
        assert_eq!(fw.fuzzy_find_multiple("brsc", 5), vec!["brisc".to_string()]);
    }
}
