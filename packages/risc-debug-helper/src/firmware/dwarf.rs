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

//! [`ImageParser`] over ELF files with DWARF debug info.
//!
//! A single walk over every compilation unit collects:
//! - types into the image's [`TypeGraph`](crate::firmware::types::TypeGraph), keyed by DIE offset so
//!   forward references become reserved ids that are defined when the DIE is reached;
//! - variables with a `DW_OP_addr` location or a `DW_AT_const_value`; declarations
//!   get the address of the definition that names them in `DW_AT_specification`;
//! - enumerators, keyed by `Enum::Name` including enclosing namespaces.
//!
//! Function symbols come from `.symtab` and the PC -> line table from the line program.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::rc::Rc;

use gimli::{AttributeValue, DebugInfoOffset, Reader};
use object::{Object, ObjectSection, ObjectSymbol, SymbolKind};

use crate::error::LoadError;
use crate::firmware::image::{FirmwareImage, ImageParser};
use crate::firmware::symbols::{Symbol, SymbolKind as FwSymbolKind, SymbolOrigin};
use crate::firmware::types::{Member, TypeDef, TypeId, TypeKind};

type DwarfReader = gimli::EndianRcSlice<gimli::RunTimeEndian>;
type Unit = gimli::Unit<DwarfReader>;
type Node<'a, 'b> = gimli::EntriesTreeNode<'a, 'a, 'b, DwarfReader>;

/// Reads ELF + DWARF firmware images from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct DwarfParser;

impl ImageParser for DwarfParser {
    fn parse(&self, prefix: &str, path: &Path) -> Result<FirmwareImage, LoadError> {
        let io_err = |source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(io_err)?;
        // SAFETY: the mapping is read-only and every section is copied out before it is dropped.
        let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(io_err)?;
        let obj = object::File::parse(&*mmap)?;

        if obj.section_by_name(".debug_info").is_none() {
            return Err(LoadError::NoDebugInfo(path.to_path_buf()));
        }

        let endian = if obj.is_little_endian() {
            gimli::RunTimeEndian::Little
        } else {
            gimli::RunTimeEndian::Big
        };
        let load_section = |id: gimli::SectionId| -> Result<DwarfReader, gimli::Error> {
            let data = obj
                .section_by_name(id.name())
                .map(|s| s.uncompressed_data().unwrap_or_default())
                .unwrap_or_default();
            let data_rc: Rc<[u8]> = match data {
                Cow::Borrowed(b) => Rc::from(b),
                Cow::Owned(o) => Rc::from(o),
            };
            Ok(gimli::EndianRcSlice::new(data_rc, endian))
        };
        let dwarf = gimli::Dwarf::load(&load_section)?;

        let mut image = FirmwareImage::new(prefix).with_path(path);
        let mut walker = Walker::new(&dwarf);
        let mut units = dwarf.units();
        while let Some(header) = units.next()? {
            let unit = dwarf.unit(header)?;
            walker.walk_unit(&unit, &mut image)?;
            read_line_program(&dwarf, &unit, &mut image)?;
        }
        walker.finish(&mut image);
        read_symtab(&obj, &mut image);

        log::debug!(
            "{prefix}: {} variables, {} types, {} enumerators, {} functions",
            image.variables().len(),
            image.type_names().len(),
            image.enumerators().len(),
            image.functions().len()
        );
        Ok(image)
    }
}

/// A variable seen in DWARF, before declarations are paired with definitions.
struct PendingVariable {
    name: String,
    offset: Option<DebugInfoOffset>,
    address: Option<u64>,
    const_value: Option<i64>,
    ty: Option<TypeId>,
}

/// Attributes of one DIE, read before its children are visited.
#[derive(Default)]
struct DieInfo {
    offset: Option<DebugInfoOffset>,
    name: Option<String>,
    ty: Option<DebugInfoOffset>,
    byte_size: Option<u64>,
    member_offset: Option<u64>,
    address: Option<u64>,
    const_value: Option<i64>,
    specification: Option<DebugInfoOffset>,
    declaration: bool,
}

struct Walker<'d> {
    dwarf: &'d gimli::Dwarf<DwarfReader>,
    ids: HashMap<DebugInfoOffset, TypeId>,
    variables: Vec<PendingVariable>,
    // declaration offset -> address from the defining DIE
    definitions: HashMap<DebugInfoOffset, u64>,
}

impl<'d> Walker<'d> {
    fn new(dwarf: &'d gimli::Dwarf<DwarfReader>) -> Self {
        Self {
            dwarf,
            ids: HashMap::new(),
            variables: Vec::new(),
            definitions: HashMap::new(),
        }
    }

    fn type_id(&mut self, offset: DebugInfoOffset, image: &mut FirmwareImage) -> TypeId {
        *self
            .ids
            .entry(offset)
            .or_insert_with(|| image.types_mut().reserve())
    }

    fn walk_unit(&mut self, unit: &Unit, image: &mut FirmwareImage) -> Result<(), LoadError> {
        let mut tree = unit.entries_tree(None)?;
        let root = tree.root()?;
        let mut children = root.children();
        while let Some(child) = children.next()? {
            self.walk(unit, child, "", image)?;
        }
        Ok(())
    }

    fn read_die(
        &self,
        unit: &Unit,
        entry: &gimli::DebuggingInformationEntry<DwarfReader>,
    ) -> Result<DieInfo, LoadError> {
        let to_global = |value: AttributeValue<DwarfReader>| match value {
            AttributeValue::UnitRef(offset) => offset.to_debug_info_offset(&unit.header),
            AttributeValue::DebugInfoRef(offset) => Some(offset),
            _ => None,
        };

        let mut info = DieInfo {
            offset: entry.offset().to_debug_info_offset(&unit.header),
            ..DieInfo::default()
        };
        let mut attrs = entry.attrs();
        while let Some(attr) = attrs.next()? {
            match attr.name() {
                gimli::DW_AT_name => {
                    let name = self.dwarf.attr_string(unit, attr.value())?;
                    info.name = Some(name.to_string_lossy()?.into_owned());
                }
                gimli::DW_AT_type => info.ty = to_global(attr.value()),
                gimli::DW_AT_byte_size => info.byte_size = attr.udata_value(),
                gimli::DW_AT_data_member_location => {
                    info.member_offset = match attr.value() {
                        AttributeValue::Exprloc(expr) => {
                            match single_operation(unit, &expr)? {
                                Some(gimli::Operation::PlusConstant { value }) => Some(value),
                                _ => None,
                            }
                        }
                        other => other.udata_value(),
                    }
                }
                gimli::DW_AT_location => {
                    if let AttributeValue::Exprloc(expr) = attr.value() {
                        info.address = match single_operation(unit, &expr)? {
                            Some(gimli::Operation::Address { address }) => Some(address),
                            Some(gimli::Operation::AddressIndex { index }) => {
                                Some(self.dwarf.address(unit, index)?)
                            }
                            _ => None,
                        };
                    }
                }
                gimli::DW_AT_const_value => {
                    // fixed-size data forms carry unsigned values; negatives use sdata
                    info.const_value = match attr.value() {
                        AttributeValue::Sdata(value) => Some(value),
                        other => other.udata_value().map(|v| v as i64),
                    };
                }
                gimli::DW_AT_specification | gimli::DW_AT_abstract_origin => {
                    info.specification = to_global(attr.value())
                }
                gimli::DW_AT_declaration => info.declaration = true,
                _ => {}
            }
        }
        Ok(info)
    }

    fn walk(
        &mut self,
        unit: &Unit,
        node: Node<'_, '_>,
        scope: &str,
        image: &mut FirmwareImage,
    ) -> Result<(), LoadError> {
        let tag = node.entry().tag();
        let info = self.read_die(unit, node.entry())?;
        let path = match &info.name {
            Some(name) if scope.is_empty() => name.clone(),
            Some(name) => format!("{scope}::{name}"),
            None => String::new(),
        };

        match tag {
            gimli::DW_TAG_structure_type | gimli::DW_TAG_class_type | gimli::DW_TAG_union_type => {
                let is_union = tag == gimli::DW_TAG_union_type;
                let mut members = Vec::new();
                let mut children = node.children();
                while let Some(child) = children.next()? {
                    if child.entry().tag() == gimli::DW_TAG_member {
                        let member = self.read_die(unit, child.entry())?;
                        if member.declaration {
                            // DWARF 4 static data member
                            self.add_variable(member, &path, image);
                            continue;
                        }
                        let Some(ty) = member.ty else { continue };
                        let ty = self.type_id(ty, image);
                        let offset = if is_union {
                            0
                        } else {
                            member.member_offset.unwrap_or(0)
                        };
                        members.push(Member {
                            name: member.name,
                            offset,
                            ty,
                        });
                    } else {
                        self.walk(unit, child, &path, image)?;
                    }
                }
                let kind = if is_union {
                    TypeKind::Union
                } else {
                    TypeKind::Struct
                };
                self.define_type(&info, &path, kind, members, image);
            }
            gimli::DW_TAG_enumeration_type => {
                let mut children = node.children();
                while let Some(child) = children.next()? {
                    if child.entry().tag() != gimli::DW_TAG_enumerator {
                        continue;
                    }
                    let enumerator = self.read_die(unit, child.entry())?;
                    if let (Some(name), Some(value)) = (enumerator.name, enumerator.const_value) {
                        let enum_path = if path.is_empty() {
                            name
                        } else {
                            format!("{path}::{name}")
                        };
                        image.add_enumerator(&enum_path, value);
                    }
                }
                self.define_type(&info, &path, TypeKind::Enum, Vec::new(), image);
            }
            gimli::DW_TAG_array_type => {
                let mut dimensions = Vec::new();
                let mut children = node.children();
                while let Some(child) = children.next()? {
                    if child.entry().tag() != gimli::DW_TAG_subrange_type {
                        continue;
                    }
                    let entry = child.entry();
                    let count = match entry.attr_value(gimli::DW_AT_count)? {
                        Some(count) => count.udata_value(),
                        None => entry
                            .attr_value(gimli::DW_AT_upper_bound)?
                            .and_then(|ub| ub.udata_value())
                            .map(|ub| ub + 1),
                    };
                    dimensions.push(count.unwrap_or(0));
                }
                if let Some(element) = info.ty {
                    let element = self.type_id(element, image);
                    let kind = TypeKind::Array {
                        element,
                        dimensions,
                    };
                    self.define_type(&info, &path, kind, Vec::new(), image);
                }
            }
            gimli::DW_TAG_pointer_type
            | gimli::DW_TAG_reference_type
            | gimli::DW_TAG_rvalue_reference_type
            | gimli::DW_TAG_typedef
            | gimli::DW_TAG_const_type
            | gimli::DW_TAG_volatile_type
            | gimli::DW_TAG_restrict_type
            | gimli::DW_TAG_atomic_type => {
                let target = info.ty.map(|t| self.type_id(t, image));
                let kind = match tag {
                    gimli::DW_TAG_pointer_type => TypeKind::Pointer { target },
                    gimli::DW_TAG_reference_type | gimli::DW_TAG_rvalue_reference_type => {
                        TypeKind::Reference { target }
                    }
                    gimli::DW_TAG_typedef => TypeKind::Typedef { target },
                    _ => TypeKind::Qualified { target },
                };
                self.define_type(&info, &path, kind, Vec::new(), image);
            }
            gimli::DW_TAG_base_type => {
                self.define_type(&info, &path, TypeKind::Base, Vec::new(), image);
            }
            gimli::DW_TAG_subroutine_type | gimli::DW_TAG_unspecified_type => {
                self.define_type(&info, &path, TypeKind::Opaque, Vec::new(), image);
            }
            gimli::DW_TAG_variable => {
                self.add_variable(info, scope, image);
            }
            gimli::DW_TAG_namespace | gimli::DW_TAG_subprogram => {
                let mut children = node.children();
                while let Some(child) = children.next()? {
                    self.walk(unit, child, &path, image)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn define_type(
        &mut self,
        info: &DieInfo,
        path: &str,
        kind: TypeKind,
        members: Vec<Member>,
        image: &mut FirmwareImage,
    ) {
        let Some(offset) = info.offset else { return };
        let id = self.type_id(offset, image);
        // forward declarations must not replace a real definition
        if info.declaration && !matches!(image.types().get(id).kind, TypeKind::Opaque) {
            return;
        }
        image.types_mut().define(
            id,
            TypeDef {
                name: path.to_string(),
                kind,
                byte_size: info.byte_size,
                members,
            },
        );
        if !info.declaration {
            image.register_type_name(path, id);
        }
    }

    fn add_variable(&mut self, info: DieInfo, scope: &str, image: &mut FirmwareImage) {
        if let (Some(declaration), Some(address)) = (info.specification, info.address) {
            self.definitions.insert(declaration, address);
        }
        let Some(name) = info.name else { return };
        let name = if scope.is_empty() {
            name
        } else {
            format!("{scope}::{name}")
        };
        let ty = info.ty.map(|t| self.type_id(t, image));
        self.variables.push(PendingVariable {
            name,
            offset: info.offset,
            address: info.address,
            const_value: info.const_value,
            ty,
        });
    }

    /// Pair declarations with definitions and publish the variables.
    fn finish(self, image: &mut FirmwareImage) {
        for var in self.variables {
            let address = var.address.or_else(|| {
                var.offset
                    .and_then(|offset| self.definitions.get(&offset).copied())
            });
            if address.is_none() && var.const_value.is_none() {
                continue;
            }
            let size = var
                .ty
                .and_then(|ty| image.types().size_of(ty))
                .unwrap_or(0);
            let ty = var.ty.map(|ty| image.types().resolve(ty));
            image.insert_symbol(Symbol {
                name: var.name,
                address,
                size,
                ty,
                const_value: var.const_value,
                kind: FwSymbolKind::Variable,
                origin: SymbolOrigin::Dwarf,
            });
        }
    }
}

fn single_operation(
    unit: &Unit,
    expr: &gimli::Expression<DwarfReader>,
) -> Result<Option<gimli::Operation<DwarfReader>>, LoadError> {
    let mut bytes = expr.0.clone();
    if bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(gimli::Operation::parse(&mut bytes, unit.encoding())?))
}

fn read_line_program(
    dwarf: &gimli::Dwarf<DwarfReader>,
    unit: &Unit,
    image: &mut FirmwareImage,
) -> Result<(), LoadError> {
    let Some(program) = unit.line_program.clone() else {
        return Ok(());
    };
    let mut rows = program.rows();
    while let Some((header, row)) = rows.next_row()? {
        if !row.is_stmt() || row.end_sequence() {
            continue;
        }
        // line 0 is compiler-generated code
        let Some(line) = row.line() else { continue };
        let Some(file) = row.file(header) else {
            continue;
        };
        let name = dwarf.attr_string(unit, file.path_name())?;
        let name = name.to_string_lossy()?;
        let path = match file.directory(header) {
            Some(dir) if !name.starts_with('/') => {
                let dir = dwarf.attr_string(unit, dir)?;
                format!("{}/{name}", dir.to_string_lossy()?)
            }
            _ => name.into_owned(),
        };
        image.add_line(row.address(), &path, line);
    }
    Ok(())
}

/// Itanium C++ names first, then Rust; anything else is kept as is.
fn demangle(name: &str) -> String {
    match cpp_demangle::Symbol::new(name) {
        Ok(symbol) => symbol
            .demangle()
            .unwrap_or_else(|_| name.to_string()),
        Err(_) => rustc_demangle::demangle(name).to_string(),
    }
}

fn read_symtab(obj: &object::File<'_>, image: &mut FirmwareImage) {
    for symbol in obj.symbols() {
        let Ok(name) = symbol.name() else { continue };
        if name.is_empty() || symbol.is_undefined() {
            continue;
        }
        match symbol.kind() {
            SymbolKind::Text | SymbolKind::Label | SymbolKind::Unknown => {
                let name = demangle(name);
                image.add_function(&name, symbol.address(), symbol.size());
            }
            _ => {}
        }
    }
}
