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

//! Explicit type graph of one firmware image.
//!
//! Types live in an arena and refer to each other through [`TypeId`], so
//! self-referential structures (a list node pointing at its own type) are plain
//! data and never recursive Rust values.

/// Firmware pointers are 32-bit.
pub const POINTER_SIZE: u64 = 4;

/// Bound on typedef/qualifier chains, which a corrupt image could make cyclic.
const MAX_ALIAS_CHAIN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Base,
    Struct,
    Union,
    Enum,
    Pointer { target: Option<TypeId> },
    Reference { target: Option<TypeId> },
    /// `dimensions` lists element counts, outermost first: `int a[2][3]` is `[2, 3]`.
    Array { element: TypeId, dimensions: Vec<u64> },
    Typedef { target: Option<TypeId> },
    /// const / volatile / restrict wrapper.
    Qualified { target: Option<TypeId> },
    /// Functions, `void`, and types the parser has not filled in.
    Opaque,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// `None` for anonymous struct/union members, whose fields are reachable from the parent.
    pub name: Option<String>,
    pub offset: u64,
    pub ty: TypeId,
}

impl Member {
    pub fn new(name: &str, offset: u64, ty: TypeId) -> Self {
        Self {
            name: Some(name.to_string()),
            offset,
            ty,
        }
    }

    pub fn unnamed(offset: u64, ty: TypeId) -> Self {
        Self {
            name: None,
            offset,
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    /// Qualified name (`ns::epoch_t`); empty for anonymous and derived types.
    pub name: String,
    pub kind: TypeKind,
    pub byte_size: Option<u64>,
    /// Data members in declaration order (structs and unions only).
    pub members: Vec<Member>,
}

impl TypeDef {
    pub fn base(name: &str, byte_size: u64) -> Self {
        Self::sized(name, TypeKind::Base, byte_size)
    }

    pub fn structure(name: &str, byte_size: u64, members: Vec<Member>) -> Self {
        Self {
            members,
            ..Self::sized(name, TypeKind::Struct, byte_size)
        }
    }

    pub fn union(name: &str, byte_size: u64, members: Vec<Member>) -> Self {
        Self {
            members,
            ..Self::sized(name, TypeKind::Union, byte_size)
        }
    }

    pub fn enumeration(name: &str, byte_size: u64) -> Self {
        Self::sized(name, TypeKind::Enum, byte_size)
    }

    pub fn pointer(target: TypeId) -> Self {
        Self::unnamed(TypeKind::Pointer {
            target: Some(target),
        })
    }

    pub fn reference(target: TypeId) -> Self {
        Self::unnamed(TypeKind::Reference {
            target: Some(target),
        })
    }

    pub fn array(element: TypeId, dimensions: Vec<u64>) -> Self {
        Self::unnamed(TypeKind::Array {
            element,
            dimensions,
        })
    }

    pub fn typedef(name: &str, target: TypeId) -> Self {
        Self {
            name: name.to_string(),
            ..Self::unnamed(TypeKind::Typedef {
                target: Some(target),
            })
        }
    }

    pub fn qualified(target: TypeId) -> Self {
        Self::unnamed(TypeKind::Qualified {
            target: Some(target),
        })
    }

    pub fn opaque(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::unnamed(TypeKind::Opaque)
        }
    }

    fn sized(name: &str, kind: TypeKind, byte_size: u64) -> Self {
        Self {
            name: name.to_string(),
            kind,
            byte_size: Some(byte_size),
            members: Vec::new(),
        }
    }

    fn unnamed(kind: TypeKind) -> Self {
        Self {
            name: String::new(),
            kind,
            byte_size: None,
            members: Vec::new(),
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.kind, TypeKind::Struct | TypeKind::Union)
    }
}

/// Member found by name, with its offset relative to the searched type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberLookup {
    pub offset: u64,
    pub ty: TypeId,
}

#[derive(Debug, Clone, Default)]
pub struct TypeGraph {
    types: Vec<TypeDef>,
}

impl TypeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, def: TypeDef) -> TypeId {
        self.types.push(def);
        TypeId(self.types.len() - 1)
    }

    /// Allocate an id before the definition is known (forward references in DWARF).
    pub fn reserve(&mut self) -> TypeId {
        self.add(TypeDef::opaque(""))
    }

    pub fn define(&mut self, id: TypeId, def: TypeDef) {
        self.types[id.0] = def;
    }

    pub fn get(&self, id: TypeId) -> &TypeDef {
        &self.types[id.0]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &TypeDef)> {
        self.types.iter().enumerate().map(|(i, t)| (TypeId(i), t))
    }

    /// Strip typedefs and qualifiers.
    pub fn resolve(&self, mut id: TypeId) -> TypeId {
        for _ in 0..MAX_ALIAS_CHAIN {
            match self.get(id).kind {
                TypeKind::Typedef { target: Some(t) } | TypeKind::Qualified { target: Some(t) } => {
                    id = t
                }
                _ => return id,
            }
        }
        id
    }

    /// Target of a pointer or reference, typedefs stripped on both sides.
    pub fn pointee(&self, id: TypeId) -> Option<TypeId> {
        match self.get(self.resolve(id)).kind {
            TypeKind::Pointer { target } | TypeKind::Reference { target } => {
                target.map(|t| self.resolve(t))
            }
            _ => None,
        }
    }

    pub fn is_pointer(&self, id: TypeId) -> bool {
        matches!(self.get(self.resolve(id)).kind, TypeKind::Pointer { .. })
    }

    pub fn is_reference(&self, id: TypeId) -> bool {
        matches!(self.get(self.resolve(id)).kind, TypeKind::Reference { .. })
    }

    pub fn size_of(&self, id: TypeId) -> Option<u64> {
        self.size_of_bounded(id, MAX_ALIAS_CHAIN)
    }

    fn size_of_bounded(&self, id: TypeId, budget: usize) -> Option<u64> {
        let def = self.get(id);
        if let Some(size) = def.byte_size {
            return Some(size);
        }
        if budget == 0 {
            return None;
        }
        match &def.kind {
            TypeKind::Pointer { .. } | TypeKind::Reference { .. } => Some(POINTER_SIZE),
            TypeKind::Array {
                element,
                dimensions,
            } => {
                let count = dimensions
                    .iter()
                    .try_fold(1u64, |acc, &d| acc.checked_mul(d))?;
                count.checked_mul(self.size_of_bounded(*element, budget - 1)?)
            }
            TypeKind::Typedef { target: Some(t) } | TypeKind::Qualified { target: Some(t) } => {
                self.size_of_bounded(*t, budget - 1)
            }
            _ => None,
        }
    }

    /// Human-readable name: `epoch_t`, `epoch_t*`, `uint32_t[2][3]`.
    pub fn display_name(&self, id: TypeId) -> String {
        self.display_name_bounded(id, MAX_ALIAS_CHAIN)
    }

    fn display_name_bounded(&self, id: TypeId, budget: usize) -> String {
        let def = self.get(id);
        if !def.name.is_empty() {
            return def.name.clone();
        }
        if budget == 0 {
            return "?".to_string();
        }
        let inner = |target: &Option<TypeId>| match target {
            Some(t) => self.display_name_bounded(*t, budget - 1),
            None => "void".to_string(),
        };
        match &def.kind {
            TypeKind::Pointer { target } => format!("{}*", inner(target)),
            TypeKind::Reference { target } => format!("{}&", inner(target)),
            TypeKind::Qualified { target } | TypeKind::Typedef { target } => inner(target),
            TypeKind::Array {
                element,
                dimensions,
            } => {
                let dims: String = dimensions.iter().map(|d| format!("[{d}]")).collect();
                format!("{}{dims}", self.display_name_bounded(*element, budget - 1))
            }
            TypeKind::Struct => "<anonymous struct>".to_string(),
            TypeKind::Union => "<anonymous union>".to_string(),
            TypeKind::Enum => "<anonymous enum>".to_string(),
            TypeKind::Base | TypeKind::Opaque => "?".to_string(),
        }
    }

    /// Find a data member by name, looking through anonymous struct/union members.
    pub fn find_member(&self, id: TypeId, name: &str) -> Option<MemberLookup> {
        self.find_member_bounded(self.resolve(id), name, MAX_ALIAS_CHAIN)
    }

    fn find_member_bounded(&self, id: TypeId, name: &str, budget: usize) -> Option<MemberLookup> {
        let def = self.get(id);
        if let Some(m) = def.members.iter().find(|m| m.name.as_deref() == Some(name)) {
            return Some(MemberLookup {
                offset: m.offset,
                ty: m.ty,
            });
        }
        if budget == 0 {
            return None;
        }
        def.members
            .iter()
            .filter(|m| m.name.is_none())
            .find_map(|m| {
                self.find_member_bounded(self.resolve(m.ty), name, budget - 1)
                    .map(|found| MemberLookup {
                        offset: m.offset + found.offset,
                        ty: found.ty,
                    })
            })
    }

    /// Named data members in declaration order, with anonymous members flattened in place.
    pub fn flattened_members(&self, id: TypeId) -> Vec<(String, MemberLookup)> {
        let mut out = Vec::new();
        self.flatten_into(self.resolve(id), 0, &mut out, MAX_ALIAS_CHAIN);
        out
    }

    fn flatten_into(
        &self,
        id: TypeId,
        base: u64,
        out: &mut Vec<(String, MemberLookup)>,
        budget: usize,
    ) {
        for m in &self.get(id).members {
            match &m.name {
                Some(name) => out.push((
                    name.clone(),
                    MemberLookup {
                        offset: base + m.offset,
                        ty: m.ty,
                    },
                )),
                None if budget > 0 => {
                    self.flatten_into(self.resolve(m.ty), base + m.offset, out, budget - 1)
                }
                None => {}
            }
        }
    }
}
