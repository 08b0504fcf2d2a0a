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

use std::collections::BTreeMap;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};

use crate::error::LoadError;
use crate::firmware::elf_items::{AddrtoLineInfo, FileTable};
use crate::firmware::symbols::{Symbol, SymbolOrigin, SymbolTable};
use crate::firmware::types::{TypeDef, TypeGraph, TypeId};

/// Turns a firmware binary into a [`FirmwareImage`].
pub trait ImageParser: Send + Sync {
    fn parse(&self, prefix: &str, path: &Path) -> Result<FirmwareImage, LoadError>;
}

/// Source position of a program counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub file: String,
    pub line: u64,
}

/// Everything known about one firmware build: variables, types, enumerators,
/// function symbols and the line table.
pub struct FirmwareImage {
    prefix: String,
    path: Option<PathBuf>,
    types: TypeGraph,
    type_names: BTreeMap<String, TypeId>,
    variables: SymbolTable,
    enumerators: BTreeMap<String, i64>,
    functions: SymbolTable,
    lines: AddrtoLineInfo,
    files: FileTable,
}

impl FirmwareImage {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            path: None,
            types: TypeGraph::new(),
            type_names: BTreeMap::new(),
            variables: SymbolTable::new(),
            enumerators: BTreeMap::new(),
            functions: SymbolTable::new(),
            lines: AddrtoLineInfo::new(),
            files: FileTable::new(),
        }
    }

    pub fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.to_path_buf());
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn types(&self) -> &TypeGraph {
        &self.types
    }

    pub(crate) fn types_mut(&mut self) -> &mut TypeGraph {
        &mut self.types
    }

    pub fn variables(&self) -> &SymbolTable {
        &self.variables
    }

    pub fn functions(&self) -> &SymbolTable {
        &self.functions
    }

    pub fn enumerators(&self) -> &BTreeMap<String, i64> {
        &self.enumerators
    }

    /// Named types, keyed by qualified name.
    pub fn type_names(&self) -> &BTreeMap<String, TypeId> {
        &self.type_names
    }

    pub fn type_by_name(&self, name: &str) -> Option<TypeId> {
        self.type_names.get(name).copied()
    }

    /// Add a type; named types become findable by name (first definition wins).
    pub fn add_type(&mut self, def: TypeDef) -> TypeId {
        let name = def.name.clone();
        let id = self.types.add(def);
        self.register_type_name(&name, id);
        id
    }

    /// Allocate an id for a type defined later, so a struct can point to itself.
    pub fn reserve_type(&mut self) -> TypeId {
        self.types.reserve()
    }

    pub fn define_type(&mut self, id: TypeId, def: TypeDef) {
        let name = def.name.clone();
        self.types.define(id, def);
        self.register_type_name(&name, id);
    }

    pub(crate) fn register_type_name(&mut self, name: &str, id: TypeId) {
        if !name.is_empty() {
            self.type_names.entry(name.to_string()).or_insert(id);
        }
    }

    pub fn add_variable(&mut self, name: &str, address: u64, ty: TypeId) {
        let size = self.types.size_of(ty).unwrap_or(0);
        self.variables
            .insert(Symbol::variable(name, address, size, ty));
    }

    /// A variable the compiler folded into a constant; it has a value but no address.
    pub fn add_constant(&mut self, name: &str, value: i64, ty: TypeId) {
        let size = self.types.size_of(ty).unwrap_or(0);
        self.variables.insert(Symbol {
            address: None,
            const_value: Some(value),
            ..Symbol::variable(name, 0, size, ty)
        });
    }

    pub(crate) fn insert_symbol(&mut self, symbol: Symbol) {
        self.variables.insert(symbol);
    }

    /// `path` is the enumerator's qualified name, e.g. `EpochQueueCmd::EpochCmdValid`.
    pub fn add_enumerator(&mut self, path: &str, value: i64) {
        self.enumerators.insert(path.to_string(), value);
    }

    pub fn add_function(&mut self, name: &str, address: u64, size: u64) {
        self.functions.insert(Symbol::function(name, address, size));
    }

    pub fn add_line(&mut self, address: u64, file: &str, line: NonZeroU64) {
        let file_id = self.files.intern(file);
        self.lines.append_or_insert(address, file_id, line);
    }

    pub fn function_at(&self, pc: u64) -> Option<&Symbol> {
        self.functions.lookup(pc)
    }

    pub fn source_line(&self, pc: u64) -> Option<SourceLine> {
        let (_, entry) = self.lines.find_entry(pc)?;
        let file = self.files.get_by_id(entry.file_id)?;
        Some(SourceLine {
            file: file.clone(),
            line: entry.line.first()?.get(),
        })
    }

    /// "function+0xoffset at file:line" for a program counter.
    pub fn describe_pc(&self, pc: u64) -> String {
        let mut out = match self.function_at(pc) {
            Some(f) => {
                let offset = pc - f.address.unwrap_or(pc);
                if offset == 0 {
                    f.name.clone()
                } else {
                    format!("{}+0x{offset:x}", f.name)
                }
            }
            None => format!("0x{pc:08x}"),
        };
        if let Some(line) = self.source_line(pc) {
            out.push_str(&format!(" at {}:{}", line.file, line.line));
        }
        out
    }

    /// Inject synthetic variables for firmware constants that only exist as `#define`s.
    /// Each declaration names an existing variable whose value (or address) becomes
    /// the new symbol's address, and the type the new symbol has.
    pub(crate) fn inject_synthetic(
        &mut self,
        extra_vars: &BTreeMap<String, ExtraVar>,
    ) -> Result<(), LoadError> {
        for (name, decl) in extra_vars {
            if self.variables.has_symbol_by_name(name) {
                log::info!("Variable '{name}' already in {}. Skipping", self.prefix);
                continue;
            }
            let missing_offset = || LoadError::MissingOffsetSymbol {
                prefix: self.prefix.clone(),
                name: name.clone(),
                offset: decl.offset_symbol_name.clone(),
            };
            let source = self
                .variables
                .get_by_name(&decl.offset_symbol_name)
                .ok_or_else(missing_offset)?;
            // a zero constant counts as no value
            let address = match source.const_value {
                Some(value) if value < 0 => {
                    return Err(LoadError::NegativeOffset {
                        prefix: self.prefix.clone(),
                        name: name.clone(),
                        offset: decl.offset_symbol_name.clone(),
                        value,
                    })
                }
                Some(value) if value > 0 => value as u64,
                _ => source.address.ok_or_else(missing_offset)?,
            };
            let ty = self
                .type_by_name(&decl.type_name)
                .ok_or_else(|| LoadError::MissingType {
                    prefix: self.prefix.clone(),
                    name: name.clone(),
                    type_name: decl.type_name.clone(),
                })?;
            let ty = self.types.resolve(ty);
            let symbol = Symbol {
                origin: SymbolOrigin::Synthetic {
                    source: decl.offset_symbol_name.clone(),
                    declared_type: decl.type_name.clone(),
                },
                ..Symbol::variable(name, address, self.types.size_of(ty).unwrap_or(0), ty)
            };
            log::debug!("{}: injected {name} at 0x{address:08x}", self.prefix);
            self.variables.insert(symbol);
        }
        Ok(())
    }
}

/// Declaration of a synthetic symbol: where its address comes from and what type it has.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExtraVar {
    #[serde(alias = "offset")]
    pub offset_symbol_name: String,
    #[serde(alias = "type")]
    pub type_name: String,
}

impl ExtraVar {
    pub fn new(offset_symbol_name: &str, type_name: &str) -> Self {
        Self {
            offset_symbol_name: offset_symbol_name.to_string(),
            type_name: type_name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::types::Member;

    #[test]
    fn describe_pc_uses_symtab_and_lines() {
        let mut image = FirmwareImage::new("brisc");
        image.add_function("main", 0x100, 0x40);
        image.add_line(0x100, "/fw/brisc.cc", NonZeroU64::new(20).unwrap());
        image.add_line(0x110, "/fw/brisc.cc", NonZeroU64::new(23).unwrap());

        assert_eq!(image.describe_pc(0x100), "main at /fw/brisc.cc:20");
        assert_eq!(image.describe_pc(0x114), "main+0x14 at /fw/brisc.cc:23");
        assert_eq!(image.function_at(0x200), None);
    }

    #[test]
    fn synthetic_symbol_takes_constant_value() {
        let mut image = FirmwareImage::new("brisc");
        let u32_t = image.add_type(TypeDef::base("uint32_t", 4));
        let epoch = image.add_type(TypeDef::structure(
            "epoch_t",
            8,
            vec![Member::new("id", 0, u32_t), Member::new("count", 4, u32_t)],
        ));
        image.add_type(TypeDef::typedef("epoch_alias_t", epoch));
        image.add_constant("EPOCH_INFO_ADDR", 0x2000, u32_t);

        let mut extra = BTreeMap::new();
        extra.insert(
            "EPOCH_INFO_PTR".to_string(),
            ExtraVar::new("EPOCH_INFO_ADDR", "epoch_alias_t"),
        );
        image.inject_synthetic(&extra).unwrap();

        let sym = image.variables().get_by_name("EPOCH_INFO_PTR").unwrap();
        assert_eq!(sym.address, Some(0x2000));
        assert_eq!(sym.size, 8);
        assert_eq!(sym.ty, Some(epoch));
        assert!(sym.is_synthetic());
    }

    #[test]
    fn zero_constant_falls_back_to_the_address() {
        let mut image = FirmwareImage::new("brisc");
        let u32_t = image.add_type(TypeDef::base("uint32_t", 4));
        image.add_type(TypeDef::structure("epoch_t", 4, vec![Member::new("id", 0, u32_t)]));
        image.insert_symbol(Symbol {
            const_value: Some(0),
            ..Symbol::variable("EPOCH_INFO_ADDR", 0x3000, 4, u32_t)
        });
        image.add_constant("UNPLACED", 0, u32_t);
        image.add_constant("BELOW_ZERO", -16, u32_t);

        let extra = BTreeMap::from([(
            "EPOCH_INFO_PTR".to_string(),
            ExtraVar::new("EPOCH_INFO_ADDR", "epoch_t"),
        )]);
        image.inject_synthetic(&extra).unwrap();
        let sym = image.variables().get_by_name("EPOCH_INFO_PTR").unwrap();
        assert_eq!(sym.address, Some(0x3000));

        let extra = BTreeMap::from([("P".to_string(), ExtraVar::new("UNPLACED", "epoch_t"))]);
        assert!(matches!(
            image.inject_synthetic(&extra),
            Err(LoadError::MissingOffsetSymbol { .. })
        ));

        let extra = BTreeMap::from([("Q".to_string(), ExtraVar::new("BELOW_ZERO", "epoch_t"))]);
        assert!(matches!(
            image.inject_synthetic(&extra),
            Err(LoadError::NegativeOffset { value: -16, .. })
        ));
    }

    #[test]
    fn extra_var_accepts_short_keys() {
        let decl: ExtraVar =
            serde_json::from_str(r#"{"offset": "EPOCH_INFO_ADDR", "type": "epoch_t"}"#).unwrap();
        assert_eq!(decl, ExtraVar::new("EPOCH_INFO_ADDR", "epoch_t"));
    }
}
