use std::collections::BTreeMap;
use std::sync::Arc;

use crate::firmware::types::TypeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Function,
    /// `.symtab` entry without a type (assembly labels).
    Label,
}

/// Where a symbol came from. Resolution treats every origin the same.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolOrigin {
    Dwarf,
    ElfSymtab,
    /// Fabricated for a firmware constant that has no debug entry of its own.
    Synthetic {
        source: String,
        declared_type: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub address: Option<u64>,
    pub size: u64,
    pub ty: Option<TypeId>,
    /// `DW_AT_const_value`, for constants the compiler folded away.
    pub const_value: Option<i64>,
    pub kind: SymbolKind,
    pub origin: SymbolOrigin,
}

impl Symbol {
    pub fn variable(name: &str, address: u64, size: u64, ty: TypeId) -> Self {
        Self {
            name: name.to_string(),
            address: Some(address),
            size,
            ty: Some(ty),
            const_value: None,
            kind: SymbolKind::Variable,
            origin: SymbolOrigin::Dwarf,
        }
    }

    pub fn function(name: &str, address: u64, size: u64) -> Self {
        Self {
            name: name.to_string(),
            address: Some(address),
            size,
            ty: None,
            const_value: None,
            kind: SymbolKind::Function,
            origin: SymbolOrigin::ElfSymtab,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self.origin, SymbolOrigin::Synthetic { .. })
    }
}

#[derive(Default)]
pub struct SymbolTable {
    // start address -> symbol; only symbols that live in memory
    symbols_by_addr: BTreeMap<u64, Arc<Symbol>>,
    symbols_by_name: BTreeMap<String, Arc<Symbol>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A later symbol with the same name or start address replaces the earlier one.
    pub fn insert(&mut self, symbol: Symbol) {
        let arc_symbol = Arc::new(symbol);
        if let Some(address) = arc_symbol.address {
            self.symbols_by_addr.insert(address, arc_symbol.clone());
        }
        self.symbols_by_name
            .insert(arc_symbol.name.clone(), arc_symbol);
    }

    /// Find the symbol that contains the given address
    pub fn lookup(&self, address: u64) -> Option<&Symbol> {
        let (&start_addr, symbol) = self.symbols_by_addr.range(..=address).next_back()?;
        // zero-sized markers only match their exact address
        if (symbol.size > 0 && address < start_addr + symbol.size)
            || (symbol.size == 0 && address == start_addr)
        {
            return Some(symbol.as_ref());
        }
        None
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Symbol> {
        self.symbols_by_name.get(name).map(|s| s.as_ref())
    }

    pub fn has_symbol_by_name(&self, name: &str) -> bool {
        self.symbols_by_name.contains_key(name)
    }

    /// Names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.symbols_by_name.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols_by_name.values().map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.symbols_by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols_by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_address_range() {
        let mut table = SymbolTable::new();
        table.insert(Symbol::function("main", 0x100, 0x20));
        table.insert(Symbol::function("_start", 0x0, 0));

        assert_eq!(table.lookup(0x110).map(|s| s.name.as_str()), Some("main"));
        assert_eq!(table.lookup(0x120), None);
        assert_eq!(table.lookup(0x0).map(|s| s.name.as_str()), Some("_start"));
        assert_eq!(table.lookup(0x4), None);
    }

    #[test]
    fn constants_are_found_by_name_only() {
        let mut table = SymbolTable::new();
        table.insert(Symbol {
            const_value: Some(0x1000),
            address: None,
            ..Symbol::variable("EPOCH_INFO_ADDR", 0, 4, TypeId(0))
        });
        assert!(table.has_symbol_by_name("EPOCH_INFO_ADDR"));
        assert_eq!(table.lookup(0), None);
    }
}
