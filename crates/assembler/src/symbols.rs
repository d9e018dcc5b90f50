//! Symbol tables.
//!
//! Every file owns three tables: its labels, its `.define` constants, and
//! the set of names it declared `.global`. One shared table holds the
//! global labels of the whole program. Names are borrowed from the
//! preprocessed source buffers; an entry can exist in a declared-but-pending
//! state before its definition is seen (`.global` forward references).

use std::collections::HashMap;

use crate::scanner::Name;

/// One symbol: its 64-bit value, whether the definition has been seen, and
/// whether it lives in a data section (used by the debug trailer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SymbolEntry {
    pub value: u64,
    pub is_defined: bool,
    pub is_data: bool,
    /// Set on `.define` constants whose value came from a label; those are
    /// rewritten together with the labels once section bases are known.
    pub relocatable: bool,
}

/// A name to entry map.
#[derive(Debug, Default)]
pub(crate) struct SymbolTable<'a> {
    entries: HashMap<Name<'a>, SymbolEntry>,
}

impl<'a> SymbolTable<'a> {
    pub(crate) fn insert(&mut self, name: Name<'a>, value: u64, is_defined: bool, is_data: bool) {
        self.entries
            .insert(name, SymbolEntry { value, is_defined, is_data, relocatable: false });
    }

    pub(crate) fn insert_relocatable(&mut self, name: Name<'a>, value: u64, is_data: bool) {
        self.entries
            .insert(name, SymbolEntry { value, is_defined: true, is_data, relocatable: true });
    }

    pub(crate) fn get(&self, name: Name<'a>) -> Option<&SymbolEntry> {
        self.entries.get(name)
    }

    pub(crate) fn contains(&self, name: Name<'a>) -> bool {
        self.entries.contains_key(name)
    }

    pub(crate) fn has_definition(&self, name: Name<'a>) -> bool {
        self.entries.get(name).is_some_and(|entry| entry.is_defined)
    }

    /// Promote a declared entry to defined.
    pub(crate) fn make_defined(&mut self, name: Name<'a>, value: u64, is_data: bool) {
        if let Some(entry) = self.entries.get_mut(name) {
            entry.value = value;
            entry.is_defined = true;
            entry.is_data = is_data;
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&Name<'a>, &SymbolEntry)> {
        self.entries.iter()
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut SymbolEntry> {
        self.entries.values_mut()
    }
}

/// The three per-file tables.
#[derive(Debug, Default)]
pub(crate) struct FileScope<'a> {
    /// Labels defined (or declared `.global`) in this file.
    pub labels: SymbolTable<'a>,
    /// `.define` constants of this file. Never relocated unless the value
    /// came from a label.
    pub defines: SymbolTable<'a>,
    /// Names this file declared `.global`, for duplicate detection.
    pub globals: SymbolTable<'a>,
}

/// All symbol state of one assembly run.
#[derive(Debug)]
pub(crate) struct SymbolState<'a> {
    pub scopes: Vec<FileScope<'a>>,
    pub globals: SymbolTable<'a>,
}

/// How a name used as an operand resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolved {
    /// A `.define` constant: the raw value, never pc-adjusted.
    Define(i64),
    /// A label: an absolute address.
    Label(u64),
}

impl<'a> SymbolState<'a> {
    pub(crate) fn new(file_count: usize) -> Self {
        Self {
            scopes: (0..file_count).map(|_| FileScope::default()).collect(),
            globals: SymbolTable::default(),
        }
    }

    /// Resolve a name seen as an operand in `file`: local defines first,
    /// then local labels, then global labels.
    pub(crate) fn resolve(&self, file: usize, name: Name<'a>) -> Option<Resolved> {
        let scope = &self.scopes[file];

        if let Some(entry) = scope.defines.get(name) {
            return Some(Resolved::Define(entry.value as i64));
        }

        if scope.labels.has_definition(name) {
            return scope.labels.get(name).map(|entry| Resolved::Label(entry.value));
        }

        if self.globals.has_definition(name) {
            return self.globals.get(name).map(|entry| Resolved::Label(entry.value));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use bstr::BStr;

    use super::*;

    #[test]
    fn test_declared_versus_defined() {
        let name = BStr::new("main");
        let mut table = SymbolTable::default();

        table.insert(name, 0, false, false);
        assert!(table.contains(name));
        assert!(!table.has_definition(name));

        table.make_defined(name, 0x80000010, false);
        assert!(table.has_definition(name));
        assert_eq!(table.get(name).unwrap().value, 0x80000010);
    }

    #[test]
    fn test_resolution_order_prefers_defines() {
        let name = BStr::new("value");
        let mut state = SymbolState::new(1);

        state.globals.insert(name, 0x8000_0000, true, false);
        state.scopes[0].labels.insert(name, 0x8000_0100, true, false);
        state.scopes[0].defines.insert(name, 7, true, false);

        assert_eq!(state.resolve(0, name), Some(Resolved::Define(7)));
    }

    #[test]
    fn test_resolution_falls_back_to_globals() {
        let name = BStr::new("main");
        let mut state = SymbolState::new(2);

        state.globals.insert(name, 0x8000_0040, true, false);

        assert_eq!(state.resolve(0, name), Some(Resolved::Label(0x8000_0040)));
        assert_eq!(state.resolve(1, name), Some(Resolved::Label(0x8000_0040)));
    }

    #[test]
    fn test_undeclared_name_does_not_resolve() {
        let state = SymbolState::new(1);

        assert_eq!(state.resolve(0, BStr::new("ghost")), None);
    }
}
