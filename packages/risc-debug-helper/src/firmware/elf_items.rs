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

use crate::utils::canonicalize_path;

pub struct FileTable {
    files_by_id: BTreeMap<u32, String>,
    id_by_file: BTreeMap<String, u32>,
    next_id: u32,
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTable {
    pub fn new() -> Self {
        Self {
            files_by_id: BTreeMap::new(),
            id_by_file: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn intern(&mut self, path: &str) -> u32 {
        let fp = canonicalize_path(path);
        if let Some(&id) = self.id_by_file.get(&fp) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.files_by_id.insert(id, fp.clone());
        self.id_by_file.insert(fp, id);
        id
    }

    pub fn get_by_id(&self, id: u32) -> Option<&String> {
        self.files_by_id.get(&id)
    }

    pub fn get_by_path(&self, path: &str) -> Option<u32> {
        if let Some(id) = self.id_by_file.get(path) {
            return Some(*id);
        }
        self.id_by_file.get(&canonicalize_path(path)).copied()
    }
}

pub struct LineInfoEntry {
    pub file_id: u32,
    pub line: Vec<NonZeroU64>, // A single address may map to multiple lines
}

impl LineInfoEntry {
    pub fn new(file_id: u32, line: NonZeroU64) -> Self {
        Self {
            file_id,
            line: vec![line],
        }
    }

    pub fn add_line(&mut self, line: NonZeroU64) {
        if !self.line.contains(&line) {
            self.line.push(line);
        }
    }
}

/// PC -> source line table built from the DWARF line program.
#[derive(Default)]
pub struct AddrtoLineInfo {
    pub entries: BTreeMap<u64, LineInfoEntry>,
}

impl AddrtoLineInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_or_insert(&mut self, address: u64, file_id: u32, line: NonZeroU64) {
        self.entries
            .entry(address)
            .and_modify(|entry| entry.add_line(line))
            .or_insert_with(|| LineInfoEntry::new(file_id, line));
    }

    pub fn get_entry(&self, address: u64) -> Option<&LineInfoEntry> {
        self.entries.get(&address)
    }

    /// Entry for the closest row at or below `address`.
    pub fn find_entry(&self, address: u64) -> Option<(u64, &LineInfoEntry)> {
        self.entries
            .range(..=address)
            .next_back()
            .map(|(addr, entry)| (*addr, entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closest_row_wins() {
        let mut lines = AddrtoLineInfo::new();
        let l = |n| NonZeroU64::new(n).unwrap();
        lines.append_or_insert(0x100, 1, l(10));
        lines.append_or_insert(0x108, 1, l(12));
        lines.append_or_insert(0x108, 1, l(13));

        assert_eq!(lines.find_entry(0x104).map(|(a, _)| a), Some(0x100));
        assert_eq!(lines.get_entry(0x108).map(|e| e.line.len()), Some(2));
        assert!(lines.find_entry(0xFC).is_none());
    }
}
