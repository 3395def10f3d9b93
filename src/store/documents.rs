use super::IndexStore;
use super::models::{FileRecord, SymbolLocation, SymbolRole};

impl IndexStore {
    /// Inserts or replaces the record for `record.path`.
    ///
    /// Symbol-table entries owned by the previous record are purged before the
    /// new ones go in, so the table never points at a symbol the file no
    /// longer has. Returns the replaced record.
    pub fn upsert(&mut self, record: FileRecord) -> Option<FileRecord> {
        let previous = self.files.remove(&record.path);
        if let Some(old) = &previous {
            self.purge_symbols(old);
        }
        self.insert_symbols(&record);
        self.files.insert(record.path.clone(), record);
        previous
    }

    /// Deletes the record and its symbol entries, and prunes it from the
    /// dependency graph.
    pub fn remove(&mut self, path: &str) -> Option<FileRecord> {
        let removed = self.files.remove(path)?;
        self.purge_symbols(&removed);
        self.graph.prune(path);
        Some(removed)
    }

    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Records in path order.
    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    fn insert_symbols(&mut self, record: &FileRecord) {
        let definitions = record.symbols.iter().map(|s| SymbolLocation {
            name: s.name.clone(),
            path: record.path.clone(),
            line: s.line,
            column: s.column,
            kind: Some(s.kind),
            role: SymbolRole::Definition,
        });
        let references = record
            .imported_names
            .iter()
            .filter(|n| !record.defines(&n.name))
            .map(|n| SymbolLocation {
                name: n.name.clone(),
                path: record.path.clone(),
                line: n.line,
                column: 1,
                kind: None,
                role: SymbolRole::Reference,
            });

        for location in definitions.chain(references) {
            let entries = self.symbols.entry(location.name.clone()).or_default();
            entries.push(location);
            entries.sort_by(|a, b| {
                a.path
                    .cmp(&b.path)
                    .then(a.line.cmp(&b.line))
                    .then(a.column.cmp(&b.column))
            });
        }
    }

    fn purge_symbols(&mut self, record: &FileRecord) {
        let names = record
            .symbols
            .iter()
            .map(|s| s.name.as_str())
            .chain(record.imported_names.iter().map(|n| n.name.as_str()));

        for name in names {
            let emptied = match self.symbols.get_mut(name) {
                Some(entries) => {
                    entries.retain(|loc| loc.path != record.path);
                    entries.is_empty()
                }
                None => false,
            };
            if emptied {
                self.symbols.remove(name);
            }
        }
    }
}
