use super::handle::DirectoryListable;
use crate::models::FileRecord;

/// Open directory over a snapshot of its children
#[derive(Debug)]
pub struct DirectoryHandle {
    record: FileRecord,
    children: Vec<FileRecord>,
    entries_cursor: usize,
    names_cursor: usize,
}

impl DirectoryHandle {
    pub fn new(record: FileRecord, children: Vec<FileRecord>) -> Self {
        Self {
            record,
            children,
            entries_cursor: 0,
            names_cursor: 0,
        }
    }

    pub fn record(&self) -> &FileRecord {
        &self.record
    }

    pub fn into_record(self) -> FileRecord {
        self.record
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Skip `n` entries of the entry listing
    pub fn seek_entries(&mut self, n: usize) {
        self.entries_cursor = (self.entries_cursor + n).min(self.children.len());
    }
}

/// Advance `cursor` by up to `n` (all remaining when negative) and return the covered range
fn take(cursor: &mut usize, len: usize, n: i64) -> std::ops::Range<usize> {
    let start = *cursor;
    let remaining = len - start;
    let count = if n < 0 {
        remaining
    } else {
        (n as usize).min(remaining)
    };
    *cursor = start + count;
    start..*cursor
}

impl DirectoryListable for DirectoryHandle {
    fn list_entries(&mut self, n: i64) -> Vec<FileRecord> {
        let range = take(&mut self.entries_cursor, self.children.len(), n);
        self.children[range].to_vec()
    }

    fn list_names(&mut self, n: i64) -> Vec<String> {
        let range = take(&mut self.names_cursor, self.children.len(), n);
        self.children[range]
            .iter()
            .filter(|c| c.is_dir)
            .map(|c| c.file_name.clone())
            .collect()
    }
}
