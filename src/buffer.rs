use crate::events::ChangeEntry;

/// Accepted entries waiting to be written, in delivery order.
///
/// Owned by the consumer side of the watch hand-off, so none of these
/// methods synchronize; every call is O(1) amortized or a single move.
#[derive(Debug, Default, Clone)]
pub struct EntryBuffer {
    entries: Vec<ChangeEntry>,
}

impl EntryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: ChangeEntry) {
        self.entries.push(entry);
    }

    /// Takes everything buffered so far and leaves the buffer empty.
    pub fn snapshot_and_clear(&mut self) -> Vec<ChangeEntry> {
        std::mem::take(&mut self.entries)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Puts a snapshot that failed to persist back in front of anything
    /// appended since it was taken.
    pub fn restore(&mut self, mut snapshot: Vec<ChangeEntry>) {
        if snapshot.is_empty() {
            return;
        }
        snapshot.append(&mut self.entries);
        self.entries = snapshot;
    }

    pub fn entries(&self) -> &[ChangeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChangeKind;
    use std::path::PathBuf;
    use std::sync::mpsc;
    use std::thread;

    fn entry(name: &str) -> ChangeEntry {
        ChangeEntry::new(PathBuf::from("/w").join(name), ChangeKind::Modified)
    }

    #[test]
    fn test_append_keeps_order_and_duplicates() {
        let mut buffer = EntryBuffer::new();
        buffer.append(entry("a.txt"));
        buffer.append(entry("a.txt"));
        buffer.append(entry("b.txt"));

        let names: Vec<_> = buffer.entries().iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "a.txt", "b.txt"]);
    }

    #[test]
    fn test_snapshot_empties_buffer() {
        let mut buffer = EntryBuffer::new();
        buffer.append(entry("a.txt"));
        buffer.append(entry("b.txt"));

        let snapshot = buffer.snapshot_and_clear();
        assert_eq!(snapshot.len(), 2);
        assert!(buffer.is_empty());

        buffer.append(entry("c.txt"));
        assert_eq!(buffer.len(), 1);
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_clear_discards() {
        let mut buffer = EntryBuffer::new();
        buffer.append(entry("a.txt"));
        buffer.clear();

        assert!(buffer.is_empty());
        assert!(buffer.snapshot_and_clear().is_empty());
    }

    #[test]
    fn test_restore_goes_before_newer_entries() {
        let mut buffer = EntryBuffer::new();
        buffer.append(entry("1"));
        buffer.append(entry("2"));
        let snapshot = buffer.snapshot_and_clear();

        buffer.append(entry("3"));
        buffer.restore(snapshot);

        let names: Vec<_> = buffer.entries().iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_snapshots_interleaved_with_producer_lose_nothing() {
        let (tx, rx) = mpsc::channel::<ChangeEntry>();
        let producer = thread::spawn(move || {
            for i in 0..2000 {
                if tx.send(entry(&i.to_string())).is_err() {
                    break;
                }
            }
        });

        let mut buffer = EntryBuffer::new();
        let mut flushed = Vec::new();
        let mut received = 0;
        while let Ok(e) = rx.recv() {
            buffer.append(e);
            received += 1;
            if received % 37 == 0 {
                flushed.extend(buffer.snapshot_and_clear());
            }
        }
        producer.join().unwrap();
        flushed.extend(buffer.snapshot_and_clear());

        let names: Vec<String> = flushed.into_iter().map(|e| e.filename).collect();
        let expected: Vec<String> = (0..2000).map(|i| i.to_string()).collect();
        assert_eq!(names, expected);
    }
}
