//! Free-list of tag read records owned by the scan thread

use crate::types::TagRead;

/// Recycles [`TagRead`] records so their string and byte buffers are reused
/// across reads.
///
/// The pool is owned by the scheduler and only touched from the scan thread,
/// so it is a plain `Vec` with no synchronization. At most `capacity` idle
/// records are retained; surplus records are dropped on release.
#[derive(Debug)]
pub struct RecordPool {
    idle: Vec<TagRead>,
    capacity: usize,
    created: usize,
}

impl RecordPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            idle: Vec::with_capacity(capacity),
            capacity,
            created: 0,
        }
    }

    /// Take an idle record, or allocate a new one if the pool is empty.
    pub fn acquire(&mut self) -> TagRead {
        match self.idle.pop() {
            Some(read) => read,
            None => {
                self.created += 1;
                TagRead::default()
            }
        }
    }

    /// Reset a record and keep it for reuse.
    pub fn release(&mut self, mut read: TagRead) {
        if self.idle.len() < self.capacity {
            read.reset();
            self.idle.push(read);
        }
    }

    pub fn release_all<I: IntoIterator<Item = TagRead>>(&mut self, reads: I) {
        for read in reads {
            self.release(read);
        }
    }

    /// Records allocated since the pool was created
    pub fn created(&self) -> usize {
        self.created
    }

    /// Records currently waiting for reuse
    pub fn idle(&self) -> usize {
        self.idle.len()
    }
}
