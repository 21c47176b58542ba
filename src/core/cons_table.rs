//! Open-addressing set used for hash-consing builder instructions.
//!
//! The table only remembers a 32-bit hash and a small payload (a builder
//! value id). Full records stay in the builder, so a lookup hands every
//! candidate with a matching hash to a caller predicate that re-checks
//! structural equality.

/// One slot. A zero hash marks an empty slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Entry {
    hash: u32,
    payload: u32,
}

/// Linear-probing hash set over a power-of-two capacity.
///
/// The table grows by doubling before an insert would push occupancy past
/// three quarters, so at least one slot is always empty and probing always
/// terminates. There is no deletion; [`ConsTable::clear`] forgets everything.
#[derive(Debug, Clone, Default)]
pub struct ConsTable {
    entries: Vec<Entry>,
    len: usize,
}

impl ConsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current slot count (zero or a power of two).
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Record `payload` under `hash`, returning the slot it landed in.
    /// Duplicates are allowed; the slot is only stable until the next grow.
    pub fn insert(&mut self, hash: u32, payload: u32) -> usize {
        let hash = nonzero(hash);
        if (self.len + 1) * 4 > self.capacity() * 3 {
            self.grow();
        }
        self.just_insert(hash, payload)
    }

    /// Probe for an entry with `hash` whose payload satisfies `matches`.
    pub fn lookup<F>(&self, hash: u32, mut matches: F) -> Option<u32>
    where
        F: FnMut(u32) -> bool,
    {
        if self.entries.is_empty() {
            return None;
        }
        let hash = nonzero(hash);
        let mask = self.mask();
        let mut i = hash as usize & mask;
        while self.entries[i].hash != 0 {
            let entry = self.entries[i];
            if entry.hash == hash && matches(entry.payload) {
                return Some(entry.payload);
            }
            i = (i + 1) & mask;
        }
        None
    }

    /// Forget every entry, keeping the allocation.
    pub fn clear(&mut self) {
        self.entries.fill(Entry::default());
        self.len = 0;
    }

    fn mask(&self) -> usize {
        self.entries.len() - 1
    }

    fn grow(&mut self) {
        let new_cap = if self.entries.is_empty() { 2 } else { self.entries.len() * 2 };
        let old = std::mem::replace(&mut self.entries, vec![Entry::default(); new_cap]);
        self.len = 0;
        for entry in old.into_iter().filter(|e| e.hash != 0) {
            self.just_insert(entry.hash, entry.payload);
        }
    }

    fn just_insert(&mut self, hash: u32, payload: u32) -> usize {
        debug_assert!(hash != 0 && self.len < self.mask(), "at least two empty slots must remain");
        let mask = self.mask();
        let mut i = hash as usize & mask;
        while self.entries[i].hash != 0 {
            i = (i + 1) & mask;
        }
        self.entries[i] = Entry { hash, payload };
        self.len += 1;
        i
    }
}

/// Zero means "empty slot", so a real zero hash is stored as one.
fn nonzero(hash: u32) -> u32 {
    if hash == 0 { 1 } else { hash }
}
