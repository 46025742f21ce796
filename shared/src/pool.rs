//! Dense slot allocator keyed by player ID.
//!
//! Entries live in a `Vec<Option<T>>`. New entries always take the lowest
//! free slot, and trailing empty slots are trimmed on removal. When an
//! invalid ID sentinel `s >= 0` is configured the slot index is shifted so
//! that the sentinel never names a slot: with `s = 0`, slot 0 is ID 1.

use crate::error::ProtocolError;

#[derive(Debug, Clone)]
pub struct Pool<T> {
    entries: Vec<Option<T>>,
    lowest_available: usize,
    invalid_id: i32,
    max_entries: usize,
    count: usize,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Pool<T> {
    /// Unbounded pool where IDs equal slot indices.
    pub fn new() -> Self {
        Self::with_limits(-1, usize::MAX)
    }

    pub fn with_invalid_id(invalid_id: i32) -> Self {
        Self::with_limits(invalid_id, usize::MAX)
    }

    pub fn with_limits(invalid_id: i32, max_entries: usize) -> Self {
        Pool {
            entries: Vec::new(),
            lowest_available: 0,
            invalid_id,
            max_entries,
            count: 0,
        }
    }

    pub fn invalid_id(&self) -> i32 {
        self.invalid_id
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.lowest_available >= self.max_entries
    }

    /// Length of the backing storage, occupied or not.
    pub fn slot_count(&self) -> usize {
        self.entries.len()
    }

    fn id_by_index(&self, index: usize) -> i32 {
        let id = index as i32;
        if self.invalid_id >= 0 && id >= self.invalid_id {
            id + 1
        } else {
            id
        }
    }

    fn index_by_id(&self, id: i32) -> Result<usize, ProtocolError> {
        if id == self.invalid_id || id < 0 {
            return Err(ProtocolError::InvalidId(id));
        }
        if self.invalid_id >= 0 && id > self.invalid_id {
            Ok(id as usize - 1)
        } else {
            Ok(id as usize)
        }
    }

    /// ID the next `add` would return, or the sentinel when full.
    pub fn next_available_id(&self) -> i32 {
        if self.is_full() {
            self.invalid_id
        } else {
            self.id_by_index(self.lowest_available)
        }
    }

    /// True iff `id` names a live entry.
    pub fn is_id_valid(&self, id: i32) -> bool {
        self.get(id).is_ok()
    }

    fn advance_cursor(&mut self) {
        while self.lowest_available < self.entries.len()
            && self.entries[self.lowest_available].is_some()
        {
            self.lowest_available += 1;
        }
    }

    /// Stores `entry` in the lowest free slot and returns its ID.
    pub fn add(&mut self, entry: T) -> Option<i32> {
        if self.is_full() {
            return None;
        }
        let index = self.lowest_available;
        if index == self.entries.len() {
            self.entries.push(Some(entry));
        } else {
            self.entries[index] = Some(entry);
        }
        self.count += 1;
        self.advance_cursor();
        Some(self.id_by_index(index))
    }

    /// Stores `entry` under a specific ID, padding with empty slots.
    pub fn insert(&mut self, entry: T, id: i32) -> bool {
        let index = match self.index_by_id(id) {
            Ok(index) if index < self.max_entries => index,
            _ => return false,
        };
        if index < self.entries.len() && self.entries[index].is_some() {
            return false;
        }
        if index >= self.entries.len() {
            self.entries.resize_with(index + 1, || None);
        }
        self.entries[index] = Some(entry);
        self.count += 1;
        if index == self.lowest_available {
            self.advance_cursor();
        }
        true
    }

    /// Removes and returns the entry stored under `id`.
    pub fn take(&mut self, id: i32) -> Option<T> {
        let index = self.index_by_id(id).ok()?;
        let entry = self.entries.get_mut(index)?.take()?;
        self.count -= 1;
        if index < self.lowest_available {
            self.lowest_available = index;
        }
        while matches!(self.entries.last(), Some(None)) {
            self.entries.pop();
        }
        self.lowest_available = self.lowest_available.min(self.entries.len());
        Some(entry)
    }

    pub fn remove(&mut self, id: i32) -> bool {
        self.take(id).is_some()
    }

    pub fn get(&self, id: i32) -> Result<&T, ProtocolError> {
        let index = self.index_by_id(id)?;
        self.entries
            .get(index)
            .and_then(|e| e.as_ref())
            .ok_or(ProtocolError::InvalidId(id))
    }

    pub fn get_mut(&mut self, id: i32) -> Result<&mut T, ProtocolError> {
        let index = self.index_by_id(id)?;
        self.entries
            .get_mut(index)
            .and_then(|e| e.as_mut())
            .ok_or(ProtocolError::InvalidId(id))
    }

    /// Occupied entries with their IDs, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, &T)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (self.id_by_index(i), e)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (i32, &mut T)> + '_ {
        let invalid_id = self.invalid_id;
        self.entries.iter_mut().enumerate().filter_map(move |(i, e)| {
            let id = i as i32;
            let id = if invalid_id >= 0 && id >= invalid_id { id + 1 } else { id };
            e.as_mut().map(|e| (id, e))
        })
    }

    pub fn ids(&self) -> Vec<i32> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.lowest_available = 0;
        self.count = 0;
    }
}
