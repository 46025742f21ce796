use crate::cell::Special;

/// Ordered, bounded list of specials a player has picked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inventory {
    specials: Vec<Special>,
    capacity: usize,
}

impl Inventory {
    pub fn new(capacity: usize) -> Self {
        Inventory {
            specials: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Changes the capacity, dropping the newest items if it shrinks.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.specials.truncate(capacity);
    }

    pub fn specials(&self) -> &[Special] {
        &self.specials
    }

    pub fn len(&self) -> usize {
        self.specials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specials.is_empty()
    }

    /// The special that `/use` would fire next.
    pub fn first(&self) -> Option<Special> {
        self.specials.first().copied()
    }

    pub fn add(&mut self, special: Special) -> bool {
        if special == Special::Nothing || self.specials.len() >= self.capacity {
            return false;
        }
        self.specials.push(special);
        true
    }

    /// Removes the first occurrence of `special`.
    pub fn use_special(&mut self, special: Special) -> bool {
        match self.specials.iter().position(|s| *s == special) {
            Some(i) => {
                self.specials.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.specials.clear();
    }
}
