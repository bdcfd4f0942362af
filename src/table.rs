//! A small open-addressing hash table keyed by interned [`LoxString`]s.
//!
//! Stands in for clox's `table.c`: linear probing, tombstones on
//! delete, and a 0.75 load-factor ceiling that triggers a capacity
//! doubling (starting from 8) rather than reaching for `std`'s
//! `HashMap`. Kept as its own module — the "glue" slice of the system
//! overview — rather than folded into `vm.rs`, matching how the teacher
//! keeps growable-array and table concerns out of the interpreter loop.

use crate::value::LoxString;
use std::rc::Rc;

const INITIAL_CAPACITY: usize = 8;
const MAX_LOAD_FACTOR: f64 = 0.75;

enum Slot<V> {
    Empty,
    Tombstone,
    Occupied(Rc<LoxString>, V),
}

pub struct Table<V> {
    entries: Vec<Slot<V>>,
    // occupied + tombstones; this is what's compared against the load
    // factor, so tombstones still push a resize even though they hold
    // no live key.
    count: usize,
}

impl<V> Default for Table<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Table<V> {
    pub fn new() -> Self {
        Table { entries: Vec::new(), count: 0 }
    }

    pub fn get(&self, key: &Rc<LoxString>) -> Option<&V> {
        if self.entries.is_empty() {
            return None;
        }
        let index = self.find_slot(key.hash, |k| keys_equal(k, key));
        match &self.entries[index] {
            Slot::Occupied(_, value) => Some(value),
            _ => None,
        }
    }

    /// Inserts or overwrites. Returns `true` if this key was not
    /// already present.
    pub fn insert(&mut self, key: Rc<LoxString>, value: V) -> bool {
        if self.needs_growth() {
            self.grow();
        }

        let index = self.find_slot(key.hash, |k| keys_equal(k, &key));
        let is_new_key = !matches!(self.entries[index], Slot::Occupied(..));
        // a tombstone's slot was already counted toward `count` when it
        // was created, so only a landing in a truly empty slot grows it.
        if is_new_key && matches!(self.entries[index], Slot::Empty) {
            self.count += 1;
        }
        self.entries[index] = Slot::Occupied(key, value);
        is_new_key
    }

    pub fn delete(&mut self, key: &Rc<LoxString>) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let index = self.find_slot(key.hash, |k| keys_equal(k, key));
        if matches!(self.entries[index], Slot::Occupied(..)) {
            self.entries[index] = Slot::Tombstone;
            true
        } else {
            false
        }
    }

    /// Looks up an interned string by its raw content rather than by an
    /// existing `Rc` handle — used by the interner to find out whether
    /// a literal it just scanned already has a home before allocating
    /// a new `LoxString` for it.
    pub fn find_interned(&self, bytes: &str, hash: u32) -> Option<Rc<LoxString>> {
        if self.entries.is_empty() {
            return None;
        }
        let index = self.find_slot(hash, |k| k.hash == hash && k.bytes.as_ref() == bytes);
        match &self.entries[index] {
            Slot::Occupied(key, _) => Some(Rc::clone(key)),
            _ => None,
        }
    }

    fn needs_growth(&self) -> bool {
        self.entries.is_empty()
            || (self.count + 1) as f64 > self.entries.len() as f64 * MAX_LOAD_FACTOR
    }

    fn grow(&mut self) {
        let new_capacity = if self.entries.is_empty() { INITIAL_CAPACITY } else { self.entries.len() * 2 };
        let mut new_entries: Vec<Slot<V>> = Vec::with_capacity(new_capacity);
        new_entries.resize_with(new_capacity, || Slot::Empty);

        let old_entries = std::mem::replace(&mut self.entries, new_entries);
        self.count = 0;
        for slot in old_entries {
            if let Slot::Occupied(key, value) = slot {
                let index = Self::probe(&self.entries, key.hash, |k| keys_equal(k, &key));
                self.entries[index] = Slot::Occupied(key, value);
                self.count += 1;
            }
        }
    }

    /// Linear probe starting at `hash % capacity`, stopping at the
    /// first empty slot or the first slot whose key satisfies `matches`.
    /// Tombstones are remembered and reused if no live match is found,
    /// same as clox's `findEntry`.
    fn find_slot(&self, hash: u32, matches: impl Fn(&LoxString) -> bool) -> usize {
        Self::probe(&self.entries, hash, matches)
    }

    fn probe(entries: &[Slot<V>], hash: u32, matches: impl Fn(&LoxString) -> bool) -> usize {
        let capacity = entries.len();
        let mut index = hash as usize % capacity;
        let mut first_tombstone: Option<usize> = None;

        loop {
            match &entries[index] {
                Slot::Empty => return first_tombstone.unwrap_or(index),
                Slot::Tombstone => {
                    if first_tombstone.is_none() {
                        first_tombstone = Some(index);
                    }
                }
                Slot::Occupied(key, _) => {
                    if matches(key) {
                        return index;
                    }
                }
            }
            index = (index + 1) % capacity;
        }
    }
}

fn keys_equal(a: &LoxString, b: &LoxString) -> bool {
    a.hash == b.hash && a.bytes == b.bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::fnv1a_hash;

    fn string(s: &str) -> Rc<LoxString> {
        Rc::new(LoxString { bytes: s.into(), hash: fnv1a_hash(s.as_bytes()) })
    }

    #[test]
    fn insert_then_get_round_trips() {
        let mut table: Table<i32> = Table::new();
        let key = string("answer");
        assert!(table.insert(Rc::clone(&key), 42));
        assert_eq!(table.get(&key), Some(&42));
    }

    #[test]
    fn reinserting_same_key_overwrites_and_reports_not_new() {
        let mut table: Table<i32> = Table::new();
        let key = string("x");
        assert!(table.insert(Rc::clone(&key), 1));
        assert!(!table.insert(Rc::clone(&key), 2));
        assert_eq!(table.get(&key), Some(&2));
    }

    #[test]
    fn delete_then_get_returns_none_but_slot_is_reusable() {
        let mut table: Table<i32> = Table::new();
        let key = string("gone");
        table.insert(Rc::clone(&key), 1);
        assert!(table.delete(&key));
        assert_eq!(table.get(&key), None);
        assert!(table.insert(Rc::clone(&key), 2));
        assert_eq!(table.get(&key), Some(&2));
    }

    #[test]
    fn survives_many_insertions_and_deletions_across_resizes() {
        let mut table: Table<usize> = Table::new();
        let keys: Vec<_> = (0..200).map(|i| string(&format!("key{i}"))).collect();
        for (i, key) in keys.iter().enumerate() {
            table.insert(Rc::clone(key), i);
        }
        for key in keys.iter().step_by(2) {
            table.delete(key);
        }
        for (i, key) in keys.iter().enumerate() {
            if i % 2 == 0 {
                assert_eq!(table.get(key), None);
            } else {
                assert_eq!(table.get(key), Some(&i));
            }
        }
    }

    #[test]
    fn find_interned_matches_by_content_without_an_rc_handle() {
        let mut table: Table<()> = Table::new();
        let key = string("shared");
        table.insert(Rc::clone(&key), ());
        let hash = fnv1a_hash(b"shared");
        let found = table.find_interned("shared", hash).expect("should find by content");
        assert!(Rc::ptr_eq(&found, &key));
        assert!(table.find_interned("missing", fnv1a_hash(b"missing")).is_none());
    }
}
