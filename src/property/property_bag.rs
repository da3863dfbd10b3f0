/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::hash::Hash;

use indexmap::IndexMap;

/// Scalar values stored by key, with each key's pending change tracked
/// individually.
///
/// Used by properties whose sub-fields are updated one by one, such as the
/// street and city of a postal address. Mutators return whether anything
/// changed; the owning property is responsible for notifying its listeners.
#[derive(Clone, Debug)]
pub struct SimplePropertyBag<K, V> {
    items: IndexMap<K, V>,
    added: Vec<K>,
    modified: Vec<K>,
    removed: Vec<K>,
}

impl<K, V> SimplePropertyBag<K, V>
where
    K: Clone + Eq + Hash,
    V: PartialEq,
{
    pub fn new() -> Self {
        Self {
            items: IndexMap::new(),
            added: Vec::new(),
            modified: Vec::new(),
            removed: Vec::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.items.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.items.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.items.iter()
    }

    /// Stores a value without recording a change, as when reading from XML.
    pub fn load(&mut self, key: K, value: V) {
        self.items.insert(key, value);
    }

    /// Stores or clears the value for `key`. Returns whether the bag changed.
    pub fn set(&mut self, key: K, value: Option<V>) -> bool {
        let Some(value) = value else {
            return self.remove(&key);
        };

        match self.items.get(&key) {
            Some(existing) if *existing == value => return false,
            Some(_) => {
                if !self.added.contains(&key) {
                    push_once(&mut self.modified, &key);
                }
            }
            None => {
                // Setting a field which was deleted since the last save
                // overwrites it rather than recreating it.
                if remove_key(&mut self.removed, &key) {
                    push_once(&mut self.modified, &key);
                } else {
                    push_once(&mut self.added, &key);
                }
            }
        }

        self.items.insert(key, value);
        true
    }

    /// Clears the value for `key`. Returns whether the bag changed.
    pub fn remove(&mut self, key: &K) -> bool {
        if self.items.shift_remove(key).is_none() {
            return false;
        }

        remove_key(&mut self.modified, key);
        if !remove_key(&mut self.added, key) {
            push_once(&mut self.removed, key);
        }

        true
    }

    pub fn added_keys(&self) -> &[K] {
        &self.added
    }

    pub fn modified_keys(&self) -> &[K] {
        &self.modified
    }

    pub fn removed_keys(&self) -> &[K] {
        &self.removed
    }

    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty())
    }

    pub fn clear_change_log(&mut self) {
        self.added.clear();
        self.modified.clear();
        self.removed.clear();
    }
}

impl<K, V> Default for SimplePropertyBag<K, V>
where
    K: Clone + Eq + Hash,
    V: PartialEq,
{
    fn default() -> Self {
        Self::new()
    }
}

fn push_once<K: Clone + PartialEq>(keys: &mut Vec<K>, key: &K) {
    if !keys.contains(key) {
        keys.push(key.clone());
    }
}

fn remove_key<K: PartialEq>(keys: &mut Vec<K>, key: &K) -> bool {
    let before = keys.len();
    keys.retain(|candidate| candidate != key);
    keys.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;

    type Bag = SimplePropertyBag<&'static str, String>;

    fn loaded_bag() -> Bag {
        let mut bag = Bag::new();
        bag.load("Street", "1 Main St".to_owned());
        bag.load("City", "Springfield".to_owned());
        bag
    }

    #[test]
    fn loading_records_nothing() {
        let bag = loaded_bag();

        assert_eq!(bag.get(&"City").map(String::as_str), Some("Springfield"));
        assert!(!bag.has_changes());
    }

    #[test]
    fn setting_tracks_added_and_modified_keys() {
        let mut bag = loaded_bag();

        assert!(bag.set("City", Some("Shelbyville".to_owned())));
        assert!(!bag.set("City", Some("Shelbyville".to_owned())));
        assert!(bag.set("State", Some("OR".to_owned())));
        assert!(bag.set("State", Some("WA".to_owned())));

        assert_eq!(bag.modified_keys(), &["City"]);
        assert_eq!(bag.added_keys(), &["State"]);
    }

    #[test]
    fn removing_an_added_key_leaves_no_trace() {
        let mut bag = loaded_bag();
        bag.set("State", Some("OR".to_owned()));

        assert!(bag.set("State", None));
        assert!(!bag.has_changes());
        assert!(!bag.remove(&"State"));
    }

    #[test]
    fn removing_a_loaded_key_records_a_delete() {
        let mut bag = loaded_bag();
        bag.set("Street", Some("2 Main St".to_owned()));

        assert!(bag.remove(&"Street"));
        assert_eq!(bag.removed_keys(), &["Street"]);
        assert!(bag.modified_keys().is_empty());

        // Setting it again turns the delete into an update.
        bag.set("Street", Some("3 Main St".to_owned()));
        assert!(bag.removed_keys().is_empty());
        assert_eq!(bag.modified_keys(), &["Street"]);
    }
}
