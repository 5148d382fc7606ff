//! Exact-match name → embedding store.
//!
//! Keys are case-folded names; at most one embedding is held per key.
//! Entries live in a dense vector with a hash index beside it, so
//! iteration is cheap and every keyed operation stays O(1).

use crate::types::Embedding;
use std::collections::HashMap;

/// Case-fold a name into a registry/trie key.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
}

#[derive(Debug, Default, Clone)]
pub struct EmbeddingRegistry {
    entries: Vec<(String, Embedding)>,
    index: HashMap<String, usize>,
}

impl EmbeddingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an embedding under `name`, replacing any previous one for the same key.
    pub fn set(&mut self, name: &str, embedding: Embedding) {
        let key = normalize_name(name);
        match self.index.get(&key) {
            Some(&slot) => self.entries[slot].1 = embedding,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, embedding));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Embedding> {
        let slot = *self.index.get(&normalize_name(name))?;
        Some(&self.entries[slot].1)
    }

    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(&normalize_name(name))
    }

    /// Remove the entry for `name`. Returns whether anything was removed.
    ///
    /// The last entry is moved into the vacated slot, so iteration order
    /// changes after a delete.
    pub fn delete(&mut self, name: &str) -> bool {
        let Some(slot) = self.index.remove(&normalize_name(name)) else {
            return false;
        };
        self.entries.swap_remove(slot);
        if let Some((moved, _)) = self.entries.get(slot) {
            self.index.insert(moved.clone(), slot);
        }
        true
    }

    /// Iterate `(normalized_name, embedding)` pairs in store order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Embedding)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(v: &[f32]) -> Embedding {
        Embedding::new(v.to_vec())
    }

    #[test]
    fn test_set_then_get() {
        let mut reg = EmbeddingRegistry::new();
        reg.set("Alice", emb(&[1.0, 2.0]));
        assert_eq!(reg.get("Alice"), Some(&emb(&[1.0, 2.0])));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut reg = EmbeddingRegistry::new();
        reg.set("Alice", emb(&[1.0]));
        assert!(reg.has("ALICE"));
        assert_eq!(reg.get("alice"), Some(&emb(&[1.0])));
    }

    #[test]
    fn test_last_write_wins() {
        let mut reg = EmbeddingRegistry::new();
        reg.set("bob", emb(&[1.0]));
        reg.set("BOB", emb(&[2.0]));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("Bob"), Some(&emb(&[2.0])));
    }

    #[test]
    fn test_delete_then_get_not_found() {
        let mut reg = EmbeddingRegistry::new();
        reg.set("alice", emb(&[1.0]));
        assert!(reg.delete("Alice"));
        assert_eq!(reg.get("alice"), None);
        assert!(!reg.has("alice"));
        assert!(!reg.delete("alice"));
    }

    #[test]
    fn test_delete_keeps_index_consistent() {
        let mut reg = EmbeddingRegistry::new();
        reg.set("a", emb(&[1.0]));
        reg.set("b", emb(&[2.0]));
        reg.set("c", emb(&[3.0]));
        assert!(reg.delete("a"));
        // "c" was moved into slot 0; lookups must still resolve.
        assert_eq!(reg.get("c"), Some(&emb(&[3.0])));
        assert_eq!(reg.get("b"), Some(&emb(&[2.0])));
        assert!(reg.delete("c"));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("b"), Some(&emb(&[2.0])));
    }

    #[test]
    fn test_entries_yield_normalized_keys() {
        let mut reg = EmbeddingRegistry::new();
        reg.set("Alice", emb(&[1.0]));
        reg.set("Bob", emb(&[2.0]));
        let keys: Vec<&str> = reg.entries().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["alice", "bob"]);
    }

    #[test]
    fn test_clear() {
        let mut reg = EmbeddingRegistry::new();
        reg.set("alice", emb(&[1.0]));
        reg.clear();
        assert!(reg.is_empty());
        assert!(!reg.has("alice"));
    }
}
