//! Prefix tree over case-folded names, for autocomplete.
//!
//! Nodes live in a flat arena and refer to each other by index. Pruned
//! nodes go on a free list and are reused by later inserts. Children keep
//! insertion order, so search results come back in depth-first discovery
//! order (not alphabetical).

use crate::registry::normalize_name;

type NodeId = usize;

const ROOT: NodeId = 0;

#[derive(Debug, Default, Clone)]
struct TrieNode {
    children: Vec<(char, NodeId)>,
    terminal: bool,
    /// Display-cased name, set only on terminal nodes.
    stored_name: Option<String>,
}

impl TrieNode {
    fn child(&self, c: char) -> Option<NodeId> {
        self.children.iter().find(|(k, _)| *k == c).map(|&(_, id)| id)
    }

    fn is_prunable(&self) -> bool {
        self.children.is_empty() && !self.terminal
    }
}

#[derive(Debug, Clone)]
pub struct NameTrie {
    nodes: Vec<TrieNode>,
    free: Vec<NodeId>,
    len: usize,
}

impl Default for NameTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl NameTrie {
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
            free: Vec::new(),
            len: 0,
        }
    }

    /// Insert `name`. Re-inserting an existing name only updates its display casing.
    pub fn insert(&mut self, name: &str) {
        let mut current = ROOT;
        for c in normalize_name(name).chars() {
            current = match self.nodes[current].child(c) {
                Some(next) => next,
                None => {
                    let next = self.alloc();
                    self.nodes[current].children.push((c, next));
                    next
                }
            };
        }

        let node = &mut self.nodes[current];
        if !node.terminal {
            node.terminal = true;
            self.len += 1;
        }
        node.stored_name = Some(name.to_string());
    }

    /// True only if `name` itself was inserted, not merely a longer name sharing its prefix.
    pub fn exists(&self, name: &str) -> bool {
        self.find(&normalize_name(name))
            .is_some_and(|id| self.nodes[id].terminal)
    }

    /// Display casing of `name` as last inserted.
    pub fn display_name(&self, name: &str) -> Option<&str> {
        let id = self.find(&normalize_name(name))?;
        self.nodes[id].stored_name.as_deref()
    }

    /// Every stored name that starts with `prefix` (case-insensitive), with
    /// original casing. An empty prefix returns all names.
    pub fn search_with_prefix(&self, prefix: &str) -> Vec<String> {
        let Some(start) = self.find(&normalize_name(prefix)) else {
            return Vec::new();
        };

        let mut results = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if node.terminal {
                if let Some(name) = &node.stored_name {
                    results.push(name.clone());
                }
            }
            // Reverse so the first-inserted child is visited first.
            stack.extend(node.children.iter().rev().map(|&(_, child)| child));
        }
        results
    }

    /// Remove `name` and prune any ancestors left without children or
    /// terminal status. Returns whether the name was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let mut path: Vec<(NodeId, char)> = Vec::new();
        let mut current = ROOT;
        for c in normalize_name(name).chars() {
            let Some(next) = self.nodes[current].child(c) else {
                return false;
            };
            path.push((current, c));
            current = next;
        }

        let node = &mut self.nodes[current];
        if !node.terminal {
            return false;
        }
        node.terminal = false;
        node.stored_name = None;
        self.len -= 1;

        while let Some((parent, c)) = path.pop() {
            if !self.nodes[current].is_prunable() {
                break;
            }
            self.nodes[parent].children.retain(|&(k, _)| k != c);
            self.release(current);
            current = parent;
        }
        true
    }

    /// Number of stored names.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.nodes.truncate(1);
        self.nodes[ROOT] = TrieNode::default();
        self.free.clear();
        self.len = 0;
    }

    /// Nodes currently reachable from the root, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    fn find(&self, key: &str) -> Option<NodeId> {
        key.chars().try_fold(ROOT, |id, c| self.nodes[id].child(c))
    }

    fn alloc(&mut self) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = TrieNode::default();
                id
            }
            None => {
                self.nodes.push(TrieNode::default());
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        self.nodes[id] = TrieNode::default();
        self.free.push(id);
    }
}
