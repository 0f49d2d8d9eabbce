//! # SkipList - Ordered In-Memory Index
//!
//! The sorted, mutable index behind the QuillKV memtable. Keys are ordered by
//! a pluggable [`Comparator`]; lookups, inserts and deletes run in expected
//! `O(log n)` without any rebalancing.
//!
//! ## Layout
//!
//! ```text
//! Level 3:  HEAD ─────────────────────► 50 ─────────────► NIL
//! Level 2:  HEAD ────────► 20 ────────► 50 ─────────────► NIL
//! Level 1:  HEAD ──► 10 ──► 20 ──► 30 ──► 50 ──► 60 ────► NIL
//! ```
//!
//! Nodes live in an arena owned by the list and are addressed by index, so the
//! forward links form a plain singly linked graph with no shared ownership and
//! no `unsafe`. Freed slots are recycled by later inserts.
//!
//! Each node draws its height once, at insertion, from a geometric
//! distribution (`p = 0.25`, capped at [`MAX_LEVEL`]). Every list owns its own
//! random source so that level choices are uncorrelated across lists.
//!
//! The list is **not** internally synchronized. Reads take `&self`, writes take
//! `&mut self`, and a [`Cursor`] borrows the list for its lifetime, so mutating
//! while iterating does not compile.
//!
//! ## Example
//!
//! ```rust
//! use skiplist::{OrdComparator, SkipList};
//!
//! let mut list = SkipList::new(OrdComparator);
//! list.insert(3, "three");
//! list.insert(1, "one");
//! list.insert(7, "seven");
//!
//! assert_eq!(list.find(&7), Some(&"seven"));
//!
//! let keys: Vec<i32> = list.iter().map(|(k, _)| *k).collect();
//! assert_eq!(keys, vec![1, 3, 7]);
//!
//! assert!(list.delete(&7));
//! assert!(list.find(&7).is_none());
//! ```

mod comparator;
mod cursor;

pub use comparator::{BytewiseComparator, Comparator, OrdComparator, ReverseComparator};
pub use cursor::{Cursor, Iter};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;

/// Maximum number of levels a node (and the head) can participate in.
pub const MAX_LEVEL: usize = 32;

/// Probability that a node is promoted one level higher.
pub const PROBABILITY: f64 = 0.25;

/// A position from which forward links can be followed: either the sentinel
/// head or an arena slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pos {
    Head,
    Node(usize),
}

struct Node<K, V> {
    key: K,
    value: V,
    /// One link per level this node participates in; fixed at insertion.
    forward: Vec<Option<usize>>,
}

/// An ordered associative container keyed by a [`Comparator`].
///
/// Inserting an existing key replaces its value in place. Lookups accept any
/// borrowed form `Q` of the key for which the comparator is defined, e.g.
/// `&[u8]` for `Vec<u8>` keys under [`BytewiseComparator`].
pub struct SkipList<K, V, C = OrdComparator> {
    /// Head forward links, one per level.
    head: [Option<usize>; MAX_LEVEL],
    /// Node arena. `None` marks a freed slot awaiting reuse.
    nodes: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    /// Highest level with a link from the head; never below 1.
    level: usize,
    len: usize,
    cmp: C,
    rng: StdRng,
}

impl<K, V, C> SkipList<K, V, C> {
    /// Creates an empty list whose level generator is seeded from OS entropy.
    pub fn new(cmp: C) -> Self {
        Self::with_rng(cmp, StdRng::from_entropy())
    }

    /// Creates an empty list with a deterministic level generator.
    pub fn with_seed(cmp: C, seed: u64) -> Self {
        Self::with_rng(cmp, StdRng::seed_from_u64(seed))
    }

    fn with_rng(cmp: C, rng: StdRng) -> Self {
        Self {
            head: [None; MAX_LEVEL],
            nodes: Vec::new(),
            free: Vec::new(),
            level: 1,
            len: 0,
            cmp,
            rng,
        }
    }

    /// Number of entries. `O(1)`.
    pub fn size(&self) -> usize {
        self.len
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current active level (highest tier with any linked node, minimum 1).
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn comparator(&self) -> &C {
        &self.cmp
    }

    /// Removes every entry and resets the active level to 1.
    pub fn clear(&mut self) {
        self.head = [None; MAX_LEVEL];
        self.nodes.clear();
        self.free.clear();
        self.level = 1;
        self.len = 0;
    }

    /// Ascending iterator over `(key, value)` pairs.
    pub fn iter(&self) -> Iter<'_, K, V, C> {
        Iter::new(self, self.head[0])
    }

    /// Ascending iterator starting at the first entry whose key is `>= key`.
    pub fn range_from<Q>(&self, key: &Q) -> Iter<'_, K, V, C>
    where
        Q: ?Sized,
        K: Borrow<Q>,
        C: Comparator<Q>,
    {
        Iter::new(self, self.lower_bound(key))
    }

    /// A positional cursor placed on the first entry (invalid if empty).
    pub fn cursor(&self) -> Cursor<'_, K, V, C> {
        Cursor::new(self)
    }

    fn node(&self, id: usize) -> &Node<K, V> {
        self.nodes[id]
            .as_ref()
            .expect("skip list link points at a freed slot")
    }

    fn node_mut(&mut self, id: usize) -> &mut Node<K, V> {
        self.nodes[id]
            .as_mut()
            .expect("skip list link points at a freed slot")
    }

    fn next(&self, from: Pos, level: usize) -> Option<usize> {
        match from {
            Pos::Head => self.head[level],
            Pos::Node(id) => self.node(id).forward[level],
        }
    }

    fn set_next(&mut self, from: Pos, level: usize, to: Option<usize>) {
        match from {
            Pos::Head => self.head[level] = to,
            Pos::Node(id) => self.node_mut(id).forward[level] = to,
        }
    }

    fn alloc(&mut self, node: Node<K, V>) -> usize {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    /// Draws a node height: start at 1, promote while a `p = 0.25` coin lands.
    fn random_level(&mut self) -> usize {
        let mut level = 1;
        while level < MAX_LEVEL && self.rng.gen_bool(PROBABILITY) {
            level += 1;
        }
        level
    }

    /// Walks down from the head, moving forward while the next key is less
    /// than `key`. Records the last position visited on each level in
    /// `update` and returns the level-0 predecessor.
    fn descend<Q>(&self, key: &Q, mut update: Option<&mut [Pos; MAX_LEVEL]>) -> Pos
    where
        Q: ?Sized,
        K: Borrow<Q>,
        C: Comparator<Q>,
    {
        let mut x = Pos::Head;
        for i in (0..self.level).rev() {
            while let Some(next) = self.next(x, i) {
                if self.cmp.compare(self.node(next).key.borrow(), key) != Ordering::Less {
                    break;
                }
                x = Pos::Node(next);
            }
            if let Some(update) = update.as_deref_mut() {
                update[i] = x;
            }
        }
        x
    }

    /// First node whose key is `>= key`.
    fn lower_bound<Q>(&self, key: &Q) -> Option<usize>
    where
        Q: ?Sized,
        K: Borrow<Q>,
        C: Comparator<Q>,
    {
        let pred = self.descend(key, None);
        self.next(pred, 0)
    }

    /// Point lookup.
    pub fn find<Q>(&self, key: &Q) -> Option<&V>
    where
        Q: ?Sized,
        K: Borrow<Q>,
        C: Comparator<Q>,
    {
        let id = self.lower_bound(key)?;
        let node = self.node(id);
        match self.cmp.compare(node.key.borrow(), key) {
            Ordering::Equal => Some(&node.value),
            _ => None,
        }
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        Q: ?Sized,
        K: Borrow<Q>,
        C: Comparator<Q>,
    {
        self.find(key).is_some()
    }

    /// Inserts `key -> value`, or replaces the value if `key` is present.
    ///
    /// Returns the previous value on update. An update never allocates a node
    /// and leaves the size unchanged.
    pub fn insert(&mut self, key: K, value: V) -> Option<V>
    where
        C: Comparator<K>,
    {
        let mut update = [Pos::Head; MAX_LEVEL];
        let pred = self.descend(&key, Some(&mut update));

        if let Some(next) = self.next(pred, 0) {
            if self.cmp.compare(&self.node(next).key, &key) == Ordering::Equal {
                let old = std::mem::replace(&mut self.node_mut(next).value, value);
                return Some(old);
            }
        }

        // update[self.level..height] is still Head, which is the splice point
        // for newly promoted levels.
        let height = self.random_level();
        if height > self.level {
            self.level = height;
        }

        let id = self.alloc(Node {
            key,
            value,
            forward: vec![None; height],
        });
        for (i, &pred) in update.iter().enumerate().take(height) {
            let succ = self.next(pred, i);
            self.node_mut(id).forward[i] = succ;
            self.set_next(pred, i, Some(id));
        }
        self.len += 1;
        None
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        Q: ?Sized,
        K: Borrow<Q>,
        C: Comparator<Q>,
    {
        let mut update = [Pos::Head; MAX_LEVEL];
        let pred = self.descend(key, Some(&mut update));

        let target = self.next(pred, 0)?;
        if self.cmp.compare(self.node(target).key.borrow(), key) != Ordering::Equal {
            return None;
        }

        // The target cannot appear above the first level where its
        // predecessor does not link to it.
        for (i, &pred) in update.iter().enumerate().take(self.level) {
            if self.next(pred, i) != Some(target) {
                break;
            }
            let succ = self.node(target).forward[i];
            self.set_next(pred, i, succ);
        }

        while self.level > 1 && self.head[self.level - 1].is_none() {
            self.level -= 1;
        }

        let node = self.nodes[target]
            .take()
            .expect("skip list link points at a freed slot");
        self.free.push(target);
        self.len -= 1;
        Some(node.value)
    }

    /// Removes `key`; returns whether it was present.
    pub fn delete<Q>(&mut self, key: &Q) -> bool
    where
        Q: ?Sized,
        K: Borrow<Q>,
        C: Comparator<Q>,
    {
        self.remove(key).is_some()
    }
}

impl<K, V, C: Default> Default for SkipList<K, V, C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}

impl<K: fmt::Debug, V: fmt::Debug, C> fmt::Debug for SkipList<K, V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, K, V, C> IntoIterator for &'a SkipList<K, V, C> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V, C>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests;
