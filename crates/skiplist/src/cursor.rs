use std::borrow::Borrow;

use crate::{Comparator, SkipList};

/// A positional cursor over a [`SkipList`], in ascending key order.
///
/// `key`, `value` and `advance` panic when the cursor is not valid; check
/// [`Cursor::valid`] first. The cursor holds a shared borrow of the list, so
/// the list cannot be mutated while a cursor is alive.
pub struct Cursor<'a, K, V, C> {
    list: &'a SkipList<K, V, C>,
    current: Option<usize>,
}

impl<'a, K, V, C> Cursor<'a, K, V, C> {
    pub(crate) fn new(list: &'a SkipList<K, V, C>) -> Self {
        Self {
            list,
            current: list.head[0],
        }
    }

    /// Whether the cursor is positioned at an entry.
    pub fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn expect_current(&self) -> usize {
        self.current
            .expect("skip list cursor used after it was exhausted")
    }

    pub fn key(&self) -> &'a K {
        let list = self.list;
        &list.node(self.expect_current()).key
    }

    pub fn value(&self) -> &'a V {
        let list = self.list;
        &list.node(self.expect_current()).value
    }

    /// Moves to the next entry along level 0.
    pub fn advance(&mut self) {
        let id = self.expect_current();
        self.current = self.list.node(id).forward[0];
    }

    /// Repositions at the first entry.
    pub fn seek_to_first(&mut self) {
        self.current = self.list.head[0];
    }

    /// Repositions at the first entry whose key is `>= key`, whether or not
    /// `key` itself is present.
    pub fn seek<Q>(&mut self, key: &Q)
    where
        Q: ?Sized,
        K: Borrow<Q>,
        C: Comparator<Q>,
    {
        self.current = self.list.lower_bound(key);
    }
}

/// Borrowing iterator over `(key, value)` pairs in ascending order.
pub struct Iter<'a, K, V, C> {
    list: &'a SkipList<K, V, C>,
    current: Option<usize>,
    remaining: usize,
}

impl<'a, K, V, C> Iter<'a, K, V, C> {
    pub(crate) fn new(list: &'a SkipList<K, V, C>, start: Option<usize>) -> Self {
        Self {
            list,
            current: start,
            remaining: list.len(),
        }
    }
}

impl<'a, K, V, C> Iterator for Iter<'a, K, V, C> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let list = self.list;
        let node = list.node(self.current?);
        self.current = node.forward[0];
        self.remaining = self.remaining.saturating_sub(1);
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}
