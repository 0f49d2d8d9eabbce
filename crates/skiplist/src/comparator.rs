//! Pluggable total orders for skip list keys.
//!
//! A comparator must be a strict total order over its key domain: antisymmetric
//! and transitive. The skip list never mixes domains within one instance; the
//! key type parameter pins the domain at compile time.
use std::cmp::Ordering;

/// A total order over values of type `T`.
pub trait Comparator<T: ?Sized> {
    /// Returns the ordering of `a` relative to `b`.
    fn compare(&self, a: &T, b: &T) -> Ordering;
}

/// Orders keys by their natural [`Ord`] implementation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OrdComparator;

impl<T: Ord + ?Sized> Comparator<T> for OrdComparator {
    #[inline]
    fn compare(&self, a: &T, b: &T) -> Ordering {
        a.cmp(b)
    }
}

/// Lexicographic byte order: the first differing byte decides, and a strict
/// prefix sorts before the longer key.
///
/// This is the order LSM keys are stored in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BytewiseComparator;

impl Comparator<[u8]> for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let common = a.len().min(b.len());
        for (x, y) in a[..common].iter().zip(&b[..common]) {
            match x.cmp(y) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        a.len().cmp(&b.len())
    }
}

impl Comparator<Vec<u8>> for BytewiseComparator {
    #[inline]
    fn compare(&self, a: &Vec<u8>, b: &Vec<u8>) -> Ordering {
        Comparator::<[u8]>::compare(self, a, b)
    }
}

/// Inverts another comparator, yielding a descending order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReverseComparator<C>(pub C);

impl<T: ?Sized, C: Comparator<T>> Comparator<T> for ReverseComparator<C> {
    #[inline]
    fn compare(&self, a: &T, b: &T) -> Ordering {
        self.0.compare(b, a)
    }
}
