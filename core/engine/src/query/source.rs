//! FILENAME: core/engine/src/query/source.rs
//! PURPOSE: Sequences backed by ordinary Rust collections and iterators,
//! plus the adapter that turns a sequence back into an `Iterator`.

use super::cursor::Cursor;
use super::Query;

/// A sequence that pulls from any iterator.
#[derive(Debug)]
pub struct IterQuery<I: Iterator> {
    iter: I,
    cursor: Cursor<I::Item>,
}

impl<I: Iterator> IterQuery<I> {
    pub fn new(iter: I) -> Self {
        IterQuery {
            iter,
            cursor: Cursor::new(),
        }
    }
}

impl<I: Iterator> Query for IterQuery<I> {
    type Item = I::Item;

    fn cursor(&self) -> &Cursor<I::Item> {
        &self.cursor
    }

    fn cursor_mut(&mut self) -> &mut Cursor<I::Item> {
        &mut self.cursor
    }

    fn produce(&mut self) -> Option<I::Item> {
        self.iter.next()
    }
}

/// Sequence that owns its items.
pub type VecQuery<T> = IterQuery<std::vec::IntoIter<T>>;

/// Sequence over a borrowed slice, yielding clones.
pub type SliceQuery<'a, T> = IterQuery<std::iter::Cloned<std::slice::Iter<'a, T>>>;

pub fn from_iter<I: IntoIterator>(items: I) -> IterQuery<I::IntoIter> {
    IterQuery::new(items.into_iter())
}

pub fn from_vec<T>(items: Vec<T>) -> VecQuery<T> {
    IterQuery::new(items.into_iter())
}

pub fn from_slice<T: Clone>(items: &[T]) -> SliceQuery<'_, T> {
    IterQuery::new(items.iter().cloned())
}

/// Drives a sequence through the `Iterator` protocol.
#[derive(Debug)]
pub struct QueryIter<Q>(pub(crate) Q);

impl<Q: Query> Iterator for QueryIter<Q> {
    type Item = Q::Item;

    fn next(&mut self) -> Option<Q::Item> {
        self.0.next_item()
    }
}
