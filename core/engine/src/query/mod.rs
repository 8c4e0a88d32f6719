//! FILENAME: core/engine/src/query/mod.rs
//! PURPOSE: Lazy, single-pass sequences with composable operators.
//! CONTEXT: This is the foundation the grouping operation and the node API
//! are built on. Partitions, child lists, leaf lists and filtered datum sets
//! are all handed out as sequences.
//!
//! PROTOCOL:
//! - `index()` starts at -1, counts produced items, and becomes -2 once the
//!   sequence is exhausted.
//! - `advance()` moves to the next item. After it has returned false it
//!   returns false forever; there is no restart.
//! - Operators (`map`, `filter`, `flat_map`, `distinct`, `skip`, `take`,
//!   `reverse`, `sort`) wrap their source and do nothing until pulled.
//! - Terminals (`count`, `to_array`, `reduce`, `first`, `any`, ...) consume
//!   the sequence. Applying one through `&mut q` leaves `q` exhausted (or
//!   partially consumed for short-circuiting terminals).

mod cursor;
mod ops;
mod source;

pub use cursor::{Cursor, INDEX_BEFORE_START, INDEX_EXHAUSTED};
pub use ops::{
    Distinct, Filter, FlatMap, Flatten, KeyComparer, Map, Reverse, Skip, Sort, SortComparer, Take,
};
pub use source::{from_iter, from_slice, from_vec, IterQuery, QueryIter, SliceQuery, VecQuery};

use std::cmp::Ordering;
use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::error::{CubeError, CubeResult};

/// Minimum and maximum of a sequence, found in one pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange<T> {
    pub min: T,
    pub max: T,
}

/// The default less/equal/greater comparer. Incomparable values are equal.
pub fn default_compare<T: PartialOrd + ?Sized>(a: &T, b: &T) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

fn clone_key<T: Clone>(item: &T) -> Option<T> {
    Some(item.clone())
}

pub trait Query {
    type Item;

    fn cursor(&self) -> &Cursor<Self::Item>;

    fn cursor_mut(&mut self) -> &mut Cursor<Self::Item>;

    /// Produces the next item, or `None` when there are no more.
    /// Only called while the sequence is not exhausted.
    fn produce(&mut self) -> Option<Self::Item>;

    /// Moves to the next item. Returns false, permanently, once exhausted.
    fn advance(&mut self) -> bool {
        if self.cursor().is_exhausted() {
            return false;
        }
        let next = self.produce();
        self.cursor_mut().step(next)
    }

    fn index(&self) -> isize {
        self.cursor().index()
    }

    fn item(&self) -> Option<&Self::Item> {
        self.cursor().item()
    }

    fn take_item(&mut self) -> Option<Self::Item> {
        self.cursor_mut().take_item()
    }

    /// `advance` followed by `take_item`.
    fn next_item(&mut self) -> Option<Self::Item> {
        if self.advance() {
            self.take_item()
        } else {
            None
        }
    }

    // ========================================================================
    // OPERATORS
    // ========================================================================

    fn map<U, F>(self, f: F) -> Map<Self, F, U>
    where
        Self: Sized,
        F: FnMut(Self::Item) -> U,
    {
        Map::new(self, f)
    }

    fn filter<P>(self, predicate: P) -> Filter<Self, P>
    where
        Self: Sized,
        P: FnMut(&Self::Item) -> bool,
    {
        Filter::new(self, predicate)
    }

    fn flat_map<R, F>(self, f: F) -> FlatMap<Self, F, R>
    where
        Self: Sized,
        R: Query,
        F: FnMut(Self::Item) -> R,
    {
        FlatMap::new(self, f)
    }

    fn flatten(self) -> Flatten<Self>
    where
        Self: Sized,
        Self::Item: Query,
    {
        Flatten::new(self)
    }

    fn distinct(self) -> Distinct<Self, fn(&Self::Item) -> Option<Self::Item>, Self::Item>
    where
        Self: Sized,
        Self::Item: Clone + Eq + Hash,
    {
        Distinct::new(self, clone_key::<Self::Item> as fn(&Self::Item) -> Option<Self::Item>)
    }

    /// Keeps the first item per key. A `None` key never deduplicates.
    fn distinct_by<K, F>(self, key: F) -> Distinct<Self, F, K>
    where
        Self: Sized,
        K: Eq + Hash,
        F: FnMut(&Self::Item) -> Option<K>,
    {
        Distinct::new(self, key)
    }

    fn skip(self, count: usize) -> Skip<Self>
    where
        Self: Sized,
    {
        Skip::new(self, count)
    }

    fn take(self, count: usize) -> Take<Self>
    where
        Self: Sized,
    {
        Take::new(self, count)
    }

    fn reverse(self) -> Reverse<Self>
    where
        Self: Sized,
    {
        Reverse::new(self)
    }

    fn sort(self) -> Sort<Self, fn(&Self::Item, &Self::Item) -> Ordering>
    where
        Self: Sized,
        Self::Item: PartialOrd,
    {
        Sort::new(
            self,
            default_compare::<Self::Item> as fn(&Self::Item, &Self::Item) -> Ordering,
        )
    }

    fn sort_by<F>(self, compare: F) -> Sort<Self, F>
    where
        Self: Sized,
        F: FnMut(&Self::Item, &Self::Item) -> Ordering,
    {
        Sort::new(self, compare)
    }

    fn sort_by_key<K, F>(self, key: F) -> Sort<Self, KeyComparer<F>>
    where
        Self: Sized,
        K: PartialOrd,
        F: FnMut(&Self::Item) -> K,
    {
        Sort::new(self, KeyComparer(key))
    }

    // ========================================================================
    // TERMINALS
    // ========================================================================

    fn for_each<F>(mut self, mut f: F)
    where
        Self: Sized,
        F: FnMut(Self::Item),
    {
        while let Some(item) = self.next_item() {
            f(item);
        }
    }

    fn to_array(mut self) -> Vec<Self::Item>
    where
        Self: Sized,
    {
        let mut items = Vec::new();
        while let Some(item) = self.next_item() {
            items.push(item);
        }
        items
    }

    /// Folds without a seed. Fails on an empty sequence.
    fn reduce<F>(mut self, mut f: F) -> CubeResult<Self::Item>
    where
        Self: Sized,
        F: FnMut(Self::Item, Self::Item) -> Self::Item,
    {
        let mut acc = self
            .next_item()
            .ok_or_else(|| CubeError::operation_invalid("Cannot reduce an empty sequence"))?;
        while let Some(item) = self.next_item() {
            acc = f(acc, item);
        }
        Ok(acc)
    }

    fn fold<A, F>(mut self, seed: A, mut f: F) -> A
    where
        Self: Sized,
        F: FnMut(A, Self::Item) -> A,
    {
        let mut acc = seed;
        while let Some(item) = self.next_item() {
            acc = f(acc, item);
        }
        acc
    }

    fn count(mut self) -> usize
    where
        Self: Sized,
    {
        let mut count = 0;
        while self.advance() {
            count += 1;
        }
        count
    }

    fn first(mut self) -> Option<Self::Item>
    where
        Self: Sized,
    {
        self.next_item()
    }

    fn first_where<P>(mut self, mut predicate: P) -> Option<Self::Item>
    where
        Self: Sized,
        P: FnMut(&Self::Item) -> bool,
    {
        while let Some(item) = self.next_item() {
            if predicate(&item) {
                return Some(item);
            }
        }
        None
    }

    fn first_or(self, default: Self::Item) -> Self::Item
    where
        Self: Sized,
    {
        self.first().unwrap_or(default)
    }

    fn last(mut self) -> Option<Self::Item>
    where
        Self: Sized,
    {
        let mut last = None;
        while let Some(item) = self.next_item() {
            last = Some(item);
        }
        last
    }

    fn last_where<P>(mut self, mut predicate: P) -> Option<Self::Item>
    where
        Self: Sized,
        P: FnMut(&Self::Item) -> bool,
    {
        let mut last = None;
        while let Some(item) = self.next_item() {
            if predicate(&item) {
                last = Some(item);
            }
        }
        last
    }

    fn last_or(self, default: Self::Item) -> Self::Item
    where
        Self: Sized,
    {
        self.last().unwrap_or(default)
    }

    fn any(mut self) -> bool
    where
        Self: Sized,
    {
        self.advance()
    }

    fn any_where<P>(mut self, mut predicate: P) -> bool
    where
        Self: Sized,
        P: FnMut(&Self::Item) -> bool,
    {
        while let Some(item) = self.next_item() {
            if predicate(&item) {
                return true;
            }
        }
        false
    }

    fn all<P>(mut self, mut predicate: P) -> bool
    where
        Self: Sized,
        P: FnMut(&Self::Item) -> bool,
    {
        while let Some(item) = self.next_item() {
            if !predicate(&item) {
                return false;
            }
        }
        true
    }

    fn min(mut self) -> Option<Self::Item>
    where
        Self: Sized,
        Self::Item: PartialOrd,
    {
        let mut best = self.next_item()?;
        while let Some(item) = self.next_item() {
            if item < best {
                best = item;
            }
        }
        Some(best)
    }

    fn max(mut self) -> Option<Self::Item>
    where
        Self: Sized,
        Self::Item: PartialOrd,
    {
        let mut best = self.next_item()?;
        while let Some(item) = self.next_item() {
            if item > best {
                best = item;
            }
        }
        Some(best)
    }

    fn range(mut self) -> Option<ValueRange<Self::Item>>
    where
        Self: Sized,
        Self::Item: PartialOrd + Clone,
    {
        let first = self.next_item()?;
        let mut range = ValueRange {
            min: first.clone(),
            max: first,
        };
        while let Some(item) = self.next_item() {
            if item < range.min {
                range.min = item;
            } else if item > range.max {
                range.max = item;
            }
        }
        Some(range)
    }

    fn sum_by<F>(mut self, mut f: F) -> f64
    where
        Self: Sized,
        F: FnMut(&Self::Item) -> f64,
    {
        let mut sum = 0.0;
        while let Some(item) = self.next_item() {
            sum += f(&item);
        }
        sum
    }

    /// Keys every item; the first item per key wins.
    fn to_unique_index_map<K, F>(mut self, mut key: F) -> FxHashMap<K, Self::Item>
    where
        Self: Sized,
        K: Eq + Hash,
        F: FnMut(&Self::Item) -> K,
    {
        let mut map = FxHashMap::default();
        while let Some(item) = self.next_item() {
            map.entry(key(&item)).or_insert(item);
        }
        map
    }

    /// Keys every item, accumulating all items per key in sequence order.
    fn to_grouped_index_map<K, F>(mut self, mut key: F) -> FxHashMap<K, Vec<Self::Item>>
    where
        Self: Sized,
        K: Eq + Hash,
        F: FnMut(&Self::Item) -> K,
    {
        let mut map: FxHashMap<K, Vec<Self::Item>> = FxHashMap::default();
        while let Some(item) = self.next_item() {
            map.entry(key(&item)).or_default().push(item);
        }
        map
    }

    fn into_iter(self) -> QueryIter<Self>
    where
        Self: Sized,
    {
        QueryIter(self)
    }
}

impl<Q: Query + ?Sized> Query for &mut Q {
    type Item = Q::Item;

    fn cursor(&self) -> &Cursor<Q::Item> {
        (**self).cursor()
    }

    fn cursor_mut(&mut self) -> &mut Cursor<Q::Item> {
        (**self).cursor_mut()
    }

    fn produce(&mut self) -> Option<Q::Item> {
        (**self).produce()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_pass_law() {
        let mut q = from_vec(vec![1, 2]);
        assert_eq!(q.index(), INDEX_BEFORE_START);
        assert!(q.advance());
        assert_eq!(q.item(), Some(&1));
        assert_eq!(q.index(), 0);
        assert!(q.advance());
        assert!(!q.advance());
        assert_eq!(q.index(), INDEX_EXHAUSTED);
        for _ in 0..3 {
            assert!(!q.advance());
        }
    }

    #[test]
    fn test_terminal_through_by_ref_exhausts_owner() {
        let mut q = from_vec(vec!['a', 'b', 'c']);
        assert_eq!((&mut q).count(), 3);
        assert!(!q.advance());
    }

    #[test]
    fn test_operators_are_lazy() {
        let mut calls = 0;
        {
            let q = from_vec(vec![1, 2, 3]).map(|x| {
                calls += 1;
                x * 10
            });
            drop(q);
        }
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_map_filter() {
        let out = from_vec(vec![1, 2, 3, 4, 5])
            .filter(|x| x % 2 == 1)
            .map(|x| x * x)
            .to_array();
        assert_eq!(out, vec![1, 9, 25]);
    }

    #[test]
    fn test_distinct_keeps_first_occurrence() {
        let out = from_vec(vec![1, 1, 2, 3, 3, 3, 2]).distinct().to_array();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn test_distinct_by_never_dedups_null_keys() {
        let items = vec![Some("a"), None, Some("a"), None, Some("b")];
        let out = from_vec(items).distinct_by(|x| *x).to_array();
        assert_eq!(out, vec![Some("a"), None, None, Some("b")]);
    }

    #[test]
    fn test_take_and_skip() {
        assert_eq!(from_vec(vec![1, 2, 3]).take(2).to_array(), vec![1, 2]);
        assert_eq!(from_vec(vec![1, 2, 3]).skip(2).to_array(), vec![3]);
        assert_eq!(from_vec(vec![1, 2, 3]).skip(5).count(), 0);
        assert_eq!(from_vec(vec![1, 2, 3]).take(usize::MAX).count(), 3);

        let mut none = from_vec(vec![1, 2, 3]).take(0);
        assert!(!none.advance());
        assert_eq!(none.index(), INDEX_EXHAUSTED);
    }

    #[test]
    fn test_unbounded_take_is_the_source() {
        let mut all = from_vec(vec![1, 2, 3]).take(usize::MAX);
        assert!(all.is_unbounded());
        assert!(all.advance());
        assert_eq!(all.item(), Some(&1));

        // the source carries the position, so it resumes where the take stopped
        let mut source = all.into_source();
        assert_eq!(source.index(), 0);
        assert_eq!(source.to_array(), vec![2, 3]);

        assert!(!from_vec(vec![1]).take(5).is_unbounded());
    }

    #[test]
    fn test_reverse() {
        assert_eq!(from_vec(vec![1, 2, 3]).reverse().to_array(), vec![3, 2, 1]);
        assert_eq!(from_vec(Vec::<i32>::new()).reverse().count(), 0);
    }

    #[test]
    fn test_sort_is_stable() {
        let items = vec![(2, 'a'), (1, 'b'), (2, 'c'), (1, 'd'), (0, 'e')];
        let out = from_vec(items).sort_by_key(|p| p.0).to_array();
        assert_eq!(out, vec![(0, 'e'), (1, 'b'), (1, 'd'), (2, 'a'), (2, 'c')]);

        let desc = from_vec(vec![3.0, 1.0, 2.0])
            .sort_by(|a: &f64, b: &f64| default_compare(b, a))
            .to_array();
        assert_eq!(desc, vec![3.0, 2.0, 1.0]);

        assert_eq!(from_vec(vec![3, 1, 2]).sort().to_array(), vec![1, 2, 3]);
    }

    #[test]
    fn test_flat_map_and_flatten() {
        let out = from_vec(vec![1, 2, 3])
            .flat_map(|n| from_vec(vec![n; n]))
            .to_array();
        assert_eq!(out, vec![1, 2, 2, 3, 3, 3]);

        let nested = from_vec(vec![from_vec(vec!['a']), from_vec(vec![]), from_vec(vec!['b', 'c'])]);
        assert_eq!(nested.flatten().to_array(), vec!['a', 'b', 'c']);
    }

    #[test]
    fn test_flat_map_abandoned_early() {
        let mut pulled_outer = 0;
        let first = from_vec(vec![1, 2, 3])
            .map(|n| {
                pulled_outer += 1;
                n
            })
            .flat_map(|n| from_vec(vec![n * 10, n * 10 + 1]))
            .first();
        assert_eq!(first, Some(10));
        assert_eq!(pulled_outer, 1);
    }

    #[test]
    fn test_reduce_and_fold() {
        assert_eq!(from_vec(vec![1, 2, 3]).reduce(|a, b| a + b), Ok(6));
        assert!(matches!(
            from_vec(Vec::<i32>::new()).reduce(|a, b| a + b),
            Err(CubeError::OperationInvalid(_))
        ));
        assert_eq!(from_vec(Vec::<i32>::new()).fold(7, |a, b| a + b), 7);
    }

    #[test]
    fn test_first_last_any_all() {
        assert_eq!(from_vec(vec![1, 2, 3]).first_where(|x| *x > 1), Some(2));
        assert_eq!(from_vec(vec![1, 2, 3]).last_where(|x| *x < 3), Some(2));
        assert_eq!(from_vec(Vec::<i32>::new()).first_or(-1), -1);
        assert_eq!(from_vec(vec![4]).last_or(-1), 4);
        assert!(from_vec(vec![1]).any());
        assert!(!from_vec(Vec::<i32>::new()).any());
        assert!(from_vec(vec![1, 2]).any_where(|x| *x == 2));
        assert!(from_vec(vec![2, 4]).all(|x| x % 2 == 0));
        assert!(from_vec(Vec::<i32>::new()).all(|_| false));
    }

    #[test]
    fn test_min_max_range() {
        assert_eq!(from_vec(vec![3, 1, 2]).min(), Some(1));
        assert_eq!(from_vec(vec![3, 1, 2]).max(), Some(3));
        assert_eq!(
            from_vec(vec![5.0, -1.0, 2.5]).range(),
            Some(ValueRange { min: -1.0, max: 5.0 })
        );
        assert_eq!(from_vec(Vec::<i32>::new()).range(), None);
        assert_eq!(from_vec(vec![1.5, 2.5]).sum_by(|x| *x), 4.0);
    }

    #[test]
    fn test_index_maps() {
        let words = vec!["apple", "avocado", "banana", "blueberry", "cherry"];
        let unique = from_slice(&words).to_unique_index_map(|w| w.chars().next());
        assert_eq!(unique[&Some('a')], "apple");
        assert_eq!(unique[&Some('b')], "banana");

        let grouped = from_slice(&words).to_grouped_index_map(|w| w.len());
        assert_eq!(grouped[&6], vec!["banana", "cherry"]);
        assert_eq!(grouped[&7], vec!["avocado"]);
    }

    #[test]
    fn test_into_iter_interop() {
        let total: i32 = from_vec(vec![1, 2, 3]).into_iter().sum();
        assert_eq!(total, 6);
    }
}
