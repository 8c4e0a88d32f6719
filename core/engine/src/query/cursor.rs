//! FILENAME: core/engine/src/query/cursor.rs
//! PURPOSE: The position/item pair every sequence carries.
//! CONTEXT: A cursor starts before the first item (index -1), counts items
//! as they are produced, and is pinned at index -2 once its sequence runs
//! out. From that point it never moves again.

/// Index of a sequence that has not produced anything yet.
pub const INDEX_BEFORE_START: isize = -1;

/// Index of a sequence that has run out of items.
pub const INDEX_EXHAUSTED: isize = -2;

#[derive(Debug)]
pub struct Cursor<T> {
    index: isize,
    item: Option<T>,
}

impl<T> Cursor<T> {
    pub fn new() -> Self {
        Cursor {
            index: INDEX_BEFORE_START,
            item: None,
        }
    }

    /// Position of the current item, or one of the sentinels.
    pub fn index(&self) -> isize {
        self.index
    }

    /// The current item. `None` before the first `advance`, after the item
    /// was taken, and once the sequence is exhausted.
    pub fn item(&self) -> Option<&T> {
        self.item.as_ref()
    }

    /// Moves the current item out of the cursor.
    pub fn take_item(&mut self) -> Option<T> {
        self.item.take()
    }

    pub fn is_exhausted(&self) -> bool {
        self.index == INDEX_EXHAUSTED
    }

    /// Records the outcome of one pull. Returns whether an item was produced.
    pub(crate) fn step(&mut self, next: Option<T>) -> bool {
        match next {
            Some(item) => {
                self.index += 1;
                self.item = Some(item);
                true
            }
            None => {
                self.index = INDEX_EXHAUSTED;
                self.item = None;
                false
            }
        }
    }
}

impl<T> Default for Cursor<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_counts_then_pins() {
        let mut cursor = Cursor::new();
        assert_eq!(cursor.index(), INDEX_BEFORE_START);

        assert!(cursor.step(Some('a')));
        assert_eq!(cursor.index(), 0);
        assert!(cursor.step(Some('b')));
        assert_eq!(cursor.index(), 1);
        assert_eq!(cursor.item(), Some(&'b'));

        assert!(!cursor.step(None));
        assert!(cursor.is_exhausted());
        assert_eq!(cursor.item(), None);
    }
}
