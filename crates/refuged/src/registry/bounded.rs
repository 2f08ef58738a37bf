//! Fixed-capacity ordered list.

/// An ordered list that refuses insertions beyond a fixed capacity.
///
/// Removal keeps the relative order of the remaining items.
#[derive(Debug)]
pub struct BoundedList<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T> BoundedList<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `item`, or hands it back if the list is full.
    pub fn push(&mut self, item: T) -> Result<usize, T> {
        if self.is_full() {
            return Err(item);
        }
        self.items.push(item);
        Ok(self.items.len())
    }

    /// Removes the first item matching `pred`, shifting later items left.
    pub fn remove_first<F>(&mut self, pred: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let index = self.items.iter().position(pred)?;
        Some(self.items.remove(index))
    }

    /// Removes every item matching `pred`, keeping the rest in order.
    pub fn remove_all<F>(&mut self, mut pred: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        let (removed, kept) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|item| pred(item));
        self.items = kept;
        removed
    }

    /// Removes and returns all items.
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }

    pub fn find<F>(&self, pred: F) -> Option<&T>
    where
        F: FnMut(&&T) -> bool,
    {
        self.items.iter().find(pred)
    }

    pub fn find_mut<F>(&mut self, pred: F) -> Option<&mut T>
    where
        F: FnMut(&&mut T) -> bool,
    {
        self.items.iter_mut().find(pred)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_until_full() {
        let mut list = BoundedList::new(3);
        for n in 1..=3 {
            assert_eq!(list.push(n), Ok(n as usize));
        }
        assert!(list.is_full());
        assert_eq!(list.push(4), Err(4));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut list = BoundedList::new(5);
        for c in ['a', 'b', 'c', 'd', 'e'] {
            list.push(c).unwrap();
        }

        assert_eq!(list.remove_first(|c| *c == 'b'), Some('b'));
        assert_eq!(list.iter().copied().collect::<String>(), "acde");
        assert_eq!(list.remove_first(|c| *c == 'z'), None);
        assert_eq!(list.len(), 4);

        // Freed slot accepts a new item at the end
        list.push('f').unwrap();
        assert_eq!(list.iter().copied().collect::<String>(), "acdef");
    }

    #[test]
    fn test_remove_all() {
        let mut list = BoundedList::new(6);
        for n in 1..=6 {
            list.push(n).unwrap();
        }

        let removed = list.remove_all(|n| n % 2 == 0);
        assert_eq!(removed, vec![2, 4, 6]);
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![1, 3, 5]);
    }

    #[test]
    fn test_zero_capacity_rejects_everything() {
        let mut list = BoundedList::new(0);
        assert_eq!(list.push("x"), Err("x"));
        assert!(list.is_empty());
    }
}
