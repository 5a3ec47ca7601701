//! Bounded binary min-heap for time-ordered scheduling
//!
//! Storage is a `Vec` reserved to full capacity at construction; `push` never
//! grows it, so the heap is usable from the RT path once built.
//!
//! The ordering is supplied by the caller as a "greater-or-equal" predicate:
//! `compare(a, b)` returns true when `a`'s key is >= `b`'s key. The root is
//! always an element with the smallest key. Among equal keys the pop order is
//! unspecified.

/// Returned when pushing onto a full heap; hands the rejected item back
#[derive(Debug)]
pub struct HeapFull<T> {
    pub capacity: usize,
    pub item: T,
}

impl<T> std::fmt::Display for HeapFull<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "heap is full (capacity {})", self.capacity)
    }
}

impl<T: std::fmt::Debug> std::error::Error for HeapFull<T> {}

/// Fixed-capacity min-heap
///
/// `on_move(item, index)` is called every time an item lands at a new index,
/// including its first placement.
pub struct SchedHeap<T, C, M>
where
    C: Fn(&T, &T) -> bool,
    M: FnMut(&T, usize),
{
    items: Vec<T>,
    capacity: usize,
    compare: C,
    on_move: M,
}

impl<T, C, M> SchedHeap<T, C, M>
where
    C: Fn(&T, &T) -> bool,
    M: FnMut(&T, usize),
{
    pub fn new(capacity: usize, compare: C, on_move: M) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            compare,
            on_move,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert an item, restoring heap order in O(log n)
    ///
    /// Fails without touching the heap when it already holds `capacity` items.
    pub fn push(&mut self, item: T) -> Result<(), HeapFull<T>> {
        if self.items.len() >= self.capacity {
            return Err(HeapFull {
                capacity: self.capacity,
                item,
            });
        }
        self.items.push(item);
        let idx = self.items.len() - 1;
        (self.on_move)(&self.items[idx], idx);
        self.sift_up(idx);
        Ok(())
    }

    /// The smallest item, without removing it
    pub fn top(&self) -> Option<&T> {
        self.items.first()
    }

    /// Remove and return the smallest item in O(log n)
    pub fn pop(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let top = self.items.swap_remove(0);
        if !self.items.is_empty() {
            (self.on_move)(&self.items[0], 0);
            self.sift_down(0);
        }
        Some(top)
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if (self.compare)(&self.items[idx], &self.items[parent]) {
                break;
            }
            self.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * idx + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && !(self.compare)(&self.items[right], &self.items[left]) {
                right
            } else {
                left
            };
            if (self.compare)(&self.items[child], &self.items[idx]) {
                break;
            }
            self.swap(idx, child);
            idx = child;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.items.swap(a, b);
        (self.on_move)(&self.items[a], a);
        (self.on_move)(&self.items[b], b);
    }
}

impl<T, C, M> std::fmt::Debug for SchedHeap<T, C, M>
where
    T: std::fmt::Debug,
    C: Fn(&T, &T) -> bool,
    M: FnMut(&T, usize),
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedHeap")
            .field("len", &self.items.len())
            .field("capacity", &self.capacity)
            .field("top", &self.items.first())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ge(a: &u64, b: &u64) -> bool {
        a >= b
    }

    fn no_move(_: &u64, _: usize) {}

    #[test]
    fn test_empty_heap() {
        let mut heap = SchedHeap::new(4, ge, no_move);
        assert!(heap.is_empty());
        assert!(heap.top().is_none());
        assert!(heap.pop().is_none());
    }

    #[test]
    fn test_top_is_minimum() {
        let mut heap = SchedHeap::new(8, ge, no_move);
        for t in [50, 10, 40, 30, 20] {
            heap.push(t).unwrap();
        }
        assert_eq!(heap.top(), Some(&10));
        assert_eq!(heap.len(), 5);
    }

    #[test]
    fn test_pop_order_non_decreasing() {
        let mut heap = SchedHeap::new(16, ge, no_move);
        for t in [1050, 1000, 1100, 1000, 1025, 999, 2000] {
            heap.push(t).unwrap();
        }
        let mut popped = Vec::new();
        while let Some(t) = heap.pop() {
            popped.push(t);
        }
        assert_eq!(popped, vec![999, 1000, 1000, 1025, 1050, 1100, 2000]);
    }

    #[test]
    fn test_push_beyond_capacity_fails_without_mutation() {
        let mut heap = SchedHeap::new(2, ge, no_move);
        heap.push(5).unwrap();
        heap.push(3).unwrap();

        let err = heap.push(1).unwrap_err();
        assert_eq!(err.item, 1);
        assert_eq!(err.capacity, 2);

        assert_eq!(heap.len(), 2);
        assert_eq!(heap.pop(), Some(3));
        assert_eq!(heap.pop(), Some(5));
    }

    #[test]
    fn test_zero_capacity_rejects_everything() {
        let mut heap = SchedHeap::new(0, ge, no_move);
        assert!(heap.push(1).is_err());
        assert!(heap.is_empty());
    }

    #[test]
    fn test_on_move_tracks_positions() {
        let positions: Rc<RefCell<Vec<(u64, usize)>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&positions);
        let mut heap = SchedHeap::new(4, ge, move |item: &u64, idx| {
            sink.borrow_mut().push((*item, idx));
        });

        heap.push(20).unwrap();
        heap.push(10).unwrap();

        // 20 placed at 0, 10 placed at 1, then swapped: 20 -> 1, 10 -> 0
        let moves = positions.borrow().clone();
        assert_eq!(moves, vec![(20, 0), (10, 1), (20, 1), (10, 0)]);
    }

    #[test]
    fn test_push_after_pop_reuses_capacity() {
        let mut heap = SchedHeap::new(1, ge, no_move);
        heap.push(7).unwrap();
        assert!(heap.push(8).is_err());
        assert_eq!(heap.pop(), Some(7));
        heap.push(8).unwrap();
        assert_eq!(heap.top(), Some(&8));
    }

    proptest! {
        #[test]
        fn pops_are_sorted(times in proptest::collection::vec(0u64..10_000, 0..64)) {
            let mut heap = SchedHeap::new(64, ge, no_move);
            for t in &times {
                heap.push(*t).unwrap();
            }
            let mut expected = times.clone();
            expected.sort_unstable();

            let mut popped = Vec::with_capacity(times.len());
            while let Some(t) = heap.pop() {
                popped.push(t);
            }
            prop_assert_eq!(popped, expected);
        }

        #[test]
        fn interleaved_pops_return_current_minimum(
            ops in proptest::collection::vec(proptest::option::of(0u64..1000), 0..128)
        ) {
            let mut heap = SchedHeap::new(32, ge, no_move);
            let mut model: Vec<u64> = Vec::new();
            for op in ops {
                match op {
                    Some(t) => {
                        let pushed = heap.push(t).is_ok();
                        prop_assert_eq!(pushed, model.len() < 32);
                        if pushed {
                            model.push(t);
                        }
                    }
                    None => {
                        let expected = model.iter().copied().min();
                        if let Some(min) = expected {
                            let pos = model.iter().position(|&t| t == min).unwrap();
                            model.swap_remove(pos);
                        }
                        prop_assert_eq!(heap.pop(), expected);
                    }
                }
            }
        }
    }
}
