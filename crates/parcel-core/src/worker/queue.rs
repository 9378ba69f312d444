//! Shared FIFO of work items with end-of-work sentinels.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::segmenter::Interval;

/// Blocking multi-consumer queue. `None` entries are sentinels telling one
/// worker to exit.
pub struct WorkQueue<T = Interval> {
    items: Mutex<VecDeque<Option<T>>>,
    ready: Condvar,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a work item (`Some`) or a sentinel (`None`).
    pub fn submit(&self, item: Option<T>) {
        let mut items = self.items.lock().unwrap_or_else(|p| p.into_inner());
        items.push_back(item);
        drop(items);
        self.ready.notify_one();
    }

    /// Block until an entry is available and take it.
    pub fn pop(&self) -> Option<T> {
        let mut items = self.items.lock().unwrap_or_else(|p| p.into_inner());
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            items = self.ready.wait(items).unwrap_or_else(|p| p.into_inner());
        }
    }

    /// Entries not yet taken (items and sentinels).
    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn fifo_order() {
        let q = WorkQueue::new();
        q.submit(Some(Interval::new(0, 10)));
        q.submit(Some(Interval::new(10, 20)));
        q.submit(None);
        assert_eq!(q.len(), 3);
        assert_eq!(q.pop(), Some(Interval::new(0, 10)));
        assert_eq!(q.pop(), Some(Interval::new(10, 20)));
        assert_eq!(q.pop(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn pop_blocks_until_submit() {
        let q: Arc<WorkQueue> = Arc::new(WorkQueue::new());
        let q2 = Arc::clone(&q);
        let consumer = std::thread::spawn(move || q2.pop());
        std::thread::sleep(std::time::Duration::from_millis(20));
        q.submit(Some(Interval::new(5, 6)));
        assert_eq!(consumer.join().unwrap(), Some(Interval::new(5, 6)));
    }
}
