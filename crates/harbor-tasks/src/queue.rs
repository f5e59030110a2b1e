//! Thread-safe FIFO of pending jobs.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// A FIFO queue guarded by a single lock for both insertion and removal.
///
/// Every enqueued item is handed to exactly one successful
/// [`try_dequeue`](Self::try_dequeue). Neither operation blocks beyond the
/// critical section.
#[derive(Debug)]
pub struct JobQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> JobQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends an item to the tail.
    pub fn enqueue(&self, item: T) {
        self.items.lock().push_back(item);
    }

    /// Removes and returns the head, or `None` if the queue is empty.
    pub fn try_dequeue(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Number of items waiting.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns `true` if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl<T> Default for JobQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_empty_queue() {
        let queue: JobQueue<u32> = JobQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.try_dequeue(), None);
    }

    #[test]
    fn test_fifo_order() {
        let queue = JobQueue::new();
        queue.enqueue(1);
        queue.enqueue(2);
        queue.enqueue(3);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.try_dequeue(), Some(1));
        assert_eq!(queue.try_dequeue(), Some(2));
        assert_eq!(queue.try_dequeue(), Some(3));
        assert_eq!(queue.try_dequeue(), None);
    }

    #[test]
    fn test_concurrent_dequeue_delivers_each_item_once() {
        let queue = Arc::new(JobQueue::new());
        for i in 0..1000 {
            queue.enqueue(i);
        }

        let consumers: Vec<_> = (0..8)
            .map(|_| {
                let q = queue.clone();
                thread::spawn(move || {
                    let mut taken = Vec::new();
                    while let Some(item) = q.try_dequeue() {
                        taken.push(item);
                    }
                    taken
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for consumer in consumers {
            for item in consumer.join().unwrap() {
                assert!(seen.insert(item), "item {item} dequeued twice");
            }
        }
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn test_concurrent_enqueue_loses_nothing() {
        let queue = Arc::new(JobQueue::new());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let q = queue.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        q.enqueue(p * 1000 + i);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        assert_eq!(queue.len(), 1000);
    }

    proptest! {
        #[test]
        fn prop_single_consumer_preserves_insertion_order(items in proptest::collection::vec(any::<u32>(), 0..64)) {
            let queue = JobQueue::new();
            for item in &items {
                queue.enqueue(*item);
            }
            let drained: Vec<u32> = std::iter::from_fn(|| queue.try_dequeue()).collect();
            prop_assert_eq!(drained, items);
        }
    }
}
