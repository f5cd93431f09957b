//! Inbound queue between peer readers and the local consumer.
//!
//! Unbounded FIFO, many producers, one consumer. Items are handed out in
//! enqueue order; across peers that is arrival order, nothing stronger.
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

pub struct MessageQueue<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

struct State<T> {
    items: VecDeque<T>,
    stopped: bool,
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MessageQueue<T> {
    pub fn new() -> Self {
        Self { state: Mutex::new(State { items: VecDeque::new(), stopped: false }), ready: Condvar::new() }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue an item. Items pushed after [`stop`](Self::stop) are dropped.
    pub fn push(&self, item: T) {
        {
            let mut state = self.lock();
            if state.stopped {
                return;
            }
            state.items.push_back(item);
        }
        self.ready.notify_one();
    }

    /// Block until an item is available or the queue is stopped. Returns
    /// `None` once stopped, even if items are still pending.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if state.stopped {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            state = self.ready.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    pub fn stop(&self) {
        self.lock().stopped = true;
        self.ready.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }
}

/// Dispatcher loop: hand every queued item to `deliver` until the queue is
/// stopped. The lock is released while `deliver` runs.
pub fn run_dispatcher<T, F>(queue: &MessageQueue<T>, mut deliver: F)
where
    F: FnMut(T),
{
    while let Some(item) = queue.pop() {
        deliver(item);
    }
}
