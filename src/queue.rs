// Copyright (c) 2025 Sean McNamara <smcnam@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounded multi-producer FIFO with blocking push/pop and a drain mode.
//!
//! Producers block (bounded) when the queue is full; the single consumer
//! blocks (bounded) when it is empty. Closing the queue rejects new pushes
//! but keeps queued items poppable until the consumer sees `Abandoned`.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::LogError;

/// Outcome of a blocking pop.
#[derive(Debug, PartialEq, Eq)]
pub enum PopResult<T> {
    /// The next item in FIFO order.
    Item(T),
    /// Nothing arrived in time, or the consumer was interrupted.
    TimedOut,
    /// The queue is closed and empty; no item will ever arrive again.
    Abandoned,
}

/// Absolute deadline that tolerates `Duration::MAX`.
struct Deadline(Option<Instant>);

impl Deadline {
    fn after(timeout: Duration) -> Self {
        Deadline(Instant::now().checked_add(timeout))
    }

    fn remaining(&self) -> Duration {
        match self.0 {
            Some(at) => at.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        }
    }
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
    interrupted: bool,
}

pub struct BoundedQueue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(1024)),
                closed: false,
                interrupted: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue `item`, waiting up to `timeout` for room.
    ///
    /// A zero timeout never blocks. The item is dropped on failure.
    pub fn push(&self, item: T, timeout: Duration) -> Result<(), LogError> {
        let deadline = Deadline::after(timeout);
        let mut state = self.lock();

        loop {
            if state.closed {
                return Err(LogError::QueueClosed);
            }
            if state.items.len() < self.capacity {
                state.items.push_back(item);
                drop(state);
                self.not_empty.notify_one();
                return Ok(());
            }

            let remaining = deadline.remaining();
            if remaining.is_zero() {
                return Err(LogError::QueueFull);
            }
            state = self
                .not_full
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Dequeue the next item, waiting up to `timeout`.
    pub fn pop(&self, timeout: Duration) -> PopResult<T> {
        let deadline = Deadline::after(timeout);
        let mut state = self.lock();

        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return PopResult::Item(item);
            }
            if state.closed {
                return PopResult::Abandoned;
            }
            if state.interrupted {
                state.interrupted = false;
                return PopResult::TimedOut;
            }

            let remaining = deadline.remaining();
            if remaining.is_zero() {
                return PopResult::TimedOut;
            }
            state = self
                .not_empty
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Dequeue without waiting.
    pub fn try_pop(&self) -> Option<T> {
        let item = self.lock().items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Reject further pushes and wake every waiter. Queued items stay.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Make the consumer's current (or next) empty wait return `TimedOut` early.
    pub fn interrupt(&self) {
        let mut state = self.lock();
        state.interrupted = true;
        drop(state);
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = BoundedQueue::new(4);
        for i in 0..4 {
            queue.push(i, Duration::ZERO).unwrap();
        }
        for i in 0..4 {
            assert_eq!(queue.pop(Duration::ZERO), PopResult::Item(i));
        }
        assert_eq!(queue.pop(Duration::from_millis(5)), PopResult::TimedOut);
    }

    #[test]
    fn test_push_full_times_out() {
        let queue = BoundedQueue::new(1);
        queue.push("a", Duration::ZERO).unwrap();

        assert_eq!(queue.push("b", Duration::ZERO), Err(LogError::QueueFull));

        let start = Instant::now();
        assert_eq!(
            queue.push("c", Duration::from_millis(30)),
            Err(LogError::QueueFull)
        );
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_blocked_push_succeeds_when_room_appears() {
        let queue = Arc::new(BoundedQueue::new(1));
        queue.push(1, Duration::ZERO).unwrap();

        let consumer = queue.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            consumer.pop(Duration::from_secs(1))
        });

        queue.push(2, Duration::from_secs(2)).unwrap();
        assert_eq!(handle.join().unwrap(), PopResult::Item(1));
        assert_eq!(queue.try_pop(), Some(2));
    }

    #[test]
    fn test_close_keeps_items_then_abandons() {
        let queue = BoundedQueue::new(8);
        queue.push(1, Duration::ZERO).unwrap();
        queue.push(2, Duration::ZERO).unwrap();
        queue.close();

        assert_eq!(queue.push(3, Duration::ZERO), Err(LogError::QueueClosed));
        assert_eq!(queue.pop(Duration::ZERO), PopResult::Item(1));
        assert_eq!(queue.pop(Duration::ZERO), PopResult::Item(2));
        assert_eq!(queue.pop(Duration::from_secs(1)), PopResult::Abandoned);
        assert_eq!(queue.pop(Duration::from_secs(1)), PopResult::Abandoned);
    }

    #[test]
    fn test_close_wakes_blocked_popper_and_pusher() {
        let queue = Arc::new(BoundedQueue::<u32>::new(1));

        let popper = queue.clone();
        let pop_handle = thread::spawn(move || popper.pop(Duration::from_secs(10)));

        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert_eq!(pop_handle.join().unwrap(), PopResult::Abandoned);

        let full = Arc::new(BoundedQueue::<u32>::new(1));
        full.push(0, Duration::ZERO).unwrap();
        let pusher = full.clone();
        let push_handle = thread::spawn(move || pusher.push(1, Duration::from_secs(10)));

        thread::sleep(Duration::from_millis(20));
        full.close();
        assert_eq!(push_handle.join().unwrap(), Err(LogError::QueueClosed));
    }

    #[test]
    fn test_interrupt_ends_wait_early() {
        let queue = Arc::new(BoundedQueue::<u32>::new(1));
        let popper = queue.clone();

        let start = Instant::now();
        let handle = thread::spawn(move || popper.pop(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(20));
        queue.interrupt();

        assert_eq!(handle.join().unwrap(), PopResult::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let queue = BoundedQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.push('x', Duration::ZERO).unwrap();
        assert!(!queue.is_empty());
    }
}
