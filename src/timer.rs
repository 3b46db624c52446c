// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::collections::HashMap;
use std::time::Duration;

#[derive(PartialEq, Eq, Hash, Debug, Copy, Clone)]
pub struct EventId(u64);

/// Backend that arms and disarms wall-clock timeouts. The production
/// implementation lives with the driver's work-queue plumbing; tests use
/// [`FakeScheduler`].
pub trait Scheduler {
    /// Requests a timeout after `delay`. Returns a unique ID used to cancel
    /// the scheduled event.
    fn schedule(&mut self, delay: Duration) -> EventId;
    /// Cancels a previously scheduled event.
    fn cancel(&mut self, id: EventId);
}

/// A timer to schedule and cancel timeouts and retrieve triggered events.
///
/// Timeout delivery is serialized with every other state-mutating operation
/// (they all require exclusive access to the owning context), so
/// `cancel_event` has cancel-and-join semantics: after it returns, the
/// cancelled event can never be observed via [`Timer::triggered`].
pub struct Timer<E> {
    events: HashMap<EventId, E>,
    scheduler: Box<dyn Scheduler + Send>,
}

impl<E> Timer<E> {
    pub fn new(scheduler: Box<dyn Scheduler + Send>) -> Self {
        Self { events: HashMap::default(), scheduler }
    }

    /// Takes the event payload for a fired timeout. Returns `None` if the
    /// event was cancelled or already delivered.
    pub fn triggered(&mut self, event_id: &EventId) -> Option<E> {
        self.events.remove(event_id)
    }

    pub fn schedule_after(&mut self, delay: Duration, event: E) -> EventId {
        let event_id = self.scheduler.schedule(delay);
        self.events.insert(event_id, event);
        event_id
    }

    pub fn cancel_event(&mut self, event_id: EventId) {
        self.events.remove(&event_id);
        self.scheduler.cancel(event_id);
    }

    pub fn cancel_all(&mut self) {
        for event_id in self.events.keys() {
            self.scheduler.cancel(*event_id);
        }
        self.events.clear();
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records scheduled deadlines so tests can fire them by hand.
    #[derive(Clone)]
    pub struct FakeScheduler {
        inner: Arc<Mutex<FakeSchedulerState>>,
    }

    struct FakeSchedulerState {
        next_id: u64,
        pending: Vec<(EventId, Duration)>,
    }

    impl FakeScheduler {
        pub fn new() -> Self {
            Self { inner: Arc::new(Mutex::new(FakeSchedulerState { next_id: 0, pending: vec![] })) }
        }

        /// Pops the earliest pending deadline, if any.
        pub fn next_pending(&self) -> Option<(EventId, Duration)> {
            let mut state = self.inner.lock();
            if state.pending.is_empty() {
                return None;
            }
            let (idx, _) = state
                .pending
                .iter()
                .enumerate()
                .min_by_key(|(_, (_, delay))| *delay)
                .expect("non-empty");
            Some(state.pending.remove(idx))
        }

        /// Delay of the pending event with the given ID, if still armed.
        pub fn delay_of(&self, id: EventId) -> Option<Duration> {
            self.inner.lock().pending.iter().find(|(i, _)| *i == id).map(|(_, d)| *d)
        }

        pub fn pending_count(&self) -> usize {
            self.inner.lock().pending.len()
        }
    }

    impl Scheduler for FakeScheduler {
        fn schedule(&mut self, delay: Duration) -> EventId {
            let mut state = self.inner.lock();
            state.next_id += 1;
            let id = EventId(state.next_id);
            state.pending.push((id, delay));
            id
        }

        fn cancel(&mut self, id: EventId) {
            self.inner.lock().pending.retain(|(i, _)| *i != id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeScheduler;
    use super::*;

    #[test]
    fn schedule_cancel_event() {
        #[derive(PartialEq, Eq, Debug, Hash)]
        struct FooEvent(u8);

        let sched = FakeScheduler::new();
        let mut timer = Timer::<FooEvent>::new(Box::new(sched.clone()));

        // Verify event triggers no more than once.
        let event_id = timer.schedule_after(Duration::from_millis(5), FooEvent(8));
        assert_eq!(timer.triggered(&event_id), Some(FooEvent(8)));
        assert_eq!(timer.triggered(&event_id), None);

        // Verify event does not trigger if it was canceled.
        let event_id = timer.schedule_after(Duration::from_millis(5), FooEvent(9));
        timer.cancel_event(event_id);
        assert_eq!(timer.triggered(&event_id), None);
        assert_eq!(sched.delay_of(event_id), None);

        // Verify multiple events can be scheduled and canceled.
        let event_id_1 = timer.schedule_after(Duration::from_millis(1), FooEvent(8));
        let event_id_2 = timer.schedule_after(Duration::from_millis(2), FooEvent(9));
        let event_id_3 = timer.schedule_after(Duration::from_millis(3), FooEvent(10));
        timer.cancel_event(event_id_2);
        assert_eq!(timer.triggered(&event_id_2), None);
        assert_eq!(timer.triggered(&event_id_3), Some(FooEvent(10)));
        assert_eq!(timer.triggered(&event_id_1), Some(FooEvent(8)));
    }

    #[test]
    fn cancel_all() {
        let sched = FakeScheduler::new();
        let mut timer = Timer::new(Box::new(sched.clone()));

        let event_id_1 = timer.schedule_after(Duration::from_millis(5), 8);
        let event_id_2 = timer.schedule_after(Duration::from_millis(5), 9);
        let event_id_3 = timer.schedule_after(Duration::from_millis(5), 10);
        timer.cancel_all();
        assert_eq!(timer.triggered(&event_id_1), None);
        assert_eq!(timer.triggered(&event_id_2), None);
        assert_eq!(timer.triggered(&event_id_3), None);
        assert_eq!(sched.pending_count(), 0);
    }

    #[test]
    fn fake_scheduler_orders_by_deadline() {
        let sched = FakeScheduler::new();
        let mut timer = Timer::new(Box::new(sched.clone()));
        let late = timer.schedule_after(Duration::from_secs(10), "late");
        let early = timer.schedule_after(Duration::from_millis(100), "early");
        assert_eq!(sched.next_pending().map(|(id, _)| id), Some(early));
        assert_eq!(sched.next_pending().map(|(id, _)| id), Some(late));
    }
}
