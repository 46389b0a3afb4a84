//! Deferred, ordered event queue.
//!
//! Events are appended with a countdown delay and applied when a drain
//! takes the countdown below zero. A delay of `0` therefore means "next
//! drain", which is what makes the host apply its own events one tick
//! after producing them, in step with every replica.
//!
//! # Ordering
//!
//! - Due events dispatch in insertion order.
//! - Events that are not yet due keep their relative order.
//! - Events enqueued while a drain is running go to a [`FollowUps`] buffer
//!   and are appended after the drain finishes, so they never dispatch in
//!   the same pass.

use serde::{Deserialize, Serialize};

use crate::events::Event;

/// An event waiting in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedEvent {
    /// Drains remaining minus one; dispatched when it drops below zero.
    pub delay: i32,
    /// The event.
    pub event: Event,
}

/// Events enqueued from inside a drain.
#[derive(Debug, Default)]
pub struct FollowUps {
    events: Vec<QueuedEvent>,
}

impl FollowUps {
    /// Queue a follow-up for the next drain.
    pub fn push(&mut self, event: Event) {
        self.push_delayed(event, 0);
    }

    /// Queue a follow-up with an extra delay.
    pub fn push_delayed(&mut self, event: Event, delay: i32) {
        self.events.push(QueuedEvent { delay, event });
    }

    /// Buffered follow-ups in order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|q| &q.event)
    }

    /// Number of buffered follow-ups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Ordered buffer of pending events, one per session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventQueue {
    pending: Vec<QueuedEvent>,
}

impl EventQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event for the next drain.
    pub fn enqueue(&mut self, event: Event) {
        self.enqueue_delayed(event, 0);
    }

    /// Append an event that waits `delay` extra drains.
    pub fn enqueue_delayed(&mut self, event: Event, delay: i32) {
        self.pending.push(QueuedEvent { delay, event });
    }

    /// Number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending events in order.
    pub fn iter(&self) -> impl Iterator<Item = &QueuedEvent> {
        self.pending.iter()
    }

    /// Count down every pending event and dispatch the ones that are due.
    ///
    /// Returns the number of events dispatched.
    ///
    /// # Example
    ///
    /// ```
    /// use tilestorm_core::events::Event;
    /// use tilestorm_core::queue::EventQueue;
    ///
    /// let mut queue = EventQueue::new();
    /// queue.enqueue(Event::GameStart);
    /// queue.enqueue_delayed(Event::GameBegin, 1);
    ///
    /// let mut seen = Vec::new();
    /// queue.drain(|event, _| seen.push(event));
    /// assert_eq!(seen, vec![Event::GameStart]);
    ///
    /// queue.drain(|event, _| seen.push(event));
    /// assert_eq!(seen, vec![Event::GameStart, Event::GameBegin]);
    /// ```
    pub fn drain<F>(&mut self, mut dispatch: F) -> usize
    where
        F: FnMut(Event, &mut FollowUps),
    {
        let pending = std::mem::take(&mut self.pending);
        let mut follow_ups = FollowUps::default();
        let mut dispatched = 0;

        for mut queued in pending {
            queued.delay -= 1;
            if queued.delay < 0 {
                dispatch(queued.event, &mut follow_ups);
                dispatched += 1;
            } else {
                self.pending.push(queued);
            }
        }

        self.pending.append(&mut follow_ups.events);
        dispatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remove(uid: u64) -> Event {
        Event::RemoveBullet { uid }
    }

    fn uid_of(event: &Event) -> u64 {
        match event {
            Event::RemoveBullet { uid } => *uid,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_insertion_order() {
        let mut queue = EventQueue::new();
        for uid in 0..5 {
            queue.enqueue(remove(uid));
        }
        let mut seen = Vec::new();
        assert_eq!(queue.drain(|e, _| seen.push(uid_of(&e))), 5);
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_delay_counts_drains() {
        let mut queue = EventQueue::new();
        queue.enqueue_delayed(remove(1), 2);
        queue.enqueue(remove(2));
        queue.enqueue_delayed(remove(3), 1);

        let mut seen = Vec::new();
        queue.drain(|e, _| seen.push(uid_of(&e)));
        assert_eq!(seen, vec![2]);
        queue.drain(|e, _| seen.push(uid_of(&e)));
        assert_eq!(seen, vec![2, 3]);
        queue.drain(|e, _| seen.push(uid_of(&e)));
        assert_eq!(seen, vec![2, 3, 1]);
    }

    #[test]
    fn test_retained_events_keep_order() {
        let mut queue = EventQueue::new();
        queue.enqueue_delayed(remove(1), 1);
        queue.enqueue(remove(2));
        queue.enqueue_delayed(remove(3), 1);
        queue.drain(|_, _| {});

        let left: Vec<_> = queue.iter().map(|q| uid_of(&q.event)).collect();
        assert_eq!(left, vec![1, 3]);
        assert!(queue.iter().all(|q| q.delay == 0));
    }

    #[test]
    fn test_follow_ups_wait_for_next_drain() {
        let mut queue = EventQueue::new();
        queue.enqueue(remove(1));
        queue.enqueue_delayed(remove(9), 1);

        let mut seen = Vec::new();
        queue.drain(|e, follow_ups| {
            let uid = uid_of(&e);
            seen.push(uid);
            if uid == 1 {
                follow_ups.push(remove(2));
            }
        });
        assert_eq!(seen, vec![1]);

        // The follow-up lands after the retained event.
        let left: Vec<_> = queue.iter().map(|q| uid_of(&q.event)).collect();
        assert_eq!(left, vec![9, 2]);

        queue.drain(|e, _| seen.push(uid_of(&e)));
        assert_eq!(seen, vec![1, 9, 2]);
    }

    #[test]
    fn test_each_event_dispatched_once() {
        let mut queue = EventQueue::new();
        queue.enqueue(remove(1));
        let mut count = 0;
        for _ in 0..3 {
            queue.drain(|_, _| count += 1);
        }
        assert_eq!(count, 1);
    }
}
