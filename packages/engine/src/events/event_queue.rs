// packages/engine/src/events/event_queue.rs
//! Per-connection event outbox
//!
//! Agents offer events from any task; the connection writer takes them off
//! in batches. Offering never waits: once the outbox is full the event is
//! handed back and counted as rejected, so a slow client cannot stall a run.

use crate::events::event::AgentEvent;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Bounded lock-free outbox of events awaiting delivery
pub struct EventQueue {
    /// Pending events, oldest first
    slots: ArrayQueue<AgentEvent>,

    /// Events accepted into the outbox
    accepted: AtomicU64,

    /// Events handed to the writer
    delivered: AtomicU64,

    /// Events refused because every slot was taken
    rejected: AtomicU64,

    /// Deepest the outbox has been
    peak_depth: AtomicUsize,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: ArrayQueue::new(capacity.max(1)),
            accepted: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            peak_depth: AtomicUsize::new(0),
        }
    }

    /// Enqueue without waiting; a full outbox returns the event
    pub fn offer(&self, event: AgentEvent) -> Result<(), AgentEvent> {
        if let Err(event) = self.slots.push(event) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(event);
        }
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.peak_depth.fetch_max(self.slots.len(), Ordering::Relaxed);
        Ok(())
    }

    /// Oldest pending event, if any
    pub fn take(&self) -> Option<AgentEvent> {
        let event = self.slots.pop()?;
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Some(event)
    }

    /// Up to `max` pending events in offer order
    pub fn take_batch(&self, max: usize) -> Vec<AgentEvent> {
        let mut batch = Vec::with_capacity(max.min(self.slots.len()));
        while batch.len() < max {
            match self.take() {
                Some(event) => batch.push(event),
                None => break,
            }
        }
        batch
    }

    pub fn pending(&self) -> usize {
        self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            pending: self.slots.len(),
            peak_depth: self.peak_depth.load(Ordering::Relaxed),
            capacity: self.slots.capacity(),
        }
    }
}

/// Delivery counters for one outbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub accepted: u64,
    pub delivered: u64,
    pub rejected: u64,
    pub pending: usize,
    pub peak_depth: usize,
    pub capacity: usize,
}

impl QueueStats {
    /// Fraction of offered events that were refused
    pub fn rejection_ratio(&self) -> f64 {
        match self.accepted + self.rejected {
            0 => 0.0,
            offered => self.rejected as f64 / offered as f64,
        }
    }

    /// True once the writer has let the outbox fill up at least once
    pub fn saturated(&self) -> bool {
        self.peak_depth >= self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event::EventPayload;
    use std::sync::Arc;

    fn thinking(run_id: &str, step: u32) -> AgentEvent {
        AgentEvent::new(
            run_id,
            "planner",
            EventPayload::AgentThinking {
                thought: format!("step {}", step),
                step_number: Some(step),
            },
        )
    }

    fn step_of(event: &AgentEvent) -> Option<u32> {
        match event.payload {
            EventPayload::AgentThinking { step_number, .. } => step_number,
            _ => None,
        }
    }

    #[test]
    fn test_take_batch_keeps_offer_order() {
        let outbox = EventQueue::new(8);
        for step in 1..=5 {
            outbox.offer(thinking("run_a", step)).unwrap();
        }

        let first = outbox.take_batch(3);
        assert_eq!(first.len(), 3);
        assert_eq!(step_of(&first[0]), Some(1));
        assert_eq!(step_of(&first[2]), Some(3));

        let rest = outbox.take_batch(10);
        assert_eq!(rest.len(), 2);
        assert_eq!(outbox.pending(), 0);
        assert!(outbox.take().is_none());

        let stats = outbox.stats();
        assert_eq!(stats.accepted, 5);
        assert_eq!(stats.delivered, 5);
        assert_eq!(stats.peak_depth, 5);
        assert!(!stats.saturated());
    }

    #[test]
    fn test_full_outbox_hands_event_back() {
        let outbox = EventQueue::new(2);
        outbox.offer(thinking("run_a", 1)).unwrap();
        outbox.offer(thinking("run_a", 2)).unwrap();

        let refused = outbox.offer(thinking("run_b", 1)).unwrap_err();
        assert_eq!(refused.run_id, "run_b");

        let stats = outbox.stats();
        assert_eq!(stats.rejected, 1);
        assert!(stats.saturated());
        assert!((stats.rejection_ratio() - 1.0 / 3.0).abs() < 1e-9);

        // Room again once the writer catches up
        outbox.take().unwrap();
        outbox.offer(thinking("run_b", 1)).unwrap();
        assert_eq!(outbox.pending(), 2);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let outbox = EventQueue::new(0);
        assert_eq!(outbox.capacity(), 1);
        assert_eq!(outbox.stats().rejection_ratio(), 0.0);
    }

    #[test]
    fn test_offers_from_many_threads() {
        let outbox = Arc::new(EventQueue::new(256));
        let producers: Vec<_> = (0..4)
            .map(|worker| {
                let outbox = Arc::clone(&outbox);
                std::thread::spawn(move || {
                    for step in 0..50 {
                        outbox.offer(thinking(&format!("run_{}", worker), step)).unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let events = outbox.take_batch(usize::MAX);
        assert_eq!(events.len(), 200);

        // Each run's own events stay in order
        for worker in 0..4 {
            let run = format!("run_{}", worker);
            let steps: Vec<Option<u32>> = events
                .iter()
                .filter(|e| e.run_id == run)
                .map(step_of)
                .collect();
            let expected: Vec<Option<u32>> = (0..50).map(Some).collect();
            assert_eq!(steps, expected);
        }
    }
}
