//! Pending Buffer
//!
//! Ordered queue of events issued while readiness is unknown. It is drained
//! exactly once, in one step, when the transport resolves.

use std::collections::VecDeque;

use crate::PendingEvent;

#[derive(Debug, Default)]
pub struct PendingBuffer {
    events: VecDeque<PendingEvent>,
}

impl PendingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: PendingEvent) {
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Take every buffered event in insertion order, leaving the buffer empty
    pub fn drain_all(&mut self) -> Vec<PendingEvent> {
        std::mem::take(&mut self.events).into()
    }
}
