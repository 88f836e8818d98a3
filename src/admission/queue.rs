//! Bounded FIFO queue for requests waiting on capacity.
//!
//! # Settlement
//! Each entry owns the sending half of a oneshot channel; the waiter holds
//! the receiver. An entry is settled at most once because `settle` consumes
//! it, and every settlement, removal, and skip happens under the admission
//! lock. A waiter whose deadline passes removes its own entry under that
//! same lock; if the entry is already gone the result is in the channel.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::admission::connection::LoadBalancingResult;
use crate::error::LoadBalancerError;
use crate::load_balancer::SelectionContext;

/// Final outcome delivered to a queued waiter.
pub type Settlement = Result<LoadBalancingResult, LoadBalancerError>;

/// An entry waiting in the queue.
#[derive(Debug)]
pub struct QueuedRequest {
    id: u64,
    pub context: SelectionContext,
    pub enqueued_at: Instant,
    responder: oneshot::Sender<Settlement>,
}

impl QueuedRequest {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.enqueued_at.elapsed() >= timeout
    }

    /// The waiter stopped listening (its future was dropped).
    pub fn is_abandoned(&self) -> bool {
        self.responder.is_closed()
    }

    /// Deliver the outcome. Gives it back if the waiter is gone.
    pub fn settle(self, outcome: Settlement) -> Result<(), Settlement> {
        self.responder.send(outcome)
    }
}

/// Waiter's half of a queued request.
#[derive(Debug)]
pub struct PendingRequest {
    pub id: u64,
    pub enqueued_at: Instant,
    pub receiver: oneshot::Receiver<Settlement>,
}

#[derive(Debug)]
pub struct RequestQueue {
    entries: VecDeque<QueuedRequest>,
    capacity: usize,
    next_id: u64,
}

impl RequestQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            next_id: 1,
        }
    }

    /// Append a request, or fail with `QueueFull` at capacity.
    /// Entries whose waiter has gone away do not hold a slot.
    pub fn enqueue(&mut self, context: SelectionContext) -> Result<PendingRequest, LoadBalancerError> {
        self.entries.retain(|e| !e.is_abandoned());
        if self.entries.len() >= self.capacity {
            return Err(LoadBalancerError::QueueFull);
        }

        let (responder, receiver) = oneshot::channel();
        let id = self.next_id;
        self.next_id += 1;
        let enqueued_at = Instant::now();

        self.entries.push_back(QueuedRequest {
            id,
            context,
            enqueued_at,
            responder,
        });

        Ok(PendingRequest {
            id,
            enqueued_at,
            receiver,
        })
    }

    pub fn pop_front(&mut self) -> Option<QueuedRequest> {
        self.entries.pop_front()
    }

    /// Put an entry back at the head (it keeps its place in line).
    pub fn push_front(&mut self, entry: QueuedRequest) {
        self.entries.push_front(entry);
    }

    /// Remove an entry by id. Returns false if it was already taken.
    pub fn remove(&mut self, id: u64) -> bool {
        match self.entries.iter().position(|e| e.id == id) {
            Some(index) => self.entries.remove(index).is_some(),
            None => false,
        }
    }

    pub fn take_all(&mut self) -> Vec<QueuedRequest> {
        self.entries.drain(..).collect()
    }

    /// Number of requests still waiting.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_abandoned()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_enforced() {
        let mut queue = RequestQueue::new(2);
        let _a = queue.enqueue(SelectionContext::new()).unwrap();
        let _b = queue.enqueue(SelectionContext::new()).unwrap();
        assert_eq!(queue.enqueue(SelectionContext::new()).unwrap_err(), LoadBalancerError::QueueFull);
    }

    #[test]
    fn test_zero_capacity_rejects_immediately() {
        let mut queue = RequestQueue::new(0);
        assert_eq!(queue.enqueue(SelectionContext::new()).unwrap_err(), LoadBalancerError::QueueFull);
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = RequestQueue::new(3);
        let a = queue.enqueue(SelectionContext::new()).unwrap();
        let b = queue.enqueue(SelectionContext::new()).unwrap();

        let first = queue.pop_front().unwrap();
        assert_eq!(first.id(), a.id);
        queue.push_front(first);
        assert_eq!(queue.pop_front().unwrap().id(), a.id);
        assert_eq!(queue.pop_front().unwrap().id(), b.id);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_is_exclusive() {
        let mut queue = RequestQueue::new(3);
        let a = queue.enqueue(SelectionContext::new()).unwrap();
        assert!(queue.remove(a.id));
        assert!(!queue.remove(a.id));
    }

    #[test]
    fn test_abandoned_entries_free_their_slot() {
        let mut queue = RequestQueue::new(1);
        let gone = queue.enqueue(SelectionContext::new()).unwrap();
        drop(gone.receiver);
        assert_eq!(queue.len(), 0);
        assert!(queue.is_empty());

        let live = queue.enqueue(SelectionContext::new()).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop_front().unwrap().id(), live.id);
        assert!(queue.pop_front().is_none());
    }

    #[tokio::test]
    async fn test_settle_and_abandon() {
        let mut queue = RequestQueue::new(2);
        let pending = queue.enqueue(SelectionContext::new()).unwrap();
        let dropped = queue.enqueue(SelectionContext::new()).unwrap();
        drop(dropped.receiver);

        let entry = queue.pop_front().unwrap();
        assert!(!entry.is_abandoned());
        entry.settle(Err(LoadBalancerError::ServiceShuttingDown)).unwrap();
        assert_eq!(
            pending.receiver.await.unwrap().unwrap_err(),
            LoadBalancerError::ServiceShuttingDown
        );

        let orphan = queue.pop_front().unwrap();
        assert!(orphan.is_abandoned());
        assert!(orphan.settle(Err(LoadBalancerError::QueueTimeout)).is_err());
    }
}
