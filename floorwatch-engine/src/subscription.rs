//! Push subscriptions to current state changes.
//!
//! Each subscriber owns a bounded queue coalesced by machine: a newer version
//! replaces the pending one in place, and when the queue is full the oldest
//! pending machine is dropped. Publishing never blocks on a slow subscriber.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use floorwatch_types::{CurrentStateRecord, MachineId, StateFilter};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Arc<CurrentStateRecord>>,
    /// Highest version handed to the subscriber, per machine.
    delivered: HashMap<MachineId, u64>,
    dropped: u64,
    closed: bool,
}

#[derive(Debug)]
pub(crate) struct SubscriberQueue {
    filter: StateFilter,
    capacity: usize,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl SubscriberQueue {
    fn new(filter: StateFilter, capacity: usize) -> Self {
        Self {
            filter,
            capacity: capacity.max(1),
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    pub(crate) fn matches(&self, record: &CurrentStateRecord, now_ms: u64) -> bool {
        self.filter.matches(record, now_ms)
    }

    /// Enqueue a record unless something at least as new is already
    /// pending or delivered for the same machine.
    pub(crate) fn offer(&self, record: Arc<CurrentStateRecord>) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        if state
            .delivered
            .get(record.id())
            .is_some_and(|v| *v >= record.version)
        {
            return;
        }

        if let Some(pending) = state.pending.iter_mut().find(|p| p.id() == record.id()) {
            if pending.version < record.version {
                *pending = record;
            }
            return;
        }

        if state.pending.len() >= self.capacity {
            state.pending.pop_front();
            state.dropped += 1;
        }
        state.pending.push_back(record);
        drop(state);
        self.notify.notify_one();
    }

    fn take(&self) -> Option<Arc<CurrentStateRecord>> {
        let mut state = self.state.lock();
        let record = state.pending.pop_front()?;
        state.delivered.insert(record.id().clone(), record.version);
        Some(record)
    }

    fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// A live subscription. Dropping it cancels delivery.
///
/// # Example
///
/// ```rust
/// use floorwatch_engine::{Engine, ManualClock};
/// use floorwatch_types::{RawEvent, RawPayload, StateFilter};
/// use std::sync::Arc;
///
/// let engine = Engine::builder().clock(Arc::new(ManualClock::new(10))).build().unwrap();
/// let mut subscription = engine.subscribe(StateFilter::all().machine("1001"));
///
/// engine
///     .process(RawEvent::new("1001", "fault_code", 5u64, RawPayload::code("F12")))
///     .unwrap();
///
/// let record = subscription.try_recv().unwrap();
/// assert_eq!(record.status.to_string(), "F12");
/// ```
#[derive(Debug)]
pub struct Subscription {
    queue: Arc<SubscriberQueue>,
}

impl Subscription {
    /// Wait for the next update. Returns `None` once the engine is gone and
    /// everything pending has been received.
    pub async fn recv(&mut self) -> Option<Arc<CurrentStateRecord>> {
        loop {
            if let Some(record) = self.queue.take() {
                return Some(record);
            }
            if self.queue.is_closed() {
                return None;
            }
            self.queue.notify.notified().await;
        }
    }

    /// Take the next pending update without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<CurrentStateRecord>> {
        self.queue.take()
    }

    /// Updates discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.queue.state.lock().dropped
    }

    /// Number of updates waiting to be received.
    pub fn pending(&self) -> usize {
        self.queue.state.lock().pending.len()
    }

    pub fn filter(&self) -> &StateFilter {
        &self.queue.filter
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    pub(crate) fn queue(&self) -> &SubscriberQueue {
        &self.queue
    }
}

/// Fan-out point for committed records.
#[derive(Debug)]
pub struct SubscriptionHub {
    subscribers: RwLock<Vec<Weak<SubscriberQueue>>>,
    buffer: usize,
}

impl SubscriptionHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            buffer,
        }
    }

    /// Register a subscriber. The caller seeds it with current state.
    pub(crate) fn register(&self, filter: StateFilter) -> Subscription {
        let queue = Arc::new(SubscriberQueue::new(filter, self.buffer));
        self.subscribers.write().push(Arc::downgrade(&queue));
        Subscription { queue }
    }

    /// Deliver a committed record to every matching subscriber.
    pub fn publish(&self, record: &Arc<CurrentStateRecord>) {
        let mut saw_dead = false;
        for weak in self.subscribers.read().iter() {
            match weak.upgrade() {
                Some(queue) => {
                    if queue.matches(record, record.resolved_at_ms) {
                        queue.offer(Arc::clone(record));
                    }
                }
                None => saw_dead = true,
            }
        }
        if saw_dead {
            self.subscribers.write().retain(|w| w.strong_count() > 0);
        }
    }

    /// Live subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}

impl Drop for SubscriptionHub {
    fn drop(&mut self) {
        for queue in self.subscribers.get_mut().iter().filter_map(Weak::upgrade) {
            queue.close();
        }
    }
}
