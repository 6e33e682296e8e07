//! Type-indexed publish/subscribe dispatch. Subscriptions are RAII: dropping
//! the [`Subscription`] token removes the callback. `Deferred` events sit in a
//! bounded [`FixedStorage`] (capacity settles the "how big can a stored event
//! be" question the same way job storage does: by being bounded and handle-
//! indexed rather than unbounded) and drain within a wall-clock budget each
//! frame; `Async` events run as scheduler jobs; `Immediate` events run
//! synchronously, on the emitting thread, before `emit` returns.

use crate::event::{Event, EventEnvelope, EventMetadata, EventPayload, EventTypeId, ExecutionMode, JobPriorityHint, SourceLocation};
use crate::handle::Handle;
use crate::job::{JobAffinity, JobPriority, JobResult};
use crate::scheduler::DefaultJobScheduler;
use crate::storage::FixedStorage;
use crossbeam::queue::SegQueue;
use fnv::FnvHashMap;
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

struct Subscriber {
    callback: Box<dyn Fn(&dyn Event) + Send + Sync>,
}

#[derive(Default)]
struct Subscribers {
    entries: Vec<Option<Subscriber>>,
    free: Vec<u32>,
}

impl Subscribers {
    fn insert(&mut self, subscriber: Subscriber) -> u32 {
        if let Some(id) = self.free.pop() {
            self.entries[id as usize] = Some(subscriber);
            id
        } else {
            self.entries.push(Some(subscriber));
            (self.entries.len() - 1) as u32
        }
    }

    fn remove(&mut self, id: u32) {
        if let Some(slot) = self.entries.get_mut(id as usize) {
            if slot.take().is_some() {
                self.free.push(id);
            }
        }
    }

    fn count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_some()).count()
    }
}

type SubscriptionRegistry = Arc<RwLock<FnvHashMap<EventTypeId, Subscribers>>>;

/// RAII unsubscribe token. Dropping it removes the callback from the registry.
pub struct Subscription {
    registry: SubscriptionRegistry,
    type_id: EventTypeId,
    id: u32,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subs) = self.registry.write().get_mut(&self.type_id) {
            subs.remove(self.id);
        }
    }
}

/// Tuning knobs for an [`EventSystem`], the event-dispatch counterpart to
/// [`crate::scheduler::SchedulerConfig`].
#[derive(Clone, Debug)]
pub struct EventSystemConfig {
    /// Pending deferred-queue depth at which [`EventSystem::begin_frame`] logs a
    /// warning: a sustained backlog here usually means the per-frame
    /// `process_deferred_events` budget is too small for the emission rate.
    pub deferred_queue_warn_threshold: usize,
}

impl Default for EventSystemConfig {
    fn default() -> Self {
        Self {
            deferred_queue_warn_threshold: 128,
        }
    }
}

#[derive(Default)]
struct EventSystemCounters {
    immediate: AtomicU64,
    deferred: AtomicU64,
    async_dispatched: AtomicU64,
    events_dropped: AtomicU64,
    total_processing_ns: AtomicU64,
    processed_count: AtomicU64,
    min_processing_ns: AtomicU64,
    max_processing_ns: AtomicU64,
}

impl EventSystemCounters {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            min_processing_ns: AtomicU64::new(u64::MAX),
            ..Default::default()
        })
    }

    fn record_dispatch(&self, event: &dyn Event) {
        let counter = match event.execution_mode() {
            ExecutionMode::Immediate => &self.immediate,
            ExecutionMode::Deferred => &self.deferred,
            ExecutionMode::Async => &self.async_dispatched,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if let Some(duration) = event.metadata().processing_time() {
            let nanos = duration.as_nanos().min(u64::MAX as u128) as u64;
            self.total_processing_ns.fetch_add(nanos, Ordering::Relaxed);
            self.processed_count.fetch_add(1, Ordering::Relaxed);
            atomic_min(&self.min_processing_ns, nanos);
            atomic_max(&self.max_processing_ns, nanos);
        }
    }

    fn record_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }
}

fn atomic_min(cell: &AtomicU64, value: u64) {
    let mut current = cell.load(Ordering::Relaxed);
    while value < current {
        match cell.compare_exchange_weak(current, value, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(actual) => current = actual,
        }
    }
}

fn atomic_max(cell: &AtomicU64, value: u64) {
    let mut current = cell.load(Ordering::Relaxed);
    while value > current {
        match cell.compare_exchange_weak(current, value, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(actual) => current = actual,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct EventSystemStats {
    pub deferred_used: usize,
    pub deferred_capacity: usize,
    pub pending_deferred: usize,
    pub active_subscriptions: usize,
    pub immediate_dispatched: u64,
    pub deferred_dispatched: u64,
    pub async_dispatched: u64,
    pub events_dropped: u64,
    pub min_processing_time_ns: Option<u64>,
    pub max_processing_time_ns: Option<u64>,
    pub total_processing_time_ns: u64,
    pub processed_count: u64,
}

/// Result of a budgeted [`EventSystem::process_deferred_events`] call.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeferredEventStats {
    pub executed: usize,
    pub time_spent_ms: f64,
    pub budget_exceeded: bool,
}

pub struct EventSystem<const MAX_EVENTS: usize = 4096> {
    registry: SubscriptionRegistry,
    deferred_events: FixedStorage<Box<dyn Event>, MAX_EVENTS>,
    deferred_queue: SegQueue<Handle<Box<dyn Event>>>,
    scheduler: Option<Arc<DefaultJobScheduler>>,
    config: EventSystemConfig,
    counters: Arc<EventSystemCounters>,
}

fn map_priority(hint: JobPriorityHint) -> JobPriority {
    match hint {
        JobPriorityHint::Low => JobPriority::Low,
        JobPriorityHint::Normal => JobPriority::Normal,
        JobPriorityHint::High => JobPriority::High,
        JobPriorityHint::Critical => JobPriority::Critical,
    }
}

impl<const MAX_EVENTS: usize> EventSystem<MAX_EVENTS> {
    pub fn new(scheduler: Option<Arc<DefaultJobScheduler>>, config: EventSystemConfig) -> Self {
        Self {
            registry: Arc::new(RwLock::new(FnvHashMap::default())),
            deferred_events: FixedStorage::new(),
            deferred_queue: SegQueue::new(),
            scheduler,
            config,
            counters: EventSystemCounters::new(),
        }
    }

    pub fn config(&self) -> &EventSystemConfig {
        &self.config
    }

    pub fn subscribe<T: EventPayload>(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let type_id = EventTypeId::of::<T>();
        let wrapped: Box<dyn Fn(&dyn Event) + Send + Sync> = Box::new(move |event: &dyn Event| {
            if let Some(payload) = event.as_any().downcast_ref::<T>() {
                callback(payload);
            }
        });
        let id = {
            let mut guard = self.registry.write();
            guard.entry(type_id).or_default().insert(Subscriber { callback: wrapped })
        };
        Subscription {
            registry: self.registry.clone(),
            type_id,
            id,
        }
    }

    pub fn emit<T: EventPayload>(&self, payload: T) {
        self.emit_inner(payload, None);
    }

    /// Like [`Self::emit`], but stamps the event's metadata with the given
    /// call-site so later inspection (logging, debugging tools) can say where
    /// an event came from.
    pub fn emit_with_source<T: EventPayload>(&self, file: &'static str, line: u32, payload: T) {
        self.emit_inner(payload, Some(SourceLocation { file, line }));
    }

    fn emit_inner<T: EventPayload>(&self, payload: T, source: Option<SourceLocation>) {
        let metadata = EventMetadata::new(crate::event::next_event_id(), source);
        match T::EXECUTION_MODE {
            ExecutionMode::Immediate => {
                let envelope = EventEnvelope { payload, metadata };
                self.dispatch(&envelope);
            }
            ExecutionMode::Deferred => self.emit_deferred(payload, metadata),
            ExecutionMode::Async => self.emit_async(payload, metadata),
        }
    }

    fn emit_deferred<T: EventPayload>(&self, payload: T, metadata: EventMetadata) {
        let boxed: Box<dyn Event> = Box::new(EventEnvelope { payload, metadata });
        let handle = self.deferred_events.allocate(boxed);
        if handle.is_valid() {
            self.deferred_queue.push(handle);
        } else {
            self.counters.record_dropped();
            crate::log_warn!("event system: deferred event storage full, event dropped");
        }
    }

    fn emit_async<T: EventPayload>(&self, payload: T, metadata: EventMetadata) {
        let Some(scheduler) = &self.scheduler else {
            let envelope = EventEnvelope { payload, metadata };
            self.dispatch(&envelope);
            return;
        };
        let registry = self.registry.clone();
        let counters = self.counters.clone();
        let envelope = EventEnvelope { payload, metadata };
        let affinity = if T::REQUIRES_MAIN_THREAD {
            JobAffinity::MainThreadOnly
        } else {
            JobAffinity::AnyWorker
        };
        let priority = map_priority(T::PRIORITY);
        scheduler.submit_job(T::name(), priority, affinity, move || {
            let guard = registry.read();
            if let Some(subs) = guard.get(&envelope.type_id()) {
                for entry in subs.entries.iter().flatten() {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| (entry.callback)(&envelope)));
                    if outcome.is_err() {
                        crate::log_error!("event system: subscriber for '{}' panicked", envelope.event_name());
                    }
                }
            }
            envelope.metadata.mark_processed();
            counters.record_dispatch(&envelope);
            JobResult::success()
        });
    }

    /// Dispatch `event` to every live subscriber for its type, isolating each
    /// subscriber from the others: a panicking handler is logged and skipped,
    /// it does not abort the rest of the emission.
    fn dispatch(&self, event: &dyn Event) {
        let guard = self.registry.read();
        if let Some(subs) = guard.get(&event.type_id()) {
            for entry in subs.entries.iter().flatten() {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| (entry.callback)(event)));
                if outcome.is_err() {
                    crate::log_error!("event system: subscriber for '{}' panicked", event.event_name());
                }
            }
        }
        drop(guard);
        event.metadata().mark_processed();
        self.counters.record_dispatch(event);
    }

    /// Drain deferred events until the queue empties or `budget_ms` elapses,
    /// whichever comes first. An event popped once the budget has already run
    /// out is pushed back onto the queue rather than processed, so it is
    /// retried on the next call instead of silently skipped.
    pub fn process_deferred_events(&self, budget_ms: f64) -> DeferredEventStats {
        let start = Instant::now();
        let mut stats = DeferredEventStats::default();
        loop {
            if elapsed_ms(start) >= budget_ms {
                stats.budget_exceeded = !self.deferred_queue.is_empty();
                break;
            }
            let Some(handle) = self.deferred_queue.pop() else { break };
            if elapsed_ms(start) >= budget_ms {
                self.deferred_queue.push(handle);
                stats.budget_exceeded = true;
                break;
            }
            if let Some(event) = self.deferred_events.get(handle) {
                self.dispatch(event.as_ref());
            }
            self.deferred_events.release(handle);
            stats.executed += 1;
        }
        stats.time_spent_ms = elapsed_ms(start);
        if stats.budget_exceeded {
            crate::log_warn!(
                "event system: process_deferred_events exceeded its {budget_ms}ms budget ({} events still queued)",
                self.deferred_queue.len()
            );
        }
        stats
    }

    /// Sample the deferred queue's depth and warn if it has crossed the
    /// configured threshold. Does not drain anything itself — call
    /// [`Self::process_deferred_events`] separately to actually process the
    /// backlog this samples.
    pub fn begin_frame(&self) {
        let depth = self.deferred_queue.len();
        if depth >= self.config.deferred_queue_warn_threshold {
            crate::log_warn!(
                "event system: deferred queue depth {depth} at or above warn threshold {}",
                self.config.deferred_queue_warn_threshold
            );
        }
    }

    pub fn has_pending_deferred_events(&self) -> bool {
        !self.deferred_queue.is_empty()
    }

    pub fn active_subscription_count(&self) -> usize {
        self.registry.read().values().map(Subscribers::count).sum()
    }

    pub fn stats(&self) -> EventSystemStats {
        let min = self.counters.min_processing_ns.load(Ordering::Relaxed);
        let max = self.counters.max_processing_ns.load(Ordering::Relaxed);
        EventSystemStats {
            deferred_used: self.deferred_events.used(),
            deferred_capacity: self.deferred_events.capacity(),
            pending_deferred: self.deferred_queue.len(),
            active_subscriptions: self.active_subscription_count(),
            immediate_dispatched: self.counters.immediate.load(Ordering::Relaxed),
            deferred_dispatched: self.counters.deferred.load(Ordering::Relaxed),
            async_dispatched: self.counters.async_dispatched.load(Ordering::Relaxed),
            events_dropped: self.counters.events_dropped.load(Ordering::Relaxed),
            min_processing_time_ns: if min == u64::MAX { None } else { Some(min) },
            max_processing_time_ns: if max == 0 { None } else { Some(max) },
            total_processing_time_ns: self.counters.total_processing_ns.load(Ordering::Relaxed),
            processed_count: self.counters.processed_count.load(Ordering::Relaxed),
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventTraits;
    use std::sync::atomic::{AtomicU32, Ordering as StdOrdering};
    use std::time::Duration;

    struct Tick;
    impl EventTraits for Tick {}

    struct Deferred;
    impl EventTraits for Deferred {
        const EXECUTION_MODE: ExecutionMode = ExecutionMode::Deferred;
    }

    #[test]
    fn immediate_event_dispatches_before_emit_returns() {
        let system = EventSystem::<32>::new(None, EventSystemConfig::default());
        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = seen.clone();
        let _subscription = system.subscribe::<Tick>(move |_| {
            seen_clone.fetch_add(1, StdOrdering::SeqCst);
        });
        system.emit(Tick);
        assert_eq!(seen.load(StdOrdering::SeqCst), 1);
        assert_eq!(system.stats().immediate_dispatched, 1);
    }

    #[test]
    fn dropping_subscription_stops_delivery() {
        let system = EventSystem::<32>::new(None, EventSystemConfig::default());
        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = seen.clone();
        let subscription = system.subscribe::<Tick>(move |_| {
            seen_clone.fetch_add(1, StdOrdering::SeqCst);
        });
        drop(subscription);
        system.emit(Tick);
        assert_eq!(seen.load(StdOrdering::SeqCst), 0);
    }

    #[test]
    fn a_panicking_subscriber_does_not_block_the_others() {
        let system = EventSystem::<32>::new(None, EventSystemConfig::default());
        let seen = Arc::new(AtomicU32::new(0));
        let _panicky = system.subscribe::<Tick>(|_| panic!("boom"));
        let seen_clone = seen.clone();
        let _survivor = system.subscribe::<Tick>(move |_| {
            seen_clone.fetch_add(1, StdOrdering::SeqCst);
        });
        system.emit(Tick);
        assert_eq!(seen.load(StdOrdering::SeqCst), 1, "a panicking subscriber must not stop the rest");
    }

    #[test]
    fn deferred_event_waits_for_explicit_drain() {
        let system = EventSystem::<32>::new(None, EventSystemConfig::default());
        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = seen.clone();
        let _subscription = system.subscribe::<Deferred>(move |_| {
            seen_clone.fetch_add(1, StdOrdering::SeqCst);
        });
        system.emit(Deferred);
        assert_eq!(seen.load(StdOrdering::SeqCst), 0);
        assert!(system.has_pending_deferred_events());

        let stats = system.process_deferred_events(1_000.0);
        assert_eq!(stats.executed, 1);
        assert!(!stats.budget_exceeded);
        assert_eq!(seen.load(StdOrdering::SeqCst), 1);
        assert!(!system.has_pending_deferred_events());
    }

    #[test]
    fn deferred_drain_respects_the_wall_clock_budget() {
        let system = EventSystem::<32>::new(None, EventSystemConfig::default());
        let _subscription = system.subscribe::<Deferred>(|_| {
            std::thread::sleep(Duration::from_millis(1));
        });
        for _ in 0..10 {
            system.emit(Deferred);
        }
        let stats = system.process_deferred_events(3.0);
        assert!(stats.executed < 10, "a 3ms budget must not drain ten 1ms handlers");
        assert!(stats.budget_exceeded);
        assert!(system.has_pending_deferred_events());

        // The remainder must still be there to drain on a later call.
        let remaining = system.stats().pending_deferred;
        assert_eq!(remaining, 10 - stats.executed);
    }

    #[test]
    fn begin_frame_only_samples_and_never_drains() {
        let system = EventSystem::<32>::new(None, EventSystemConfig::default());
        system.emit(Deferred);
        system.begin_frame();
        assert!(system.has_pending_deferred_events(), "begin_frame must not drain the queue itself");
    }

    #[test]
    fn dropped_deferred_events_are_counted() {
        let system = EventSystem::<1>::new(None, EventSystemConfig::default());
        system.emit(Deferred);
        system.emit(Deferred);
        assert_eq!(system.stats().events_dropped, 1);
    }
}
