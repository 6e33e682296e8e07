//! Event data model: the [`Event`] trait objects flow through, [`EventMetadata`]
//! carried by every event regardless of payload type, and [`EventTraits`] for the
//! compile-time dispatch configuration a concrete event type opts into (mirrors
//! the attribute-driven trait defaults a reflected C++ event class would declare,
//! expressed here as associated consts with defaults instead of a derive macro).

use crate::sync_cell::SyncUnsafeCell;
use fnv::FnvHasher;
use std::any::Any;
use std::hash::Hasher;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

pub type EventCategory = u32;
pub const CATEGORY_NONE: EventCategory = 0;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Run subscriber callbacks synchronously, on the emitting thread.
    Immediate,
    /// Queue the event; subscriber callbacks run during a later budgeted drain.
    Deferred,
    /// Queue the event as a scheduler job so subscriber callbacks run on a
    /// worker thread.
    Async,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventTypeId(u32);

/// Reserved so a hash collision with it can be remapped without special-casing
/// `0` everywhere a `EventTypeId` is compared.
const RESERVED_ZERO: u32 = 0;

impl EventTypeId {
    pub fn of<T: 'static>() -> Self {
        let mut hasher = FnvHasher::default();
        hasher.write(std::any::type_name::<T>().as_bytes());
        let hash = hasher.finish();
        let folded = (hash as u32) ^ ((hash >> 32) as u32);
        let value = if folded == RESERVED_ZERO { 1 } else { folded };
        Self(value)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Per-event-type dispatch configuration. A concrete event implements this with
/// the defaults it needs to override; most events only override `PRIORITY` or
/// nothing at all.
pub trait EventTraits: 'static {
    const EXECUTION_MODE: ExecutionMode = ExecutionMode::Immediate;
    const PRIORITY: JobPriorityHint = JobPriorityHint::Normal;
    const REQUIRES_MAIN_THREAD: bool = false;
    const CATEGORY: EventCategory = CATEGORY_NONE;
}

/// A priority hint independent of [`crate::job::JobPriority`] so this module
/// doesn't have to depend on the scheduler crate surface just to name a
/// priority; [`crate::event_system::EventSystem`] maps it onto a real
/// `JobPriority` when it dispatches an `Async` event as a job.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JobPriorityHint {
    Low,
    Normal,
    High,
    Critical,
}

/// Where an event was emitted from, when the caller used
/// [`crate::event_system::EventSystem::emit_with_source`].
#[derive(Copy, Clone, Debug)]
pub struct SourceLocation {
    pub file: &'static str,
    pub line: u32,
}

/// Per-emission bookkeeping carried by every event: when and from what thread it
/// was emitted, an optional call-site, and the timing of when (if ever) dispatch
/// finished processing it. `processed_at`/`processed` use interior mutability
/// (set once, by [`EventMetadata::mark_processed`]) since an event sits behind a
/// shared `&dyn Event` for the entire time a subscriber callback runs.
pub struct EventMetadata {
    pub id: u64,
    pub emitted_at: Instant,
    pub emitter_thread: ThreadId,
    pub source: Option<SourceLocation>,
    processed: AtomicBool,
    processed_at: SyncUnsafeCell<Option<Instant>>,
}

impl EventMetadata {
    pub(crate) fn new(id: u64, source: Option<SourceLocation>) -> Self {
        Self {
            id,
            emitted_at: Instant::now(),
            emitter_thread: crate::thread::current_thread_id(),
            source,
            processed: AtomicBool::new(false),
            processed_at: SyncUnsafeCell::new(None),
        }
    }

    pub fn is_processed(&self) -> bool {
        self.processed.load(Ordering::Acquire)
    }

    pub fn processed_at(&self) -> Option<Instant> {
        unsafe { *self.processed_at.get() }
    }

    /// Wall-clock span from emission to the end of dispatch, once processed.
    pub fn processing_time(&self) -> Option<Duration> {
        self.processed_at()
            .map(|processed_at| processed_at.saturating_duration_since(self.emitted_at))
    }

    /// Stamp this event as processed. Called exactly once, at the end of
    /// dispatch, by [`crate::event_system::EventSystem`].
    pub(crate) fn mark_processed(&self) {
        unsafe {
            *self.processed_at.get() = Some(Instant::now());
        }
        self.processed.store(true, Ordering::Release);
    }
}

pub trait Event: Any + Send + Sync {
    fn type_id(&self) -> EventTypeId;
    fn event_name(&self) -> &'static str;
    fn execution_mode(&self) -> ExecutionMode;
    fn category(&self) -> EventCategory;
    fn metadata(&self) -> &EventMetadata;

    fn as_any(&self) -> &dyn Any;
}

/// Blanket impl so any `T: EventTraits + 'static` that is also `Send + Sync`
/// gets `Event` for free, the way the reference design derives its event base
/// class boilerplate from a single macro invocation.
pub trait EventPayload: EventTraits + Send + Sync + Sized + 'static {
    fn name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<T: EventTraits + Send + Sync + Sized + 'static> EventPayload for T {}

pub struct EventEnvelope<T: EventPayload> {
    pub payload: T,
    pub metadata: EventMetadata,
}

impl<T: EventPayload> Event for EventEnvelope<T> {
    fn type_id(&self) -> EventTypeId {
        EventTypeId::of::<T>()
    }

    fn event_name(&self) -> &'static str {
        T::name()
    }

    fn execution_mode(&self) -> ExecutionMode {
        T::EXECUTION_MODE
    }

    fn category(&self) -> EventCategory {
        T::CATEGORY
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn as_any(&self) -> &dyn Any {
        &self.payload
    }
}

/// Process-wide monotonic source of [`EventMetadata::id`] values, shared across
/// every [`crate::event_system::EventSystem`] instance in the process.
static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_event_id() -> u64 {
    NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Hit;
    impl EventTraits for Hit {
        const EXECUTION_MODE: ExecutionMode = ExecutionMode::Deferred;
    }

    struct Miss;
    impl EventTraits for Miss {}

    #[test]
    fn distinct_types_get_distinct_ids() {
        assert_ne!(EventTypeId::of::<Hit>(), EventTypeId::of::<Miss>());
    }

    #[test]
    fn same_type_id_is_stable() {
        assert_eq!(EventTypeId::of::<Hit>(), EventTypeId::of::<Hit>());
    }

    #[test]
    fn envelope_downcasts_to_payload() {
        let envelope = EventEnvelope {
            payload: Hit,
            metadata: EventMetadata::new(next_event_id(), None),
        };
        let event: &dyn Event = &envelope;
        assert!(event.as_any().downcast_ref::<Hit>().is_some());
    }

    #[test]
    fn metadata_reports_processed_only_after_marked() {
        let metadata = EventMetadata::new(next_event_id(), None);
        assert!(!metadata.is_processed());
        assert!(metadata.processing_time().is_none());
        metadata.mark_processed();
        assert!(metadata.is_processed());
        assert!(metadata.processing_time().is_some());
    }

    #[test]
    fn source_location_is_recorded_when_provided() {
        let metadata = EventMetadata::new(next_event_id(), Some(SourceLocation { file: "foo.rs", line: 42 }));
        let source = metadata.source.expect("source must be present");
        assert_eq!(source.file, "foo.rs");
        assert_eq!(source.line, 42);
    }
}
