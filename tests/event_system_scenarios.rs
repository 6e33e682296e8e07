use enginecore::{EventSystem, EventSystemConfig, EventTraits, ExecutionMode};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

struct FrameTick;
impl EventTraits for FrameTick {}

struct AssetLoaded {
    #[allow(dead_code)]
    path: &'static str,
}
impl EventTraits for AssetLoaded {
    const EXECUTION_MODE: ExecutionMode = ExecutionMode::Deferred;
}

#[test]
fn deferred_events_drain_within_a_wall_clock_budget() {
    let system = EventSystem::<64>::new(None, EventSystemConfig::default());
    let seen = Arc::new(AtomicU32::new(0));
    let seen_clone = seen.clone();
    let _subscription = system.subscribe::<AssetLoaded>(move |_| {
        seen_clone.fetch_add(1, Ordering::SeqCst);
    });

    for path in ["a.bin", "b.bin", "c.bin", "d.bin", "e.bin", "f.bin", "g.bin"] {
        system.emit(AssetLoaded { path });
    }
    assert!(system.has_pending_deferred_events());
    assert_eq!(seen.load(Ordering::SeqCst), 0);

    let stats = system.process_deferred_events(1_000.0);
    assert_eq!(stats.executed, 7);
    assert!(!stats.budget_exceeded);
    assert_eq!(seen.load(Ordering::SeqCst), 7);
    assert!(!system.has_pending_deferred_events());
}

#[test]
fn subscription_scope_bounds_delivery_to_its_own_lifetime() {
    let system = EventSystem::<64>::new(None, EventSystemConfig::default());
    let seen = Arc::new(AtomicU32::new(0));

    {
        let seen_clone = seen.clone();
        let _subscription = system.subscribe::<FrameTick>(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });
        system.emit(FrameTick);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(system.active_subscription_count(), 1);
    }

    assert_eq!(system.active_subscription_count(), 0);
    system.emit(FrameTick);
    assert_eq!(
        seen.load(Ordering::SeqCst),
        1,
        "a dropped subscription must not receive events emitted after its scope ends"
    );
}

#[test]
fn begin_frame_warns_but_never_drains_the_backlog_itself() {
    let system = EventSystem::<64>::new(
        None,
        EventSystemConfig {
            deferred_queue_warn_threshold: 2,
        },
    );
    for path in ["a.bin", "b.bin", "c.bin"] {
        system.emit(AssetLoaded { path });
    }
    system.begin_frame();
    assert!(
        system.has_pending_deferred_events(),
        "begin_frame only samples queue depth, process_deferred_events does the draining"
    );
    assert_eq!(system.stats().pending_deferred, 3);
}
