//! L0: thread spawn/naming/yield abstraction the rest of the core builds on.

use fnv::FnvHashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

static THREAD_NAME_MAP: Lazy<RwLock<FnvHashMap<ThreadId, Arc<String>>>> =
    Lazy::new(RwLock::default);

pub fn set_thread_name(id: ThreadId, name: String) {
    THREAD_NAME_MAP.write().insert(id, Arc::new(name));
}

pub fn thread_name(id: ThreadId) -> Option<Arc<String>> {
    THREAD_NAME_MAP.read().get(&id).cloned()
}

pub fn current_thread_id() -> ThreadId {
    thread::current().id()
}

/// Cooperative yield used by workers instead of blocking on a condvar.
pub fn yield_now() {
    thread::yield_now();
}

/// Spawn an OS thread, registering its name in the lookup table used by the logger
/// and by diagnostics before handing control to `f`.
pub fn spawn_named<F>(name: impl Into<String>, f: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    let name = name.into();
    thread::Builder::new().name(name.clone()).spawn(move || {
        set_thread_name(current_thread_id(), name);
        f();
    })
}
