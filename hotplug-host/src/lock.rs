//! Global load lock
//!
//! Every critical section that reads-then-mutates the code registry
//! (snapshot + load + diff, enumerate + evict) runs under this lock, across
//! all plugins and threads. It is reentrant: loading one plugin may load
//! another on the same thread.

use parking_lot::{const_reentrant_mutex, ReentrantMutex, ReentrantMutexGuard};

static GLOBAL_LOAD_LOCK: ReentrantMutex<()> = const_reentrant_mutex(());

/// Acquire the process-wide load lock, blocking until it is available
pub fn global_load_lock() -> ReentrantMutexGuard<'static, ()> {
    GLOBAL_LOAD_LOCK.lock()
}

/// Whether the calling thread currently holds the load lock
pub fn is_held_by_current_thread() -> bool {
    GLOBAL_LOAD_LOCK.is_owned_by_current_thread()
}
