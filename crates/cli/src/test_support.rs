//! Process-environment helpers shared by config tests.

use std::sync::{Mutex, MutexGuard, OnceLock};

fn env_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Serializes environment mutation across parallel tests.
pub(crate) fn with_locked_env<R>(run: impl FnOnce() -> R) -> R {
    let _guard = env_lock();
    run()
}

pub(crate) fn set_env_var(key: &str, value: &str) {
    // SAFETY: callers hold the `with_locked_env` lock, so no other test thread
    // reads or writes the environment concurrently.
    unsafe {
        std::env::set_var(key, value);
    }
}

pub(crate) fn remove_env_var(key: &str) {
    // SAFETY: see `set_env_var`.
    unsafe {
        std::env::remove_var(key);
    }
}
