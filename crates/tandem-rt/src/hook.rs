// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Process-wide hook for errors nobody is waiting on.
//!
//! Loop tasks started from native callbacks have no caller to return an
//! error to. Their failures come here. Without a hook they are logged.

use std::sync::Arc;

use parking_lot::{const_rwlock, RwLock};

use crate::error::TaskError;

pub type UnhandledErrorHook = Arc<dyn Fn(&TaskError) + Send + Sync>;

static HOOK: RwLock<Option<UnhandledErrorHook>> = const_rwlock(None);

/// Install `hook`, returning the previous one.
pub fn set_unhandled_error_hook(
    hook: impl Fn(&TaskError) + Send + Sync + 'static,
) -> Option<UnhandledErrorHook> {
    HOOK.write().replace(Arc::new(hook))
}

/// Back to logging. Returns the removed hook.
pub fn clear_unhandled_error_hook() -> Option<UnhandledErrorHook> {
    HOOK.write().take()
}

/// Restore a hook returned by one of the setters.
pub fn restore_unhandled_error_hook(hook: Option<UnhandledErrorHook>) {
    *HOOK.write() = hook;
}

pub fn report_unhandled(error: &TaskError) {
    let hook = HOOK.read().clone();
    match hook {
        Some(h) => h(error),
        None => tracing::error!(error = %error, panicked = error.is_panic(), "unhandled error in loop task"),
    }
}

/// Serializes tests that install a hook.
#[cfg(test)]
pub(crate) static HOOK_TEST_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());
