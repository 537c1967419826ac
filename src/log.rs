use std::sync::atomic::{AtomicBool, Ordering};

/// Log target used by all library messages.
pub const TARGET: &str = "livedis";

static ENABLED: AtomicBool = AtomicBool::new(true);

#[inline(always)]
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::SeqCst)
}

/// Mute library logging (used by front-ends that own the terminal).
pub fn disable() {
    ENABLED.store(false, Ordering::SeqCst)
}

pub fn enable() {
    ENABLED.store(true, Ordering::SeqCst)
}

#[macro_export]
macro_rules! ld_info {
    ($($arg:tt)+) => {
        if $crate::log::is_enabled() {
            log::info!(target: $crate::log::TARGET, $($arg)+)
        }
    };
}

#[macro_export]
macro_rules! ld_warn {
    ($($arg:tt)+) => {
        if $crate::log::is_enabled() {
            log::warn!(target: $crate::log::TARGET, $($arg)+)
        }
    };
}

#[macro_export]
macro_rules! ld_error {
    ($($arg:tt)+) => {
        if $crate::log::is_enabled() {
            log::error!(target: $crate::log::TARGET, $($arg)+)
        }
    };
}

#[macro_export]
macro_rules! ld_debug {
    ($($arg:tt)+) => {
        if $crate::log::is_enabled() {
            log::debug!(target: $crate::log::TARGET, $($arg)+)
        }
    };
}
