//! Log macros for the background side of the service.
//!
//! Each macro expands to a check of `ENABLE_LOGS` in the calling module, so
//! the enrichment worker and the retention sweeper can be muted one at a time
//! while the `RUST_LOG` filter stays global.
//!
//! ```rust,ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_info, log_warn};
//!
//! log_info!("sweep removed {} records", removed);
//! ```

/// Shared expansion behind the level macros below.
#[doc(hidden)]
#[macro_export]
macro_rules! log_gated {
    ($level:expr, $($arg:tt)*) => {
        if ENABLE_LOGS {
            log::log!($level, $($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::log_gated!(log::Level::Info, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::log_gated!(log::Level::Warn, $($arg)*)
    };
}

/// Muting a module hides its errors too; enrichment failures still land in
/// the record's `error` column.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::log_gated!(log::Level::Error, $($arg)*)
    };
}

/// Per-step traces, visible once `GLUCOCAST_DEBUG` lowers the level.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::log_gated!(log::Level::Debug, $($arg)*)
    };
}
