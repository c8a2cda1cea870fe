//! Per-module switchable logging macros.
//!
//! Each module that wants these defines its own flag and pulls the macros in
//! from the crate root:
//!
//! ```text
//! const ENABLE_LOGS: bool = true;
//! use crate::{log_info, log_warn};
//!
//! log_info!("only emitted while ENABLE_LOGS is true");
//! ```
//!
//! The flag is a const, so a module set to `false` compiles its log calls
//! away entirely. Handy for silencing the chattier host-interop modules
//! without touching the global filter.

/// Info-level logging gated on the calling module's `ENABLE_LOGS` const.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Warn-level logging gated on the calling module's `ENABLE_LOGS` const.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Error-level logging gated on the calling module's `ENABLE_LOGS` const.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
