pub mod game;

// ============================================================================
// Profiling Macros
// ============================================================================

/// Logs every 100th tick when the `perf_stats` feature is enabled.
///
/// ```ignore
/// profile_log!(tick, "[PERF] units: {}", units.iter().len());
/// ```
///
/// Without the feature this expands to nothing and the arguments are never
/// evaluated.
#[macro_export]
#[cfg(feature = "perf_stats")]
macro_rules! profile_log {
    ($tick:expr, $($arg:tt)*) => {
        if $tick.0 % 100 == 0 {
            bevy::prelude::info!($($arg)*);
        }
    };
}

#[macro_export]
#[cfg(not(feature = "perf_stats"))]
macro_rules! profile_log {
    ($tick:expr, $($arg:tt)*) => {};
}
