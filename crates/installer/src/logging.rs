//! Tracing subscriber setup for hosts embedding the installer

use tracing::Level;

/// Install a formatted tracing subscriber at the given level
///
/// Returns `false` when a global subscriber was already installed, which is
/// the normal case for UI hosts that configure their own logging.
pub fn init_tracing(level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .is_ok()
}
