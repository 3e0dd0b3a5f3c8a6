//! Default value functions for configuration.

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Transport Defaults
// =============================================================================

pub fn default_reconnect_backoff_secs() -> u64 {
    5
}

pub fn default_idle_threshold_secs() -> u64 {
    120
}

pub fn default_watchdog_poll_secs() -> u64 {
    10
}

// =============================================================================
// Queue Defaults
// =============================================================================

pub fn default_queue_poll_ms() -> u64 {
    25
}
