//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Centralized configuration constants for breakeron.
//!
//! All defaults and bounds used by [`BreakerConfig`](crate::config::BreakerConfig)
//! are defined here with their purpose and usage context.

// ============================================================================
// Open Config Constants
// ============================================================================

/// Default statistical window length (3 minutes).
///
/// While the breaker is closed, request and error counters are reset every
/// refresh interval.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 180;

/// Default error threshold percentage.
///
/// The breaker opens once at least this share of the window's requests failed
/// and the request volume floor is reached.
pub const DEFAULT_ERROR_THRESHOLD_PERCENT: u8 = 20;

/// Default request volume floor.
///
/// The breaker never opens in a window with fewer requests than this.
pub const DEFAULT_REQUEST_VOLUME_THRESHOLD: u64 = 1000;

// ============================================================================
// Close Config Constants
// ============================================================================

/// Default recovery interval (1 minute).
///
/// A half-open breaker closes once this interval elapses without any error.
pub const DEFAULT_RECOVERY_INTERVAL_SECS: u64 = 60;

/// Default success threshold percentage.
///
/// 100 means every probe in the success volume must have succeeded.
pub const DEFAULT_SUCCESS_THRESHOLD_PERCENT: u8 = 100;

/// Default probe volume floor in half-open state.
pub const DEFAULT_SUCCESS_VOLUME_THRESHOLD: u64 = 100;

// ============================================================================
// Sleep Window
// ============================================================================

/// Default sleep window (3 minutes).
///
/// How long the breaker stays open before probing the downstream again.
pub const DEFAULT_SLEEP_WINDOW_SECS: u64 = 180;

// ============================================================================
// Bounds
// ============================================================================

/// Lower clamp bound for error and success threshold percentages.
pub const MIN_THRESHOLD_PERCENT: u8 = 5;

/// Upper clamp bound for error and success threshold percentages.
pub const MAX_THRESHOLD_PERCENT: u8 = 100;
