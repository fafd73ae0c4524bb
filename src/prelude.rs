//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Prelude module - Commonly used types for quick imports
//!
//! This module re-exports the most commonly used types from breakeron,
//! allowing users to import them with a single `use breakeron::prelude::*;`
//! statement instead of importing each type individually.

pub use crate::breaker::CircuitBreaker;
pub use crate::config::BreakerConfig;
pub use crate::error::{BreakerError, BreakerState, Transition};
