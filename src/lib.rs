//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Breakeron - Lock-free Circuit Breaker
//!
//! Guards calls to an unreliable downstream resource. The breaker tallies
//! caller-reported outcomes per statistical window, trips once failures cross a
//! threshold, rejects calls for a sleep window, then probes the resource again.
//!
//! # API Layers
//!
//! ## Prelude (Quick Start)
//!
//! Use `use breakeron::prelude::*;` to import all commonly used types.
//!
//! ## Core API
//!
//! - [`CircuitBreaker`] - The breaker: report outcomes, read the state, shut down
//! - [`BreakerConfig`] - Open/close thresholds, sleep window, transition callback
//! - [`BreakerState`] - Closed / Open / HalfOpen
//! - [`BreakerError`] - Error types
//!
//! # Examples
//!
//! ```rust
//! use breakeron::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     // 请求量达到100且错误率达到50%时熔断
//!     let config = BreakerConfig::new()
//!         .request_volume_threshold(100)
//!         .error_threshold_percent(50)
//!         .sleep_window(Duration::from_secs(15));
//!     let breaker = CircuitBreaker::new(config).unwrap();
//!
//!     // 检查请求是否被允许
//!     assert!(breaker.report_request(1).is_ok());
//!     breaker.report_success(1).unwrap();
//!     assert_eq!(breaker.current_status(), BreakerState::Closed);
//! }
//! ```
//!
//! # Features
//!
//! - **Double-gated tripping**: error percentage *and* request volume floor
//! - **Automatic probing**: Open moves to HalfOpen when the sleep window elapses
//! - **Two recovery paths**: enough successful probes, or a full recovery interval without errors
//! - **Lock-free reporting**: atomics only on the report path
//! - **Config files**: YAML / TOML / JSON with human-readable durations (requires `config-file` feature)

pub mod prelude;

pub mod breaker;
pub mod config;
pub mod constants;
pub mod error;

mod counter;
mod state;
mod timer;

// 重新导出常用类型
pub use breaker::CircuitBreaker;
pub use config::{BreakerConfig, CloseConfig, OpenConfig, Thresholds, TransitionCallback};
pub use error::{BreakerError, BreakerState, BreakerStats, Transition};
