//! Rate limiter adapters.
//!
//! ## Available Adapters
//!
//! - `InMemoryRateLimiter` - Fixed-window arena with a scheduled sweeper
//!
//! ## Usage
//!
//! ```ignore
//! let limiter = Arc::new(InMemoryRateLimiter::new(30, Duration::from_secs(10)));
//! let sweeper = limiter.clone().spawn_sweeper(Duration::from_secs(60), shutdown_rx);
//! ```

mod in_memory;

pub use in_memory::InMemoryRateLimiter;
