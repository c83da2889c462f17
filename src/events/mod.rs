//! # Events Module
//!
//! Event-driven progress reporting for the curation pipeline.
//!
//! ## Design
//! The engine emits typed events through channels, allowing any UI
//! (CLI, the capture tool's text view, tests) to subscribe. Every event also
//! renders as a one-line status message through `Display`.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//! let printer = std::thread::spawn(move || {
//!     for line in receiver.lines() {
//!         eprintln!("{line}");
//!     }
//! });
//!
//! pipeline.run_with_events(&token, &sender)?;
//! drop(sender);
//! printer.join().ok();
//! ```

mod channel;
mod throttle;
mod types;

pub use channel::{EventChannel, EventReceiver, EventSender, null_sender};
pub use throttle::{IntervalThrottle, PercentThrottle, percent};
pub use types::*;
