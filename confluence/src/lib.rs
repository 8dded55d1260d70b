//! # Confluence
//!
//! **Confluence** runs a callback-driven "foreign" event context (sources,
//! dispatch priorities, per-source descriptor polling and a single shared
//! timeout) inside a single-threaded host reactor, without ever blocking on
//! the foreign context's own wait primitive.
//!
//! On every turn of the host loop the [`Bridge`]:
//!
//! - asks the foreign context what it is waiting on,
//! - turns that wait set into host watches and a deadline,
//! - lets the host wait,
//! - reports which descriptors became ready so the foreign callbacks run.
//!
//! The crate ships its own host, a small `epoll` [`Reactor`], but the bridge
//! only depends on the [`Host`](host::Host) trait.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use confluence::{Bridge, Reactor};
//!
//! let mut reactor = Reactor::new()?;
//! let mut bridge = Bridge::new(my_context);
//!
//! bridge.initialize(&mut reactor)?;
//! reactor.run()?;
//! bridge.teardown(&mut reactor);
//! ```
//!
//! ## Modules
//!
//! - [`bridge`] — The reconciliation bridge
//! - [`context`] — The foreign context contract
//! - [`host`] — The host reactor contract
//! - [`reactor`] — The bundled `epoll` reactor

mod utils;

pub mod bridge;
pub mod context;
pub mod error;
pub mod host;
pub mod reactor;

pub use bridge::{Bridge, BridgeBuilder};
pub use error::{Error, Result};
pub use reactor::{Reactor, ReactorBuilder};
