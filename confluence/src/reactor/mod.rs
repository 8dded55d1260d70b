//! The bundled host reactor.
//!
//! This module implements a single-threaded, libuv-shaped event loop over
//! `epoll`. One turn of the loop:
//! 1. runs the pre-wait hooks,
//! 2. re-registers every started watch, so a descriptor number that now
//!    names a different file is polled again,
//! 3. blocks until readiness or the earliest timer deadline,
//! 4. runs the handlers of ready watches,
//! 5. fires expired timers,
//! 6. runs the post-wait hooks.
//!
//! It implements [`Host`](crate::host::Host), which is all the
//! [`Bridge`](crate::Bridge) needs from it.

mod builder;
mod core;
mod event;
mod poller;
mod timer;

pub use builder::ReactorBuilder;
pub use self::core::{Reactor, RunMode, StopHandle};
