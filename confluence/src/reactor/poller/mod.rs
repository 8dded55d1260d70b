//! Platform-specific I/O poller.
//!
//! The poller is used by the reactor to:
//! - register, update and remove descriptor interests,
//! - block until readiness or a timeout,
//! - translate OS readiness flags into [`Event`](super::event::Event)s.
//!
//! The concrete implementation is selected at compile time
//! depending on the target operating system. Only Linux `epoll` is
//! provided.

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;

#[cfg(not(target_os = "linux"))]
compile_error!("confluence currently ships an epoll backend only");
