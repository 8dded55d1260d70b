//! The foreign event context contract.
//!
//! A foreign context is any callback-driven event system that owns its own
//! sources, priorities and timeouts, but agrees to be driven in four steps
//! per turn: prepare, query, check, dispatch. The [`Bridge`](crate::Bridge)
//! treats it as a black box behind [`ForeignContext`].

use crate::error::AttachError;

use bitflags::bitflags;

use std::os::fd::RawFd;
use std::time::Duration;

bitflags! {
    /// Readiness vocabulary of the foreign context.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct IoCondition: u16 {
        /// Data to read.
        const IN = 0x01;
        /// Urgent data to read.
        const PRI = 0x02;
        /// Writing will not block.
        const OUT = 0x04;
        /// Error condition.
        const ERR = 0x08;
        /// Hung up.
        const HUP = 0x10;
        /// Invalid descriptor.
        const NVAL = 0x20;
    }
}

/// One wait entry: a descriptor the foreign context wants polled.
///
/// `events` is what the context asked for, `revents` is what the host
/// observed during the last wait.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollFd {
    pub fd: RawFd,
    pub events: IoCondition,
    pub revents: IoCondition,
}

impl PollFd {
    pub fn new(fd: RawFd, events: IoCondition) -> Self {
        Self {
            fd,
            events,
            revents: IoCondition::empty(),
        }
    }
}

/// Result of [`ForeignContext::prepare`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Prepared {
    /// Highest priority with pending work. Passed back to query and check.
    pub priority: i32,

    /// How long the context is willing to sleep. `None` means no deadline.
    pub timeout: Option<Duration>,
}

/// A foreign event context driven one step at a time.
pub trait ForeignContext {
    /// Takes ownership of the context for the current thread.
    fn acquire(&mut self) -> Result<(), AttachError> {
        Ok(())
    }

    /// Gives ownership back. Called once per successful [`acquire`](Self::acquire).
    fn release(&mut self) {}

    /// Starts a turn.
    fn prepare(&mut self) -> Prepared;

    /// Fills `fds` with the descriptors the context wants polled at
    /// `priority` and returns how many it wants.
    ///
    /// A return value greater than `fds.len()` means the buffer was too
    /// small: only the first `fds.len()` slots are meaningful and the call
    /// must be repeated with a buffer of at least the returned size.
    ///
    /// Reporting a descriptor number whose file was closed and reopened
    /// since the last turn is allowed. The bundled reactor re-registers
    /// watches before every wait; other hosts may require the descriptor
    /// to leave the wait set for one turn first.
    fn query(&mut self, priority: i32, fds: &mut [PollFd]) -> usize;

    /// Inspects the observed readiness and reports whether dispatch is needed.
    fn check(&mut self, priority: i32, fds: &[PollFd]) -> bool;

    /// Runs the callbacks of every ready source once.
    fn dispatch(&mut self);
}

impl<C: ForeignContext + ?Sized> ForeignContext for Box<C> {
    fn acquire(&mut self) -> Result<(), AttachError> {
        (**self).acquire()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn prepare(&mut self) -> Prepared {
        (**self).prepare()
    }

    fn query(&mut self, priority: i32, fds: &mut [PollFd]) -> usize {
        (**self).query(priority, fds)
    }

    fn check(&mut self, priority: i32, fds: &[PollFd]) -> bool {
        (**self).check(priority, fds)
    }

    fn dispatch(&mut self) {
        (**self).dispatch()
    }
}
