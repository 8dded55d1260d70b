//! The host reactor contract.
//!
//! A [`Bridge`](crate::Bridge) never talks to epoll directly. It drives
//! whatever implements [`Host`]: the bundled [`Reactor`](crate::Reactor)
//! in production, a scripted double in tests.
//!
//! The contract is deliberately small:
//! - two per-turn hook phases ([`Phase::PreWait`], [`Phase::PostWait`]),
//! - per-descriptor readiness watches that can be created, restarted with
//!   a new mask, stopped and closed,
//! - one-shot timers.
//!
//! Every method is object safe so hooks can receive `&mut dyn Host`.

use bitflags::bitflags;

use std::fmt;
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

bitflags! {
    /// Host-side interest mask for a watch.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Interest: u8 {
        const READABLE = 0b01;
        const WRITABLE = 0b10;
    }
}

/// Readiness observed on a watched descriptor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Readiness {
    /// The descriptor can be read without blocking.
    pub readable: bool,

    /// The descriptor can be written without blocking.
    pub writable: bool,

    /// The peer hung up.
    pub hangup: bool,

    /// The descriptor is in an error state.
    pub error: bool,
}

impl Readiness {
    /// Returns `true` if the host reported a broken descriptor rather
    /// than plain readiness.
    pub fn is_failure(&self) -> bool {
        self.error
    }
}

/// What a readiness handler wants done with its watch once it returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostAction {
    /// Keep the watch armed.
    Continue,

    /// Stop the watch. The handle stays valid and can be restarted or closed.
    Stop,
}

/// Per-turn hook phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Runs at the start of every turn, before the host blocks.
    PreWait,

    /// Runs after the wait returned and readiness has been delivered.
    PostWait,
}

macro_rules! handle_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) usize);

        impl $name {
            /// Wraps a raw slot index. Intended for [`Host`] implementations.
            pub fn from_raw(raw: usize) -> Self {
                Self(raw)
            }

            /// Returns the raw slot index.
            pub fn into_raw(self) -> usize {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

handle_id!(
    /// Handle to a descriptor watch.
    WatchId
);

handle_id!(
    /// Handle to a one-shot timer.
    TimerId
);

handle_id!(
    /// Handle to an installed turn hook.
    HookId
);

/// Hook installed for one [`Phase`].
pub type Hook = Box<dyn FnMut(&mut dyn Host)>;

/// Callback invoked when a watched descriptor becomes ready.
pub type ReadinessHandler = Box<dyn FnMut(Readiness) -> PostAction>;

/// Callback invoked when a timer expires.
pub type TimerCallback = Box<dyn FnMut()>;

/// Operations a host reactor offers to the bridge.
pub trait Host {
    /// Installs a hook for `phase`. It runs once per turn until removed.
    fn add_hook(&mut self, phase: Phase, hook: Hook) -> HookId;

    /// Removes a hook. Unknown ids are ignored.
    fn remove_hook(&mut self, id: HookId);

    /// Creates a watch on `fd` and starts it with `interest`.
    fn watch(&mut self, fd: RawFd, interest: Interest, handler: ReadinessHandler)
    -> io::Result<WatchId>;

    /// Stops the watch and starts it again with a new mask.
    ///
    /// A stopped watch is started. On error the watch is left stopped.
    fn restart(&mut self, id: WatchId, interest: Interest) -> io::Result<()>;

    /// Stops the watch without releasing it.
    fn stop(&mut self, id: WatchId);

    /// Stops and releases the watch. Unknown ids are ignored.
    fn close(&mut self, id: WatchId);

    /// Number of watches currently started at the OS level.
    fn active_watches(&self) -> usize;

    /// Creates a disarmed one-shot timer.
    fn timer(&mut self, callback: TimerCallback) -> TimerId;

    /// Arms the timer to fire `after` from now, replacing any previous
    /// deadline.
    fn arm_timer(&mut self, id: TimerId, after: Duration);

    /// Disarms the timer. Disarming a disarmed timer does nothing.
    fn disarm_timer(&mut self, id: TimerId);

    /// Disarms and releases the timer.
    fn close_timer(&mut self, id: TimerId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interest_union() {
        let both = Interest::READABLE | Interest::WRITABLE;
        assert!(both.contains(Interest::READABLE));
        assert!(both.contains(Interest::WRITABLE));
        assert_eq!(Interest::READABLE | Interest::READABLE, Interest::READABLE);
        assert!(Interest::default().is_empty());
    }

    #[test]
    fn handle_ids_round_trip_raw_index() {
        let id = WatchId::from_raw(3);
        assert_eq!(id.into_raw(), 3);
        assert_eq!(format!("{id:?}"), "WatchId(3)");
    }
}
