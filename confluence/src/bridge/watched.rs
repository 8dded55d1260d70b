use crate::context::{IoCondition, PollFd};
use crate::host::{Interest, Readiness, WatchId};

use std::collections::BTreeMap;
use std::os::fd::RawFd;

/// A descriptor currently registered with the host on behalf of the
/// foreign context.
#[derive(Debug)]
pub(crate) struct WatchedDescriptor {
    /// Mask the host watch is currently started with.
    pub(crate) interest: Interest,

    /// Number of wait entries mapped onto this descriptor this turn.
    pub(crate) refs: usize,

    /// Host watch handle, owned.
    pub(crate) watch: WatchId,

    /// The host reported an error and the watch was stopped.
    pub(crate) broken: bool,
}

/// Public snapshot of a watched descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatchedFd {
    pub fd: RawFd,
    pub interest: Interest,
    pub refs: usize,
}

/// What one turn's wait set asks of a single descriptor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Wanted {
    /// Union of every entry's interest.
    pub(crate) interest: Interest,

    /// Number of entries on the descriptor.
    pub(crate) refs: usize,
}

/// Coalesces a wait set into one [`Wanted`] per distinct descriptor.
pub(crate) fn coalesce(entries: &[PollFd]) -> BTreeMap<RawFd, Wanted> {
    let mut wanted: BTreeMap<RawFd, Wanted> = BTreeMap::new();

    for entry in entries {
        let slot = wanted.entry(entry.fd).or_default();
        slot.interest |= interest_for(entry.events);
        slot.refs += 1;
    }

    wanted
}

/// Translates requested foreign conditions into a host interest mask.
///
/// `PRI` has no host counterpart and is not watched.
pub(crate) fn interest_for(events: IoCondition) -> Interest {
    let mut interest = Interest::empty();

    if events.contains(IoCondition::IN) {
        interest |= Interest::READABLE;
    }
    if events.contains(IoCondition::OUT) {
        interest |= Interest::WRITABLE;
    }

    interest
}

/// Translates observed host readiness into foreign conditions.
pub(crate) fn conditions_for(readiness: Readiness) -> IoCondition {
    let mut conditions = IoCondition::empty();

    if readiness.readable {
        conditions |= IoCondition::IN;
    }
    if readiness.writable {
        conditions |= IoCondition::OUT;
    }
    if readiness.hangup {
        conditions |= IoCondition::HUP;
    }
    if readiness.error {
        conditions |= IoCondition::ERR;
    }

    conditions
}
