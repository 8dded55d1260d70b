use crate::host::Readiness;

/// An I/O event reported by the poller.
///
/// An `Event` represents readiness information for a registered
/// file descriptor. It is produced by the poller and consumed
/// by the reactor to run the matching watch handler.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Event {
    /// Token associated with the registered file descriptor.
    ///
    /// This is the slab index of the watch inside the reactor.
    pub(crate) token: usize,

    /// What the OS reported for the descriptor.
    pub(crate) readiness: Readiness,
}
