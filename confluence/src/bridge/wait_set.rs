use crate::context::{ForeignContext, IoCondition, PollFd};
use crate::error::Error;

use tracing::debug;

use std::os::fd::RawFd;

/// Conditions reported to an entry whether it asked for them or not.
const ALWAYS_REPORTED: IoCondition = IoCondition::ERR
    .union(IoCondition::HUP)
    .union(IoCondition::NVAL);

/// The per-turn buffer of wait entries shared with the foreign context.
///
/// Rebuilt by every [`fill`](Self::fill); annotated with observed readiness
/// by [`record`](Self::record); read back by the check step.
///
/// The buffer only grows while attached: a turn that needs fewer slots
/// keeps the larger allocation for the next one.
pub(crate) struct WaitSet {
    /// Slots handed to the foreign context. `fds.len()` is the capacity.
    fds: Vec<PollFd>,

    /// Number of meaningful entries from the last successful fill.
    len: usize,

    /// Capacity restored by [`reset`](Self::reset).
    initial: usize,

    /// Largest capacity the foreign context may ask for.
    ceiling: usize,
}

impl WaitSet {
    pub(crate) fn new(initial: usize, ceiling: usize) -> Self {
        Self {
            fds: vec![PollFd::default(); initial],
            len: 0,
            initial,
            ceiling,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.fds.len()
    }

    /// Entries from the last successful fill.
    pub(crate) fn entries(&self) -> &[PollFd] {
        &self.fds[..self.len]
    }

    /// Queries the foreign context into the buffer.
    ///
    /// Starts from the current capacity. Whenever the context reports more
    /// entries than fit, the buffer grows to exactly the reported size and
    /// the query is repeated. Capacity strictly increases on every retry and
    /// is bounded by the ceiling, so the loop always terminates.
    ///
    /// Observed readiness of every returned entry is cleared.
    pub(crate) fn fill<C>(&mut self, context: &mut C, priority: i32) -> Result<usize, Error>
    where
        C: ForeignContext + ?Sized,
    {
        self.len = 0;

        loop {
            let wanted = context.query(priority, &mut self.fds);

            if wanted <= self.fds.len() {
                self.len = wanted;
                break;
            }

            if wanted > self.ceiling {
                return Err(Error::WaitSetTooLarge {
                    requested: wanted,
                    ceiling: self.ceiling,
                });
            }

            debug!(from = self.fds.len(), to = wanted, "growing wait set");
            self.fds.resize(wanted, PollFd::default());
        }

        for entry in &mut self.fds[..self.len] {
            entry.revents = IoCondition::empty();
        }

        Ok(self.len)
    }

    /// Adds `observed` to the readiness of every entry on `fd`.
    ///
    /// Each entry only receives the conditions it asked for, plus the
    /// error and hang-up conditions. Returns how many entries matched.
    pub(crate) fn record(&mut self, fd: RawFd, observed: IoCondition) -> usize {
        let mut matched = 0;

        for entry in self.fds[..self.len].iter_mut().filter(|e| e.fd == fd) {
            entry.revents |= observed & (entry.events | ALWAYS_REPORTED);
            matched += 1;
        }

        matched
    }

    /// Forgets the entries of the current turn, keeping the allocation.
    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }

    /// Releases the buffer back to its initial capacity.
    pub(crate) fn reset(&mut self) {
        self.fds = vec![PollFd::default(); self.initial];
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Prepared;

    /// Always wants the same entries and counts how often it was asked.
    struct Fixed {
        wanted: Vec<PollFd>,
        queries: Vec<usize>,
    }

    impl Fixed {
        fn new(wanted: Vec<PollFd>) -> Self {
            Self {
                wanted,
                queries: Vec::new(),
            }
        }
    }

    impl ForeignContext for Fixed {
        fn prepare(&mut self) -> Prepared {
            Prepared {
                priority: 0,
                timeout: None,
            }
        }

        fn query(&mut self, _priority: i32, fds: &mut [PollFd]) -> usize {
            self.queries.push(fds.len());
            for (slot, entry) in fds.iter_mut().zip(&self.wanted) {
                *slot = *entry;
            }
            self.wanted.len()
        }

        fn check(&mut self, _priority: i32, _fds: &[PollFd]) -> bool {
            false
        }

        fn dispatch(&mut self) {}
    }

    fn entries(n: i32) -> Vec<PollFd> {
        (0..n).map(|fd| PollFd::new(fd, IoCondition::IN)).collect()
    }

    #[test]
    fn grows_once_to_reported_size() {
        let mut set = WaitSet::new(2, 64);
        let mut ctx = Fixed::new(entries(5));

        assert_eq!(set.fill(&mut ctx, 0).unwrap(), 5);
        assert_eq!(ctx.queries, vec![2, 5]);
        assert_eq!(set.capacity(), 5);
        assert_eq!(set.entries().len(), 5);
    }

    #[test]
    fn capacity_never_shrinks_between_turns() {
        let mut set = WaitSet::new(1, 64);
        let mut ctx = Fixed::new(entries(4));
        set.fill(&mut ctx, 0).unwrap();

        let mut smaller = Fixed::new(entries(1));
        assert_eq!(set.fill(&mut smaller, 0).unwrap(), 1);
        assert_eq!(smaller.queries, vec![4]);
        assert_eq!(set.capacity(), 4);
    }

    #[test]
    fn request_above_ceiling_is_refused_without_looping() {
        let mut set = WaitSet::new(2, 3);
        let mut ctx = Fixed::new(entries(10));

        match set.fill(&mut ctx, 0) {
            Err(Error::WaitSetTooLarge { requested, ceiling }) => {
                assert_eq!((requested, ceiling), (10, 3));
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(ctx.queries.len(), 1);
        assert!(set.entries().is_empty());
    }

    #[test]
    fn record_masks_by_requested_events() {
        let mut set = WaitSet::new(4, 64);
        let mut ctx = Fixed::new(vec![
            PollFd::new(7, IoCondition::IN),
            PollFd::new(7, IoCondition::OUT),
            PollFd::new(8, IoCondition::IN),
        ]);
        set.fill(&mut ctx, 0).unwrap();

        let matched = set.record(7, IoCondition::IN | IoCondition::OUT | IoCondition::HUP);
        assert_eq!(matched, 2);

        let e = set.entries();
        assert_eq!(e[0].revents, IoCondition::IN | IoCondition::HUP);
        assert_eq!(e[1].revents, IoCondition::OUT | IoCondition::HUP);
        assert!(e[2].revents.is_empty());
    }

    #[test]
    fn fill_clears_previous_readiness() {
        let mut set = WaitSet::new(1, 64);
        let mut ctx = Fixed::new(entries(1));
        set.fill(&mut ctx, 0).unwrap();
        set.record(0, IoCondition::IN);

        set.fill(&mut ctx, 0).unwrap();
        assert!(set.entries()[0].revents.is_empty());
    }

    #[test]
    fn reset_restores_initial_capacity() {
        let mut set = WaitSet::new(2, 64);
        let mut ctx = Fixed::new(entries(9));
        set.fill(&mut ctx, 0).unwrap();

        set.reset();
        assert_eq!(set.capacity(), 2);
        assert!(set.entries().is_empty());
    }
}
