use super::wait_set::WaitSet;
use super::watched::{WatchedDescriptor, WatchedFd, coalesce, conditions_for};
use crate::context::ForeignContext;
use crate::error::{Error, Result};
use crate::host::{Host, PostAction, Readiness, ReadinessHandler, TimerId};

use tracing::{debug, error, trace, warn};

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};

/// State shared between the bridge, its two hooks and its watch handlers.
///
/// Only ever touched from the host thread, one hook or handler at a time.
pub(crate) struct Session<C> {
    /// Back reference handed to readiness handlers.
    this: Weak<RefCell<Session<C>>>,

    pub(crate) context: C,

    pub(crate) wait_set: WaitSet,

    /// One entry per descriptor with a live host watch.
    pub(crate) watched: BTreeMap<RawFd, WatchedDescriptor>,

    /// Priority returned by the last prepare.
    priority: i32,

    /// Set by a completed pre-wait step, consumed by the post-wait step.
    prepared: bool,

    /// Deadline timer, present while attached.
    timer: Option<TimerId>,

    /// Set when the bridge gave up on the foreign context.
    pub(crate) fault: Option<Error>,
}

impl<C: ForeignContext + 'static> Session<C> {
    pub(crate) fn new(context: C, wait_set: WaitSet) -> Rc<RefCell<Self>> {
        Rc::new_cyclic(|this| {
            RefCell::new(Self {
                this: this.clone(),
                context,
                wait_set,
                watched: BTreeMap::new(),
                priority: 0,
                prepared: false,
                timer: None,
                fault: None,
            })
        })
    }

    /// Acquires the foreign context and creates the deadline timer.
    pub(crate) fn attach(&mut self, host: &mut dyn Host) -> Result<()> {
        self.context.acquire()?;

        self.wait_set.reset();
        self.prepared = false;
        self.fault = None;
        self.timer = Some(host.timer(Box::new(|| {
            trace!("foreign context deadline reached");
        })));

        Ok(())
    }

    /// Releases every host resource and the foreign context.
    pub(crate) fn detach(&mut self, host: &mut dyn Host) {
        self.release_watches(host);

        if let Some(timer) = self.timer.take() {
            host.close_timer(timer);
        }

        self.wait_set.reset();
        self.prepared = false;
        self.context.release();
    }

    /// Pre-wait step: prepare, query, reconcile, arm the deadline.
    pub(crate) fn pre_wait(&mut self, host: &mut dyn Host) {
        self.prepared = false;

        if self.fault.is_some() {
            return;
        }

        let prepared = self.context.prepare();
        self.priority = prepared.priority;

        if let Err(e) = self.wait_set.fill(&mut self.context, prepared.priority) {
            self.give_up(host, e);
            return;
        }

        self.reconcile(host);

        if let Some(timer) = self.timer {
            match prepared.timeout {
                Some(after) => host.arm_timer(timer, after),
                None => host.disarm_timer(timer),
            }
        }

        self.prepared = true;

        trace!(
            priority = self.priority,
            entries = self.wait_set.entries().len(),
            watched = self.watched.len(),
            timeout = ?prepared.timeout,
            "foreign context prepared"
        );
    }

    /// Post-wait step: check, then dispatch at most once.
    pub(crate) fn post_wait(&mut self) {
        if !std::mem::take(&mut self.prepared) {
            return;
        }

        if self.context.check(self.priority, self.wait_set.entries()) {
            trace!(priority = self.priority, "dispatching foreign context");
            self.context.dispatch();
        }
    }

    /// Records readiness reported by the host for `fd`.
    pub(crate) fn on_readiness(&mut self, fd: RawFd, readiness: Readiness) -> PostAction {
        let Some(watched) = self.watched.get_mut(&fd) else {
            trace!(fd, "readiness for unwatched descriptor ignored");
            return PostAction::Continue;
        };

        let matched = self.wait_set.record(fd, conditions_for(readiness));
        trace!(fd, ?readiness, matched, "readiness recorded");

        if readiness.is_failure() {
            warn!(fd, "host reported an error on descriptor, stopping watch");
            watched.broken = true;
            return PostAction::Stop;
        }

        PostAction::Continue
    }

    /// Brings the host watches in line with this turn's wait set.
    ///
    /// The desired state is computed first, then existing watches are
    /// updated or retired, then missing watches are created. The collection
    /// is never mutated while it is being walked.
    fn reconcile(&mut self, host: &mut dyn Host) {
        let wanted = coalesce(self.wait_set.entries());
        let mut retired = Vec::new();

        for (&fd, watched) in self.watched.iter_mut() {
            let Some(want) = wanted.get(&fd) else {
                retired.push(fd);
                continue;
            };

            if watched.broken {
                retired.push(fd);
                continue;
            }

            watched.refs = want.refs;

            if watched.interest != want.interest {
                match host.restart(watched.watch, want.interest) {
                    Ok(()) => {
                        debug!(fd, from = ?watched.interest, to = ?want.interest, "watch re-masked");
                        watched.interest = want.interest;
                    }
                    Err(e) => {
                        warn!(fd, error = %e, "failed to restart watch");
                        retired.push(fd);
                    }
                }
            }
        }

        for fd in retired {
            if let Some(watched) = self.watched.remove(&fd) {
                host.close(watched.watch);
                debug!(fd, "watch released");
            }
        }

        for (fd, want) in wanted {
            if self.watched.contains_key(&fd) {
                continue;
            }

            match host.watch(fd, want.interest, self.handler_for(fd)) {
                Ok(watch) => {
                    debug!(fd, interest = ?want.interest, refs = want.refs, "watch created");
                    self.watched.insert(
                        fd,
                        WatchedDescriptor {
                            interest: want.interest,
                            refs: want.refs,
                            watch,
                            broken: false,
                        },
                    );
                }
                Err(e) => {
                    warn!(fd, error = %e, "cannot watch descriptor, skipping it this turn");
                }
            }
        }
    }

    fn handler_for(&self, fd: RawFd) -> ReadinessHandler {
        let session = self.this.clone();

        Box::new(move |readiness: Readiness| {
            let Some(session) = session.upgrade() else {
                return PostAction::Stop;
            };

            session.borrow_mut().on_readiness(fd, readiness)
        })
    }

    fn release_watches(&mut self, host: &mut dyn Host) {
        for (fd, watched) in std::mem::take(&mut self.watched) {
            host.close(watched.watch);
            trace!(fd, "watch released");
        }
    }

    /// Stops driving the foreign context after an unrecoverable condition.
    fn give_up(&mut self, host: &mut dyn Host, e: Error) {
        error!(error = %e, "foreign context can no longer be driven");

        self.release_watches(host);
        if let Some(timer) = self.timer {
            host.disarm_timer(timer);
        }

        self.wait_set.clear();
        self.fault = Some(e);
    }

    pub(crate) fn snapshot(&self) -> Vec<WatchedFd> {
        self.watched
            .iter()
            .map(|(&fd, w)| WatchedFd {
                fd,
                interest: w.interest,
                refs: w.refs,
            })
            .collect()
    }
}
