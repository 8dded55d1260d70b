#![allow(dead_code)]

use confluence::context::{ForeignContext, IoCondition, PollFd, Prepared};
use confluence::error::AttachError;
use confluence::host::{
    Hook, HookId, Host, Interest, Phase, PostAction, Readiness, ReadinessHandler, TimerCallback,
    TimerId, WatchId,
};

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Host operations as seen by the scripted host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Watch(RawFd, Interest),
    Restart(RawFd, Interest),
    Stop(RawFd),
    Close(RawFd),
}

struct FakeWatch {
    fd: RawFd,
    interest: Interest,
    started: bool,
    handler: ReadinessHandler,
}

struct FakeTimer {
    armed: Option<Duration>,
    callback: TimerCallback,
}

/// A host that never blocks: each `turn` runs the hooks and delivers the
/// readiness the test asks for.
#[derive(Default)]
pub struct ScriptedHost {
    next_id: usize,
    hooks: BTreeMap<usize, (Phase, Option<Hook>)>,
    watches: BTreeMap<usize, FakeWatch>,
    timers: BTreeMap<usize, FakeTimer>,

    /// Closed watches, kept so tests can replay late events into them.
    closed: Vec<FakeWatch>,

    /// Descriptors `watch` refuses, as if already closed.
    pub refuse: BTreeSet<RawFd>,

    pub ops: Vec<Op>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    /// Runs one turn: pre-wait hooks, readiness delivery, post-wait hooks.
    pub fn turn(&mut self, ready: &[(RawFd, Readiness)]) {
        self.run_hooks(Phase::PreWait);

        for &(fd, readiness) in ready {
            let target = self
                .watches
                .iter()
                .find(|(_, w)| w.started && w.fd == fd)
                .map(|(&id, _)| id);

            if let Some(id) = target {
                let action = self
                    .watches
                    .get_mut(&id)
                    .map(|w| (w.handler)(readiness))
                    .unwrap_or(PostAction::Continue);

                if action == PostAction::Stop {
                    self.stop(WatchId::from_raw(id));
                }
            }
        }

        self.run_hooks(Phase::PostWait);
    }

    /// Delivers readiness to the most recent handler registered for `fd`,
    /// even if its watch was stopped or closed.
    pub fn deliver_raw(&mut self, fd: RawFd, readiness: Readiness) -> Option<PostAction> {
        self.watches
            .values_mut()
            .rev()
            .chain(self.closed.iter_mut().rev())
            .find(|w| w.fd == fd)
            .map(|w| (w.handler)(readiness))
    }

    fn run_hooks(&mut self, phase: Phase) {
        let ids: Vec<usize> = self
            .hooks
            .iter()
            .filter(|(_, (p, _))| *p == phase)
            .map(|(&id, _)| id)
            .collect();

        for id in ids {
            let Some(mut hook) = self.hooks.get_mut(&id).and_then(|(_, h)| h.take()) else {
                continue;
            };

            let host: &mut dyn Host = self;
            hook(host);

            if let Some((_, slot)) = self.hooks.get_mut(&id) {
                *slot = Some(hook);
            }
        }
    }

    /// Started watches by descriptor.
    pub fn started(&self) -> BTreeMap<RawFd, Interest> {
        self.watches
            .values()
            .filter(|w| w.started)
            .map(|w| (w.fd, w.interest))
            .collect()
    }

    pub fn watch_handles(&self) -> usize {
        self.watches.len()
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// Deadline of the single timer, if armed.
    pub fn armed(&self) -> Option<Duration> {
        self.timers.values().find_map(|t| t.armed)
    }

    /// Fires every armed timer.
    pub fn expire_timers(&mut self) {
        for timer in self.timers.values_mut() {
            if timer.armed.take().is_some() {
                (timer.callback)();
            }
        }
    }
}

impl Host for ScriptedHost {
    fn add_hook(&mut self, phase: Phase, hook: Hook) -> HookId {
        let id = self.id();
        self.hooks.insert(id, (phase, Some(hook)));
        HookId::from_raw(id)
    }

    fn remove_hook(&mut self, id: HookId) {
        self.hooks.remove(&id.into_raw());
    }

    fn watch(
        &mut self,
        fd: RawFd,
        interest: Interest,
        handler: ReadinessHandler,
    ) -> io::Result<WatchId> {
        if self.refuse.contains(&fd) {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }

        if self.started().contains_key(&fd) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "duplicate watch"));
        }

        let id = self.id();
        self.watches.insert(
            id,
            FakeWatch {
                fd,
                interest,
                started: true,
                handler,
            },
        );
        self.ops.push(Op::Watch(fd, interest));

        Ok(WatchId::from_raw(id))
    }

    fn restart(&mut self, id: WatchId, interest: Interest) -> io::Result<()> {
        let watch = self
            .watches
            .get_mut(&id.into_raw())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;

        if self.refuse.contains(&watch.fd) {
            watch.started = false;
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }

        watch.interest = interest;
        watch.started = true;
        self.ops.push(Op::Restart(watch.fd, interest));

        Ok(())
    }

    fn stop(&mut self, id: WatchId) {
        if let Some(watch) = self.watches.get_mut(&id.into_raw()) {
            if watch.started {
                watch.started = false;
                self.ops.push(Op::Stop(watch.fd));
            }
        }
    }

    fn close(&mut self, id: WatchId) {
        if let Some(watch) = self.watches.remove(&id.into_raw()) {
            self.ops.push(Op::Close(watch.fd));
            self.closed.push(watch);
        }
    }

    fn active_watches(&self) -> usize {
        self.watches.values().filter(|w| w.started).count()
    }

    fn timer(&mut self, callback: TimerCallback) -> TimerId {
        let id = self.id();
        self.timers.insert(
            id,
            FakeTimer {
                armed: None,
                callback,
            },
        );
        TimerId::from_raw(id)
    }

    fn arm_timer(&mut self, id: TimerId, after: Duration) {
        if let Some(timer) = self.timers.get_mut(&id.into_raw()) {
            timer.armed = Some(after);
        }
    }

    fn disarm_timer(&mut self, id: TimerId) {
        if let Some(timer) = self.timers.get_mut(&id.into_raw()) {
            timer.armed = None;
        }
    }

    fn close_timer(&mut self, id: TimerId) {
        self.timers.remove(&id.into_raw());
    }
}

/// A foreign context whose wait set is set by the test between turns.
#[derive(Default)]
pub struct ScriptedContext {
    /// Entries the next query reports.
    pub wanted: Vec<PollFd>,

    /// Timeout the next prepare reports.
    pub timeout: Option<Duration>,

    pub priority: i32,

    /// Fail `acquire`.
    pub refuse_acquire: bool,

    pub acquired: usize,
    pub released: usize,
    pub prepares: usize,

    /// Buffer capacity seen by each query.
    pub queries: Vec<usize>,

    /// Entries seen by each check.
    pub checks: Vec<Vec<PollFd>>,

    pub dispatches: usize,
}

impl ScriptedContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wants(mut self, entries: &[(RawFd, IoCondition)]) -> Self {
        self.set(entries);
        self
    }

    pub fn set(&mut self, entries: &[(RawFd, IoCondition)]) {
        self.wanted = entries
            .iter()
            .map(|&(fd, events)| PollFd::new(fd, events))
            .collect();
    }

    pub fn last_check(&self) -> &[PollFd] {
        self.checks.last().map(Vec::as_slice).unwrap_or(&[])
    }
}

impl ForeignContext for ScriptedContext {
    fn acquire(&mut self) -> Result<(), AttachError> {
        if self.refuse_acquire {
            return Err(AttachError::new("owned by another thread"));
        }

        self.acquired += 1;
        Ok(())
    }

    fn release(&mut self) {
        self.released += 1;
    }

    fn prepare(&mut self) -> Prepared {
        self.prepares += 1;

        Prepared {
            priority: self.priority,
            timeout: self.timeout,
        }
    }

    fn query(&mut self, priority: i32, fds: &mut [PollFd]) -> usize {
        assert_eq!(priority, self.priority);
        self.queries.push(fds.len());

        for (slot, entry) in fds.iter_mut().zip(&self.wanted) {
            *slot = *entry;
            // Stale readiness the bridge has to clear.
            slot.revents = IoCondition::IN;
        }

        self.wanted.len()
    }

    fn check(&mut self, priority: i32, fds: &[PollFd]) -> bool {
        assert_eq!(priority, self.priority);
        self.checks.push(fds.to_vec());

        fds.iter().any(|fd| !fd.revents.is_empty())
    }

    fn dispatch(&mut self) {
        self.dispatches += 1;
    }
}

pub fn readable() -> Readiness {
    Readiness {
        readable: true,
        ..Readiness::default()
    }
}

pub fn writable() -> Readiness {
    Readiness {
        writable: true,
        ..Readiness::default()
    }
}

pub fn failed() -> Readiness {
    Readiness {
        error: true,
        hangup: true,
        ..Readiness::default()
    }
}
