use super::event::Event;
use super::poller::Poller;
use super::timer::TimerEntry;
use crate::host::{
    Hook, HookId, Host, Interest, Phase, PostAction, Readiness, ReadinessHandler, TimerCallback,
    TimerId, WatchId,
};
use crate::utils::Slab;

use tracing::{debug, trace, warn};

use std::cell::Cell;
use std::collections::BinaryHeap;
use std::io;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// How a single turn is allowed to wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// Block until readiness or the earliest timer deadline.
    Wait,

    /// Poll without blocking.
    NoWait,
}

/// Requests that [`Reactor::run`] return after the current turn.
///
/// Handles are cheap to clone and can be moved into readiness handlers or
/// timer callbacks. They are not `Send`: the reactor is single-threaded.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Rc<Cell<bool>>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.set(true);
    }

    fn take(&self) -> bool {
        self.0.replace(false)
    }
}

/// A descriptor watch.
struct WatchSlot {
    fd: RawFd,
    interest: Interest,

    /// Whether the descriptor is currently registered with epoll.
    started: bool,

    handler: ReadinessHandler,
}

/// A one-shot timer.
struct TimerSlot {
    /// Pending deadline, `None` while disarmed.
    deadline: Option<Instant>,

    /// Bumped on every arm/disarm so stale heap entries can be skipped.
    generation: u64,

    callback: TimerCallback,
}

/// A turn hook.
struct HookSlot {
    phase: Phase,

    /// Installation order. Also tells a reused slot apart from the one a
    /// running hook was taken from.
    seq: u64,

    /// Empty while the hook is running.
    hook: Option<Hook>,
}

/// The reactor.
///
/// The reactor runs on the thread that owns it and is responsible for:
/// - polling OS I/O readiness events,
/// - managing one-shot timers,
/// - running turn hooks before and after each wait.
pub struct Reactor {
    /// Platform-specific poller.
    poller: Poller,

    /// Buffer used to collect I/O events from the poller.
    events: Vec<Event>,

    /// Watches indexed by poller token.
    watches: Slab<WatchSlot>,

    /// Number of watches registered with the poller.
    active: usize,

    timers: Slab<TimerSlot>,

    /// Min-heap of pending timer deadlines.
    deadlines: BinaryHeap<TimerEntry>,

    hooks: Slab<HookSlot>,
    next_hook_seq: u64,

    signal: StopHandle,
}

impl Reactor {
    /// Creates a reactor with the default configuration.
    pub fn new() -> io::Result<Self> {
        super::ReactorBuilder::new().build()
    }

    pub(crate) fn with_capacity(event_capacity: usize) -> io::Result<Self> {
        let poller = Poller::new(event_capacity)?;

        Ok(Self {
            poller,
            events: Vec::with_capacity(event_capacity),
            watches: Slab::new(64),
            active: 0,
            timers: Slab::new(4),
            deadlines: BinaryHeap::new(),
            hooks: Slab::new(4),
            next_hook_seq: 0,
            signal: StopHandle::default(),
        })
    }

    /// Returns a handle that makes [`run`](Self::run) return.
    pub fn stop_handle(&self) -> StopHandle {
        self.signal.clone()
    }

    /// Returns `true` while something can still produce a turn: a hook, a
    /// started watch or an armed timer.
    pub fn is_alive(&self) -> bool {
        self.hooks.len() > 0
            || self.active > 0
            || self.timers.iter().any(|(_, t)| t.deadline.is_some())
    }

    /// Runs turns until stopped or until nothing is alive.
    pub fn run(&mut self) -> io::Result<()> {
        while self.is_alive() {
            self.turn(RunMode::Wait)?;

            if self.signal.take() {
                debug!("reactor stopped");
                break;
            }
        }

        Ok(())
    }

    /// Runs exactly one turn.
    pub fn turn(&mut self, mode: RunMode) -> io::Result<()> {
        self.run_hooks(Phase::PreWait);

        self.refresh_watches();

        let timeout = match mode {
            RunMode::NoWait => Some(Duration::ZERO),
            RunMode::Wait => self.next_timeout(),
        };

        trace!(?timeout, watches = self.active, "waiting");

        self.poller.poll(&mut self.events, timeout)?;

        let events = std::mem::take(&mut self.events);
        for event in &events {
            self.handle_event(event);
        }
        self.events = events;

        self.fire_timers();

        self.run_hooks(Phase::PostWait);

        Ok(())
    }

    /// Time until the earliest armed deadline, dropping stale heap entries.
    fn next_timeout(&mut self) -> Option<Duration> {
        while let Some(entry) = self.deadlines.peek() {
            if self.is_current(entry) {
                return Some(entry.deadline.saturating_duration_since(Instant::now()));
            }

            self.deadlines.pop();
        }

        None
    }

    fn is_current(&self, entry: &TimerEntry) -> bool {
        self.timers
            .get(entry.slot)
            .is_some_and(|t| t.generation == entry.generation && t.deadline.is_some())
    }

    fn handle_event(&mut self, event: &Event) {
        self.deliver(event.token, event.readiness);
    }

    fn deliver(&mut self, token: usize, readiness: Readiness) {
        let Some(slot) = self.watches.get_mut(token) else {
            return;
        };

        // Stopped earlier in this turn.
        if !slot.started {
            return;
        }

        let action = (slot.handler)(readiness);

        if action == PostAction::Stop {
            self.stop(WatchId(token));
        }
    }

    /// Re-asserts every started registration before the wait.
    ///
    /// Closing a descriptor silently drops it from the epoll set, and the
    /// number may already belong to a new file. `ENOENT` on modify means
    /// exactly that and the new file is registered. Any other failure means
    /// the descriptor is gone: the handler sees an error and the watch is
    /// stopped.
    fn refresh_watches(&mut self) {
        let mut lost = Vec::new();

        for (token, slot) in self.watches.iter() {
            if !slot.started {
                continue;
            }

            let result = match self.poller.reregister(slot.fd, token, slot.interest) {
                Err(e) if e.raw_os_error() == Some(libc::ENOENT) => {
                    debug!(fd = slot.fd, token, "descriptor replaced, registering again");
                    self.poller.register(slot.fd, token, slot.interest)
                }
                other => other,
            };

            if let Err(e) = result {
                lost.push((token, slot.fd, e));
            }
        }

        for (token, fd, e) in lost {
            warn!(fd, token, error = %e, "watched descriptor is gone");

            self.deliver(
                token,
                Readiness {
                    error: true,
                    ..Readiness::default()
                },
            );
            self.stop(WatchId(token));
        }
    }

    fn fire_timers(&mut self) {
        let now = Instant::now();

        while let Some(entry) = self.deadlines.peek() {
            if entry.deadline > now {
                break;
            }

            let Some(entry) = self.deadlines.pop() else {
                break;
            };

            let Some(timer) = self.timers.get_mut(entry.slot) else {
                continue;
            };

            if timer.generation != entry.generation || timer.deadline.is_none() {
                continue;
            }

            timer.deadline = None;
            (timer.callback)();
        }
    }

    fn run_hooks(&mut self, phase: Phase) {
        let mut order: Vec<(u64, usize)> = self
            .hooks
            .iter()
            .filter(|(_, h)| h.phase == phase)
            .map(|(i, h)| (h.seq, i))
            .collect();
        order.sort_unstable();

        for (seq, index) in order {
            let Some(mut hook) = self
                .hooks
                .get_mut(index)
                .filter(|h| h.seq == seq)
                .and_then(|h| h.hook.take())
            else {
                continue;
            };

            let host: &mut dyn Host = self;
            hook(host);

            // The hook may have removed itself while running.
            if let Some(slot) = self.hooks.get_mut(index).filter(|h| h.seq == seq) {
                slot.hook = Some(hook);
            }
        }
    }

    fn has_started_watch(&self, fd: RawFd) -> bool {
        self.watches.iter().any(|(_, w)| w.started && w.fd == fd)
    }
}

impl Host for Reactor {
    fn add_hook(&mut self, phase: Phase, hook: Hook) -> HookId {
        let seq = self.next_hook_seq;
        self.next_hook_seq += 1;

        let id = self.hooks.insert(HookSlot {
            phase,
            seq,
            hook: Some(hook),
        });

        debug!(?phase, hook = id, "hook installed");
        HookId(id)
    }

    fn remove_hook(&mut self, id: HookId) {
        if self.hooks.remove(id.0).is_some() {
            debug!(hook = id.0, "hook removed");
        }
    }

    fn watch(
        &mut self,
        fd: RawFd,
        interest: Interest,
        handler: ReadinessHandler,
    ) -> io::Result<WatchId> {
        if self.has_started_watch(fd) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("descriptor {fd} is already watched"),
            ));
        }

        let token = self.watches.insert(WatchSlot {
            fd,
            interest,
            started: false,
            handler,
        });

        if let Err(e) = self.poller.register(fd, token, interest) {
            self.watches.remove(token);
            return Err(e);
        }

        if let Some(slot) = self.watches.get_mut(token) {
            slot.started = true;
        }
        self.active += 1;

        debug!(fd, ?interest, token, "watch started");
        Ok(WatchId(token))
    }

    fn restart(&mut self, id: WatchId, interest: Interest) -> io::Result<()> {
        let Some(slot) = self.watches.get(id.0) else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("unknown watch {}", id.0),
            ));
        };

        let (fd, started) = (slot.fd, slot.started);

        let result = if started {
            self.poller.reregister(fd, id.0, interest)
        } else if self.has_started_watch(fd) {
            Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("descriptor {fd} is already watched"),
            ))
        } else {
            self.poller.register(fd, id.0, interest)
        };

        if let Err(e) = result {
            self.stop(id);
            return Err(e);
        }

        if let Some(slot) = self.watches.get_mut(id.0) {
            slot.interest = interest;
            if !slot.started {
                slot.started = true;
                self.active += 1;
            }
        }

        debug!(fd, ?interest, token = id.0, "watch restarted");
        Ok(())
    }

    fn stop(&mut self, id: WatchId) {
        let Some(slot) = self.watches.get_mut(id.0) else {
            return;
        };

        if !slot.started {
            return;
        }

        slot.started = false;
        self.active -= 1;

        let (fd, interest) = (slot.fd, slot.interest);

        // The descriptor may already be closed, which removes it from
        // the epoll set on its own.
        if let Err(e) = self.poller.deregister(fd) {
            if e.raw_os_error() != Some(libc::EBADF) && e.raw_os_error() != Some(libc::ENOENT) {
                warn!(fd, error = %e, "failed to deregister descriptor");
            }
        }

        debug!(fd, ?interest, token = id.0, "watch stopped");
    }

    fn close(&mut self, id: WatchId) {
        self.stop(id);

        if let Some(slot) = self.watches.remove(id.0) {
            trace!(fd = slot.fd, token = id.0, "watch closed");
        }
    }

    fn active_watches(&self) -> usize {
        self.active
    }

    fn timer(&mut self, callback: TimerCallback) -> TimerId {
        TimerId(self.timers.insert(TimerSlot {
            deadline: None,
            generation: 0,
            callback,
        }))
    }

    fn arm_timer(&mut self, id: TimerId, after: Duration) {
        let Some(timer) = self.timers.get_mut(id.0) else {
            return;
        };

        let deadline = Instant::now() + after;

        timer.generation += 1;
        timer.deadline = Some(deadline);

        self.deadlines.push(TimerEntry {
            deadline,
            slot: id.0,
            generation: timer.generation,
        });
    }

    fn disarm_timer(&mut self, id: TimerId) {
        if let Some(timer) = self.timers.get_mut(id.0) {
            if timer.deadline.take().is_some() {
                timer.generation += 1;
            }
        }
    }

    fn close_timer(&mut self, id: TimerId) {
        self.disarm_timer(id);
        self.timers.remove(id.0);
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        for id in self.watches.keys() {
            self.stop(WatchId(id));
        }
    }
}
