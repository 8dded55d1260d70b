//! The loop bridge.
//!
//! A [`Bridge`] lets a foreign, callback-driven event context run inside a
//! [`Host`] reactor without ever blocking on the foreign context's own wait.
//! Once initialized it occupies one pre-wait and one post-wait hook and, on
//! every host turn:
//!
//! 1. asks the context to prepare and queries its wait set,
//! 2. reconciles that wait set with the host watches it owns: one watch per
//!    distinct descriptor, masked with the union of every entry's interest,
//!    created, re-masked or released as the set changes,
//! 3. arms its deadline timer with the context's timeout, or disarms it,
//! 4. lets the host wait, recording any readiness on the matching entries,
//! 5. hands the annotated entries to the context's check step and
//!    dispatches at most once.
//!
//! # Examples
//!
//! ```rust,ignore
//! let mut reactor = Reactor::new()?;
//! let mut bridge = BridgeBuilder::new()
//!     .initial_capacity(8)
//!     .build(my_context);
//!
//! bridge.initialize(&mut reactor)?;
//! reactor.run()?;
//! bridge.teardown(&mut reactor);
//! ```

mod session;
mod wait_set;
mod watched;

pub use watched::WatchedFd;

use crate::context::ForeignContext;
use crate::error::{Error, Result};
use crate::host::{HookId, Host, Phase};
use session::Session;
use wait_set::WaitSet;

use tracing::{debug, warn};

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

/// Builder for configuring and creating a bridge.
///
/// # Examples
///
/// ```rust,ignore
/// let bridge = BridgeBuilder::new()
///     .initial_capacity(4)
///     .max_descriptors(1024)
///     .build(context);
/// ```
pub struct BridgeBuilder {
    /// Wait entries allocated before the first query.
    initial_capacity: usize,

    /// Largest wait set the foreign context may ask for.
    max_descriptors: usize,
}

impl BridgeBuilder {
    /// Creates a new `BridgeBuilder` with default configuration.
    ///
    /// By default the wait-set buffer starts with 16 slots and may grow to
    /// 65 536.
    pub fn new() -> Self {
        Self {
            initial_capacity: 16,
            max_descriptors: 65_536,
        }
    }

    /// Sets how many wait entries are allocated before the first query.
    ///
    /// Zero is allowed: the first turn then sizes the buffer.
    pub fn initial_capacity(mut self, n: usize) -> Self {
        self.initial_capacity = n;
        self
    }

    /// Sets the largest wait set the foreign context may ask for.
    ///
    /// A larger request faults the bridge instead of growing forever.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn max_descriptors(mut self, n: usize) -> Self {
        assert!(n > 0, "max_descriptors must be > 0");

        self.max_descriptors = n;
        self
    }

    /// Builds a detached bridge around `context`.
    ///
    /// # Panics
    ///
    /// Panics if the initial capacity exceeds `max_descriptors`.
    pub fn build<C: ForeignContext + 'static>(self, context: C) -> Bridge<C> {
        assert!(
            self.initial_capacity <= self.max_descriptors,
            "initial_capacity must not exceed max_descriptors"
        );

        let wait_set = WaitSet::new(self.initial_capacity, self.max_descriptors);

        Bridge {
            session: Session::new(context, wait_set),
            attachment: None,
        }
    }
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Hooks held while the bridge is attached.
struct Attachment {
    pre_wait: HookId,
    post_wait: HookId,
}

/// Drives a [`ForeignContext`] from a [`Host`] reactor.
///
/// `initialize` and `teardown` are the whole lifecycle and are both
/// idempotent. They must be called between turns, never from inside a
/// hook or a foreign callback.
pub struct Bridge<C: ForeignContext + 'static> {
    session: Rc<RefCell<Session<C>>>,

    /// `Some` while attached to a host.
    attachment: Option<Attachment>,
}

impl<C: ForeignContext + 'static> Bridge<C> {
    /// Creates a bridge with the default configuration.
    pub fn new(context: C) -> Self {
        BridgeBuilder::new().build(context)
    }

    /// Attaches to `host`.
    ///
    /// Acquires the foreign context, creates the deadline timer and installs
    /// the two turn hooks. No descriptor is watched until the first
    /// pre-wait step. Does nothing if already attached.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Attach`] if the foreign context cannot be acquired;
    /// the bridge then stays detached.
    pub fn initialize(&mut self, host: &mut dyn Host) -> Result<()> {
        if self.attachment.is_some() {
            return Ok(());
        }

        self.session.borrow_mut().attach(host)?;

        // Hooks only hold a weak reference: a dropped bridge goes quiet.
        let session = Rc::downgrade(&self.session);
        let pre_wait = host.add_hook(
            Phase::PreWait,
            Box::new(move |host: &mut dyn Host| {
                if let Some(session) = session.upgrade() {
                    session.borrow_mut().pre_wait(host);
                }
            }),
        );

        let session = Rc::downgrade(&self.session);
        let post_wait = host.add_hook(
            Phase::PostWait,
            Box::new(move |_: &mut dyn Host| {
                if let Some(session) = session.upgrade() {
                    session.borrow_mut().post_wait();
                }
            }),
        );

        self.attachment = Some(Attachment {
            pre_wait,
            post_wait,
        });

        debug!("bridge attached");
        Ok(())
    }

    /// Detaches from `host`.
    ///
    /// Releases every watch, the deadline timer, both hooks and the foreign
    /// context. Does nothing if not attached.
    ///
    /// Call this before dropping an attached bridge. A dropped bridge stops
    /// driving the context and releases it, but its hooks, watches and
    /// timer stay installed in the host as inert entries.
    pub fn teardown(&mut self, host: &mut dyn Host) {
        let Some(attachment) = self.attachment.take() else {
            return;
        };

        host.remove_hook(attachment.pre_wait);
        host.remove_hook(attachment.post_wait);

        self.session.borrow_mut().detach(host);

        debug!("bridge detached");
    }

    pub fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    /// Descriptors currently watched on behalf of the foreign context,
    /// ordered by descriptor.
    pub fn watched(&self) -> Vec<WatchedFd> {
        self.session.borrow().snapshot()
    }

    /// Current wait-set buffer capacity.
    pub fn capacity(&self) -> usize {
        self.session.borrow().wait_set.capacity()
    }

    /// The error that made the bridge stop driving the foreign context, if
    /// any. Cleared by the next successful `initialize`.
    pub fn fault(&self) -> Option<Error> {
        self.session.borrow().fault.clone()
    }

    /// Borrows the foreign context.
    pub fn context(&self) -> Ref<'_, C> {
        Ref::map(self.session.borrow(), |s| &s.context)
    }

    /// Mutably borrows the foreign context.
    pub fn context_mut(&mut self) -> RefMut<'_, C> {
        RefMut::map(self.session.borrow_mut(), |s| &mut s.context)
    }
}

impl<C: ForeignContext + 'static> Drop for Bridge<C> {
    fn drop(&mut self) {
        if self.attachment.is_none() {
            return;
        }

        warn!("bridge dropped while attached; host entries left behind until the host goes away");

        if let Ok(mut session) = self.session.try_borrow_mut() {
            session.context.release();
        }
    }
}
