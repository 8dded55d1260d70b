use super::Reactor;

use std::io;

/// Builder for configuring and creating a reactor.
///
/// # Examples
///
/// ```rust,ignore
/// let reactor = ReactorBuilder::new()
///     .event_capacity(128)
///     .build()?;
/// ```
pub struct ReactorBuilder {
    /// Maximum number of readiness events fetched per wait.
    event_capacity: usize,
}

impl ReactorBuilder {
    /// Creates a new `ReactorBuilder` with default configuration.
    ///
    /// By default, up to 64 events are fetched per wait.
    pub fn new() -> Self {
        Self { event_capacity: 64 }
    }

    /// Sets how many readiness events a single wait can report.
    ///
    /// Descriptors that are ready beyond this count are reported on the
    /// next turn.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn event_capacity(mut self, n: usize) -> Self {
        assert!(n > 0, "event_capacity must be > 0");

        self.event_capacity = n;
        self
    }

    /// Builds the reactor with the configured options.
    ///
    /// This creates the underlying epoll instance.
    pub fn build(self) -> io::Result<Reactor> {
        Reactor::with_capacity(self.event_capacity)
    }
}

impl Default for ReactorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
