//! Error types.

use thiserror::Error;

/// Returned by [`ForeignContext::acquire`](crate::context::ForeignContext::acquire)
/// when the context cannot be owned by this thread.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("foreign context could not be acquired: {reason}")]
pub struct AttachError {
    reason: String,
}

impl AttachError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Errors surfaced by the bridge.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The foreign context could not be acquired at initialization.
    #[error(transparent)]
    Attach(#[from] AttachError),

    /// The foreign context asked for more wait entries than the configured
    /// ceiling allows.
    #[error("foreign context wants {requested} wait entries, ceiling is {ceiling}")]
    WaitSetTooLarge { requested: usize, ceiling: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_clone_keeps_details() {
        let err = Error::WaitSetTooLarge {
            requested: 70_000,
            ceiling: 65_536,
        };
        assert_eq!(err.clone(), err);
        assert_eq!(
            err.to_string(),
            "foreign context wants 70000 wait entries, ceiling is 65536"
        );

        let err = Error::from(AttachError::new("owned elsewhere"));
        assert_eq!(err.clone(), err);
        assert_eq!(
            err.to_string(),
            "foreign context could not be acquired: owned elsewhere"
        );
    }
}
