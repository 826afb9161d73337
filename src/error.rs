//! This module implements the error type used throughout this crate.

use nix::errno::Errno;
use thiserror::Error;

/// The error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Forking, requesting trace authority or attaching failed at the OS level.
    #[error("{context}: {source}")]
    Acquisition {
        context: &'static str,
        #[source]
        source: Errno,
    },

    /// The child process reported a failure before or during `exec`.
    #[error("{0}")]
    Execution(String),

    /// A precondition was violated before the OS was consulted.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Resuming or waiting on the traced process failed.
    #[error("{context}: {source}")]
    Operation {
        context: &'static str,
        #[source]
        source: Errno,
    },

    /// Represents [`std::io::Error`].
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn acquisition(context: &'static str) -> impl FnOnce(Errno) -> Self {
        move |source| Self::Acquisition { context, source }
    }

    pub(crate) fn operation(context: &'static str) -> impl FnOnce(Errno) -> Self {
        move |source| Self::Operation { context, source }
    }
}
