//! Failures of an app chain and the control-flow signal that shares its channel.

use crate::reply::{IntoReply, Reply};
use mach_http::{ContentError, LocationError};
use std::error::Error as StdError;
use std::io;
use thiserror::Error;

pub(crate) type BoxError = Box<dyn StdError + Send + Sync>;

/// The result every [`App`](crate::App) resolves to.
pub type AppResult = Result<Reply, Interrupt>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Location(#[from] LocationError),

    #[error("http error: {source}")]
    Http {
        #[from]
        source: http::Error,
    },

    /// Misconfiguration an integrator has to fix: a missing upstream middleware, an invalid
    /// route pattern, a malformed option.
    #[error("usage error: {reason}")]
    Usage { reason: String },

    #[error("upstream error: {source}")]
    Upstream { source: BoxError },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error(transparent)]
    Other(BoxError),
}

impl Error {
    pub fn usage<S: ToString>(reason: S) -> Self {
        Self::Usage { reason: reason.to_string() }
    }

    pub fn upstream<E: Into<BoxError>>(e: E) -> Self {
        Self::Upstream { source: e.into() }
    }

    pub fn other<E: Into<BoxError>>(e: E) -> Self {
        Self::Other(e.into())
    }
}

/// Why an app chain stopped short of a regular reply.
///
/// `Halt` ends the chain early with a reply and is not a failure: [`Catch`](crate::middleware::Catch)
/// turns it back into a normal result. `Error` keeps propagating through every boundary.
#[derive(Debug)]
pub enum Interrupt {
    Halt(Reply),
    Error(Error),
}

impl Interrupt {
    pub fn halt(reply: impl IntoReply) -> Self {
        Self::Halt(reply.into_reply())
    }

    pub fn is_halt(&self) -> bool {
        matches!(self, Self::Halt(_))
    }
}

impl From<Error> for Interrupt {
    fn from(e: Error) -> Self {
        Self::Error(e)
    }
}

macro_rules! interrupt_from {
    ($($source:ty),* $(,)?) => {
        $(
            impl From<$source> for Interrupt {
                fn from(e: $source) -> Self {
                    Self::Error(Error::from(e))
                }
            }
        )*
    };
}

interrupt_from!(ContentError, LocationError, http::Error, io::Error);
