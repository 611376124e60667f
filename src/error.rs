use std::fmt;

/// A basic error type from this library.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The bus failed to carry a call or the signal feed, e.g. the
    /// connection dropped or a call timed out.
    Transport(String),

    /// The daemon answered a call with an error reply.
    Protocol {
        /// The bus error name, e.g. `org.freedesktop.Avahi.CollisionError`.
        name: String,
        /// The human readable message attached to the reply.
        message: String,
    },

    /// A signal or reply body does not have the expected shape.
    Decode(String),

    /// The server has been closed.
    Closed,

    /// A generic error message.
    Msg(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(s) => write!(f, "bus transport failed: {}", s),
            Error::Protocol { name, message } => write!(f, "{}: {}", name, message),
            Error::Decode(s) => write!(f, "decoding of message body failed, reason: {}", s),
            Error::Closed => write!(f, "server is closed"),
            Error::Msg(s) => write!(f, "{}", s),
        }
    }
}

impl std::error::Error for Error {}

/// One and only `Result` type from this library crate.
pub type Result<T> = core::result::Result<T, Error>;

/// A simple macro to report all kinds of errors.
macro_rules! e_fmt {
  ($($arg:tt)+) => {
      $crate::error::Error::Msg(format!($($arg)+))
  };
}

pub(crate) use e_fmt;
