//! Error taxonomy for the fetch-parse-filter-dispatch pipeline.

use thiserror::Error;

/// Failure of a single remote fetch attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The server answered with a status other than 200.
    #[error("HTTP {status}")]
    Status { status: u16 },

    /// DNS, connect, timeout, TLS or body read failure.
    #[error("{cause}")]
    Transport { cause: String },

    /// The resolved reference is not a usable URL.
    #[error("invalid url {url}: {cause}")]
    InvalidUrl { url: String, cause: String },
}

/// Bad input from the invoking actor. Reported without logging.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid mode `{0}` (expected elevated or restricted)")]
    InvalidMode(String),

    #[error("no alias named `{0}`")]
    UnknownAlias(String),

    #[error("unknown subcommand `{0}`")]
    UnknownSubcommand(String),

    #[error("only interactive actors can do this")]
    NotInteractive,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("remote fetch failed: {0}")]
    RemoteFetch(#[from] FetchError),

    #[error("dispatch of `{command}` failed: {cause}")]
    Dispatch { command: String, cause: String },

    #[error("store i/o failed for {path}: {cause}")]
    StoreIo { path: String, cause: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl Error {
    pub fn dispatch(command: &str, cause: impl std::fmt::Display) -> Self {
        Error::Dispatch {
            command: command.to_string(),
            cause: cause.to_string(),
        }
    }

    pub fn store_io(path: impl std::fmt::Display, cause: impl std::fmt::Display) -> Self {
        Error::StoreIo {
            path: path.to_string(),
            cause: cause.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Render an error and its whole `source()` chain as `outer: inner: ...`.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !rendered.contains(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        source = inner.source();
    }
    rendered
}
