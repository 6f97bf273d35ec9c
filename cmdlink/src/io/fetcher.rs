//! Remote script retrieval.
//!
//! The [`Fetcher`] trait decouples the pipeline from the HTTP transport. Tests
//! use scripted fetchers that return canned bodies without touching the
//! network.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use tracing::{debug, instrument, warn};

use crate::error::{FetchError, error_chain};
use crate::io::config::AppConfig;

/// Per-call transport settings, taken from the current config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl FetchSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            user_agent: cfg.fetch.user_agent.clone(),
            connect_timeout: Duration::from_millis(cfg.timeouts.connect_ms),
            read_timeout: Duration::from_millis(cfg.timeouts.read_ms),
        }
    }
}

/// Abstraction over the remote fetch transport.
pub trait Fetcher: Send + Sync {
    /// Single GET of `url`. Only HTTP 200 counts as success.
    fn fetch(&self, url: &str, settings: &FetchSettings) -> Result<String, FetchError>;

    /// True if `url` answers at all within `timeout`.
    fn is_reachable(&self, url: &str, timeout: Duration) -> bool;
}

/// Fetcher backed by a blocking `reqwest` client.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpFetcher;

impl HttpFetcher {
    fn client(settings: &FetchSettings) -> Result<Client, FetchError> {
        // The blocking client exposes a connect timeout and a whole-request
        // timeout; the read budget starts once the connect budget is spent.
        Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.connect_timeout + settings.read_timeout)
            .build()
            .map_err(|err| FetchError::Transport {
                cause: error_chain(&err),
            })
    }
}

impl Fetcher for HttpFetcher {
    #[instrument(skip_all, fields(url = %url))]
    fn fetch(&self, url: &str, settings: &FetchSettings) -> Result<String, FetchError> {
        let parsed = reqwest::Url::parse(url).map_err(|err| FetchError::InvalidUrl {
            url: url.to_string(),
            cause: err.to_string(),
        })?;
        let client = Self::client(settings)?;

        debug!("sending request");
        let response = client
            .get(parsed)
            .header(USER_AGENT, &settings.user_agent)
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(status = status.as_u16(), "unexpected fetch status");
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().map_err(transport_error)?;
        debug!(bytes = body.len(), "fetched body");
        Ok(body)
    }

    #[instrument(skip_all, fields(url = %url, timeout_ms = timeout.as_millis() as u64))]
    fn is_reachable(&self, url: &str, timeout: Duration) -> bool {
        let client = match Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                warn!(err = %err, "failed to build reachability client");
                return false;
            }
        };
        match client.head(url).send() {
            Ok(_) => true,
            Err(err) => {
                debug!(err = %error_chain(&err), "reachability check failed");
                false
            }
        }
    }
}

fn transport_error(err: reqwest::Error) -> FetchError {
    let chain = error_chain(&err);
    let cause = if err.is_timeout() && !chain.contains("timed out") {
        format!("connection timed out: {chain}")
    } else {
        chain
    };
    FetchError::Transport { cause }
}
