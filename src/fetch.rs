// src/fetch.rs

//! Resilient fetch: redirect following plus busy polling.
//!
//! The remote API materializes responses from a server-side cache; until a
//! result is ready it answers with the busy sentinel body. A logical fetch
//! therefore runs two nested loops: the inner loop follows redirects until a
//! final status, the outer loop sleeps and retries the whole fetch while the
//! body is the sentinel.
//!
//! Both loops are unbounded by default, matching the remote contract; a
//! permanently busy server stalls the run (known limitation). A maximum
//! poll count can be set through [`PollPolicy`] to turn exhaustion into an
//! error instead.

use crate::error::{Error, Result};
use crate::transport::HttpTransport;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Body signaling "result not ready yet, retry"
pub const BUSY_SENTINEL: &[u8] = br#"{"cacheState":"working"}"#;

/// Fixed pause between busy polls
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// One logical request, before any redirect has been followed
#[derive(Debug, Clone)]
pub enum FetchRequest {
    Get { url: String },
    PostForm { url: String, form: Vec<(&'static str, String)> },
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self::Get { url: url.into() }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Get { url } => url,
            Self::PostForm { url, .. } => url,
        }
    }
}

/// Busy-poll tuning
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Sleep between polls
    pub interval: Duration,
    /// Maximum number of busy responses tolerated before giving up;
    /// `None` polls forever
    pub max_polls: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
            max_polls: None,
        }
    }
}

/// Issue a request and follow redirects until a final status
///
/// A redirect is re-issued as a GET against its `Location` header, however
/// many hops it takes. Any non-success, non-redirect status, or a redirect
/// without a `Location`, fails the fetch.
pub fn follow_redirects<T: HttpTransport>(
    transport: &T,
    request: &FetchRequest,
) -> Result<Vec<u8>> {
    debug!("sending request: {}", request.url());
    let mut reply = match request {
        FetchRequest::Get { url } => transport.get(url)?,
        FetchRequest::PostForm { url, form } => transport.post_form(url, form)?,
    };

    loop {
        if reply.is_success() {
            return Ok(reply.body);
        }
        if reply.is_redirect() {
            let location = reply.location.ok_or_else(|| {
                Error::HttpProtocol(format!(
                    "redirect from {} missing Location header",
                    request.url()
                ))
            })?;
            debug!("following redirect to {location}");
            reply = transport.get(&location)?;
            continue;
        }
        return Err(Error::HttpProtocol(format!(
            "unexpected status {} from {}",
            reply.status,
            request.url()
        )));
    }
}

/// Fetch until the body is no longer the busy sentinel
pub fn fetch_until_ready<T: HttpTransport>(
    transport: &T,
    request: &FetchRequest,
    policy: &PollPolicy,
) -> Result<Vec<u8>> {
    let mut polls = 0u32;
    loop {
        let body = follow_redirects(transport, request)?;
        if body != BUSY_SENTINEL {
            return Ok(body);
        }

        polls += 1;
        if let Some(max) = policy.max_polls {
            if polls >= max {
                return Err(Error::HttpProtocol(format!(
                    "{} still busy after {polls} polls",
                    request.url()
                )));
            }
        }
        info!("{} busy, retrying shortly", request.url());
        thread::sleep(policy.interval);
    }
}
