// src/transport.rs

//! Blocking HTTP transport with an explicit cookie jar.
//!
//! Redirect handling is disabled on the underlying client: the capture
//! protocol follows redirects itself (see [`crate::fetch`]) because a login
//! POST redirects through several hops while the session cookie is being
//! established, and each hop must be re-issued as a GET.
//!
//! One transport instance carries one cookie jar, and one is created per
//! credential: the session cookie for one account must never leak into
//! another account's fetches.

use crate::error::{Error, Result};
use reqwest::blocking::Client;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::LOCATION;
use reqwest::redirect;
use std::sync::Arc;
use url::Url;

/// One HTTP exchange's observable outcome
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub location: Option<String>,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

/// Minimal blocking HTTP surface the capture engine needs
///
/// Abstracted so the fetch loops and the login protocol are testable against
/// a scripted fake without a live server.
pub trait HttpTransport {
    fn get(&self, url: &str) -> Result<HttpReply>;

    fn post_form(&self, url: &str, form: &[(&str, String)]) -> Result<HttpReply>;

    /// Whether the cookie jar currently holds a cookie with this name for
    /// the given URL
    fn has_cookie(&self, url: &str, name: &str) -> bool;
}

/// Production transport over a blocking reqwest client
pub struct ReqwestTransport {
    client: Client,
    jar: Arc<Jar>,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .cookie_provider(jar.clone())
            .build()
            .map_err(|e| Error::HttpProtocol(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, jar })
    }

    fn reply(response: reqwest::blocking::Response) -> Result<HttpReply> {
        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = response
            .bytes()
            .map_err(|e| Error::HttpProtocol(format!("failed to read response body: {e}")))?
            .to_vec();
        Ok(HttpReply {
            status,
            location,
            body,
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str) -> Result<HttpReply> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::HttpProtocol(format!("request to {url} failed: {e}")))?;
        Self::reply(response)
    }

    fn post_form(&self, url: &str, form: &[(&str, String)]) -> Result<HttpReply> {
        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .map_err(|e| Error::HttpProtocol(format!("request to {url} failed: {e}")))?;
        Self::reply(response)
    }

    fn has_cookie(&self, url: &str, name: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(header) = self.jar.cookies(&parsed) else {
            return false;
        };
        let Ok(cookies) = header.to_str() else {
            return false;
        };
        cookies
            .split("; ")
            .any(|pair| pair.split('=').next() == Some(name))
    }
}
