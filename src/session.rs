// src/session.rs

//! Per-credential login session against the remote account site.
//!
//! The login protocol: GET the login page, pull the `UrlToken` value out of
//! the HTML, POST the login form with it, then check the cookie jar for the
//! session cookie. The cookie's presence is the sole success signal; the
//! response body of the POST says nothing useful. There are no retries at
//! this layer; a failed login ends that credential's capture.

use crate::config::Credential;
use crate::error::{Error, Result};
use crate::fetch::{fetch_until_ready, follow_redirects, FetchRequest, PollPolicy};
use crate::transport::HttpTransport;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};
use url::Url;

/// Cookie set by the site on successful login
pub const SESSION_COOKIE: &str = ".AspNetCore.Cookies";

/// Marker around the login token embedded in the login page HTML
static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#" id="UrlToken" value="([^"]*)""#).unwrap());

/// URL scheme of the remote site, derived from the configured base URL
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid base_url {base_url}: {e}")))?;
        Ok(Self { base })
    }

    pub fn login_page(&self) -> String {
        self.join("login")
    }

    /// Post-login landing page sent along with the login form
    pub fn return_url(&self) -> String {
        self.base.to_string()
    }

    pub fn api(&self, resource: &str) -> String {
        self.join(&format!("api/{resource}"))
    }

    pub fn site(&self) -> &str {
        self.base.as_str()
    }

    fn join(&self, path: &str) -> String {
        // Url::parse guarantees a path, so join cannot fail for our inputs
        self.base
            .join(path)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}{path}", self.base))
    }
}

/// Extract the login token from the login page body
pub fn extract_token(html: &str) -> Result<String> {
    TOKEN_PATTERN
        .captures(html)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| Error::MissingToken("login page did not contain a UrlToken field".into()))
}

/// What the snapshot writer needs from one account's session
///
/// Implemented by [`AccountSession`] over a live transport, and by scripted
/// fakes in tests.
pub trait AccountClient {
    /// Fetch one resource by API path, logging in first if needed
    fn fetch_resource(&mut self, path: &str) -> Result<Vec<u8>>;

    /// Login token captured during authentication, if logged in
    fn url_token(&self) -> Option<&str>;
}

/// One credential's authenticated session
///
/// Owns its transport (and with it the cookie jar): sessions are never
/// shared across credentials. Login happens lazily on the first resource
/// fetch and the session is reused sequentially for the rest of that
/// account's resources.
pub struct AccountSession<T: HttpTransport> {
    transport: T,
    endpoints: Endpoints,
    credential: Credential,
    poll: PollPolicy,
    url_token: Option<String>,
    logged_in: bool,
}

impl<T: HttpTransport> AccountSession<T> {
    pub fn new(transport: T, endpoints: Endpoints, credential: Credential) -> Self {
        Self {
            transport,
            endpoints,
            credential,
            poll: PollPolicy::default(),
            url_token: None,
            logged_in: false,
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    fn ensure_login(&mut self) -> Result<()> {
        if self.logged_in {
            return Ok(());
        }
        self.login()?;
        self.logged_in = true;
        Ok(())
    }

    fn login(&mut self) -> Result<()> {
        debug!("logging in as {}", self.credential.username);
        let page = fetch_until_ready(
            &self.transport,
            &FetchRequest::get(self.endpoints.login_page()),
            &self.poll,
        )?;
        let token = extract_token(&String::from_utf8_lossy(&page))?;

        let form = vec![
            ("Username", self.credential.username.clone()),
            ("Password", self.credential.password.clone()),
            ("RememberLogin", "true".to_string()),
            ("ReturnUrl", self.endpoints.return_url()),
            ("UrlToken", token.clone()),
        ];
        follow_redirects(
            &self.transport,
            &FetchRequest::PostForm {
                url: self.endpoints.login_page(),
                form,
            },
        )?;

        if !self
            .transport
            .has_cookie(self.endpoints.site(), SESSION_COOKIE)
        {
            return Err(Error::Authentication(format!(
                "login rejected for {}",
                self.credential.username
            )));
        }

        info!("logged in as {}", self.credential.username);
        self.url_token = Some(token);
        Ok(())
    }
}

impl<T: HttpTransport> AccountClient for AccountSession<T> {
    fn fetch_resource(&mut self, path: &str) -> Result<Vec<u8>> {
        self.ensure_login()?;
        fetch_until_ready(
            &self.transport,
            &FetchRequest::get(self.endpoints.api(path)),
            &self.poll,
        )
    }

    fn url_token(&self) -> Option<&str> {
        self.url_token.as_deref()
    }
}
