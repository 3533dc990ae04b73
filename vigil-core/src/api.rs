//! HTTP client for the monitoring server.
//!
//! Authentication is a session cookie obtained from the server's form
//! login; the cookie store on the underlying client carries it on every
//! subsequent call. All requests share one bounded timeout so nothing in
//! the engine can block indefinitely on the network.

use std::fmt;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};
use vigil_model::{Category, ChangeEvent, MonitoredPath};

use crate::error::Result;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Quick reachability probe against the login page.
    pub async fn check_connection(&self) -> bool {
        match self.client.get(self.url("/login")).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(error = %err, "server connection check failed");
                false
            }
        }
    }

    /// Form login. The server answers with a redirect (or 200) and sets the
    /// session cookie; success is confirmed by probing a protected endpoint,
    /// since the login form itself answers 200 on bad credentials too.
    pub async fn login(&self, username: &str, password: &str) -> Result<bool> {
        let response = self
            .client
            .post(self.url("/login"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;

        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            return Ok(false);
        }

        let probe = self.client.get(self.url("/api/paths")).send().await?;
        let authenticated = probe.status().is_success();
        if authenticated {
            info!(user = username, "logged in");
        }
        Ok(authenticated)
    }

    /// Best-effort logout; the session is server-owned, so a failure here
    /// only means the cookie dies with the process instead.
    pub async fn logout(&self) {
        if let Err(err) = self.client.get(self.url("/logout")).send().await {
            debug!(error = %err, "logout request failed");
        }
    }

    /// Path registry snapshot. Fails soft: any network or parse error yields
    /// an empty list, leaving it to the caller whether to touch existing
    /// watches.
    pub async fn load_paths(&self) -> Vec<MonitoredPath> {
        match self.fetch_paths().await {
            Ok(paths) => paths,
            Err(err) => {
                warn!(error = %err, "failed to load monitored paths");
                Vec::new()
            }
        }
    }

    pub async fn fetch_paths(&self) -> Result<Vec<MonitoredPath>> {
        let paths = self
            .client
            .get(self.url("/api/paths"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(paths)
    }

    pub async fn fetch_categories(&self) -> Result<Vec<Category>> {
        let categories = self
            .client
            .get(self.url("/api/categories"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(categories)
    }

    /// Report one change event. At-most-once: the caller drops any error.
    pub async fn report_event(&self, event: &ChangeEvent) -> Result<()> {
        let response = self
            .client
            .post(self.url("/api/log_event"))
            .json(event)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("event report rejected: session expired");
        }
        response.error_for_status()?;
        Ok(())
    }
}
