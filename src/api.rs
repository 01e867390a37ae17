//! Rate-limited client for Gazelle-based tracker APIs (RED and OPS).

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use serde_json::Value as Json;

const API_TIMEOUT: Duration = Duration::from_secs(15);
const RATE_LIMIT_POLL: Duration = Duration::from_millis(200);
const DEFAULT_MAX_RETRIES: u32 = 20;
const MAX_RETRY_WAIT: u64 = 600;

/// JSON client for `<site_url>/ajax.php`.
///
/// One instance per site is shared process-wide. A single mutex serializes
/// the rate-limit accounting together with the outgoing request, so
/// concurrent callers (the webhook server) cannot violate the per-site
/// limit.
pub struct GazelleApi {
    client: Client,
    sitename: &'static str,
    site_url: String,
    tracker_url: String,
    api_url: String,
    auth_header: String,
    rate_limit: Duration,
    max_retries: u32,
    last_used: Mutex<Option<Instant>>,
    announce_url: Mutex<Option<String>>,
}

impl GazelleApi {
    pub fn new(
        sitename: &'static str,
        site_url: impl Into<String>,
        tracker_url: impl Into<String>,
        auth_header: String,
        rate_limit: Duration,
    ) -> crate::Result<Self> {
        let site_url = site_url.into();
        let api_url = format!("{site_url}/ajax.php");

        Ok(Self {
            client: Client::builder().timeout(API_TIMEOUT).build()?,
            sitename,
            site_url,
            tracker_url: tracker_url.into(),
            api_url,
            auth_header,
            rate_limit,
            max_retries: DEFAULT_MAX_RETRIES,
            last_used: Mutex::new(None),
            announce_url: Mutex::new(None),
        })
    }

    /// Client for RED. The API key is sent bare in the Authorization header.
    pub fn red(api_key: &str) -> crate::Result<Self> {
        Self::new(
            "RED",
            "https://redacted.sh",
            "https://flacsfor.me",
            api_key.to_string(),
            Duration::from_secs(2),
        )
    }

    /// Client for OPS. The API key is sent as `Authorization: token <key>`.
    pub fn ops(api_key: &str) -> crate::Result<Self> {
        Self::new(
            "OPS",
            "https://orpheus.network",
            "https://home.opsfet.ch",
            format!("token {api_key}"),
            Duration::from_secs(2),
        )
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn sitename(&self) -> &'static str {
        self.sitename
    }

    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    /// Account information for the configured key. Raises
    /// [`Authentication`](crate::Error::Authentication) unless the API
    /// reports success.
    pub fn account_info(&self) -> crate::Result<Json> {
        let response = self.get("index", &[])?;
        if response.get("status").and_then(Json::as_str) == Some("success") {
            Ok(response)
        } else {
            let error = response
                .get("error")
                .and_then(Json::as_str)
                .unwrap_or("unknown error");
            Err(crate::Error::Authentication(error.to_string()))
        }
    }

    /// Look a torrent up by infohash. Success and application-level failure
    /// responses are both returned to the caller; only transport errors are
    /// retried.
    pub fn find_torrent(&self, torrent_hash: &str) -> crate::Result<Json> {
        self.get("torrent", &[("hash", torrent_hash)])
    }

    /// The passkey announce URL, fetched via `account_info` on first use and
    /// memoized for the lifetime of the client.
    pub fn announce_url(&self) -> crate::Result<String> {
        if let Some(url) = self.announce_url.lock().unwrap().clone() {
            return Ok(url);
        }

        let account_info = self.account_info().map_err(|e| {
            crate::Error::Authentication(format!("Authentication to {} failed: {e}", self.sitename))
        })?;
        let passkey = account_info
            .pointer("/response/passkey")
            .and_then(Json::as_str)
            .ok_or_else(|| {
                crate::Error::Authentication(format!(
                    "{} account info did not include a passkey",
                    self.sitename
                ))
            })?;

        let url = format!("{}/{passkey}/announce", self.tracker_url);
        *self.announce_url.lock().unwrap() = Some(url.clone());
        Ok(url)
    }

    fn get(&self, action: &str, params: &[(&str, &str)]) -> crate::Result<Json> {
        // Held across the request so rate accounting and the call are atomic
        let mut last_used = self.last_used.lock().unwrap();

        let mut attempt = 1;
        loop {
            while let Some(last) = *last_used {
                if last.elapsed() >= self.rate_limit {
                    break;
                }
                thread::sleep(RATE_LIMIT_POLL);
            }
            *last_used = Some(Instant::now());

            let description = match self.request(action, params) {
                Ok(json) => return Ok(json),
                Err(description) => description,
            };

            if attempt >= self.max_retries {
                return Err(crate::Error::MaxRetries(format!(
                    "{description} (attempt {attempt}/{})",
                    self.max_retries
                )));
            }

            let wait = retry_wait_time(attempt);
            tracing::warn!(
                "{}: {description} (attempt {attempt}/{}), retrying in {}s",
                self.sitename,
                self.max_retries,
                wait.as_secs()
            );
            thread::sleep(wait);
            attempt += 1;
        }
    }

    fn request(&self, action: &str, params: &[(&str, &str)]) -> Result<Json, String> {
        let response = self
            .client
            .get(&self.api_url)
            .header("Authorization", &self.auth_header)
            .query(&[("action", action)])
            .query(params)
            .send()
            .map_err(describe_transport_error)?;

        let text = response.text().map_err(describe_transport_error)?;
        serde_json::from_str(&text).map_err(|_| "JSON decoding of response failed".to_string())
    }
}

fn describe_transport_error(error: reqwest::Error) -> String {
    if error.is_timeout() {
        "Request timed out".to_string()
    } else if error.is_connect() {
        "Unable to connect".to_string()
    } else {
        format!("Request failed: {error}")
    }
}

/// Backoff before retry `attempt + 1`: floor(e^attempt) seconds, capped at
/// ten minutes. Attempt 1 waits 2s, attempt 10 hits the cap.
fn retry_wait_time(attempt: u32) -> Duration {
    let exponential = (attempt as f64).exp() as u64;
    Duration::from_secs(exponential.min(MAX_RETRY_WAIT))
}
