use std::sync::Mutex;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use reqwest::blocking::{Client, Request};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, RANGE};
use reqwest::{Method, StatusCode, Url};

use super::RangeReader;
use crate::error::{PmtError, PmtResult};

/// Maximum number of retries for a transient (5xx) HTTP failure.
const MAX_RETRIES: u32 = 3;

/// Credentials supplied with every request issued by an [`HttpRangeReader`].
#[derive(Clone)]
pub enum Authenticator {
    /// No credentials.
    None,
    /// `Authorization: Basic base64(user:pass)`.
    Basic {
        /// Username.
        user: String,
        /// Password.
        password: String,
    },
    /// `Authorization: Bearer <token>`.
    Bearer(String),
    /// A single API-key header, e.g. `x-api-key: <value>`.
    ApiKey {
        /// Header name.
        header: String,
        /// Header value.
        value: String,
    },
    /// Arbitrary static headers sent with every request.
    Headers(Vec<(String, String)>),
}

impl Authenticator {
    fn apply(&self, headers: &mut HeaderMap) -> PmtResult<()> {
        match self {
            Authenticator::None => {}
            Authenticator::Basic { user, password } => {
                let value = format!("Basic {}", BASE64.encode(format!("{user}:{password}")));
                headers.insert(AUTHORIZATION, header_value(&value)?);
            }
            Authenticator::Bearer(token) => {
                headers.insert(AUTHORIZATION, header_value(&format!("Bearer {token}"))?);
            }
            Authenticator::ApiKey { header, value } => {
                let name = HeaderName::try_from(header.as_str())
                    .map_err(|e| PmtError::Transport(e.to_string()))?;
                headers.insert(name, header_value(value)?);
            }
            Authenticator::Headers(pairs) => {
                for (name, value) in pairs {
                    let name = HeaderName::try_from(name.as_str())
                        .map_err(|e| PmtError::Transport(e.to_string()))?;
                    headers.insert(name, header_value(value)?);
                }
            }
        }
        Ok(())
    }
}

fn header_value(v: &str) -> PmtResult<HeaderValue> {
    HeaderValue::try_from(v).map_err(|e| PmtError::Transport(e.to_string()))
}

/// A [`RangeReader`] backed by HTTP `Range` requests.
pub struct HttpRangeReader {
    client: Client,
    url: Url,
    auth: Authenticator,
    size: Mutex<Option<u64>>,
}

impl HttpRangeReader {
    /// Creates a reader for `url` using `client`, with no authentication.
    pub fn new(client: Client, url: Url) -> Self {
        Self::with_auth(client, url, Authenticator::None)
    }

    /// Creates a reader for `url`, sending `auth`'s credentials with every request.
    pub fn with_auth(client: Client, url: Url, auth: Authenticator) -> Self {
        Self {
            client,
            url,
            auth,
            size: Mutex::new(None),
        }
    }

    fn execute_with_retry(&self, request_fn: impl Fn() -> PmtResult<Request>) -> PmtResult<reqwest::blocking::Response> {
        let mut attempt = 0;
        loop {
            let request = request_fn()?;
            match self.client.execute(request) {
                Ok(resp) if resp.status().is_server_error() && attempt < MAX_RETRIES => {
                    attempt += 1;
                    std::thread::sleep(Duration::from_millis(100 * 2u64.pow(attempt)));
                }
                Ok(resp) => return Ok(resp.error_for_status()?),
                Err(e) if attempt < MAX_RETRIES && (e.is_connect() || e.is_timeout()) => {
                    attempt += 1;
                    std::thread::sleep(Duration::from_millis(100 * 2u64.pow(attempt)));
                }
                Err(e) => return Err(PmtError::Reqwest(e)),
            }
        }
    }
}

impl RangeReader for HttpRangeReader {
    fn read(&self, offset: u64, length: u32) -> PmtResult<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }
        let end = offset + u64::from(length) - 1;
        let range = format!("bytes={offset}-{end}");

        let response = self.execute_with_retry(|| {
            let mut request = Request::new(Method::GET, self.url.clone());
            request.headers_mut().insert(RANGE, header_value(&range)?);
            self.auth.apply(request.headers_mut())?;
            Ok(request)
        })?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {
                let bytes = response.bytes()?;
                if bytes.len() as u64 > u64::from(length) {
                    Ok(bytes.slice(0..length as usize))
                } else {
                    Ok(bytes)
                }
            }
            // Server ignored the Range header and sent the whole resource; slice out
            // the requested window ourselves.
            StatusCode::OK => {
                let bytes = response.bytes()?;
                let start = usize::try_from(offset).unwrap_or(usize::MAX).min(bytes.len());
                let end = start.saturating_add(length as usize).min(bytes.len());
                Ok(bytes.slice(start..end))
            }
            other => Err(PmtError::Transport(format!(
                "range request returned unexpected status {other}"
            ))),
        }
    }

    fn size(&self) -> PmtResult<u64> {
        #[expect(clippy::unwrap_used)]
        if let Some(size) = *self.size.lock().unwrap() {
            return Ok(size);
        }

        let response = self.execute_with_retry(|| {
            let mut request = Request::new(Method::HEAD, self.url.clone());
            self.auth.apply(request.headers_mut())?;
            Ok(request)
        })?;

        let len = response
            .content_length()
            .ok_or_else(|| PmtError::Transport("HEAD response missing Content-Length".into()))?;

        #[expect(clippy::unwrap_used)]
        {
            *self.size.lock().unwrap() = Some(len);
        }
        Ok(len)
    }
}
