//! HTTP client for the Lattice load API
//!
//! This is the client used by the end-to-end test suites: it issues a load
//! query against a running server and hands back the raw result rows for
//! assertion. The server answers long-running loads with a `Continue wait`
//! body; [`Client::load`] transparently re-polls until data arrives or the
//! configured attempt budget runs out.

mod query;

pub use query::{Filter, FilterOperator, Query, TimeDimension};

use std::time::Duration;

use reqwest::{IntoUrl, Method, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use url::Url;

/// Body sent by the server when a load is still being computed and the
/// client should ask again.
const CONTINUE_WAIT: &str = "Continue wait";

const DEFAULT_CONTINUE_WAIT_ATTEMPTS: usize = 180;
const DEFAULT_CONTINUE_WAIT_DELAY: Duration = Duration::from_secs(1);

/// Primary error type for the [`Client`]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("base URL error: {0}")]
    BaseUrl(#[source] reqwest::Error),

    #[error("request URL error: {0}")]
    RequestUrl(#[from] url::ParseError),

    #[error("failed to parse JSON response: {0}")]
    Json(#[source] reqwest::Error),

    #[error("failed to read plaintext response: {0}")]
    Text(#[source] reqwest::Error),

    #[error("server responded with error [{code}]: {message}")]
    ApiError { code: StatusCode, message: String },

    #[error("load did not finish after {attempts} continue-wait polls")]
    ContinueWaitTimeout { attempts: usize },

    #[error("failed to send {method} {url} request: {source}")]
    RequestSend {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl Error {
    fn request_send(method: Method, url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::RequestSend {
            method,
            url: url.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for the HTTP API of a running Lattice server
#[derive(Debug, Clone)]
pub struct Client {
    /// The base URL for making requests to the server
    base_url: Url,
    /// The `Bearer` token to use for authenticating on each request
    auth_token: Option<Secret<String>>,
    /// A [`reqwest::Client`] for handling HTTP requests
    http_client: reqwest::Client,
    continue_wait_attempts: usize,
    continue_wait_delay: Duration,
}

impl Client {
    /// Create a new [`Client`]
    pub fn new<U: IntoUrl>(base_url: U) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into_url().map_err(Error::BaseUrl)?,
            auth_token: None,
            http_client: reqwest::Client::new(),
            continue_wait_attempts: DEFAULT_CONTINUE_WAIT_ATTEMPTS,
            continue_wait_delay: DEFAULT_CONTINUE_WAIT_DELAY,
        })
    }

    /// Set the `Bearer` token that will be sent with each request
    pub fn with_auth_token<S: Into<String>>(mut self, auth_token: S) -> Self {
        self.auth_token = Some(Secret::new(auth_token.into()));
        self
    }

    /// Override the continue-wait polling budget. Mostly useful to keep
    /// failure tests fast.
    pub fn with_continue_wait(mut self, attempts: usize, delay: Duration) -> Self {
        self.continue_wait_attempts = attempts;
        self.continue_wait_delay = delay;
        self
    }

    /// Issue a load query via `POST /api/v1/load` and return the result set
    ///
    /// # Example
    /// ```no_run
    /// # use lattice_client::{Client, Query};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    /// let client = Client::new("http://localhost:4000")?;
    /// let result = client
    ///     .load(&Query::default().with_measure("Orders.count"))
    ///     .await?;
    /// println!("{:?}", result.raw_data());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn load(&self, query: &Query) -> Result<ResultSet> {
        #[derive(Serialize)]
        struct Req<'a> {
            query: &'a Query,
        }

        let url = self.base_url.join("/api/v1/load")?;

        let mut attempts = 0;
        loop {
            let mut request = self.http_client.post(url.clone()).json(&Req { query });
            if let Some(token) = &self.auth_token {
                request = request.bearer_auth(token.expose_secret());
            }

            let response = request
                .send()
                .await
                .map_err(|source| Error::request_send(Method::POST, url.as_str(), source))?;

            let code = response.status();
            if !code.is_success() {
                let message = response.text().await.map_err(Error::Text)?;
                return Err(Error::ApiError { code, message });
            }

            let body: LoadResponse = response.json().await.map_err(Error::Json)?;
            match body {
                LoadResponse {
                    error: Some(error), ..
                } if error == CONTINUE_WAIT => {
                    attempts += 1;
                    if attempts >= self.continue_wait_attempts {
                        return Err(Error::ContinueWaitTimeout { attempts });
                    }
                    tokio::time::sleep(self.continue_wait_delay).await;
                }
                LoadResponse {
                    error: Some(message),
                    ..
                } => return Err(Error::ApiError { code, message }),
                LoadResponse {
                    data: Some(data), ..
                } => return Ok(ResultSet { data }),
                LoadResponse {
                    data: None,
                    error: None,
                } => {
                    return Err(Error::ApiError {
                        code,
                        message: "response contained neither data nor error".into(),
                    })
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoadResponse {
    #[serde(default)]
    data: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    error: Option<String>,
}

/// The result of a successful load query
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    data: Vec<serde_json::Value>,
}

impl ResultSet {
    /// The raw result rows, exactly as returned by the server
    pub fn raw_data(&self) -> &[serde_json::Value] {
        &self.data
    }

    pub fn into_raw_data(self) -> Vec<serde_json::Value> {
        self.data
    }
}
