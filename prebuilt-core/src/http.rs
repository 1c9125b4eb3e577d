pub use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, LINK};
pub use reqwest::{Response, StatusCode};

use crate::{Result, config::HttpConfig, error};
use backon::{ExponentialBuilder, Retryable};
use reqwest::Client;
use snafu::ResultExt;
use std::{future::Future, time::Duration};
use tokio_util::sync::CancellationToken;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client wrapper with retry, user agent, proxy, timeout and optional bearer authentication.
///
/// Every provider owns one of these.  Cloning is cheap and clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpConfig,
}

impl HttpClient {
    /// Build a new unauthenticated [`HttpClient`] with the given configuration.
    pub fn new(config: &HttpConfig) -> Result<Self> {
        Self::build(config, HeaderMap::new())
    }

    /// Build a new [`HttpClient`] that sends `Authorization: Bearer <token>` with every request
    /// that does not set its own `Authorization` header.
    ///
    /// `provider` is only used to name the provider in the error if the token is not a valid
    /// header value.
    pub fn with_bearer_token(config: &HttpConfig, provider: &str, token: &str) -> Result<Self> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
            error::Error::InvalidAuthToken {
                provider: provider.to_string(),
            }
        })?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);

        Self::build(config, headers)
    }

    fn build(config: &HttpConfig, default_headers: HeaderMap) -> Result<Self> {
        let user_agent = format!(
            "prebuilt/{} ({})",
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_REPOSITORY")
        );

        let mut builder = Client::builder()
            .user_agent(user_agent)
            .default_headers(default_headers)
            .timeout(config.timeout)
            .connect_timeout(CONNECT_TIMEOUT);

        if let Some(ref proxy_url) = config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| error::Error::HttpClientBuild {
                message: format!("invalid proxy URL '{}': {}", proxy_url, e),
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| error::Error::HttpClientBuild {
            message: e.to_string(),
        })?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Perform a GET request with retry on transient errors.
    ///
    /// Retries on 429 (rate limit), 5xx (server errors), and connection errors.
    /// Returns the response on success (including 4xx responses other than 429).
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.get_with_headers(url, &HeaderMap::new()).await
    }

    /// Perform a GET request with custom headers and retry on transient errors.
    ///
    /// Retries on 429 (rate limit), 5xx (server errors), and connection errors.  Once the retries
    /// are used up, a retryable status is returned as [`error::Error::ProviderHttp`] with the body
    /// of the last response.  Other responses (including 4xx other than 429) are returned as-is.
    pub async fn get_with_headers(&self, url: &str, headers: &HeaderMap) -> Result<Response> {
        let operation = || async {
            let response = self
                .client
                .get(url)
                .headers(headers.clone())
                .send()
                .await
                .with_context(|_| error::HttpRequestSnafu { url })?;

            Self::classify_response(response, url).await
        };

        operation
            .retry(self.build_backoff())
            .sleep(tokio::time::sleep)
            .notify(|err, dur| {
                tracing::debug!(url, "HTTP request failed, retrying in {:?}: {}", dur, err);
            })
            .await
    }

    fn build_backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.config.backoff_base)
            .with_max_delay(self.config.backoff_max)
            .with_max_times(self.config.retries)
            .with_jitter()
    }

    async fn classify_response(response: Response, url: &str) -> Result<Response> {
        let status = response.status();

        if is_retryable(status) {
            // The body often says why (maintenance window, rate limit reset)
            let body = response.text().await.unwrap_or_default();
            return error::ProviderHttpSnafu {
                url,
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        Ok(response)
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Run `operation` to completion unless `cancel` fires first, in which case it is dropped and
/// [`error::Error::Cancelled`] is returned.
pub async fn until_cancelled<T>(
    cancel: &CancellationToken,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => error::CancelledSnafu.fail(),
        result = operation => result,
    }
}
