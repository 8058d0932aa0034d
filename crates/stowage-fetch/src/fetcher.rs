//! Remote bundle retrieval.
//!
//! One GET per call, no retries. The response body is never buffered: it is
//! bridged into a blocking reader and extracted entry by entry on the
//! blocking pool while it downloads.

use std::path::Path;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use stowage_store::{
    extract_stream, CancellationToken, ExtractLimits, ExtractOptions, ExtractSummary,
    StorageRoot, StoreError,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::TokenProvider;
use crate::bridge::{body_reader, NetworkFailure};
use crate::config::FetchConfig;
use crate::error::{FetchError, FetchResult};

const USER_AGENT_VALUE: &str = concat!("stowage-fetch/", env!("CARGO_PKG_VERSION"));

/// Downloads ZIP bundles and extracts them into a storage root.
#[derive(Debug, Clone)]
pub struct RemoteBundleFetcher {
    client: reqwest::Client,
    token_provider: TokenProvider,
    limits: ExtractLimits,
}

impl RemoteBundleFetcher {
    pub fn new(config: FetchConfig) -> FetchResult<Self> {
        let token_provider = config
            .token
            .as_ref()
            .map(TokenProvider::static_token)
            .unwrap_or_else(TokenProvider::from_env);

        Self::with_token_provider(config, token_provider)
    }

    pub fn with_token_provider(
        config: FetchConfig,
        token_provider: TokenProvider,
    ) -> FetchResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .default_headers(default_headers)
            .build()
            .map_err(|e| FetchError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            token_provider,
            limits: config.extract_limits(),
        })
    }

    pub fn from_env() -> FetchResult<Self> {
        Self::new(FetchConfig::from_env())
    }

    /// Download the container at `uri` and extract it below `folder`.
    ///
    /// Files extracted before a failure or cancellation are left in place.
    pub async fn fetch_and_extract(
        &self,
        uri: &str,
        root: &StorageRoot,
        folder: impl AsRef<Path>,
        cancel: &CancellationToken,
    ) -> FetchResult<ExtractSummary> {
        let url = parse_uri(uri)?;
        let folder = folder.as_ref().to_path_buf();
        root.resolve(&folder)?;

        if cancel.is_cancelled() {
            warn!(url = %url, "fetch cancelled before request");
            return Err(FetchError::Cancelled);
        }

        let mut request = self.client.get(url.clone());
        if let Some(token) = self.token_provider.token() {
            request = request.bearer_auth(token);
        }

        debug!(url = %url, folder = %folder.display(), "fetching bundle");
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(url = %url, "fetch cancelled while waiting for response");
                return Err(FetchError::Cancelled);
            }
            result = request.send() => result?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Network {
                message: format!("HTTP {} from {}", status.as_u16(), url),
                status: Some(status.as_u16()),
            });
        }
        debug!(
            url = %url,
            content_length = ?response.content_length(),
            "streaming bundle body"
        );

        let (reader, failure) = body_reader(response.bytes_stream(), cancel.clone());
        let options = ExtractOptions::default()
            .with_limits(self.limits)
            .with_cancel(cancel.clone());
        let task_root = root.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            extract_stream(reader, &task_root, &folder, &options)
        })
        .await
        .map_err(|e| FetchError::Internal {
            message: format!("extraction task failed: {}", e),
        })?;

        match outcome {
            Ok(summary) => {
                if let Some(message) = failure.take() {
                    return Err(FetchError::network(message));
                }
                info!(
                    url = %url,
                    files = summary.files,
                    bytes = summary.bytes,
                    "bundle extracted"
                );
                Ok(summary)
            }
            Err(err) => Err(classify(err, cancel, &failure)),
        }
    }
}

/// A truncated body surfaces in extraction as a corrupt or short archive;
/// report what actually cut it short.
fn classify(err: StoreError, cancel: &CancellationToken, failure: &NetworkFailure) -> FetchError {
    if cancel.is_cancelled() {
        return FetchError::Cancelled;
    }
    if let Some(message) = failure.take() {
        return FetchError::network(message);
    }
    FetchError::Store(err)
}

fn parse_uri(uri: &str) -> FetchResult<Url> {
    let url = Url::parse(uri).map_err(|e| FetchError::InvalidUri {
        uri: uri.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::InvalidUri {
            uri: uri.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}
