//! Remote bundle fetching for stowage.
//!
//! Downloads a ZIP container over HTTP(S) and extracts it into a
//! [`StorageRoot`](stowage_store::StorageRoot) while the body is still
//! arriving. The payload is never held in memory or written to a temporary
//! file.
//!
//! # Quick Start
//!
//! ```no_run
//! use stowage_fetch::RemoteBundleFetcher;
//! use stowage_store::{CancellationToken, StorageRoot};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let root = StorageRoot::from_env()?;
//! let fetcher = RemoteBundleFetcher::from_env()?;
//!
//! let cancel = CancellationToken::new();
//! let summary = fetcher
//!     .fetch_and_extract("https://example.com/content.zip", &root, "content", &cancel)
//!     .await?;
//! println!("extracted {} files", summary.files);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `STOWAGE_FETCH_TIMEOUT` | Request timeout in seconds (default: 300) |
//! | `STOWAGE_FETCH_CONNECT_TIMEOUT` | Connect timeout in seconds (default: 10) |
//! | `STOWAGE_FETCH_TOKEN` | Bearer token |

pub mod auth;
mod bridge;
pub mod config;
pub mod error;
pub mod fetcher;

pub use auth::TokenProvider;
pub use config::FetchConfig;
pub use error::{FetchError, FetchResult};
pub use fetcher::RemoteBundleFetcher;
