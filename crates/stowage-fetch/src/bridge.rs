//! Async body to blocking `Read` bridge.
//!
//! The reader produced here only ever ends with EOF: body errors and
//! cancellation both terminate the stream cleanly. Errors are parked in a
//! [`NetworkFailure`] for the caller to inspect once extraction stops, so a
//! body cut short is reported as a network failure and not as a truncated
//! container.

use std::io;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use tokio_util::io::{StreamReader, SyncIoBridge};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Blocking reader over a response body. Must be read off the async runtime.
pub(crate) type BodyReader = SyncIoBridge<StreamReader<BoxStream<'static, io::Result<Bytes>>, Bytes>>;

/// First body error seen by a bridge.
#[derive(Debug, Clone, Default)]
pub(crate) struct NetworkFailure(Arc<Mutex<Option<String>>>);

impl NetworkFailure {
    pub(crate) fn record(&self, message: String) {
        if let Ok(mut slot) = self.0.lock() {
            slot.get_or_insert(message);
        }
    }

    pub(crate) fn take(&self) -> Option<String> {
        self.0.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Wrap `body` for blocking consumption. Must be called inside a runtime.
pub(crate) fn body_reader<S, E>(body: S, cancel: CancellationToken) -> (BodyReader, NetworkFailure)
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let failure = NetworkFailure::default();
    let recorder = failure.clone();

    let stream = body
        .take_until(cancel.cancelled_owned())
        .scan((), move |_, chunk| {
            let next = match chunk {
                Ok(bytes) => Some(Ok::<Bytes, io::Error>(bytes)),
                Err(err) => {
                    warn!(error = %err, "response body failed");
                    recorder.record(err.to_string());
                    None
                }
            };
            futures::future::ready(next)
        })
        .boxed();

    (SyncIoBridge::new(StreamReader::new(stream)), failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn chunks(
        items: Vec<Result<&'static str, &'static str>>,
    ) -> impl Stream<Item = Result<Bytes, String>> {
        futures::stream::iter(items.into_iter().map(|item| {
            item.map(|s| Bytes::from_static(s.as_bytes()))
                .map_err(String::from)
        }))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reads_all_chunks() {
        let (mut reader, failure) = body_reader(
            chunks(vec![Ok("hello "), Ok("world")]),
            CancellationToken::new(),
        );

        let text = tokio::task::spawn_blocking(move || {
            let mut text = String::new();
            reader.read_to_string(&mut text).map(|_| text)
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(text, "hello world");
        assert!(failure.take().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_error_ends_stream_and_is_recorded() {
        let (mut reader, failure) = body_reader(
            chunks(vec![Ok("partial"), Err("connection reset"), Ok("never")]),
            CancellationToken::new(),
        );

        let bytes = tokio::task::spawn_blocking(move || {
            let mut bytes = Vec::new();
            reader.read_to_end(&mut bytes).map(|_| bytes)
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(bytes, b"partial");
        assert_eq!(failure.take().as_deref(), Some("connection reset"));
        assert!(failure.take().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancelled_token_ends_stream() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (mut reader, failure) = body_reader(chunks(vec![Ok("data")]), cancel);

        let bytes = tokio::task::spawn_blocking(move || {
            let mut bytes = Vec::new();
            reader.read_to_end(&mut bytes).map(|_| bytes)
        })
        .await
        .unwrap()
        .unwrap();

        assert!(bytes.is_empty());
        assert!(failure.take().is_none());
    }
}
