use std::io::{ErrorKind, Read, Write};

use tokio_util::sync::CancellationToken;

use crate::error::{StoreError, StoreResult};

/// Chunk size for every payload copy. Memory use is independent of entry size.
pub const CHUNK_SIZE: usize = 4096;

/// Many systems can deliver spurious interrupts during `read()`.
/// Retry only `Interrupted` for a bounded number of attempts.
const EINTR_RETRY_LIMIT: usize = 16;

/// Copy `reader` into `writer` in `CHUNK_SIZE` pieces.
///
/// Fails with `LimitExceeded` once more than `limit` bytes have been read,
/// and with `Cancelled` if `cancel` fires; the token is checked before
/// every chunk.
pub(crate) fn copy_chunked<R, W>(
    reader: &mut R,
    writer: &mut W,
    limit: u64,
    cancel: Option<&CancellationToken>,
) -> StoreResult<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut total: u64 = 0;

    loop {
        if cancel.is_some_and(|token| token.is_cancelled()) {
            return Err(StoreError::Cancelled);
        }

        let n = read_retrying(reader, &mut buffer)?;
        if n == 0 {
            break;
        }

        total += n as u64;
        if total > limit {
            return Err(StoreError::LimitExceeded {
                message: format!("payload exceeded limit of {} bytes", limit),
            });
        }

        writer.write_all(&buffer[..n])?;
    }

    Ok(total)
}

pub(crate) fn read_retrying<R: Read + ?Sized>(
    reader: &mut R,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    let mut retries = 0;
    loop {
        match reader.read(buf) {
            Err(e) if e.kind() == ErrorKind::Interrupted => {
                retries += 1;
                if retries >= EINTR_RETRY_LIMIT {
                    return Err(std::io::Error::new(
                        ErrorKind::Interrupted,
                        format!(
                            "persistent EINTR: interrupted {} consecutive times",
                            EINTR_RETRY_LIMIT
                        ),
                    ));
                }
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct Flaky {
        inner: Cursor<Vec<u8>>,
        interrupts_left: usize,
    }

    impl Read for Flaky {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.interrupts_left > 0 {
                self.interrupts_left -= 1;
                return Err(ErrorKind::Interrupted.into());
            }
            self.inner.read(buf)
        }
    }

    #[test]
    fn test_copy_spans_multiple_chunks() {
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let mut out = Vec::new();

        let copied = copy_chunked(&mut Cursor::new(data.clone()), &mut out, u64::MAX, None).unwrap();

        assert_eq!(copied, data.len() as u64);
        assert_eq!(out, data);
    }

    #[test]
    fn test_copy_enforces_limit() {
        let mut out = Vec::new();
        let err = copy_chunked(&mut Cursor::new(vec![0u8; 100]), &mut out, 99, None).unwrap_err();
        assert!(matches!(err, StoreError::LimitExceeded { .. }));
    }

    #[test]
    fn test_copy_stops_when_cancelled() {
        let token = CancellationToken::new();
        token.cancel();

        let mut out = Vec::new();
        let err = copy_chunked(&mut Cursor::new(vec![1u8; 10]), &mut out, u64::MAX, Some(&token))
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(out.is_empty());
    }

    #[test]
    fn test_copy_retries_interrupts() {
        let mut reader = Flaky {
            inner: Cursor::new(b"payload".to_vec()),
            interrupts_left: 3,
        };
        let mut out = Vec::new();

        copy_chunked(&mut reader, &mut out, u64::MAX, None).unwrap();
        assert_eq!(out, b"payload");
    }

    #[test]
    fn test_persistent_interrupt_gives_up() {
        let mut reader = Flaky {
            inner: Cursor::new(Vec::new()),
            interrupts_left: usize::MAX,
        };
        let err = read_retrying(&mut reader, &mut [0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Interrupted);
    }
}
