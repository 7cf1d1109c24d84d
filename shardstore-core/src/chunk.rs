//! Fixed-size stream chunking
//!
//! Chunks are the unit of erasure coding. A stream is cut into blocks of
//! exactly `block_size` bytes; only the final chunk may be shorter. An empty
//! stream yields no chunks at all.

use crate::error::{Result, ShardStoreError};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Lazy, ordered, finite sequence of chunks read from an async byte source
///
/// Once a read fails the error is yielded once and the chunker is exhausted.
pub struct StreamChunker<R> {
    reader: R,
    block_size: usize,
    finished: bool,
}

impl<R: AsyncRead + Unpin> StreamChunker<R> {
    /// Create a chunker over `reader`
    pub fn new(reader: R, block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(ShardStoreError::Configuration(
                "block_size must be > 0".to_string(),
            ));
        }
        Ok(Self {
            reader,
            block_size,
            finished: false,
        })
    }

    /// Configured block size
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Read the next chunk
    ///
    /// Returns `None` at end of stream, and after an error has been returned.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes>> {
        if self.finished {
            return None;
        }

        let mut buf = vec![0u8; self.block_size];
        let mut filled = 0;

        // Short reads are normal for pipes and sockets; keep filling the block
        while filled < self.block_size {
            match self.reader.read(&mut buf[filled..]).await {
                Ok(0) => {
                    self.finished = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
            }
        }

        if filled == 0 {
            return None;
        }

        buf.truncate(filled);
        Some(Ok(Bytes::from(buf)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    async fn collect_lengths<R: AsyncRead + Unpin>(chunker: &mut StreamChunker<R>) -> Vec<usize> {
        let mut lengths = Vec::new();
        while let Some(chunk) = chunker.next_chunk().await {
            lengths.push(chunk.unwrap().len());
        }
        lengths
    }

    /// Reader that hands out at most `step` bytes per poll, then fails
    struct TrickleReader {
        data: Vec<u8>,
        pos: usize,
        step: usize,
        fail_at_end: bool,
    }

    impl AsyncRead for TrickleReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.pos == self.data.len() {
                if self.fail_at_end {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::ConnectionReset,
                        "source went away",
                    )));
                }
                return Poll::Ready(Ok(()));
            }
            let n = self.step.min(self.data.len() - self.pos).min(buf.remaining());
            let start = self.pos;
            buf.put_slice(&self.data[start..start + n]);
            self.pos += n;
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_split_uneven() {
        let data = vec![7u8; 10_000];
        let mut chunker = StreamChunker::new(data.as_slice(), 4096).unwrap();
        assert_eq!(collect_lengths(&mut chunker).await, vec![4096, 4096, 1808]);
    }

    #[tokio::test]
    async fn test_split_exact_multiple() {
        let data = vec![1u8; 8192];
        let mut chunker = StreamChunker::new(data.as_slice(), 4096).unwrap();
        assert_eq!(collect_lengths(&mut chunker).await, vec![4096, 4096]);
    }

    #[tokio::test]
    async fn test_empty_stream_has_no_chunks() {
        let mut chunker = StreamChunker::new(&b""[..], 4096).unwrap();
        assert!(chunker.next_chunk().await.is_none());
        assert!(chunker.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn test_short_reads_fill_blocks() {
        let reader = TrickleReader {
            data: (0..3000).map(|i| (i % 256) as u8).collect(),
            pos: 0,
            step: 7,
            fail_at_end: false,
        };
        let mut chunker = StreamChunker::new(reader, 1024).unwrap();

        let mut joined = Vec::new();
        let mut lengths = Vec::new();
        while let Some(chunk) = chunker.next_chunk().await {
            let chunk = chunk.unwrap();
            lengths.push(chunk.len());
            joined.extend_from_slice(&chunk);
        }

        assert_eq!(lengths, vec![1024, 1024, 952]);
        assert_eq!(joined, (0..3000).map(|i| (i % 256) as u8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_error_ends_sequence() {
        let reader = TrickleReader {
            data: vec![0u8; 100],
            pos: 0,
            step: 64,
            fail_at_end: true,
        };
        let mut chunker = StreamChunker::new(reader, 1024).unwrap();

        let first = chunker.next_chunk().await.unwrap();
        assert!(matches!(first, Err(ShardStoreError::Io(_))));
        assert!(chunker.next_chunk().await.is_none());
    }

    #[test]
    fn test_zero_block_size_rejected() {
        assert!(matches!(
            StreamChunker::new(&b"abc"[..], 0),
            Err(ShardStoreError::Configuration(_))
        ));
    }
}
