//! Splitting file contents into blocks.
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt};

/// The default block size.
pub const DEFAULT_CHUNK_SIZE: usize = 262144;

/// Splits the contents of a reader into a stream of blocks.
///
/// Concatenating all blocks must yield the contents of the reader.
/// Empty contents produce no blocks.
pub trait Chunker: Send + Sync {
    fn chunks<'r>(
        &self,
        reader: Box<dyn AsyncRead + Send + Unpin + 'r>,
    ) -> BoxStream<'r, std::io::Result<Bytes>>;
}

/// Produces blocks of exactly `chunk_size` bytes, except for the last one,
/// which may be shorter.
#[derive(Debug, Clone, Copy)]
pub struct FixedSizeChunker {
    chunk_size: usize,
}

impl FixedSizeChunker {
    /// Panics if `chunk_size` is zero.
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Self { chunk_size }
    }
}

impl Default for FixedSizeChunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl Chunker for FixedSizeChunker {
    fn chunks<'r>(
        &self,
        mut reader: Box<dyn AsyncRead + Send + Unpin + 'r>,
    ) -> BoxStream<'r, std::io::Result<Bytes>> {
        let chunk_size = self.chunk_size;

        async_stream::try_stream! {
            loop {
                let mut buf = Vec::with_capacity(chunk_size);
                (&mut reader).take(chunk_size as u64).read_to_end(&mut buf).await?;

                if buf.is_empty() {
                    break;
                }

                let last = buf.len() < chunk_size;
                yield Bytes::from(buf);

                if last {
                    break;
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::{Chunker, FixedSizeChunker};
    use bytes::Bytes;
    use futures::TryStreamExt;
    use rstest::rstest;
    use std::io::Cursor;

    #[rstest]
    #[case::empty(0, 4, vec![])]
    #[case::shorter(3, 4, vec![3])]
    #[case::exact(4, 4, vec![4])]
    #[case::multiple(9, 4, vec![4, 4, 1])]
    #[case::multiple_exact(8, 4, vec![4, 4])]
    #[tokio::test]
    async fn chunk_sizes(
        #[case] len: usize,
        #[case] chunk_size: usize,
        #[case] expected: Vec<usize>,
    ) {
        let data: Vec<u8> = (0..len).map(|i| i as u8).collect();

        let chunks: Vec<Bytes> = FixedSizeChunker::new(chunk_size)
            .chunks(Box::new(Cursor::new(data.clone())))
            .try_collect()
            .await
            .expect("must succeed");

        assert_eq!(expected, chunks.iter().map(|c| c.len()).collect::<Vec<_>>());
        assert_eq!(data, chunks.concat());
    }
}
