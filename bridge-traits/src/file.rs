//! User-selected source files.
//!
//! A [`FileSource`] is whatever the host hands the core when the user picks a
//! file: a path on desktop, a blob handle elsewhere. The core only needs its
//! name and size, a bounded read of the leading bytes for local probing, and
//! a chunked stream for uploading.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream};
use std::pin::Pin;

use crate::error::{BridgeError, Result};

/// Chunked body stream. Chunks are yielded in file order.
///
/// `Sync` so the stream can be handed to HTTP bodies that require it.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static>>;

#[async_trait]
pub trait FileSource: Send + Sync {
    /// Display name, including extension.
    fn name(&self) -> &str;

    /// Total size in bytes.
    fn size(&self) -> u64;

    /// MIME type when the host knows it.
    fn content_type(&self) -> Option<&str> {
        None
    }

    /// Read up to `max_bytes` from the start of the file.
    async fn read_head(&self, max_bytes: usize) -> Result<Bytes>;

    /// Open the whole file as a stream of chunks of at most `chunk_size` bytes.
    async fn open_stream(&self, chunk_size: usize) -> Result<ByteStream>;
}

/// A file held entirely in memory.
#[derive(Debug, Clone)]
pub struct InMemoryFile {
    name: String,
    data: Bytes,
}

impl InMemoryFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

#[async_trait]
impl FileSource for InMemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_head(&self, max_bytes: usize) -> Result<Bytes> {
        let end = max_bytes.min(self.data.len());
        Ok(self.data.slice(..end))
    }

    async fn open_stream(&self, chunk_size: usize) -> Result<ByteStream> {
        if chunk_size == 0 {
            return Err(BridgeError::OperationFailed(
                "chunk size must be greater than zero".to_string(),
            ));
        }

        let data = self.data.clone();
        let chunks: Vec<std::io::Result<Bytes>> = (0..data.len())
            .step_by(chunk_size)
            .map(|start| Ok(data.slice(start..(start + chunk_size).min(data.len()))))
            .collect();

        Ok(Box::pin(stream::iter(chunks)))
    }
}
