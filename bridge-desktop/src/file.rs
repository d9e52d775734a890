//! Files on the local disk.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    file::{ByteStream, FileSource},
};
use bytes::Bytes;
use core_async::io::AsyncReadExt;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

#[derive(Debug, Clone)]
pub struct LocalFileSource {
    path: PathBuf,
    name: String,
    size: u64,
}

impl LocalFileSource {
    /// Stat `path` and capture its name and size.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(BridgeError::OperationFailed(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            path,
            name,
            size: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FileSource for LocalFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn content_type(&self) -> Option<&str> {
        match self.path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("mkv") => Some("video/x-matroska"),
            _ => None,
        }
    }

    async fn read_head(&self, max_bytes: usize) -> Result<Bytes> {
        let file = File::open(&self.path).await?;
        let mut buffer = Vec::with_capacity(max_bytes.min(self.size as usize));
        file.take(max_bytes as u64).read_to_end(&mut buffer).await?;
        Ok(Bytes::from(buffer))
    }

    async fn open_stream(&self, chunk_size: usize) -> Result<ByteStream> {
        if chunk_size == 0 {
            return Err(BridgeError::OperationFailed(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        let file = File::open(&self.path).await?;
        Ok(Box::pin(ReaderStream::with_capacity(file, chunk_size)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;
    use std::io::Write;

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".mkv").tempfile().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_open_reads_name_and_size() {
        let temp = write_temp(&[0u8; 1000]);
        let source = LocalFileSource::open(temp.path()).await.unwrap();

        assert_eq!(source.size(), 1000);
        assert!(source.name().ends_with(".mkv"));
        assert_eq!(source.content_type(), Some("video/x-matroska"));
    }

    #[tokio::test]
    async fn test_read_head_stops_at_limit() {
        let temp = write_temp(&[9u8; 64]);
        let source = LocalFileSource::open(temp.path()).await.unwrap();

        assert_eq!(source.read_head(16).await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_stream_yields_every_byte() {
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let temp = write_temp(&data);
        let source = LocalFileSource::open(temp.path()).await.unwrap();

        let chunks: Vec<Bytes> = source.open_stream(4096).await.unwrap().try_collect().await.unwrap();
        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(joined, data);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let err = LocalFileSource::open("/definitely/not/here.mkv").await.unwrap_err();
        assert!(matches!(err, BridgeError::Io(_)));
    }
}
