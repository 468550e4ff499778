//! Bounded read window over a local file, used as an upload part body

use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::Result;

/// Read-only view of `[first_byte, first_byte + size)` of a file.
///
/// The handle is opened on first read and released by [`close`](Self::close)
/// or drop. One segment serves one in-flight part; parts over the same file
/// each own their own segment.
#[derive(Debug)]
pub struct FileSegment {
    path: PathBuf,
    first_byte: u64,
    size: u64,
    /// Bytes consumed from the window
    position: u64,
    file: Option<File>,
}

impl FileSegment {
    pub fn new(path: impl Into<PathBuf>, first_byte: u64, size: u64) -> Self {
        Self {
            path: path.into(),
            first_byte,
            size,
            position: 0,
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn first_byte(&self) -> u64 {
        self.first_byte
    }

    /// Exclusive end of the window
    pub fn last_byte(&self) -> u64 {
        self.first_byte + self.size
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn remaining(&self) -> u64 {
        self.size - self.position
    }

    /// Read up to `n` bytes, or everything left when `n` is `None`.
    ///
    /// Returns `None` once the window is exhausted.
    pub async fn read(&mut self, n: Option<usize>) -> Result<Option<Bytes>> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(None);
        }

        let want = match n {
            Some(n) => (n as u64).min(remaining),
            None => remaining,
        } as usize;

        let mut file = match self.file.take() {
            Some(file) => file,
            None => self.open_at_cursor().await?,
        };
        let mut buffer = vec![0u8; want];
        // A failed read leaves the handle closed so the next read re-seeks
        file.read_exact(&mut buffer).await?;
        self.file = Some(file);
        self.position += want as u64;

        Ok(Some(Bytes::from(buffer)))
    }

    /// Move the cursor back to the start of the window
    pub async fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        if let Some(file) = self.file.as_mut() {
            file.seek(SeekFrom::Start(self.first_byte)).await?;
        }
        Ok(())
    }

    /// Release the file handle; a later read reopens it
    pub fn close(&mut self) {
        self.file = None;
    }

    async fn open_at_cursor(&self) -> Result<File> {
        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(self.first_byte + self.position))
            .await?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn twenty_byte_file() -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("source.bin");
        std::fs::write(&path, (0u8..20).collect::<Vec<u8>>()).unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_read_whole_window() {
        let (_dir, path) = twenty_byte_file();
        let mut segment = FileSegment::new(&path, 10, 5);

        let data = segment.read(None).await.unwrap().unwrap();
        assert_eq!(&data[..], &[10, 11, 12, 13, 14]);
        assert_eq!(segment.remaining(), 0);
        assert!(segment.read(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rewind_then_split_reads() {
        let (_dir, path) = twenty_byte_file();
        let mut segment = FileSegment::new(&path, 10, 5);
        segment.read(None).await.unwrap();

        segment.rewind().await.unwrap();
        let head = segment.read(Some(2)).await.unwrap().unwrap();
        let tail = segment.read(None).await.unwrap().unwrap();
        assert_eq!(&head[..], &[10, 11]);
        assert_eq!(&tail[..], &[12, 13, 14]);
    }

    #[tokio::test]
    async fn test_read_is_clamped_to_window() {
        let (_dir, path) = twenty_byte_file();
        let mut segment = FileSegment::new(&path, 18, 2);

        let data = segment.read(Some(100)).await.unwrap().unwrap();
        assert_eq!(&data[..], &[18, 19]);
        assert!(segment.read(Some(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_and_rewind_reopen_lazily() {
        let (_dir, path) = twenty_byte_file();
        let mut segment = FileSegment::new(&path, 4, 4);

        segment.read(Some(3)).await.unwrap();
        segment.close();
        segment.close();
        // Cursor survives close
        assert_eq!(&segment.read(None).await.unwrap().unwrap()[..], &[7]);

        segment.close();
        segment.rewind().await.unwrap();
        segment.rewind().await.unwrap();
        assert_eq!(
            &segment.read(None).await.unwrap().unwrap()[..],
            &[4, 5, 6, 7]
        );
    }

    #[tokio::test]
    async fn test_window_past_end_of_file_fails() {
        let (_dir, path) = twenty_byte_file();
        let mut segment = FileSegment::new(&path, 15, 10);
        assert!(segment.read(None).await.is_err());
    }

    #[test]
    fn test_window_bounds() {
        let segment = FileSegment::new("unused", 10, 5);
        assert_eq!(segment.first_byte(), 10);
        assert_eq!(segment.last_byte(), 15);
        assert_eq!(segment.size(), 5);
        assert_eq!(segment.remaining(), 5);
    }
}
