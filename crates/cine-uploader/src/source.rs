//! Chunked read access to the upload source.
//!
//! Parts are read on demand, one bounded chunk at a time; the source file
//! is never loaded into memory whole. With a concurrency window of `w`, at
//! most `w * part_size` bytes are resident at once.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::UploaderResult;

/// On-demand access to the bytes of one upload source.
#[async_trait]
pub trait PartSource: Send + Sync {
    /// Total size of the source in bytes.
    fn byte_size(&self) -> u64;

    /// Read the bytes of one part (1-based `part_number`). The final part
    /// may be shorter than `part_size`.
    async fn read_part(&self, part_number: u32, part_size: u64) -> UploaderResult<Vec<u8>>;
}

/// A local file read part-by-part.
///
/// Each read opens its own handle so concurrent part reads never contend on
/// a shared file position.
pub struct FilePartSource {
    path: PathBuf,
    byte_size: u64,
}

impl FilePartSource {
    /// Open a source file, capturing its size.
    pub async fn open(path: impl AsRef<Path>) -> UploaderResult<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;

        Ok(Self {
            path,
            byte_size: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PartSource for FilePartSource {
    fn byte_size(&self) -> u64 {
        self.byte_size
    }

    async fn read_part(&self, part_number: u32, part_size: u64) -> UploaderResult<Vec<u8>> {
        debug_assert!(part_number >= 1);

        let offset = (part_number as u64 - 1) * part_size;
        let remaining = self.byte_size.saturating_sub(offset);
        let to_read = remaining.min(part_size);

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = Vec::with_capacity(to_read as usize);
        file.take(to_read).read_to_end(&mut buf).await?;

        Ok(buf)
    }
}
