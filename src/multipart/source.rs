//! Ranged part sources / 分片数据源
//!
//! Every read names its own offset, so concurrent workers never share a cursor.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{OssError, Result};

/// Read-only data source supporting positioned reads / 支持定位读取的只读数据源
#[async_trait]
pub trait PartSource: Send + Sync {
    /// Total size in bytes / 总大小
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read exactly `length` bytes starting at `offset` / 读取指定范围
    async fn read_range(&self, offset: u64, length: u64) -> Result<Bytes>;
}

fn check_range(offset: u64, length: u64, total: u64) -> Result<()> {
    match offset.checked_add(length) {
        Some(end) if end <= total => Ok(()),
        _ => Err(OssError::invalid_input(format!(
            "range {}+{} is outside a {}-byte source",
            offset, length, total
        ))),
    }
}

/// In-memory source, slices share the underlying buffer / 内存数据源
#[derive(Debug, Clone)]
pub struct BytesSource {
    data: Bytes,
}

impl BytesSource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl PartSource for BytesSource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_range(&self, offset: u64, length: u64) -> Result<Bytes> {
        check_range(offset, length, self.len())?;
        let start = offset as usize;
        Ok(self.data.slice(start..start + length as usize))
    }
}

/// Local file source; every read opens its own handle / 本地文件数据源（每次读取独立句柄）
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    len: u64,
}

impl FileSource {
    /// Stat the file and remember its size / 打开文件并记录大小
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_file() {
            return Err(OssError::invalid_input(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        Ok(Self {
            path,
            len: meta.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PartSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    async fn read_range(&self, offset: u64, length: u64) -> Result<Bytes> {
        check_range(offset, length, self.len)?;

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;

        let mut buf = BytesMut::zeroed(length as usize);
        // Short read means the file shrank after open
        file.read_exact(&mut buf[..]).await?;
        Ok(buf.freeze())
    }
}
