use async_trait::async_trait;

use super::directory::DirectoryHandle;
use super::file::FileHandle;
use crate::error::{AppError, Result};
use crate::models::FileRecord;

/// Byte source of an open file
#[async_trait]
pub trait Readable: Send {
    /// Read up to `buf.len()` bytes at the cursor; 0 means end of file
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let mut buf = vec![0u8; 64 * 1024];
        let mut total = 0;
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&buf[..n]);
            total += n;
        }
    }
}

/// Byte sink of an open file
#[async_trait]
pub trait Writable: Send {
    async fn write(&mut self, buf: &[u8]) -> Result<usize>;

    async fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf).await?;
            if n == 0 {
                return Err(AppError::Io(std::io::ErrorKind::WriteZero.into()));
            }
            buf = &buf[n..];
        }
        Ok(())
    }
}

/// Paged listing of an open directory
pub trait DirectoryListable {
    /// Next `n` children; negative `n` returns all remaining
    fn list_entries(&mut self, n: i64) -> Vec<FileRecord>;

    /// Names of the sub-directories among the next `n` children
    fn list_names(&mut self, n: i64) -> Vec<String>;
}

/// Whatever `Driver::open_file` opened
#[derive(Debug)]
pub enum Handle {
    File(FileHandle),
    Directory(DirectoryHandle),
}

impl Handle {
    pub fn readable(&mut self) -> Result<&mut dyn Readable> {
        match self {
            Handle::File(f) => {
                if !f.flags().can_read() {
                    return Err(AppError::NotSupported(format!(
                        "{} is not open for reading",
                        f.record().abs_path()
                    )));
                }
                Ok(f)
            }
            Handle::Directory(d) => Err(AppError::NotSupported(format!(
                "{} is a directory",
                d.record().abs_path()
            ))),
        }
    }

    pub fn writable(&mut self) -> Result<&mut dyn Writable> {
        match self {
            Handle::File(f) => {
                if !f.flags().can_write() {
                    return Err(AppError::NotSupported(format!(
                        "{} is not open for writing",
                        f.record().abs_path()
                    )));
                }
                Ok(f)
            }
            Handle::Directory(d) => Err(AppError::NotSupported(format!(
                "{} is a directory",
                d.record().abs_path()
            ))),
        }
    }

    pub fn listable(&mut self) -> Result<&mut dyn DirectoryListable> {
        match self {
            Handle::Directory(d) => Ok(d),
            Handle::File(f) => Err(AppError::NotSupported(format!(
                "{} is not a directory",
                f.record().abs_path()
            ))),
        }
    }

    /// Release the handle, uploading staged bytes where the open mode requires it
    pub async fn close(self) -> Result<FileRecord> {
        match self {
            Handle::File(f) => f.close().await,
            Handle::Directory(d) => Ok(d.into_record()),
        }
    }
}
