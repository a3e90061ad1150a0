//! Drive sandbox: named directories exposed to remote clients.
//!
//! A drive binds a name to a host directory. Client paths are resolved
//! against the root with lexical normalization and a structural traversal
//! check before any filesystem operation runs.
//!
//! Concurrent writers to the same path are not coordinated; the host
//! filesystem decides, and the last write wins.

pub mod error;

pub use error::{DriveError, DriveResult};

use std::ffi::OsStr;
use std::io;
use std::path::{Component, Path, PathBuf};

use deepwell_core::CHUNK_SIZE;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// One entry from a directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirItem {
    pub name: String,
    pub is_dir: bool,
}

/// Metadata for a single path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathInfo {
    pub is_dir: bool,
    pub size: u64,
}

/// A named root directory on the host filesystem.
#[derive(Clone, Debug)]
pub struct Drive {
    root: PathBuf,
}

impl Drive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a client path against the drive root.
    ///
    /// The path is normalized lexically (`.` removed, `name/..` pairs
    /// collapsed); absolute paths and any `..` that would climb past the
    /// root are rejected. A file name that merely contains ".." is legal.
    fn resolve(&self, path: &str) -> DriveResult<PathBuf> {
        let mut parts: Vec<&OsStr> = Vec::new();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(name) => parts.push(name),
                Component::CurDir => {}
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        return Err(DriveError::InvalidPath(path.to_string()));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(DriveError::InvalidPath(path.to_string()));
                }
            }
        }

        let mut resolved = self.root.clone();
        for part in parts {
            resolved.push(part);
        }
        Ok(resolved)
    }

    /// Create an empty file, truncating an existing one.
    pub async fn create(&self, path: &str) -> DriveResult<()> {
        let host = self.resolve(path)?;
        fs::File::create(&host).await?;
        Ok(())
    }

    /// Create a directory.
    pub async fn mkdir(&self, path: &str) -> DriveResult<()> {
        let host = self.resolve(path)?;
        fs::create_dir(&host).await?;
        Ok(())
    }

    /// Stream the file at `path` into `sink` in chunk-size steps. Returns
    /// the number of bytes copied.
    pub async fn read_to<W>(&self, path: &str, sink: &mut W) -> DriveResult<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let host = self.resolve(path)?;
        let mut file = fs::File::open(&host).await?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut copied = 0u64;
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            sink.write_all(&buf[..n]).await?;
            copied += n as u64;
        }
        Ok(copied)
    }

    /// List a directory, yielding each entry's name and directory flag.
    pub async fn list(&self, path: &str) -> DriveResult<Vec<DirItem>> {
        let host = self.resolve(path)?;
        let mut entries = fs::read_dir(&host).await?;
        let mut items = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            items.push(DirItem {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: file_type.is_dir(),
            });
        }
        Ok(items)
    }

    /// Metadata for a file or directory.
    pub async fn stat(&self, path: &str) -> DriveResult<PathInfo> {
        let host = self.resolve(path)?;
        let meta = fs::metadata(&host).await?;
        Ok(PathInfo {
            is_dir: meta.is_dir(),
            size: meta.len(),
        })
    }

    /// Open the file at `path` for writing, creating or truncating it.
    ///
    /// Exposed so a caller that has not yet consumed the bytes it intends
    /// to write can learn about target errors first.
    pub async fn open_write(&self, path: &str) -> DriveResult<fs::File> {
        let host = self.resolve(path)?;
        let file = fs::File::create(&host).await?;
        Ok(file)
    }

    /// Write exactly `size` bytes from `source` into the file at `path`,
    /// creating or truncating it. Never reads past `size`.
    pub async fn write_from<R>(&self, path: &str, source: &mut R, size: u64) -> DriveResult<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut file = self.open_write(path).await?;
        copy_exact(source, &mut file, size).await?;
        file.flush().await?;
        Ok(())
    }

    /// Remove a file or an *empty* directory.
    pub async fn remove(&self, path: &str) -> DriveResult<()> {
        let host = self.resolve(path)?;
        let meta = fs::metadata(&host).await?;
        if meta.is_dir() {
            fs::remove_dir(&host).await?;
        } else {
            fs::remove_file(&host).await?;
        }
        Ok(())
    }

    /// Rename (move) a path within the drive.
    pub async fn rename(&self, src: &str, dest: &str) -> DriveResult<()> {
        let from = self.resolve(src)?;
        let to = self.resolve(dest)?;
        fs::rename(&from, &to).await?;
        Ok(())
    }
}

/// Copy exactly `size` bytes from `source` into `sink` in chunk-size reads,
/// clamping the final read to the remaining count so `source` is never read
/// past the announced size. The source ending early is an error.
pub async fn copy_exact<R, W>(source: &mut R, sink: &mut W, size: u64) -> DriveResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut copied = 0u64;
    while copied < size {
        let want = u64::min(buf.len() as u64, size - copied) as usize;
        let n = source.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(DriveError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "source ended before the announced size",
            )));
        }
        sink.write_all(&buf[..n]).await?;
        copied += n as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive() -> (tempfile::TempDir, Drive) {
        let dir = tempfile::tempdir().unwrap();
        let drive = Drive::new(dir.path());
        (dir, drive)
    }

    #[tokio::test]
    async fn create_makes_an_empty_file() {
        let (dir, drive) = drive();
        drive.create("empty.txt").await.unwrap();
        let meta = std::fs::metadata(dir.path().join("empty.txt")).unwrap();
        assert!(meta.is_file());
        assert_eq!(meta.len(), 0);
    }

    #[tokio::test]
    async fn create_truncates_an_existing_file() {
        let (dir, drive) = drive();
        std::fs::write(dir.path().join("full.txt"), b"contents").unwrap();
        drive.create("full.txt").await.unwrap();
        assert_eq!(std::fs::metadata(dir.path().join("full.txt")).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn lexical_dotdot_inside_the_root_is_legal() {
        let (dir, drive) = drive();
        drive.create("foo/../bar.txt").await.unwrap();
        assert!(dir.path().join("bar.txt").exists());
    }

    #[tokio::test]
    async fn climbing_past_the_root_is_rejected() {
        let (_dir, drive) = drive();
        let err = drive.create("../escape").await.unwrap_err();
        assert_eq!(err.to_string(), "path is invalid: ../escape");

        let err = drive.create("foo/../../etc/passwd").await.unwrap_err();
        assert_eq!(err.to_string(), "path is invalid: foo/../../etc/passwd");
    }

    #[tokio::test]
    async fn absolute_paths_are_rejected() {
        let (_dir, drive) = drive();
        let err = drive.stat("/etc/passwd").await.unwrap_err();
        assert!(matches!(err, DriveError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn a_name_containing_dotdot_is_legal() {
        let (dir, drive) = drive();
        drive.create("notes..old").await.unwrap();
        assert!(dir.path().join("notes..old").exists());
    }

    #[tokio::test]
    async fn write_then_read_roundtrips_arbitrary_bytes() {
        let (_dir, drive) = drive();
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 253) as u8).collect();

        let mut source = payload.as_slice();
        drive
            .write_from("blob.bin", &mut source, payload.len() as u64)
            .await
            .unwrap();

        let mut sink = Vec::new();
        let copied = drive.read_to("blob.bin", &mut sink).await.unwrap();
        assert_eq!(copied, payload.len() as u64);
        assert_eq!(sink, payload);
    }

    #[tokio::test]
    async fn zero_byte_write_truncates() {
        let (dir, drive) = drive();
        std::fs::write(dir.path().join("old.txt"), b"stale").unwrap();

        let mut source: &[u8] = b"";
        drive.write_from("old.txt", &mut source, 0).await.unwrap();
        assert_eq!(std::fs::metadata(dir.path().join("old.txt")).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn write_never_reads_past_the_announced_size() {
        let (dir, drive) = drive();
        let mut source: &[u8] = b"hello world";
        drive.write_from("clip.txt", &mut source, 5).await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("clip.txt")).unwrap(), b"hello");
        // The unread tail stays in the source.
        assert_eq!(source, b" world");
    }

    #[tokio::test]
    async fn write_fails_when_the_source_ends_early() {
        let (_dir, drive) = drive();
        let mut source: &[u8] = b"abc";
        let err = drive.write_from("short.txt", &mut source, 10).await.unwrap_err();
        assert!(matches!(err, DriveError::Io(_)));
    }

    #[tokio::test]
    async fn remove_deletes_files_and_empty_directories() {
        let (dir, drive) = drive();
        drive.create("gone.txt").await.unwrap();
        drive.mkdir("hollow").await.unwrap();

        drive.remove("gone.txt").await.unwrap();
        drive.remove("hollow").await.unwrap();
        assert!(!dir.path().join("gone.txt").exists());
        assert!(!dir.path().join("hollow").exists());
    }

    #[tokio::test]
    async fn remove_refuses_a_non_empty_directory() {
        let (dir, drive) = drive();
        drive.mkdir("busy").await.unwrap();
        drive.create("busy/file.txt").await.unwrap();

        assert!(drive.remove("busy").await.is_err());
        assert!(dir.path().join("busy/file.txt").exists());
    }

    #[tokio::test]
    async fn rename_moves_within_the_drive() {
        let (dir, drive) = drive();
        drive.mkdir("sub").await.unwrap();
        drive.create("here.txt").await.unwrap();

        drive.rename("here.txt", "sub/there.txt").await.unwrap();
        assert!(!dir.path().join("here.txt").exists());
        assert!(dir.path().join("sub/there.txt").exists());
    }

    #[tokio::test]
    async fn rename_cannot_escape_the_root() {
        let (_dir, drive) = drive();
        drive.create("here.txt").await.unwrap();
        let err = drive.rename("here.txt", "../there.txt").await.unwrap_err();
        assert!(matches!(err, DriveError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn list_flags_directories() {
        let (_dir, drive) = drive();
        drive.mkdir("docs").await.unwrap();
        drive.create("readme.md").await.unwrap();

        let mut items = drive.list("").await.unwrap();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            items,
            vec![
                DirItem { name: "docs".to_string(), is_dir: true },
                DirItem { name: "readme.md".to_string(), is_dir: false },
            ]
        );
    }

    #[tokio::test]
    async fn stat_reports_size_and_kind() {
        let (dir, drive) = drive();
        std::fs::write(dir.path().join("five.txt"), b"hello").unwrap();
        drive.mkdir("nested").await.unwrap();

        let file = drive.stat("five.txt").await.unwrap();
        assert!(!file.is_dir);
        assert_eq!(file.size, 5);

        let sub = drive.stat("nested").await.unwrap();
        assert!(sub.is_dir);
    }

    #[tokio::test]
    async fn stat_of_a_missing_path_is_an_io_error() {
        let (_dir, drive) = drive();
        assert!(matches!(
            drive.stat("nothing-here").await,
            Err(DriveError::Io(_))
        ));
    }

    #[tokio::test]
    async fn empty_path_addresses_the_root() {
        let (_dir, drive) = drive();
        drive.create("top.txt").await.unwrap();
        let items = drive.list("").await.unwrap();
        assert_eq!(items.len(), 1);

        let info = drive.stat("").await.unwrap();
        assert!(info.is_dir);
    }
}
