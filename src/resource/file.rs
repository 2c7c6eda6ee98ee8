//! File resources - copy, move and download files into place
//!
//! All three write only when the destination content differs, then settle
//! mode and ownership the way [`Template`](super::Template) does.

use anyhow::{Context, Result};
use converge::{Action, ActionRunStatus, ActionTable, Base, Resource, Session, run_actions};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::perms;
use crate::error::Error;

/// Default permission bits for copied, moved and downloaded files
pub const DEFAULT_MODE: u32 = 0o644;

/// Deadline for a whole download, connect to last byte
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Refuse response bodies larger than this
const MAX_DOWNLOAD_SIZE: u64 = 500 * 1024 * 1024;

/// Write `bytes` to `path` unless the file already holds exactly them.
///
/// Returns whether the file was written.
pub fn write_if_changed(path: &Path, bytes: &[u8]) -> Result<bool> {
    let wanted = blake3::hash(bytes);
    let existing = match fs::read(path) {
        Ok(current) => Some(blake3::hash(&current)),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    if existing == Some(wanted) {
        return Ok(false);
    }

    log::debug!(
        "{}: content {} -> {}",
        path.display(),
        existing.map_or_else(|| "absent".to_string(), |h| h.to_hex()[..12].to_string()),
        &wanted.to_hex()[..12]
    );
    fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}

/// Mode and ownership wanted on a placed file
#[derive(Debug, Clone)]
struct Placement {
    owner: Option<String>,
    group: Option<String>,
    mode: u32,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            owner: None,
            group: None,
            mode: DEFAULT_MODE,
        }
    }
}

impl Placement {
    fn settle(&self, path: &Path) -> Result<bool> {
        let mut changed = perms::ensure_mode(path, self.mode)?;
        changed |= perms::ensure_owner(path, self.owner.as_deref(), self.group.as_deref())?;
        Ok(changed)
    }
}

/// `None` when nothing exists at `path`
fn source_bytes(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

macro_rules! placement_builders {
    ($ty:ty) => {
        impl $ty {
            pub fn owner(mut self, owner: impl Into<String>) -> Self {
                self.placement.owner = Some(owner.into());
                self
            }

            pub fn group(mut self, group: impl Into<String>) -> Self {
                self.placement.group = Some(group.into());
                self
            }

            pub fn mode(mut self, mode: u32) -> Self {
                self.placement.mode = mode;
                self
            }

            pub fn base(mut self, base: Base) -> Self {
                self.base = base;
                self
            }
        }
    };
}

// ============================================================================
// Copy
// ============================================================================

/// Keep `to` a copy of `from`.
///
/// A missing source is not an error; there is nothing to copy yet.
#[derive(Debug)]
pub struct CopyFile {
    pub from: PathBuf,
    pub to: PathBuf,
    placement: Placement,
    pub base: Base,
}

impl CopyFile {
    pub fn new(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            placement: Placement::default(),
            base: Base::default(),
        }
    }

    fn copy(&self) -> Result<bool> {
        let Some(bytes) = source_bytes(&self.from)? else {
            log::debug!("{}: nothing to copy", self.from.display());
            return Ok(false);
        };
        let mut changed = write_if_changed(&self.to, &bytes)?;
        changed |= self.placement.settle(&self.to)?;
        Ok(changed)
    }
}

placement_builders!(CopyFile);

impl fmt::Display for CopyFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "copy {} {}", self.from.display(), self.to.display())
    }
}

impl Resource for CopyFile {
    fn resource_type(&self) -> &'static str {
        "copy"
    }

    fn run(&self, session: &mut Session, actions: &[Action]) -> converge::Result<ActionRunStatus> {
        let table = ActionTable::new().register(Action::Run, |_| self.copy());
        run_actions(session, self, &self.base, &table, actions)
    }
}

// ============================================================================
// Move
// ============================================================================

/// Move `from` to `to`. Once the source is gone the move is done.
#[derive(Debug)]
pub struct MoveFile {
    pub from: PathBuf,
    pub to: PathBuf,
    placement: Placement,
    pub base: Base,
}

impl MoveFile {
    pub fn new(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            placement: Placement::default(),
            base: Base::default(),
        }
    }

    fn relocate(&self) -> Result<bool> {
        match fs::symlink_metadata(&self.from) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("{}: already moved", self.from.display());
                return Ok(false);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to stat {}", self.from.display()));
            }
        }

        match fs::rename(&self.from, &self.to) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::CrossesDevices => {
                log::debug!("{}: rename crosses devices, copying", self.from.display());
                let bytes = fs::read(&self.from)
                    .with_context(|| format!("Failed to read {}", self.from.display()))?;
                write_if_changed(&self.to, &bytes)?;
                fs::remove_file(&self.from)
                    .with_context(|| format!("Failed to remove {}", self.from.display()))?;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!(
                        "Failed to move {} to {}",
                        self.from.display(),
                        self.to.display()
                    )
                });
            }
        }

        self.placement.settle(&self.to)?;
        Ok(true)
    }
}

placement_builders!(MoveFile);

impl fmt::Display for MoveFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "move {} {}", self.from.display(), self.to.display())
    }
}

impl Resource for MoveFile {
    fn resource_type(&self) -> &'static str {
        "move"
    }

    fn run(&self, session: &mut Session, actions: &[Action]) -> converge::Result<ActionRunStatus> {
        let table = ActionTable::new().register(Action::Run, |_| self.relocate());
        run_actions(session, self, &self.base, &table, actions)
    }
}

// ============================================================================
// Download
// ============================================================================

/// Fetch `url` over HTTP(S) into `path`.
///
/// The body is fetched on every run; the file is only rewritten when it
/// differs.
#[derive(Debug)]
pub struct Download {
    pub url: String,
    pub path: PathBuf,
    pub timeout: Duration,
    placement: Placement,
    pub base: Base,
}

impl Download {
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
            timeout: DOWNLOAD_TIMEOUT,
            placement: Placement::default(),
            base: Base::default(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn fetch(&self) -> Result<Vec<u8>, Error> {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .build();
        let agent = ureq::Agent::new_with_config(config);

        let mut response = agent
            .get(&self.url)
            .header("User-Agent", concat!("mincfg/", env!("CARGO_PKG_VERSION")))
            .call()
            .map_err(|e| Error::http(&self.url, e))?;

        response
            .body_mut()
            .with_config()
            .limit(MAX_DOWNLOAD_SIZE)
            .read_to_vec()
            .map_err(|e| Error::http(&self.url, e))
    }

    fn download(&self) -> Result<bool> {
        let bytes = self.fetch()?;
        log::debug!("{}: {} bytes", self.url, bytes.len());
        let mut changed = write_if_changed(&self.path, &bytes)?;
        changed |= self.placement.settle(&self.path)?;
        Ok(changed)
    }
}

placement_builders!(Download);

impl fmt::Display for Download {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "download {} {}", self.url, self.path.display())
    }
}

impl Resource for Download {
    fn resource_type(&self) -> &'static str {
        "download"
    }

    fn run(&self, session: &mut Session, actions: &[Action]) -> converge::Result<ActionRunStatus> {
        let table = ActionTable::new().register(Action::Run, |_| self.download());
        run_actions(session, self, &self.base, &table, actions)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use converge::CaptureReporter;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn session() -> Session {
        Session::with_reporter(CaptureReporter::new())
    }

    fn mode_of(path: &Path) -> u32 {
        fs::metadata(path).unwrap().permissions().mode() & 0o7777
    }

    /// Answer every connection with `status` and `body`; returns the base
    /// URL and a request counter.
    fn serve(status: &'static str, body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                while reader.read_line(&mut line).unwrap_or(0) > 0 && line != "\r\n" {
                    line.clear();
                }
                counter.fetch_add(1, Ordering::SeqCst);
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        (url, hits)
    }

    #[test]
    fn test_write_if_changed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("f");

        assert!(write_if_changed(&path, b"one").unwrap());
        assert!(!write_if_changed(&path, b"one").unwrap());
        assert!(write_if_changed(&path, b"two").unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"two");
    }

    #[test]
    fn test_copy_then_up_to_date() {
        let tmp = tempfile::tempdir().unwrap();
        let from = tmp.path().join("src.conf");
        let to = tmp.path().join("dst.conf");
        fs::write(&from, "listen 80\n").unwrap();
        let copy = CopyFile::new(&from, &to).mode(0o600);
        let mut session = session();

        let first = copy.run(&mut session, &[Action::Run]).unwrap();
        assert!(first.changed(Action::Run));
        assert_eq!(fs::read_to_string(&to).unwrap(), "listen 80\n");
        assert_eq!(mode_of(&to), 0o600);
        assert!(from.exists());

        let second = copy.run(&mut session, &[Action::Run]).unwrap();
        assert_eq!(second.get(Action::Run), Some(false));

        fs::write(&from, "listen 8080\n").unwrap();
        let third = copy.run(&mut session, &[Action::Run]).unwrap();
        assert!(third.changed(Action::Run));
        assert_eq!(fs::read_to_string(&to).unwrap(), "listen 8080\n");
    }

    #[test]
    fn test_copy_missing_source_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let to = tmp.path().join("dst");
        let copy = CopyFile::new(tmp.path().join("absent"), &to);

        let status = copy.run(&mut session(), &[Action::Run]).unwrap();

        assert_eq!(status.get(Action::Run), Some(false));
        assert!(!to.exists());
    }

    #[test]
    fn test_move_once() {
        let tmp = tempfile::tempdir().unwrap();
        let from = tmp.path().join("incoming.tar");
        let to = tmp.path().join("archive.tar");
        fs::write(&from, "data").unwrap();
        let relocate = MoveFile::new(&from, &to).mode(0o640);
        let mut session = session();

        let first = relocate.run(&mut session, &[Action::Run]).unwrap();
        assert!(first.changed(Action::Run));
        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "data");
        assert_eq!(mode_of(&to), 0o640);

        let second = relocate.run(&mut session, &[Action::Run]).unwrap();
        assert_eq!(second.get(Action::Run), Some(false));
        assert!(to.exists());
    }

    #[test]
    fn test_move_into_missing_directory_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let from = tmp.path().join("a");
        fs::write(&from, "x").unwrap();
        let relocate = MoveFile::new(&from, tmp.path().join("no/such/dir/a"));

        let err = relocate.run(&mut session(), &[Action::Run]).unwrap_err();

        assert!(format!("{err:#}").contains("Failed to move"));
        assert!(from.exists());
    }

    #[test]
    fn test_download_writes_only_on_change() {
        let (url, hits) = serve("200 OK", "payload\n");
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("payload.txt");
        let download = Download::new(format!("{url}/payload.txt"), &path)
            .timeout(Duration::from_secs(10));
        let mut session = session();

        let first = download.run(&mut session, &[Action::Run]).unwrap();
        assert!(first.changed(Action::Run));
        assert_eq!(fs::read_to_string(&path).unwrap(), "payload\n");
        assert_eq!(mode_of(&path), DEFAULT_MODE);

        let second = download.run(&mut session, &[Action::Run]).unwrap();
        assert_eq!(second.get(Action::Run), Some(false));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_download_http_error_leaves_file_alone() {
        let (url, _) = serve("404 Not Found", "gone");
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("payload.txt");
        fs::write(&path, "old").unwrap();
        let download = Download::new(format!("{url}/payload.txt"), &path)
            .timeout(Duration::from_secs(10));

        let err = download.run(&mut session(), &[Action::Run]).unwrap_err();

        assert!(format!("{err:#}").contains("HTTP 404"), "{err:#}");
        assert_eq!(fs::read_to_string(&path).unwrap(), "old");
    }

    #[test]
    fn test_identities() {
        assert_eq!(CopyFile::new("/a", "/b").to_string(), "copy /a /b");
        assert_eq!(MoveFile::new("/a", "/b").to_string(), "move /a /b");
        assert_eq!(
            Download::new("https://example.test/x", "/tmp/x").to_string(),
            "download https://example.test/x /tmp/x"
        );
    }
}
