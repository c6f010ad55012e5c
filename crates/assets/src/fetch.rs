use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::FailureKind;

const CHUNK_SIZE: usize = 8192;

/// Downloads one remote stem to a local path.
///
/// Implementations either leave a complete file at `target` or leave
/// nothing there at all.
pub trait StemFetcher: Send + Sync {
    /// Returns the number of bytes written.
    fn fetch(&self, url: &str, target: &Path) -> Result<u64, FetchError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },

    #[error("failed to fetch {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("incomplete download of {url}: expected {expected} bytes, got {actual}")]
    Incomplete {
        url: String,
        expected: u64,
        actual: u64,
    },

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Io { .. } => FailureKind::Io,
            _ => FailureKind::Network,
        }
    }
}

/// Blocking HTTP(S) fetcher.
///
/// Bytes are streamed into `<target>.part`, which is renamed over `target`
/// only once the body has been read completely.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(30))
            .build();
        Self { agent }
    }

    fn download(&self, url: &str, target: &Path, partial: &Path) -> Result<u64, FetchError> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let response = self.agent.get(url).call().map_err(|e| match e {
            ureq::Error::Status(status, _) => FetchError::Status {
                url: url.to_string(),
                status,
            },
            other => FetchError::Transport {
                url: url.to_string(),
                reason: other.to_string(),
            },
        })?;

        let expected: Option<u64> = response
            .header("Content-Length")
            .and_then(|s| s.parse().ok());

        let mut file = File::create(partial).map_err(io_err(partial))?;
        let mut reader = response.into_reader();
        let mut buffer = [0u8; CHUNK_SIZE];
        let mut written: u64 = 0;

        loop {
            let n = reader.read(&mut buffer).map_err(|e| FetchError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n]).map_err(io_err(partial))?;
            written += n as u64;
        }
        file.flush().map_err(io_err(partial))?;
        drop(file);

        if let Some(expected) = expected {
            if written != expected {
                return Err(FetchError::Incomplete {
                    url: url.to_string(),
                    expected,
                    actual: written,
                });
            }
        }

        fs::rename(partial, target).map_err(io_err(target))?;
        log::info!("Downloaded {} ({} bytes) to {}", url, written, target.display());
        Ok(written)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl StemFetcher for HttpFetcher {
    fn fetch(&self, url: &str, target: &Path) -> Result<u64, FetchError> {
        let partial = partial_path(target);
        let result = self.download(url, target, &partial);
        if result.is_err() {
            let _ = fs::remove_file(&partial);
        }
        result
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> FetchError {
    let path = path.to_path_buf();
    move |source| FetchError::Io { path, source }
}

pub(crate) fn partial_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "download".into());
    name.push(".part");
    target.with_file_name(name)
}
