use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use multitrack_engine::ChannelIndex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::{StemFetcher, StemGroup, StemSet};

/// Which missing files force a download of the full stem set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningPolicy {
    /// Any missing stem, click included, triggers a full download.
    #[default]
    Strict,
    /// A missing click stem is tolerated; playback proceeds without it.
    ClickOptional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Io,
    Network,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureReason {
    pub fn io(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Io,
            message: message.into(),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            FailureKind::Io => "I/O",
            FailureKind::Network => "network",
        };
        write!(f, "{kind} error: {}", self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProvisioningState {
    #[default]
    Unchecked,
    Checking,
    /// File names required by the active policy that are not on disk.
    MissingFiles(BTreeSet<String>),
    Downloading,
    Ready,
    Failed(FailureReason),
}

impl ProvisioningState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ProvisioningState::Ready)
    }
}

#[derive(Debug, Default)]
struct MissingStems {
    primary: BTreeSet<String>,
    click: BTreeSet<String>,
}

impl MissingStems {
    fn required(&self, policy: ProvisioningPolicy) -> BTreeSet<String> {
        let mut required = self.primary.clone();
        if policy == ProvisioningPolicy::Strict {
            required.extend(self.click.iter().cloned());
        }
        required
    }
}

/// Makes sure the stem files exist in the content directory, downloading the
/// whole set when any required file is absent.
pub struct AssetProvisioner {
    content_dir: PathBuf,
    stems: StemSet,
    policy: ProvisioningPolicy,
    fetcher: Arc<dyn StemFetcher>,
    state: watch::Sender<ProvisioningState>,
    /// Files on disk were found unusable; download the set even if complete.
    refetch: bool,
}

impl AssetProvisioner {
    pub fn new(
        content_dir: impl Into<PathBuf>,
        stems: StemSet,
        policy: ProvisioningPolicy,
        fetcher: Arc<dyn StemFetcher>,
    ) -> Self {
        let (state, _) = watch::channel(ProvisioningState::Unchecked);
        Self {
            content_dir: content_dir.into(),
            stems,
            policy,
            fetcher,
            state,
            refetch: false,
        }
    }

    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }

    pub fn stems(&self) -> &StemSet {
        &self.stems
    }

    pub fn policy(&self) -> ProvisioningPolicy {
        self.policy
    }

    pub fn state(&self) -> ProvisioningState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProvisioningState> {
        self.state.subscribe()
    }

    /// Local paths of the stems currently present on disk, by channel.
    pub fn local_paths(&self) -> Vec<(ChannelIndex, PathBuf)> {
        self.stems
            .iter()
            .map(|stem| (stem.channel, self.content_dir.join(&stem.file_name)))
            .filter(|(_, path)| path.is_file())
            .collect()
    }

    /// Run one provisioning pass and return its terminal state.
    ///
    /// Once `Ready` has been reached, later calls return it immediately
    /// without touching the filesystem. After `Failed`, calling again
    /// rescans and retries the download from the start. After
    /// [`invalidate`](Self::invalidate) the whole set is downloaded again.
    pub async fn ensure_assets_ready(&mut self) -> ProvisioningState {
        if self.state.borrow().is_ready() {
            return ProvisioningState::Ready;
        }

        self.transition(ProvisioningState::Checking);

        let dir = self.content_dir.clone();
        let stems = self.stems.clone();
        let missing = match tokio::task::spawn_blocking(move || scan(&dir, &stems)).await {
            Ok(Ok(missing)) => missing,
            Ok(Err(e)) => {
                let reason = FailureReason::io(format!(
                    "cannot read {}: {e}",
                    self.content_dir.display()
                ));
                return self.transition(ProvisioningState::Failed(reason));
            }
            Err(e) => {
                return self.transition(ProvisioningState::Failed(FailureReason::io(e.to_string())));
            }
        };

        let required = if self.refetch {
            self.stems.iter().map(|s| s.file_name.clone()).collect()
        } else {
            missing.required(self.policy)
        };
        if required.is_empty() {
            if !missing.click.is_empty() {
                log::warn!(
                    "Click stem missing from {}, continuing without it",
                    self.content_dir.display()
                );
            }
            return self.transition(ProvisioningState::Ready);
        }

        log::info!("Missing stems: {:?}", required);
        self.transition(ProvisioningState::MissingFiles(required));
        self.transition(ProvisioningState::Downloading);

        let dir = self.content_dir.clone();
        let stems = self.stems.clone();
        let fetcher = Arc::clone(&self.fetcher);
        let outcome =
            tokio::task::spawn_blocking(move || download_all(fetcher.as_ref(), &stems, &dir)).await;

        let terminal = match outcome {
            Ok(Ok(())) => {
                self.refetch = false;
                ProvisioningState::Ready
            }
            Ok(Err(reason)) => ProvisioningState::Failed(reason),
            Err(e) => ProvisioningState::Failed(FailureReason::io(e.to_string())),
        };
        self.transition(terminal)
    }

    /// Mark the provisioned files as unusable, for example when one of them
    /// fails to decode. The next pass re-fetches every stem.
    pub fn invalidate(&mut self, reason: FailureReason) -> ProvisioningState {
        self.refetch = true;
        self.transition(ProvisioningState::Failed(reason))
    }

    fn transition(&self, next: ProvisioningState) -> ProvisioningState {
        if let ProvisioningState::Failed(reason) = &next {
            log::error!("Stem provisioning failed: {reason}");
        } else {
            log::debug!("Provisioning state -> {:?}", next);
        }
        self.state.send_replace(next.clone());
        next
    }
}

/// An absent directory is created and reported as missing every stem.
fn scan(dir: &Path, stems: &StemSet) -> io::Result<MissingStems> {
    let present: HashSet<String> = match fs::read_dir(dir) {
        Ok(entries) => {
            let mut names = HashSet::new();
            for entry in entries {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    names.insert(entry.file_name().to_string_lossy().into_owned());
                }
            }
            names
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir)?;
            HashSet::new()
        }
        Err(e) => return Err(e),
    };

    let mut missing = MissingStems::default();
    for stem in stems.iter() {
        if present.contains(&stem.file_name) {
            continue;
        }
        match stem.group {
            StemGroup::Primary => missing.primary.insert(stem.file_name.clone()),
            StemGroup::Click => missing.click.insert(stem.file_name.clone()),
        };
    }
    Ok(missing)
}

/// Fetch every stem in channel order, stopping at the first failure.
fn download_all(fetcher: &dyn StemFetcher, stems: &StemSet, dir: &Path) -> Result<(), FailureReason> {
    for stem in stems.iter() {
        let target = dir.join(&stem.file_name);
        log::info!("Fetching {} -> {}", stem.url, target.display());
        fetcher.fetch(&stem.url, &target).map_err(|e| FailureReason {
            kind: e.kind(),
            message: e.to_string(),
        })?;
    }
    Ok(())
}
