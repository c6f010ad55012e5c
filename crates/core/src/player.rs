use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use multitrack_assets::{AssetProvisioner, FailureReason, ProvisioningState, StemSet};
use multitrack_engine::{ChannelIndex, EngineError, EngineFacade};

use crate::error::PlayerError;
use crate::loop_region::LoopRegion;
use crate::poll::PositionPoller;
use crate::session::Session;
use crate::transport::Direction;

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSnapshot {
    pub name: String,
    pub volume: f32,
    pub pan: f32,
}

/// Everything the presentation layer shows, read under one lock.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub channels: Vec<ChannelSnapshot>,
    pub is_playing: bool,
    pub current_time_seconds: f64,
    pub total_length_seconds: f64,
    pub is_dragging: bool,
    pub loop_region: LoopRegion,
    pub tempo_ratio: f32,
    pub pitch_semitones: f32,
    pub loaded: bool,
}

/// Owns an engine for its whole lifetime: set up on construction, torn down
/// by `teardown`, with the position poller running in between.
pub struct Player<E> {
    session: Arc<Mutex<Session<E>>>,
    poller: Option<PositionPoller>,
    torn_down: bool,
}

impl<E: EngineFacade + Send + 'static> Player<E> {
    /// Set up and start `engine`. On failure the engine is torn down before
    /// the error is returned.
    pub fn new(mut engine: E, stems: &StemSet, output_channels: u16) -> Result<Self, PlayerError> {
        if let Err(e) = engine.setup(output_channels).and_then(|()| engine.start()) {
            log::error!("Engine failed to start: {e}");
            engine.teardown();
            return Err(e.into());
        }
        log::info!("Engine started with {output_channels} output channels");

        Ok(Self {
            session: Arc::new(Mutex::new(Session::new(engine, stems))),
            poller: None,
            torn_down: false,
        })
    }

    /// Run provisioning and load the stems once they are all present.
    ///
    /// A `Failed` state is returned as-is; calling again retries. A stem
    /// that does not decode fails provisioning too, and the retry downloads
    /// the whole set again.
    pub async fn provision(
        &self,
        provisioner: &mut AssetProvisioner,
    ) -> Result<ProvisioningState, PlayerError> {
        self.check_alive()?;
        let state = provisioner.ensure_assets_ready().await;
        if !state.is_ready() || self.lock()?.is_loaded() {
            return Ok(state);
        }

        // decode and resample on the blocking pool
        let paths = provisioner.local_paths();
        let session = Arc::clone(&self.session);
        let loaded = tokio::task::spawn_blocking(move || {
            let mut session = session.lock().map_err(|_| PlayerError::Poisoned)?;
            match session.load_stems(&paths) {
                Ok(()) => Ok(()),
                Err(e) => {
                    if let Err(unload) = session.unload() {
                        log::warn!("Failed to unload after a failed load: {unload}");
                    }
                    Err(PlayerError::from(e))
                }
            }
        })
        .await?;

        match loaded {
            Ok(()) => Ok(state),
            Err(PlayerError::Engine(e @ EngineError::Decode { .. })) => {
                log::error!("Stem failed to load: {e}");
                Ok(provisioner.invalidate(FailureReason::io(e.to_string())))
            }
            Err(e) => Err(e),
        }
    }

    /// Start the position poller. Does nothing if it is already running.
    pub fn start_polling(&mut self, interval: Duration) -> Result<(), PlayerError> {
        self.check_alive()?;
        if self.poller.is_none() {
            self.poller = Some(PositionPoller::spawn(Arc::clone(&self.session), interval));
        }
        Ok(())
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(|p| !p.is_finished())
    }

    /// Stop the poller, wait for it, then release the engine. Repeat calls
    /// are harmless.
    pub async fn teardown(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop().await;
        }
        if self.torn_down {
            return;
        }
        let mut session = match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        session.teardown();
        self.torn_down = true;
        log::info!("Engine torn down");
    }

    pub fn play_pause(&self) -> Result<(), PlayerError> {
        self.with_session(|s| s.play_pause())
    }

    pub fn set_channel_volume(&self, index: ChannelIndex, value: f32) -> Result<(), PlayerError> {
        self.with_session(|s| s.set_channel_volume(index, value))
    }

    pub fn set_channel_pan(&self, index: ChannelIndex, pan: f32) -> Result<(), PlayerError> {
        self.with_session(|s| s.set_channel_pan(index, pan))
    }

    pub fn tempo_delta(&self, direction: Direction) -> Result<(), PlayerError> {
        self.with_session(|s| s.tempo_delta(direction))
    }

    pub fn pitch_delta(&self, direction: Direction) -> Result<(), PlayerError> {
        self.with_session(|s| s.pitch_delta(direction))
    }

    pub fn on_seek_start(&self) -> Result<(), PlayerError> {
        self.with_session(|s| {
            s.on_seek_start();
            Ok(())
        })
    }

    pub fn seek(&self, time: f64) -> Result<(), PlayerError> {
        self.with_session(|s| s.seek(time))
    }

    pub fn on_seek_end(&self) -> Result<(), PlayerError> {
        self.with_session(|s| s.on_seek_end())
    }

    pub fn toggle_loop(&self) -> Result<(), PlayerError> {
        self.with_session(|s| {
            s.toggle_loop();
            Ok(())
        })
    }

    pub fn rewind(&self) -> Result<(), PlayerError> {
        self.with_session(|s| s.rewind())
    }

    pub fn snapshot(&self) -> Result<PlayerSnapshot, PlayerError> {
        let session = self.lock()?;
        Ok(PlayerSnapshot {
            channels: session
                .channels()
                .iter()
                .map(|c| ChannelSnapshot {
                    name: c.name().to_string(),
                    volume: c.volume(),
                    pan: c.pan(),
                })
                .collect(),
            is_playing: session.transport().is_playing,
            current_time_seconds: session.current_time_seconds(),
            total_length_seconds: session.total_length_seconds(),
            is_dragging: session.is_dragging(),
            loop_region: session.loop_region(),
            tempo_ratio: session.transport().tempo_ratio(),
            pitch_semitones: session.transport().pitch_semitones(),
            loaded: session.is_loaded(),
        })
    }

    /// Shared handle to the session, for callers that need more than the
    /// intent methods.
    pub fn session(&self) -> Arc<Mutex<Session<E>>> {
        Arc::clone(&self.session)
    }

    fn with_session<F>(&self, f: F) -> Result<(), PlayerError>
    where
        F: FnOnce(&mut Session<E>) -> Result<(), EngineError>,
    {
        self.check_alive()?;
        let mut session = self.lock()?;
        Ok(f(&mut session)?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Session<E>>, PlayerError> {
        self.session.lock().map_err(|_| PlayerError::Poisoned)
    }

    fn check_alive(&self) -> Result<(), PlayerError> {
        if self.torn_down {
            Err(PlayerError::TornDown)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loop_region::LoopPhase;
    use crate::testing::{Call, CallLog, FakeEngine, channel, seeks};
    use multitrack_assets::{FailureKind, FetchError, ProvisioningPolicy, StemFetcher};
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const ORIGIN: &str = "https://origin.test/song";

    #[derive(Default)]
    struct WritingFetcher {
        fetched: AtomicUsize,
    }

    impl WritingFetcher {
        fn fetched(&self) -> usize {
            self.fetched.load(Ordering::SeqCst)
        }
    }

    impl StemFetcher for WritingFetcher {
        fn fetch(&self, url: &str, target: &Path) -> Result<u64, FetchError> {
            self.fetched.fetch_add(1, Ordering::SeqCst);
            fs::write(target, url).unwrap();
            Ok(url.len() as u64)
        }
    }

    struct OfflineFetcher;

    impl StemFetcher for OfflineFetcher {
        fn fetch(&self, url: &str, _target: &Path) -> Result<u64, FetchError> {
            Err(FetchError::Transport {
                url: url.to_string(),
                reason: "offline".to_string(),
            })
        }
    }

    fn player() -> (Player<FakeEngine>, CallLog) {
        let engine = FakeEngine::new();
        let log = engine.log();
        let player = Player::new(engine, &StemSet::standard(ORIGIN), 2).unwrap();
        (player, log)
    }

    fn provisioner(dir: &Path, fetcher: Arc<dyn StemFetcher>) -> AssetProvisioner {
        AssetProvisioner::new(
            dir,
            StemSet::standard(ORIGIN),
            ProvisioningPolicy::Strict,
            fetcher,
        )
    }

    #[test]
    fn test_new_sets_up_and_starts() {
        let (_player, log) = player();
        assert_eq!(*log.lock().unwrap(), vec![Call::Setup(2), Call::Start]);
    }

    #[test]
    fn test_failed_setup_tears_down() {
        let mut engine = FakeEngine::new();
        engine.fail_setup = true;
        let log = engine.log();

        let result = Player::new(engine, &StemSet::standard(ORIGIN), 2);

        assert!(matches!(result, Err(PlayerError::Engine(_))));
        assert_eq!(*log.lock().unwrap(), vec![Call::Setup(2), Call::Teardown]);
    }

    #[tokio::test]
    async fn test_provision_loads_every_stem_at_its_index() {
        let dir = TempDir::new().unwrap();
        let (player, log) = player();
        let mut p = provisioner(dir.path(), Arc::new(WritingFetcher::default()));

        let state = player.provision(&mut p).await.unwrap();
        assert_eq!(state, ProvisioningState::Ready);

        let loads: Vec<(String, usize)> = log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::Load(path, index, _) => Some((
                    path.file_name().unwrap().to_string_lossy().into_owned(),
                    index.get(),
                )),
                _ => None,
            })
            .collect();
        assert_eq!(
            loads,
            vec![
                ("bass.mp3".to_string(), 0),
                ("drums.mp3".to_string(), 1),
                ("other.mp3".to_string(), 2),
                ("vocals.mp3".to_string(), 3),
                ("click.mp3".to_string(), 4),
            ]
        );

        let snapshot = player.snapshot().unwrap();
        assert!(snapshot.loaded);
        assert!(snapshot.total_length_seconds > 0.0);
    }

    #[tokio::test]
    async fn test_failed_provisioning_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let (player, log) = player();
        let mut p = provisioner(dir.path(), Arc::new(OfflineFetcher));

        let state = player.provision(&mut p).await.unwrap();

        assert!(matches!(state, ProvisioningState::Failed(_)));
        assert!(!player.snapshot().unwrap().loaded);
        assert!(!log.lock().unwrap().iter().any(|c| matches!(c, Call::Load(..))));
    }

    #[tokio::test]
    async fn test_provision_again_after_ready_does_not_reload() {
        let dir = TempDir::new().unwrap();
        let (player, log) = player();
        let mut p = provisioner(dir.path(), Arc::new(WritingFetcher::default()));

        player.provision(&mut p).await.unwrap();
        player.provision(&mut p).await.unwrap();

        let loads = log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, Call::Load(..)))
            .count();
        assert_eq!(loads, 5);
    }

    #[tokio::test]
    async fn test_undecodable_stems_fail_provisioning_until_refetched() {
        let dir = TempDir::new().unwrap();
        let (player, log) = player();
        let fetcher = Arc::new(WritingFetcher::default());
        let mut p = provisioner(dir.path(), fetcher.clone());
        player.session().lock().unwrap().engine_mut().load_fails = true;

        let state = player.provision(&mut p).await.unwrap();
        assert!(matches!(state, ProvisioningState::Failed(ref r) if r.kind == FailureKind::Io));
        assert_eq!(p.state(), state);
        assert!(!player.snapshot().unwrap().loaded);
        assert_eq!(fetcher.fetched(), 5);
        assert!(log.lock().unwrap().contains(&Call::UnloadAll));

        // the files on disk are complete, but the retry fetches them again
        player.session().lock().unwrap().engine_mut().load_fails = false;
        let state = player.provision(&mut p).await.unwrap();
        assert_eq!(state, ProvisioningState::Ready);
        assert_eq!(fetcher.fetched(), 10);
        assert!(player.snapshot().unwrap().loaded);

        let loads = log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, Call::Load(..)))
            .count();
        assert_eq!(loads, 1 + 5);
    }

    #[test]
    fn test_intents_reach_engine() {
        let (player, log) = player();
        player.set_channel_volume(channel(1), 0.4).unwrap();
        player.set_channel_pan(channel(1), 0.2).unwrap();
        player.tempo_delta(Direction::Down).unwrap();
        player.pitch_delta(Direction::Up).unwrap();
        player.on_seek_start().unwrap();
        player.seek(12.0).unwrap();
        player.on_seek_end().unwrap();
        player.rewind().unwrap();

        let calls = log.lock().unwrap().clone();
        assert!(calls.contains(&Call::SetGain(channel(1), 0.4)));
        assert!(calls.contains(&Call::SetPan(channel(1), 0.2)));
        assert!(calls.contains(&Call::Pitch(1.0)));
        assert_eq!(seeks(&log), vec![12.0, 0.0]);

        let snapshot = player.snapshot().unwrap();
        assert_eq!(snapshot.channels[1].volume, 0.4);
        assert!((snapshot.tempo_ratio - 0.95).abs() < 1e-6);
        assert!(!snapshot.is_dragging);
    }

    #[test]
    fn test_snapshot_reports_loop_phase() {
        let (player, _log) = player();
        player.toggle_loop().unwrap();
        assert_eq!(player.snapshot().unwrap().loop_region.phase(), LoopPhase::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_stops_poller_and_engine_once() {
        let dir = TempDir::new().unwrap();
        let (mut player, log) = player();
        let mut p = provisioner(dir.path(), Arc::new(WritingFetcher::default()));
        player.provision(&mut p).await.unwrap();
        player.play_pause().unwrap();
        player.start_polling(Duration::from_millis(50)).unwrap();
        assert!(player.is_polling());

        player.session().lock().unwrap().engine_mut().position = 4.0;
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(player.snapshot().unwrap().current_time_seconds, 4.0);

        player.teardown().await;
        player.teardown().await;

        assert!(!player.is_polling());
        let teardowns = log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == Call::Teardown)
            .count();
        assert_eq!(teardowns, 1);
        assert!(matches!(player.play_pause(), Err(PlayerError::TornDown)));
    }
}
