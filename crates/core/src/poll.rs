//! Periodic reconciliation of the engine clock with the session.
//!
//! The engine only reports its position when asked, so a background task
//! polls the session at a fixed interval until it is cancelled.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, TryLockError};
use std::time::Duration;

use multitrack_engine::EngineFacade;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::Session;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Handle to a running poll loop.
///
/// Dropping the handle cancels the loop without waiting for it; `stop`
/// cancels and waits.
pub struct PositionPoller {
    cancel: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl PositionPoller {
    /// Spawn the poll loop on the current tokio runtime.
    pub fn spawn<E>(session: Arc<Mutex<Session<E>>>, interval: Duration) -> Self
    where
        E: EngineFacade + Send + 'static,
    {
        let (cancel, mut cancelled) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            log::debug!("Position poller started ({} ms)", interval.as_millis());

            loop {
                tokio::select! {
                    _ = &mut cancelled => break,
                    _ = ticker.tick() => {
                        if poll_once(&session).is_break() {
                            break;
                        }
                    }
                }
            }

            log::debug!("Position poller stopped");
        });

        Self { cancel, task }
    }

    /// Cancel the loop and wait until its last tick has finished.
    pub async fn stop(self) {
        let _ = self.cancel.send(());
        if let Err(e) = self.task.await {
            log::error!("Position poller task failed: {e}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

fn poll_once<E: EngineFacade>(session: &Mutex<Session<E>>) -> ControlFlow<()> {
    // Skip this tick if an intent holds the session
    let mut session = match session.try_lock() {
        Ok(guard) => guard,
        Err(TryLockError::WouldBlock) => return ControlFlow::Continue(()),
        Err(TryLockError::Poisoned(_)) => {
            log::error!("Session lock poisoned, stopping position poller");
            return ControlFlow::Break(());
        }
    };

    if let Err(e) = session.tick() {
        log::warn!("Position poll failed: {e}");
    }
    ControlFlow::Continue(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeEngine;
    use multitrack_assets::StemSet;
    use multitrack_engine::ChannelIndex;
    use std::path::PathBuf;

    fn shared_session(playing: bool) -> Arc<Mutex<Session<FakeEngine>>> {
        let mut session = Session::new(FakeEngine::new(), &StemSet::standard("https://origin.test"));
        session
            .load_stems(&[(ChannelIndex::REFERENCE, PathBuf::from("/song/bass.mp3"))])
            .unwrap();
        if playing {
            session.play_pause().unwrap();
        }
        Arc::new(Mutex::new(session))
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_position_while_playing() {
        let session = shared_session(true);
        session.lock().unwrap().engine_mut().position = 7.5;

        let poller = PositionPoller::spawn(Arc::clone(&session), DEFAULT_POLL_INTERVAL);
        tokio::time::sleep(Duration::from_millis(120)).await;
        poller.stop().await;

        assert_eq!(session.lock().unwrap().current_time_seconds(), 7.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_at_interval() {
        let session = shared_session(false);
        let before = session.lock().unwrap().engine().polls.get();

        let poller = PositionPoller::spawn(Arc::clone(&session), DEFAULT_POLL_INTERVAL);
        // first tick fires immediately, then every 50 ms
        tokio::time::sleep(Duration::from_millis(225)).await;
        poller.stop().await;

        let polls = session.lock().unwrap().engine().polls.get() - before;
        assert_eq!(polls, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_leaves_no_ticks_behind() {
        let session = shared_session(true);
        let poller = PositionPoller::spawn(Arc::clone(&session), DEFAULT_POLL_INTERVAL);
        tokio::time::sleep(Duration::from_millis(100)).await;
        poller.stop().await;

        let after_stop = session.lock().unwrap().engine().polls.get();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(session.lock().unwrap().engine().polls.get(), after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skips_ticks_while_session_is_held() {
        let session = shared_session(true);
        let before = session.lock().unwrap().engine().polls.get();
        let poller = PositionPoller::spawn(Arc::clone(&session), DEFAULT_POLL_INTERVAL);

        {
            let mut held = session.lock().unwrap();
            held.engine_mut().position = 30.0;
            tokio::time::sleep(Duration::from_millis(200)).await;
            assert_eq!(held.engine().polls.get(), before);
            drop(held);
        }

        tokio::time::sleep(Duration::from_millis(60)).await;
        poller.stop().await;
        let session = session.lock().unwrap();
        assert!(session.engine().polls.get() > before);
        assert_eq!(session.current_time_seconds(), 30.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels_loop() {
        let session = shared_session(false);
        let poller = PositionPoller::spawn(Arc::clone(&session), DEFAULT_POLL_INTERVAL);
        tokio::time::sleep(Duration::from_millis(60)).await;
        drop(poller);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let after_drop = session.lock().unwrap().engine().polls.get();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(session.lock().unwrap().engine().polls.get(), after_drop);
    }
}
