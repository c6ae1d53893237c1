//! Timer-driven automatic sync (feature `scheduler`).

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::{SyncManager, SyncOptions, SyncOutcome};
use crate::config::SyncSettings;
use crate::fs::AsyncFileSystem;
use crate::remote::RemoteSource;
use crate::state::{StateStore, SyncState};

/// A running auto-sync timer. Stops when dropped.
///
/// Each tick runs [`SyncManager::sync`] with `auto = true`. A tick that finds
/// the state already borrowed (a manual run or a hook holds it) is skipped
/// rather than queued. Restart the timer after changing the frequency.
pub struct AutoSync {
    handle: JoinHandle<()>,
    period: Duration,
}

impl AutoSync {
    /// Start the timer. Returns `None` when the configured frequency is 0.
    ///
    /// The first run happens one period after spawning.
    pub async fn spawn<FS, R, S>(
        manager: Arc<SyncManager<FS, R, S>>,
        state: Arc<Mutex<SyncState>>,
        settings: Arc<RwLock<SyncSettings>>,
    ) -> Option<Self>
    where
        FS: AsyncFileSystem + 'static,
        R: RemoteSource + 'static,
        S: StateStore + 'static,
    {
        let period = settings.read().await.auto_sync_interval()?;
        info!("Auto sync every {}s", period.as_secs());

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;

                let Ok(mut state) = state.try_lock() else {
                    debug!("Auto sync tick skipped: state is busy");
                    continue;
                };
                let settings = settings.read().await.clone();
                match manager.sync(&mut state, &settings, SyncOptions::auto()).await {
                    Ok(SyncOutcome::Completed(summary)) => {
                        debug!("Auto sync {} finished", summary.run_id)
                    }
                    Ok(SyncOutcome::Skipped { .. }) => {}
                    Err(e) => warn!("Auto sync failed: {}", e),
                }
            }
        });

        Some(Self { handle, period })
    }

    /// Time between runs.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether the timer task is still alive.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the timer. A run in progress is abandoned at its next suspension point.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for AutoSync {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::fs::{InMemoryFileSystem, SyncToAsyncFs};
    use crate::progress::{NoopSink, StatusQueue};
    use crate::state::MemoryStateStore;
    use crate::test_utils::{ScriptedRemote, record};

    type Manager =
        SyncManager<SyncToAsyncFs<InMemoryFileSystem>, Arc<ScriptedRemote>, Arc<MemoryStateStore>>;

    fn setup(minutes: u32) -> (Arc<Manager>, Arc<ScriptedRemote>, Arc<RwLock<SyncSettings>>) {
        let remote = Arc::new(ScriptedRemote::new(vec![record(
            "a",
            "Alpha",
            "2024-05-01T10:00:00Z",
        )]));
        let manager = Arc::new(SyncManager::new(
            SyncToAsyncFs::new(InMemoryFileSystem::new()),
            "/vault",
            remote.clone(),
            Arc::new(MemoryStateStore::new()),
            Arc::new(SystemClock),
            StatusQueue::new(Arc::new(NoopSink), Arc::new(SystemClock)),
        ));
        let settings = Arc::new(RwLock::new(SyncSettings {
            api_token: "token".into(),
            sync_frequency_minutes: minutes,
            ..Default::default()
        }));
        (manager, remote, settings)
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_when_frequency_is_zero() {
        let (manager, _, settings) = setup(0);
        let state = Arc::new(Mutex::new(SyncState::default()));
        assert!(AutoSync::spawn(manager, state, settings).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_after_each_period() {
        let (manager, remote, settings) = setup(1);
        let state = Arc::new(Mutex::new(SyncState::default()));
        let auto = AutoSync::spawn(manager, state.clone(), settings).await.unwrap();
        assert_eq!(auto.period(), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(remote.requests().is_empty());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(remote.requests().len(), 1);
        assert!(state.lock().await.last_successful_cursor.is_some());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(remote.requests().len(), 2);
        assert!(auto.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_state_skips_tick() {
        let (manager, remote, settings) = setup(1);
        let state = Arc::new(Mutex::new(SyncState::default()));
        let _auto = AutoSync::spawn(manager, state.clone(), settings).await.unwrap();

        let guard = state.lock().await;
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(remote.requests().is_empty());
        drop(guard);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(remote.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_timer() {
        let (manager, remote, settings) = setup(1);
        let state = Arc::new(Mutex::new(SyncState::default()));
        let auto = AutoSync::spawn(manager, state, settings).await.unwrap();
        auto.stop();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(remote.requests().is_empty());
        assert!(!auto.is_running());
    }
}
