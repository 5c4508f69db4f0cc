use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{error, info};

use crate::constants::{IDLE_EVICT_AFTER_SECS, IDLE_SWEEP_INTERVAL_SECS};
use crate::engine::GameEngine;
use crate::store::GameStore;
use crate::types::VisibleGameState;

/// One live game bound to (at most) one transport. `transport_id` guards
/// against a stale socket tearing down a session that a reconnect already
/// took over.
pub struct Session {
    pub transport_id: u64,
    pub game: GameEngine,
    pub paused: bool,
    pub last_activity: Instant,
}

struct Inner {
    sessions: HashMap<String, Session>,
    store: GameStore,
}

/// Process-wide cache of live games. Gameplay writes stay in memory; the
/// durable store only sees checkpoints (descend, terminal status,
/// disconnect, idle eviction, shutdown drain).
pub struct SessionManager {
    inner: Mutex<Inner>,
}

impl SessionManager {
    pub fn new(store: GameStore) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sessions: HashMap::new(),
                store,
            }),
        }
    }

    /// Puts a freshly created game into the cache, replacing any session
    /// already under that id.
    pub async fn register(
        &self,
        game_id: &str,
        transport_id: u64,
        game: GameEngine,
    ) -> VisibleGameState {
        let mut inner = self.inner.lock().await;
        let visible = game.visible_state();
        inner.sessions.insert(
            game_id.to_string(),
            Session {
                transport_id,
                game,
                paused: false,
                last_activity: Instant::now(),
            },
        );
        visible
    }

    /// Binds a connection to an existing game: the cached session if there is
    /// one (superseding whatever transport held it), otherwise a rehydrate
    /// from the durable store.
    pub async fn attach(
        &self,
        game_id: &str,
        transport_id: u64,
        seed: u32,
    ) -> Option<VisibleGameState> {
        let mut inner = self.inner.lock().await;
        if let Some(session) = inner.sessions.get_mut(game_id) {
            session.transport_id = transport_id;
            session.last_activity = Instant::now();
            return Some(session.game.visible_state());
        }

        let state = inner.store.load(game_id)?;
        let game = GameEngine::from_state(state, seed);
        let visible = game.visible_state();
        inner.sessions.insert(
            game_id.to_string(),
            Session {
                transport_id,
                game,
                paused: false,
                last_activity: Instant::now(),
            },
        );
        Some(visible)
    }

    /// Runs one closure against the session with the map lock held; this is
    /// what serialises a game's turns. Bumps the activity clock.
    pub async fn with_session<R>(
        &self,
        game_id: &str,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Option<R> {
        let mut inner = self.inner.lock().await;
        let session = inner.sessions.get_mut(game_id)?;
        session.last_activity = Instant::now();
        Some(f(session))
    }

    /// Writes the cached state through to the durable store. Failures are
    /// logged and swallowed; the session stays usable in memory.
    pub async fn checkpoint(&self, game_id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(state) = inner
            .sessions
            .get(game_id)
            .map(|session| session.game.state.clone())
        else {
            return false;
        };
        match inner.store.save(&state) {
            Ok(()) => true,
            Err(err) => {
                error!(game_id, error = %err, "checkpoint failed; keeping session in memory");
                false
            }
        }
    }

    pub async fn set_paused(&self, game_id: &str, paused: bool) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.sessions.get_mut(game_id) {
            Some(session) => {
                session.paused = paused;
                session.last_activity = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Drops the session, checkpointing first. With a `transport_id` the
    /// removal only happens when it still owns the session, so a reconnected
    /// game is not killed by its predecessor's close.
    pub async fn unregister(&self, game_id: &str, transport_id: Option<u64>) {
        let mut inner = self.inner.lock().await;
        let owns = inner
            .sessions
            .get(game_id)
            .map(|session| transport_id.map_or(true, |t| t == session.transport_id))
            .unwrap_or(false);
        if !owns {
            return;
        }
        if let Some(session) = inner.sessions.remove(game_id) {
            if let Err(err) = inner.store.save(&session.game.state) {
                error!(game_id, error = %err, "checkpoint on disconnect failed");
            }
            info!(game_id, "session closed");
        }
    }

    pub async fn sweep_idle(&self) -> usize {
        self.sweep_older_than(Duration::from_secs(IDLE_EVICT_AFTER_SECS))
            .await
    }

    async fn sweep_older_than(&self, cutoff: Duration) -> usize {
        let mut inner = self.inner.lock().await;
        let expired: Vec<String> = inner
            .sessions
            .iter()
            .filter(|(_, session)| !session.paused && session.last_activity.elapsed() >= cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        for game_id in &expired {
            if let Some(session) = inner.sessions.remove(game_id) {
                // Store trouble does not keep a dead session alive.
                if let Err(err) = inner.store.save(&session.game.state) {
                    error!(game_id, error = %err, "checkpoint failed during idle eviction");
                } else {
                    info!(game_id, "idle session evicted");
                }
            }
        }
        expired.len()
    }

    /// Checkpoints and drops every cached session; the shutdown path.
    pub async fn drain(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let sessions = std::mem::take(&mut inner.sessions);
        let count = sessions.len();
        for (game_id, session) in sessions {
            if let Err(err) = inner.store.save(&session.game.state) {
                error!(game_id, error = %err, "checkpoint failed during drain");
            }
        }
        count
    }

    pub fn spawn_idle_sweeper(self: Arc<Self>) {
        let manager = self;
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(IDLE_SWEEP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                manager.sweep_idle().await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CharacterKind;
    use std::path::PathBuf;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "{}-{}-{}",
            name,
            std::process::id(),
            rand::random::<u32>()
        ))
    }

    fn make_engine(id: &str) -> GameEngine {
        GameEngine::new_game(id.to_string(), "Tester".to_string(), CharacterKind::Dwarf, 7)
            .expect("new game")
    }

    #[tokio::test]
    async fn attach_reuses_cached_session_and_supersedes_transport() {
        let dir = temp_dir("session-attach");
        let manager = SessionManager::new(GameStore::new(&dir));
        manager.register("game_1", 1, make_engine("game_1")).await;

        let visible = manager.attach("game_1", 2, 99).await.expect("cached");
        assert_eq!(visible.id, "game_1");

        // The old transport no longer owns the session, so its close must
        // not remove it.
        manager.unregister("game_1", Some(1)).await;
        assert!(manager.attach("game_1", 3, 99).await.is_some());

        // The current transport does own it.
        manager.unregister("game_1", Some(3)).await;
        let inner = manager.inner.lock().await;
        assert!(inner.sessions.is_empty());
        drop(inner);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn unregister_checkpoints_before_removal() {
        let dir = temp_dir("session-unregister");
        let manager = SessionManager::new(GameStore::new(&dir));
        manager.register("game_1", 1, make_engine("game_1")).await;
        manager
            .with_session("game_1", |session| {
                session.game.state.score = 555;
            })
            .await
            .expect("session exists");

        manager.unregister("game_1", None).await;

        // Rehydrates from the store with the checkpointed score.
        let visible = manager.attach("game_1", 2, 11).await.expect("from store");
        assert_eq!(visible.score, 555);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn idle_sweep_skips_paused_sessions() {
        let dir = temp_dir("session-sweep");
        let manager = SessionManager::new(GameStore::new(&dir));
        manager.register("game_a", 1, make_engine("game_a")).await;
        manager.register("game_b", 2, make_engine("game_b")).await;
        manager.set_paused("game_b", true).await;

        let evicted = manager.sweep_older_than(Duration::ZERO).await;
        assert_eq!(evicted, 1);

        let inner = manager.inner.lock().await;
        assert!(!inner.sessions.contains_key("game_a"));
        assert!(inner.sessions.contains_key("game_b"));
        // The evicted game reached the store.
        assert!(inner.store.load("game_a").is_some());
        drop(inner);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn drain_flushes_everything() {
        let dir = temp_dir("session-drain");
        let manager = SessionManager::new(GameStore::new(&dir));
        manager.register("game_a", 1, make_engine("game_a")).await;
        manager.register("game_b", 2, make_engine("game_b")).await;

        assert_eq!(manager.drain().await, 2);

        let inner = manager.inner.lock().await;
        assert!(inner.sessions.is_empty());
        assert!(inner.store.load("game_a").is_some());
        assert!(inner.store.load("game_b").is_some());
        drop(inner);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
