//! Session-scoped achievement progression cache
//!
//! Earned-achievement state keyed by the remote achievement-provider game
//! id. Refreshed at most once per app session unless forced; cleared when
//! the app resumes from background. Lookups are pure cache reads and never
//! trigger a fetch.

use crate::SyncError;
use romdeck_remote::{ApiProvider, EarnedAchievement};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct CacheState {
    refreshed_this_session: bool,
    by_game: HashMap<i64, Vec<EarnedAchievement>>,
}

pub struct AchievementCache {
    api: Arc<dyn ApiProvider>,
    state: Mutex<CacheState>,
}

impl AchievementCache {
    pub fn new(api: Arc<dyn ApiProvider>) -> Self {
        Self {
            api,
            state: Mutex::new(CacheState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().expect("achievement cache mutex poisoned")
    }

    /// Invalidate the cache so the next guarded refresh refetches
    pub fn on_app_resumed(&self) {
        let mut state = self.state();
        state.refreshed_this_session = false;
        state.by_game.clear();
    }

    /// Earned badge ids for one game; empty for unknown keys
    pub fn earned_badge_ids(&self, ra_game_id: i64) -> HashSet<String> {
        self.state()
            .by_game
            .get(&ra_game_id)
            .map(|achievements| achievements.iter().map(|a| a.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Earned achievements for one game; empty for unknown keys
    pub fn earned_achievements(&self, ra_game_id: i64) -> Vec<EarnedAchievement> {
        self.state()
            .by_game
            .get(&ra_game_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Unconditional refresh: run the incremental provider refresh, then
    /// rebuild the cache from the user's progression listing. Requires a
    /// user with achievements-provider linkage; otherwise a no-op.
    pub async fn refresh_on_startup(&self) {
        let Some(api) = self.api.api() else {
            return;
        };

        let user = match api.current_user().await {
            Ok(user) => user,
            Err(err) => {
                tracing::debug!("progression refresh skipped, user fetch failed: {err}");
                return;
            }
        };
        if user.ra_username.as_deref().map(str::trim).unwrap_or("").is_empty() {
            return;
        }

        let mut progression = user
            .ra_progression
            .as_ref()
            .map(|p| p.results.clone())
            .unwrap_or_default();

        match api.refresh_ra_progression(user.id).await {
            Ok(()) => {
                self.state().refreshed_this_session = true;
                if let Ok(refreshed) = api.current_user().await {
                    progression = refreshed
                        .ra_progression
                        .map(|p| p.results)
                        .unwrap_or_default();
                }
            }
            Err(err) => {
                tracing::debug!("incremental progression refresh failed: {err}");
                self.state().refreshed_this_session = true;
            }
        }

        let by_game: HashMap<i64, Vec<EarnedAchievement>> = progression
            .into_iter()
            .filter_map(|game| game.rom_ra_id.map(|id| (id, game.earned_achievements)))
            .collect();
        self.state().by_game = by_game;
    }

    /// Guarded refresh: at most one provider refresh per session. Once the
    /// flag is set, further calls short-circuit to success without any
    /// network call until the next app resume.
    pub async fn refresh_if_needed(&self) -> Result<(), SyncError> {
        if self.state().refreshed_this_session {
            return Ok(());
        }

        let api = self.api.api().ok_or(SyncError::NotConnected)?;

        let user = api.current_user().await?;
        if user.ra_username.as_deref().map(str::trim).unwrap_or("").is_empty() {
            return Err(SyncError::Failed(
                "No achievements username configured".to_string(),
            ));
        }

        api.refresh_ra_progression(user.id).await?;
        self.state().refreshed_this_session = true;
        Ok(())
    }
}
