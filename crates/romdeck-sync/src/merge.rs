//! Merge aggregation for rows representing the same logical game
//!
//! Used when a migration set (the remote catalog re-identified a title) is
//! folded into its replacement row. Favorite ORs, play stats sum, ratings
//! take the max, hidden requires all sources hidden, and the earliest
//! added-at wins.

use romdeck_store::GameRow;

/// Aggregate user-owned data across `sources`.
///
/// A single source is returned unchanged. With multiple sources the result
/// has `id = 0` (it seeds a fresh row) and carries the first local path the
/// validator approves.
pub fn aggregate_game_data<F>(sources: &[GameRow], path_valid: F) -> Option<GameRow>
where
    F: Fn(&str) -> bool,
{
    if sources.is_empty() {
        return None;
    }
    if sources.len() == 1 {
        return Some(sources[0].clone());
    }

    let mut merged = sources[0].clone();
    merged.id = 0;

    merged.local_path = sources
        .iter()
        .filter_map(|s| s.local_path.as_deref())
        .find(|path| path_valid(path))
        .map(str::to_string);

    merged.is_favorite = sources.iter().any(|s| s.is_favorite);
    merged.is_hidden = sources.iter().all(|s| s.is_hidden);
    merged.backlogged = sources.iter().any(|s| s.backlogged);
    merged.now_playing = sources.iter().any(|s| s.now_playing);

    merged.play_count = sources.iter().map(|s| s.play_count).sum();
    merged.play_time_minutes = sources.iter().map(|s| s.play_time_minutes).sum();

    merged.user_rating = sources.iter().map(|s| s.user_rating).max().unwrap_or(0);
    merged.user_difficulty = sources.iter().map(|s| s.user_difficulty).max().unwrap_or(0);
    merged.completion = sources.iter().map(|s| s.completion).max().unwrap_or(0);
    merged.achievement_count = sources
        .iter()
        .map(|s| s.achievement_count)
        .max()
        .unwrap_or(0);

    merged.added_at = sources
        .iter()
        .map(|s| s.added_at)
        .min()
        .unwrap_or(merged.added_at);
    merged.last_played = sources.iter().filter_map(|s| s.last_played).max();

    Some(merged)
}
