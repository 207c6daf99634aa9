use std::collections::BTreeMap;

use chrono::prelude::*;
use serde::{Deserialize, Serialize};

use crate::GameConfig;

/// Longest player name kept in records.
const NAME_MAX: usize = 20;
/// The leaderboard keeps only the best entries.
const LEADERBOARD_MAX: usize = 10;

const LEADERBOARD_PREFIX: &str = "ms_lb_";
const STATS_PREFIX: &str = "ms_stats_";

/// One finished game on a board's leaderboard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub name: String,
    /// Completion time in whole seconds.
    pub time: u32,
    pub ts: DateTime<Utc>,
}

/// Cumulative wins by player name for one board configuration.
pub type WinCounts = BTreeMap<String, u32>;

/// String key-value storage the records live in. The browser shell backs
/// this with local storage; anything map-like works.
pub trait ScoreStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
    fn remove(&mut self, key: &str);
}

impl ScoreStore for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        BTreeMap::get(self, key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.insert(key.to_owned(), value.to_owned());
    }

    fn remove(&mut self, key: &str) {
        BTreeMap::remove(self, key);
    }
}

/// Trims and truncates a player name, falling back to `"Player"`.
pub fn sanitize_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        "Player".to_owned()
    } else {
        trimmed.chars().take(NAME_MAX).collect()
    }
}

fn leaderboard_key(config: &GameConfig) -> String {
    format!("{}{}", LEADERBOARD_PREFIX, config.board_key())
}

fn stats_key(config: &GameConfig) -> String {
    format!("{}{}", STATS_PREFIX, config.board_key())
}

/// Stored records that are missing or fail to parse degrade to empty.
pub fn load_leaderboard(store: &impl ScoreStore, config: &GameConfig) -> Vec<ScoreEntry> {
    load(store, &leaderboard_key(config))
}

pub fn load_win_counts(store: &impl ScoreStore, config: &GameConfig) -> WinCounts {
    load(store, &stats_key(config))
}

fn load<T: for<'de> Deserialize<'de> + Default>(store: &impl ScoreStore, key: &str) -> T {
    store
        .get(key)
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default()
}

fn save<T: Serialize>(store: &mut impl ScoreStore, key: &str, value: &T) {
    match serde_json::to_string(value) {
        Ok(raw) => store.set(key, &raw),
        Err(err) => log::error!("could not serialize records for {}: {}", key, err),
    }
}

/// Records a finished game: bumps the player's win count and re-ranks the
/// board's leaderboard, keeping the ten best entries ordered by time and
/// then by timestamp. Returns the player's cumulative win count.
pub fn record_win(
    store: &mut impl ScoreStore,
    config: &GameConfig,
    name: &str,
    time: u32,
    ts: DateTime<Utc>,
) -> u32 {
    let name = sanitize_name(name);

    let mut counts = load_win_counts(store, config);
    let wins = counts.entry(name.clone()).and_modify(|n| *n += 1).or_insert(1);
    let wins = *wins;
    save(store, &stats_key(config), &counts);

    let mut entries = load_leaderboard(store, config);
    entries.push(ScoreEntry { name, time, ts });
    entries.sort_by(|a, b| a.time.cmp(&b.time).then(a.ts.cmp(&b.ts)));
    entries.truncate(LEADERBOARD_MAX);
    save(store, &leaderboard_key(config), &entries);

    log::debug!(
        "recorded {}s win on {}, {} total wins",
        time,
        config.board_key(),
        wins
    );
    wins
}

/// Drops both record kinds for this board configuration only.
pub fn clear_records(store: &mut impl ScoreStore, config: &GameConfig) {
    store.remove(&leaderboard_key(config));
    store.remove(&stats_key(config));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn names_are_trimmed_truncated_and_defaulted() {
        assert_eq!(sanitize_name("  Soyeon  "), "Soyeon");
        assert_eq!(sanitize_name(""), "Player");
        assert_eq!(sanitize_name("   "), "Player");
        assert_eq!(sanitize_name(&"x".repeat(30)), "x".repeat(20));
    }

    #[test]
    fn leaderboard_sorts_by_time_then_timestamp() {
        let mut store = BTreeMap::new();
        let config = GameConfig::easy();

        record_win(&mut store, &config, "slow", 90, ts(0));
        record_win(&mut store, &config, "late", 30, ts(2));
        record_win(&mut store, &config, "early", 30, ts(1));

        let entries = load_leaderboard(&store, &config);
        let order: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(order, vec!["early", "late", "slow"]);
    }

    #[test]
    fn leaderboard_keeps_only_the_ten_best() {
        let mut store = BTreeMap::new();
        let config = GameConfig::easy();

        for i in 0..12u32 {
            record_win(&mut store, &config, &format!("p{}", i), 100 - i, ts(i as i64));
        }

        let entries = load_leaderboard(&store, &config);
        assert_eq!(entries.len(), 10);
        // the two slowest runs fell off
        assert!(entries.iter().all(|e| e.time <= 98));
    }

    #[test]
    fn win_counts_accumulate_per_name() {
        let mut store = BTreeMap::new();
        let config = GameConfig::easy();

        assert_eq!(record_win(&mut store, &config, "ana", 40, ts(0)), 1);
        assert_eq!(record_win(&mut store, &config, "ana", 35, ts(1)), 2);
        assert_eq!(record_win(&mut store, &config, "bob", 50, ts(2)), 1);

        let counts = load_win_counts(&store, &config);
        assert_eq!(counts.get("ana"), Some(&2));
        assert_eq!(counts.get("bob"), Some(&1));
    }

    #[test]
    fn records_are_scoped_to_the_board_configuration() {
        let mut store = BTreeMap::new();
        let easy = GameConfig::easy();
        let hard = GameConfig::hard();

        record_win(&mut store, &easy, "ana", 40, ts(0));
        record_win(&mut store, &hard, "ana", 200, ts(1));

        clear_records(&mut store, &easy);

        assert!(load_leaderboard(&store, &easy).is_empty());
        assert!(load_win_counts(&store, &easy).is_empty());
        assert_eq!(load_leaderboard(&store, &hard).len(), 1);
        assert_eq!(load_win_counts(&store, &hard).get("ana"), Some(&1));
    }

    #[test]
    fn corrupt_stored_data_degrades_to_empty() {
        let mut store = BTreeMap::new();
        let config = GameConfig::easy();
        store.set(&leaderboard_key(&config), "not json at all");
        store.set(&stats_key(&config), "[1, 2, 3]");

        assert!(load_leaderboard(&store, &config).is_empty());
        assert!(load_win_counts(&store, &config).is_empty());
    }
}
