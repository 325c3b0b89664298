//! Collaborator seams consumed by the engine: player stats and ratings,
//! system-message delivery, and user presence. The engine only ever talks to
//! these traits; real backends live outside this crate. In-memory
//! implementations back the demo binary and the test suites.

use shared::PlayerId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError(pub String);

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store error: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerStats {
    pub wins: u32,
    pub losses: u32,
}

pub trait PlayerStatsStore: Send + Sync {
    fn record_win(&self, player: PlayerId) -> Result<(), StoreError>;
    fn record_loss(&self, player: PlayerId) -> Result<(), StoreError>;
    fn stats(&self, player: PlayerId) -> Result<PlayerStats, StoreError>;
    fn rating(&self, player: PlayerId) -> Result<i32, StoreError>;
    /// Applies a delta and returns the new rating.
    fn update_rating(&self, player: PlayerId, delta: i32) -> Result<i32, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemMessageKind {
    HeroCode,
    RatingChange,
}

/// A system message is a type tag plus structured variables; rendering and
/// localization happen at the edge, never here.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemMessage {
    pub kind: SystemMessageKind,
    pub vars: HashMap<String, String>,
}

impl SystemMessage {
    pub fn hero_code(code: String) -> Self {
        let mut vars = HashMap::new();
        vars.insert("code".to_string(), code);
        Self {
            kind: SystemMessageKind::HeroCode,
            vars,
        }
    }

    pub fn rating_change(delta: i32, rating: i32) -> Self {
        let mut vars = HashMap::new();
        vars.insert("delta".to_string(), delta.to_string());
        vars.insert("rating".to_string(), rating.to_string());
        Self {
            kind: SystemMessageKind::RatingChange,
            vars,
        }
    }
}

pub trait SystemMessenger: Send + Sync {
    fn send(&self, player: PlayerId, message: SystemMessage);
}

pub trait PresenceLookup: Send + Sync {
    fn connections(&self, player: PlayerId) -> Vec<String>;
}

#[derive(Debug, Default)]
pub struct MemoryStatsStore {
    records: Mutex<HashMap<PlayerId, (PlayerStats, i32)>>,
}

impl MemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_record<T>(
        &self,
        player: PlayerId,
        f: impl FnOnce(&mut (PlayerStats, i32)) -> T,
    ) -> Result<T, StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| StoreError("stats store poisoned".to_string()))?;
        let record = records
            .entry(player)
            .or_insert((PlayerStats::default(), shared::DEFAULT_RATING));
        Ok(f(record))
    }
}

impl PlayerStatsStore for MemoryStatsStore {
    fn record_win(&self, player: PlayerId) -> Result<(), StoreError> {
        self.with_record(player, |(stats, _)| stats.wins += 1)
    }

    fn record_loss(&self, player: PlayerId) -> Result<(), StoreError> {
        self.with_record(player, |(stats, _)| stats.losses += 1)
    }

    fn stats(&self, player: PlayerId) -> Result<PlayerStats, StoreError> {
        self.with_record(player, |(stats, _)| *stats)
    }

    fn rating(&self, player: PlayerId) -> Result<i32, StoreError> {
        self.with_record(player, |(_, rating)| *rating)
    }

    fn update_rating(&self, player: PlayerId, delta: i32) -> Result<i32, StoreError> {
        self.with_record(player, |(_, rating)| {
            *rating += delta;
            *rating
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryMessenger {
    sent: Mutex<Vec<(PlayerId, SystemMessage)>>,
}

impl MemoryMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(PlayerId, SystemMessage)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl SystemMessenger for MemoryMessenger {
    fn send(&self, player: PlayerId, message: SystemMessage) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((player, message));
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryPresence {
    connections: Mutex<HashMap<PlayerId, Vec<String>>>,
}

impl MemoryPresence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, player: PlayerId, connection: String) {
        if let Ok(mut connections) = self.connections.lock() {
            connections.entry(player).or_default().push(connection);
        }
    }
}

impl PresenceLookup for MemoryPresence {
    fn connections(&self, player: PlayerId) -> Vec<String> {
        self.connections
            .lock()
            .ok()
            .and_then(|c| c.get(&player).cloned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_default_then_accumulate() {
        let store = MemoryStatsStore::new();

        assert_eq!(store.stats(1).unwrap(), PlayerStats::default());
        assert_eq!(store.rating(1).unwrap(), shared::DEFAULT_RATING);

        store.record_win(1).unwrap();
        store.record_win(1).unwrap();
        store.record_loss(1).unwrap();

        let stats = store.stats(1).unwrap();
        assert_eq!(stats.wins, 2);
        assert_eq!(stats.losses, 1);
    }

    #[test]
    fn test_rating_updates_apply_delta() {
        let store = MemoryStatsStore::new();
        assert_eq!(store.update_rating(7, 8).unwrap(), shared::DEFAULT_RATING + 8);
        assert_eq!(store.update_rating(7, -16).unwrap(), shared::DEFAULT_RATING - 8);
    }

    #[test]
    fn test_messenger_keeps_structured_vars() {
        let messenger = MemoryMessenger::new();
        messenger.send(3, SystemMessage::rating_change(-8, 1192));

        let sent = messenger.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 3);
        assert_eq!(sent[0].1.kind, SystemMessageKind::RatingChange);
        assert_eq!(sent[0].1.vars.get("delta").map(String::as_str), Some("-8"));
    }

    #[test]
    fn test_presence_roundtrip() {
        let presence = MemoryPresence::new();
        presence.register(4, "conn-a".to_string());
        presence.register(4, "conn-b".to_string());

        assert_eq!(presence.connections(4).len(), 2);
        assert!(presence.connections(5).is_empty());
    }
}
