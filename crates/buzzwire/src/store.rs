//! Persistence collaborator boundary.
//!
//! The engine treats storage as an external key-value collaborator behind
//! a lookup/upsert contract. Real deployments put a database behind this
//! trait; tests and the demo use [`MemoryStore`].

use std::collections::HashMap;
use std::sync::Mutex;

use buzzwire_protocol::{GameId, GameSnapshot};

/// Lookup/upsert contract for persisted sessions.
///
/// The payload is exactly the structure produced by
/// `QuizGame::generate_status()` plus identity/token/state metadata — see
/// [`GameSnapshot`]. Both calls are synchronous; implementations backed by
/// slow storage should do their own buffering.
pub trait GameStore: Send + Sync + 'static {
    /// Loads a persisted session, or `None` when it was never saved.
    /// Absence is a normal lookup miss, not an error.
    fn load(&self, game_id: GameId) -> Option<GameSnapshot>;

    /// Inserts or replaces the session's snapshot, returning its id.
    fn save(&self, snapshot: &GameSnapshot) -> GameId;
}

/// A shared store is still a store; lets one backing store serve several
/// engine instances.
impl<S: GameStore> GameStore for std::sync::Arc<S> {
    fn load(&self, game_id: GameId) -> Option<GameSnapshot> {
        self.as_ref().load(game_id)
    }

    fn save(&self, snapshot: &GameSnapshot) -> GameId {
        self.as_ref().save(snapshot)
    }
}

/// An in-memory [`GameStore`] for tests and the demo server.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<GameId, GameSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted sessions.
    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GameStore for MemoryStore {
    fn load(&self, game_id: GameId) -> Option<GameSnapshot> {
        self.rows
            .lock()
            .ok()
            .and_then(|rows| rows.get(&game_id).cloned())
    }

    fn save(&self, snapshot: &GameSnapshot) -> GameId {
        if let Ok(mut rows) = self.rows.lock() {
            rows.insert(snapshot.game_id, snapshot.clone());
        }
        snapshot.game_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buzzwire_game::{GameConfig, QuizGame};

    #[test]
    fn test_memory_store_save_and_load() {
        let store = MemoryStore::new();
        let game = QuizGame::new(GameConfig::default());
        let snapshot = game.snapshot();

        assert!(store.load(game.id()).is_none());
        assert_eq!(store.save(&snapshot), game.id());
        assert_eq!(store.load(game.id()), Some(snapshot));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_memory_store_save_replaces() {
        let store = MemoryStore::new();
        let mut game = QuizGame::new(GameConfig::default());
        store.save(&game.snapshot());

        game.advance_question();
        store.save(&game.snapshot());

        assert_eq!(store.len(), 1);
        let loaded = store.load(game.id()).unwrap();
        assert_eq!(loaded.status.question_number, 2);
    }
}
