use std::sync::Arc;

use dashmap::DashMap;

use crate::config::GameConfig;
use crate::room::{self, RoomHandle};

/// Registry holds every live room, keyed by room id.
///
/// Rooms are created lazily on first reference and only leave the registry
/// when their host closes them. Empty or idle rooms are kept.
pub struct Registry {
    rooms: DashMap<String, RoomHandle>,
    config: GameConfig,
}

impl Registry {
    pub fn new(config: GameConfig) -> Arc<Self> {
        Arc::new(Self {
            rooms: DashMap::new(),
            config,
        })
    }

    /// Returns the room for `room_id`, spawning it if it does not exist yet.
    pub fn get_or_create_room(self: &Arc<Self>, room_id: &str) -> RoomHandle {
        self.rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                tracing::info!("Room {} created", room_id);
                room::spawn(room_id.to_string(), self.config, Arc::downgrade(self))
            })
            .value()
            .clone()
    }

    /// Looks a room up without creating it.
    pub fn get(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.get(room_id).map(|r| r.value().clone())
    }

    pub fn remove_room(&self, room_id: &str) -> bool {
        let removed = self.rooms.remove(room_id).is_some();
        if removed {
            tracing::info!("Room {} removed", room_id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_id_returns_same_room() {
        let registry = Registry::new(GameConfig::default());
        let a = registry.get_or_create_room("123456");
        let b = registry.get_or_create_room("123456");
        assert_eq!(a.room_id(), b.room_id());
        assert_eq!(registry.len(), 1);

        registry.get_or_create_room("654321");
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn lookup_does_not_create() {
        let registry = Registry::new(GameConfig::default());
        assert!(registry.get("nope").is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn fresh_room_is_waiting_and_empty() {
        let registry = Registry::new(GameConfig::default());
        let room = registry.get_or_create_room("r");
        let list = room.snapshot().await.unwrap();
        assert!(list.data.is_empty());
        assert!(list.waiting_for_players);
        assert!(!list.game_started);
        assert!(!list.game_ended);
    }

    #[tokio::test]
    async fn remove_is_explicit() {
        let registry = Registry::new(GameConfig::default());
        registry.get_or_create_room("r");
        assert!(registry.remove_room("r"));
        assert!(!registry.remove_room("r"));
        assert!(registry.is_empty());
    }
}
