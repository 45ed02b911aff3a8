//! Read-only view of the host game server
//!
//! The query server never owns game state. Every request asks a
//! [`HostState`] implementation for a fresh snapshot, so concurrent requests
//! may observe different player lists.

use shared::{PermissionSnapshot, ServerSnapshot};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Live state supplied by the host process.
///
/// Implementations are called concurrently from connection handlers and must
/// not block for long.
pub trait HostState: Send + Sync + 'static {
    /// Current server port, player limit and online player names.
    fn snapshot(&self) -> ServerSnapshot;

    /// Permission groups of `player`. Unknown players yield an empty snapshot.
    fn permissions(&self, player: &str) -> PermissionSnapshot;
}

/// Host state kept in memory, updated by the owning process.
#[derive(Debug)]
pub struct InMemoryHost {
    server_port: u16,
    max_players: u32,
    players: RwLock<Vec<String>>,
    groups: RwLock<HashMap<String, PermissionSnapshot>>,
}

impl InMemoryHost {
    pub fn new(server_port: u16, max_players: u32) -> Self {
        Self {
            server_port,
            max_players,
            players: RwLock::new(Vec::new()),
            groups: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_players<I, S>(self, players: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_players(players);
        self
    }

    /// Adds `player` to the end of the online list. Returns false if the
    /// player was already online.
    pub fn add_player(&self, player: impl Into<String>) -> bool {
        let player = player.into();
        let mut players = write(&self.players);
        if players.contains(&player) {
            return false;
        }
        players.push(player);
        true
    }

    pub fn remove_player(&self, player: &str) -> bool {
        let mut players = write(&self.players);
        let before = players.len();
        players.retain(|name| name != player);
        players.len() != before
    }

    pub fn set_players<I, S>(&self, players: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *write(&self.players) = players.into_iter().map(Into::into).collect();
    }

    pub fn online_players(&self) -> Vec<String> {
        read(&self.players).clone()
    }

    /// Replaces the groups of `player`. `primary` need not be part of `groups`.
    pub fn set_groups(
        &self,
        player: impl Into<String>,
        primary: impl Into<String>,
        groups: Vec<String>,
    ) {
        write(&self.groups).insert(player.into(), PermissionSnapshot::new(primary, groups));
    }

    pub fn clear_groups(&self, player: &str) -> bool {
        write(&self.groups).remove(player).is_some()
    }
}

impl HostState for InMemoryHost {
    fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot::new(self.server_port, self.max_players, self.online_players())
    }

    fn permissions(&self, player: &str) -> PermissionSnapshot {
        read(&self.groups).get(player).cloned().unwrap_or_default()
    }
}

// A writer that panicked cannot leave a half-applied Vec or HashMap behind,
// so poisoned locks are still safe to use.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_snapshot_reflects_players() {
        let host = InMemoryHost::new(25565, 20).with_players(["Alice", "Bob"]);
        let snapshot = host.snapshot();

        assert_eq!(snapshot.server_port, 25565);
        assert_eq!(snapshot.max_players, 20);
        assert_eq!(snapshot.online_players, vec!["Alice", "Bob"]);
        assert_eq!(snapshot.player_count(), 2);
    }

    #[test]
    fn test_add_and_remove_players() {
        let host = InMemoryHost::new(25565, 20);

        assert!(host.add_player("Alice"));
        assert!(host.add_player("Bob"));
        assert!(!host.add_player("Alice"));
        assert_eq!(host.online_players(), vec!["Alice", "Bob"]);

        assert!(host.remove_player("Alice"));
        assert!(!host.remove_player("Alice"));
        assert_eq!(host.online_players(), vec!["Bob"]);
    }

    #[test]
    fn test_snapshot_is_not_cached() {
        let host = InMemoryHost::new(25565, 20);
        let before = host.snapshot();

        host.add_player("Carol");
        let after = host.snapshot();

        assert_eq!(before.player_count(), 0);
        assert_eq!(after.player_count(), 1);
    }

    #[test]
    fn test_permissions_lookup() {
        let host = InMemoryHost::new(25565, 20);
        host.set_groups(
            "Alice",
            "admin",
            vec!["admin".to_string(), "builder".to_string()],
        );

        let permissions = host.permissions("Alice");
        assert_eq!(permissions.primary_group, "admin");
        assert_eq!(permissions.others(), vec!["builder"]);

        assert!(host.clear_groups("Alice"));
        assert_eq!(host.permissions("Alice"), PermissionSnapshot::default());
    }

    #[test]
    fn test_unknown_player_permissions() {
        let host = InMemoryHost::new(25565, 20);
        assert_eq!(host.permissions("nobody"), PermissionSnapshot::default());
    }

    #[test]
    fn test_concurrent_reads_and_writes() {
        let host = Arc::new(InMemoryHost::new(25565, 100));

        let writers: Vec<_> = (0..4)
            .map(|i| {
                let host = Arc::clone(&host);
                std::thread::spawn(move || {
                    for j in 0..25 {
                        host.add_player(format!("player{}-{}", i, j));
                        let _ = host.snapshot();
                    }
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(host.snapshot().player_count(), 100);
    }
}
