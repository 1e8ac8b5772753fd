use shared::{Player, WorldState};
use std::fmt::Write;

/// Finds the local participant's entry. The server keys players by the peer
/// address it sees, which is our local socket address.
pub fn find_own_player<'a>(state: &'a WorldState, local_id: &str) -> Option<&'a Player> {
    state.get(local_id)
}

/// Text roster of the world, one line per player, sorted by identity
pub fn describe_state(state: &WorldState) -> String {
    let mut entries: Vec<(&String, &Player)> = state.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = String::new();
    for (id, player) in entries {
        let _ = writeln!(
            out,
            "{} ({}): Health = {} at ({}, {}) facing {}",
            player.name, id, player.health, player.coords.x, player.coords.y, player.direction
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Coords, Rgba};

    fn player(name: &str, x: i32, y: i32) -> Player {
        let mut player = Player::new(Coords::new(x, y), Rgba::opaque(0, 0, 0));
        player.name = name.to_string();
        player
    }

    #[test]
    fn test_describe_state_sorted() {
        let mut state = WorldState::new();
        state.insert("b:2".to_string(), player("Bob", 3, 4));
        state.insert("a:1".to_string(), player("Alice", 1, 2));

        let text = describe_state(&state);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "Alice (a:1): Health = 100 at (1, 2) facing down");
        assert_eq!(lines[1], "Bob (b:2): Health = 100 at (3, 4) facing down");
    }

    #[test]
    fn test_describe_empty_state() {
        assert!(describe_state(&WorldState::new()).is_empty());
    }

    #[test]
    fn test_find_own_player() {
        let mut state = WorldState::new();
        state.insert("127.0.0.1:6000".to_string(), player("Me", 0, 0));

        assert_eq!(
            find_own_player(&state, "127.0.0.1:6000").map(|p| p.name.as_str()),
            Some("Me")
        );
        assert!(find_own_player(&state, "127.0.0.1:6001").is_none());
    }
}
