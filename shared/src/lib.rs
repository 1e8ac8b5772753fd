use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod codec;

pub const GRID_WIDTH: i32 = 30;
pub const GRID_HEIGHT: i32 = 30;
pub const START_HEALTH: i32 = 100;
pub const DEFAULT_PORT: u16 = 1234;
pub const BROADCAST_INTERVAL_MS: u64 = 10;

/// Keys understood inside an update record. Anything else is ignored.
pub const MOVEMENT_KEY: &str = "movement";
pub const ROTATION_KEY: &str = "rotation";
pub const NAME_KEY: &str = "name";

/// Full world keyed by connection identity (the peer address as a string)
pub type WorldState = HashMap<String, Player>;

/// Raw per-tick input record sent by a participant
pub type InputDelta = HashMap<String, String>;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coords {
    #[serde(rename = "X")]
    pub x: i32,
    #[serde(rename = "Y")]
    pub y: i32,
}

impl Coords {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn in_bounds(&self) -> bool {
        (0..GRID_WIDTH).contains(&self.x) && (0..GRID_HEIGHT).contains(&self.y)
    }

    /// One cell in `direction`, without any bounds handling
    pub fn offset(&self, direction: Direction) -> Coords {
        let (dx, dy) = direction.delta();
        Coords::new(self.x + dx, self.y + dy)
    }

    /// One cell in `direction`, or unchanged when the step would leave the grid
    pub fn step(&self, direction: Direction) -> Coords {
        let next = self.offset(direction);
        if next.in_bounds() {
            next
        } else {
            *self
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Rgba {
    #[serde(rename = "R")]
    pub r: u8,
    #[serde(rename = "G")]
    pub g: u8,
    #[serde(rename = "B")]
    pub b: u8,
    #[serde(rename = "A")]
    pub a: u8,
}

impl Rgba {
    pub fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Priority order used when several directions are requested in one tick
    pub const PRIORITY: [Direction; 4] = [
        Direction::Up,
        Direction::Right,
        Direction::Down,
        Direction::Left,
    ];

    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown direction {0:?}")]
pub struct UnknownDirection(pub String);

impl FromStr for Direction {
    type Err = UnknownDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            other => Err(UnknownDirection(other.to_string())),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Player {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Color")]
    pub color: Rgba,
    #[serde(rename = "Health")]
    pub health: i32,
    #[serde(rename = "Coords")]
    pub coords: Coords,
    #[serde(rename = "Direction")]
    pub direction: Direction,
}

impl Player {
    pub fn new(coords: Coords, color: Rgba) -> Self {
        Self {
            name: String::new(),
            color,
            health: START_HEALTH,
            coords,
            direction: Direction::Down,
        }
    }

    /// Applies a decoded update in place: one clamped step, then facing, then name
    pub fn apply(&mut self, update: &PlayerUpdate) {
        if let Some(direction) = update.movement {
            self.coords = self.coords.step(direction);
            self.direction = direction;
        }
        if let Some(direction) = update.rotation {
            self.direction = direction;
        }
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
    }
}

/// Recognized contents of an [`InputDelta`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerUpdate {
    pub movement: Option<Direction>,
    pub rotation: Option<Direction>,
    pub name: Option<String>,
}

impl PlayerUpdate {
    /// Unknown keys are dropped and unknown direction values read as absent.
    pub fn from_delta(delta: &InputDelta) -> Self {
        let direction = |key: &str| delta.get(key).and_then(|value| value.parse().ok());

        Self {
            movement: direction(MOVEMENT_KEY),
            rotation: direction(ROTATION_KEY),
            name: delta.get(NAME_KEY).cloned(),
        }
    }

    pub fn to_delta(&self) -> InputDelta {
        let mut delta = InputDelta::new();
        if let Some(direction) = self.movement {
            delta.insert(MOVEMENT_KEY.to_string(), direction.to_string());
        }
        if let Some(direction) = self.rotation {
            delta.insert(ROTATION_KEY.to_string(), direction.to_string());
        }
        if let Some(name) = &self.name {
            delta.insert(NAME_KEY.to_string(), name.clone());
        }
        delta
    }

    pub fn is_empty(&self) -> bool {
        self.movement.is_none() && self.rotation.is_none() && self.name.is_none()
    }
}

/// Client to server record
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ClientMessage {
    #[serde(rename = "Update", default)]
    pub update: Option<InputDelta>,
}

impl ClientMessage {
    pub fn update(delta: InputDelta) -> Self {
        Self {
            update: Some(delta),
        }
    }
}

/// Server to client record. A `null` state tells the client the session is over.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ServerMessage {
    #[serde(rename = "State", default)]
    pub state: Option<WorldState>,
}

impl ServerMessage {
    pub fn snapshot(state: WorldState) -> Self {
        Self { state: Some(state) }
    }

    pub fn terminal() -> Self {
        Self { state: None }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.as_ref().map_or(true, HashMap::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(pairs: &[(&str, &str)]) -> InputDelta {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_player_creation() {
        let player = Player::new(Coords::new(3, 4), Rgba::opaque(1, 2, 3));
        assert_eq!(player.health, START_HEALTH);
        assert_eq!(player.coords, Coords::new(3, 4));
        assert_eq!(player.color.a, 255);
        assert!(player.name.is_empty());
        assert_eq!(player.direction, Direction::Down);
    }

    #[test]
    fn test_movement_changes_one_axis() {
        let start = Coords::new(10, 10);
        let cases = [
            (Direction::Up, Coords::new(10, 9)),
            (Direction::Down, Coords::new(10, 11)),
            (Direction::Left, Coords::new(9, 10)),
            (Direction::Right, Coords::new(11, 10)),
        ];

        for (direction, expected) in cases {
            let mut player = Player::new(start, Rgba::opaque(9, 8, 7));
            player.name = "Bob".to_string();
            player.apply(&PlayerUpdate {
                movement: Some(direction),
                ..Default::default()
            });

            assert_eq!(player.coords, expected, "moving {}", direction);
            assert_eq!(player.direction, direction);
            assert_eq!(player.name, "Bob");
            assert_eq!(player.health, START_HEALTH);
            assert_eq!(player.color, Rgba::opaque(9, 8, 7));
        }
    }

    #[test]
    fn test_movement_clamped_at_edges() {
        let corner = Coords::new(0, 0);
        assert_eq!(corner.step(Direction::Up), corner);
        assert_eq!(corner.step(Direction::Left), corner);

        let far = Coords::new(GRID_WIDTH - 1, GRID_HEIGHT - 1);
        assert_eq!(far.step(Direction::Down), far);
        assert_eq!(far.step(Direction::Right), far);

        // Off-grid offset is still computable, only step refuses it
        assert!(!corner.offset(Direction::Up).in_bounds());
    }

    #[test]
    fn test_blocked_move_still_turns() {
        let mut player = Player::new(Coords::new(0, 5), Rgba::opaque(0, 0, 0));
        player.apply(&PlayerUpdate {
            movement: Some(Direction::Left),
            ..Default::default()
        });
        assert_eq!(player.coords, Coords::new(0, 5));
        assert_eq!(player.direction, Direction::Left);
    }

    #[test]
    fn test_rotation_turns_in_place() {
        let mut player = Player::new(Coords::new(7, 8), Rgba::opaque(4, 5, 6));
        player.name = "Dana".to_string();

        player.apply(&PlayerUpdate::from_delta(&delta(&[("rotation", "left")])));

        assert_eq!(player.direction, Direction::Left);
        assert_eq!(player.coords, Coords::new(7, 8));
        assert_eq!(player.name, "Dana");
        assert_eq!(player.health, START_HEALTH);
        assert_eq!(player.color, Rgba::opaque(4, 5, 6));
    }

    #[test]
    fn test_unknown_direction_message() {
        let err = "north".parse::<Direction>().unwrap_err();
        assert_eq!(err, UnknownDirection("north".to_string()));
        assert_eq!(err.to_string(), "unknown direction \"north\"");
    }

    #[test]
    fn test_update_from_delta_ignores_unknown() {
        let update = PlayerUpdate::from_delta(&delta(&[
            ("movement", "sideways"),
            ("name", "Alice"),
            ("colour", "red"),
        ]));

        assert_eq!(update.movement, None);
        assert_eq!(update.rotation, None);
        assert_eq!(update.name.as_deref(), Some("Alice"));

        let mut player = Player::new(Coords::new(5, 5), Rgba::opaque(1, 1, 1));
        player.apply(&update);
        assert_eq!(player.coords, Coords::new(5, 5));
        assert_eq!(player.name, "Alice");
    }

    #[test]
    fn test_update_empty() {
        assert!(PlayerUpdate::from_delta(&delta(&[("jump", "yes")])).is_empty());
        assert!(!PlayerUpdate::from_delta(&delta(&[("rotation", "up")])).is_empty());
    }

    #[test]
    fn test_update_to_delta_keys() {
        let update = PlayerUpdate {
            movement: Some(Direction::Right),
            rotation: None,
            name: Some("Carol".to_string()),
        };
        let delta = update.to_delta();
        assert_eq!(delta.len(), 2);
        assert_eq!(delta.get(MOVEMENT_KEY).map(String::as_str), Some("right"));
        assert_eq!(delta.get(NAME_KEY).map(String::as_str), Some("Carol"));
    }

    #[test]
    fn test_server_message_wire_format() {
        let mut state = WorldState::new();
        let mut player = Player::new(Coords::new(1, 2), Rgba::opaque(10, 20, 30));
        player.name = "Alice".to_string();
        state.insert("127.0.0.1:5000".to_string(), player);

        let json = serde_json::to_value(ServerMessage::snapshot(state)).unwrap();
        let entry = &json["State"]["127.0.0.1:5000"];
        assert_eq!(entry["Name"], "Alice");
        assert_eq!(entry["Color"]["R"], 10);
        assert_eq!(entry["Color"]["A"], 255);
        assert_eq!(entry["Health"], 100);
        assert_eq!(entry["Coords"]["X"], 1);
        assert_eq!(entry["Coords"]["Y"], 2);
        assert_eq!(entry["Direction"], "down");
    }

    #[test]
    fn test_terminal_message() {
        let json = serde_json::to_string(&ServerMessage::terminal()).unwrap();
        assert_eq!(json, r#"{"State":null}"#);

        let absent: ServerMessage = serde_json::from_str("{}").unwrap();
        assert!(absent.is_terminal());

        let empty: ServerMessage = serde_json::from_str(r#"{"State":{}}"#).unwrap();
        assert!(empty.is_terminal());
    }

    #[test]
    fn test_client_message_parsing() {
        let message: ClientMessage =
            serde_json::from_str(r#"{"Update":{"name":"Alice","extra":"x"}}"#).unwrap();
        let update = message.update.unwrap();
        assert_eq!(update.get("name").map(String::as_str), Some("Alice"));

        let empty: ClientMessage = serde_json::from_str(r#"{"Update":null}"#).unwrap();
        assert!(empty.update.is_none());
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("left".parse::<Direction>(), Ok(Direction::Left));
        assert!("Left".parse::<Direction>().is_err());
    }
}
