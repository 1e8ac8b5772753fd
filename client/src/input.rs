//! Client input batching: at most one update record per sampling tick

use shared::{Direction, InputDelta, PlayerUpdate};

/// Collects what the input collaborator reported during one tick and turns it
/// into a single update record at the tick boundary.
#[derive(Debug, Default)]
pub struct InputManager {
    pressed: [bool; 4],
    facing: Option<Direction>,
    name: Option<String>,
}

/// One line of user input from the terminal front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Move(Direction),
    Face(Direction),
    Rename(String),
    Quit,
}

impl Command {
    /// Parses `w|a|s|d`, direction words, `face <dir>`, `name <name>` and `quit`
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match (word, rest) {
            ("w" | "up", "") => Some(Command::Move(Direction::Up)),
            ("s" | "down", "") => Some(Command::Move(Direction::Down)),
            ("a" | "left", "") => Some(Command::Move(Direction::Left)),
            ("d" | "right", "") => Some(Command::Move(Direction::Right)),
            ("face", dir) => dir.parse().ok().map(Command::Face),
            ("name", name) if !name.is_empty() => Some(Command::Rename(name.to_string())),
            ("quit" | "q", "") => Some(Command::Quit),
            _ => None,
        }
    }
}

fn slot(direction: Direction) -> usize {
    match direction {
        Direction::Up => 0,
        Direction::Right => 1,
        Direction::Down => 2,
        Direction::Left => 3,
    }
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a movement direction as held for the current tick
    pub fn press(&mut self, direction: Direction) {
        self.pressed[slot(direction)] = true;
    }

    pub fn face(&mut self, direction: Direction) {
        self.facing = Some(direction);
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Feeds one parsed command. Returns false for [`Command::Quit`].
    pub fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Move(direction) => self.press(direction),
            Command::Face(direction) => self.face(direction),
            Command::Rename(name) => self.rename(name),
            Command::Quit => return false,
        }
        true
    }

    /// The movement that wins this tick: first held direction in
    /// [`Direction::PRIORITY`] order
    pub fn movement(&self) -> Option<Direction> {
        Direction::PRIORITY
            .into_iter()
            .find(|direction| self.pressed[slot(*direction)])
    }

    /// Closes the tick: returns the batched record, if any, and clears the batch
    pub fn take_update(&mut self) -> Option<InputDelta> {
        let update = PlayerUpdate {
            movement: self.movement(),
            rotation: self.facing.take(),
            name: self.name.take(),
        };
        self.pressed = [false; 4];

        if update.is_empty() {
            None
        } else {
            Some(update.to_delta())
        }
    }
}
