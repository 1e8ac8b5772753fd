use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Coords, Player, PlayerUpdate, Rgba, WorldState, GRID_HEIGHT, GRID_WIDTH};

/// Authoritative world: every player keyed by connection identity, plus the
/// dirty flag the broadcast tick consumes.
#[derive(Debug)]
pub struct GameState {
    players: WorldState,
    dirty: bool,
    rng: StdRng,
}

impl GameState {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            players: WorldState::new(),
            dirty: false,
            rng,
        }
    }

    pub fn players(&self) -> &WorldState {
        &self.players
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Spawns a player on a free cell. Returns `None` when the grid is full.
    pub fn add_player(&mut self, id: &str) -> Option<Coords> {
        let coords = self.random_empty_cell()?;
        let color = Rgba::opaque(self.rng.gen(), self.rng.gen(), self.rng.gen());

        self.players.insert(id.to_string(), Player::new(coords, color));
        self.mark_dirty();

        info!("Added player {} at ({}, {})", id, coords.x, coords.y);
        Some(coords)
    }

    pub fn remove_player(&mut self, id: &str) -> bool {
        if self.players.remove(id).is_some() {
            self.mark_dirty();
            info!("Removed player {}", id);
            true
        } else {
            false
        }
    }

    /// Read-modify-write of one player. Unknown ids are ignored.
    pub fn apply_update(&mut self, id: &str, update: &PlayerUpdate) -> bool {
        let Some(player) = self.players.get_mut(id) else {
            return false;
        };

        player.apply(update);
        debug!(
            "Player {} now at ({}, {}) facing {} named {:?}",
            id, player.coords.x, player.coords.y, player.direction, player.name
        );
        self.mark_dirty();
        true
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Reads and clears the dirty flag
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Rejection sampling over uniform cells until one is unoccupied
    pub fn random_empty_cell(&mut self) -> Option<Coords> {
        let capacity = (GRID_WIDTH * GRID_HEIGHT) as usize;
        if self.players.len() >= capacity {
            return None;
        }

        loop {
            let candidate = Coords::new(
                self.rng.gen_range(0..GRID_WIDTH),
                self.rng.gen_range(0..GRID_HEIGHT),
            );
            if !self.is_occupied(candidate) {
                return Some(candidate);
            }
        }
    }

    fn is_occupied(&self, coords: Coords) -> bool {
        self.players.values().any(|player| player.coords == coords)
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}
