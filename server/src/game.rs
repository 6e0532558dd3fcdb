use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    Direction, GameStatus, Point, ServerPacket, Snake, GRID_CAPACITY, GRID_HEIGHT, GRID_WIDTH,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use uuid::Uuid;

/// Opaque identifier the transport assigns to each open connection.
pub type ConnectionId = u64;

pub type PlayerId = String;

/// Result of one simulation step.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick: u64,
    /// Players removed this tick, with their connection if it is still open.
    pub dead: Vec<(PlayerId, Option<ConnectionId>)>,
    /// World state after the step, ready to broadcast.
    pub snapshot: ServerPacket,
}

/// The authoritative world: connections, snakes, food and admin grants.
///
/// Owned by the game loop task, so every method runs with exclusive access
/// and a tick never observes a half-applied command.
#[derive(Debug)]
pub struct GameState {
    pub tick: u64,
    connections: HashMap<ConnectionId, PlayerId>,
    snakes: HashMap<PlayerId, Snake>,
    food: BTreeSet<Point>,
    admins: HashSet<PlayerId>,
    rng: StdRng,
}

impl GameState {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Creates a world with a fixed random seed.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            tick: 0,
            connections: HashMap::new(),
            snakes: HashMap::new(),
            food: BTreeSet::new(),
            admins: HashSet::new(),
            rng,
        }
    }

    fn random_point(&mut self) -> Point {
        Point::new(
            self.rng.gen_range(0..GRID_WIDTH),
            self.rng.gen_range(0..GRID_HEIGHT),
        )
    }

    fn spawn_snake(&mut self, player_id: &str) -> Snake {
        let spawn = self.random_point();
        Snake::new(player_id, spawn)
    }

    /// Registers a new connection and gives its player a fresh snake.
    ///
    /// Seeds the food set if it is empty.
    pub fn add_player(&mut self, conn: ConnectionId) -> PlayerId {
        let player_id = Uuid::new_v4().to_string();
        let snake = self.spawn_snake(&player_id);

        info!(
            "Added player {} on connection {} at ({}, {})",
            player_id,
            conn,
            snake.head().x,
            snake.head().y
        );
        self.connections.insert(conn, player_id.clone());
        self.snakes.insert(player_id.clone(), snake);

        if self.food.is_empty() {
            self.add_food();
        }

        player_id
    }

    /// Forgets a connection and everything owned by its player.
    ///
    /// Returns the player that was removed, or None if the connection was
    /// already gone.
    pub fn remove_player(&mut self, conn: ConnectionId) -> Option<PlayerId> {
        let player_id = self.connections.remove(&conn)?;
        self.snakes.remove(&player_id);
        self.admins.remove(&player_id);
        info!("Removed player {} (connection {})", player_id, conn);
        Some(player_id)
    }

    /// Replaces a player's snake with a fresh one. No-op for unknown players.
    pub fn restart(&mut self, player_id: &str) {
        if !self.is_connected(player_id) {
            return;
        }
        let snake = self.spawn_snake(player_id);
        self.snakes.insert(player_id.to_string(), snake);
        debug!("Player {} restarted", player_id);
    }

    pub fn set_direction(&mut self, player_id: &str, direction: Direction) {
        if let Some(snake) = self.snakes.get_mut(player_id) {
            snake.set_direction(direction);
        }
    }

    /// Grants admin to `player_id` the first time it issues an admin command.
    ///
    /// Every caller is trusted, so this always returns true.
    pub fn grant_admin_if_first(&mut self, player_id: &str) -> bool {
        if self.admins.insert(player_id.to_string()) {
            info!("Granted admin to player {}", player_id);
        }
        true
    }

    pub fn is_admin(&self, player_id: &str) -> bool {
        self.admins.contains(player_id)
    }

    /// Places one food item on a random free cell.
    ///
    /// Retries until it draws a cell that holds no food. Returns None only
    /// when every cell already holds food.
    pub fn add_food(&mut self) -> Option<Point> {
        if self.food.len() >= GRID_CAPACITY {
            return None;
        }
        loop {
            let candidate = self.random_point();
            if self.food.insert(candidate) {
                return Some(candidate);
            }
        }
    }

    /// Clears all snakes and food, then respawns every connected player.
    pub fn reset_game(&mut self) {
        self.snakes.clear();
        self.food.clear();

        let players: Vec<PlayerId> = self.connections.values().cloned().collect();
        for player_id in players {
            let snake = self.spawn_snake(&player_id);
            self.snakes.insert(player_id, snake);
        }

        self.add_food();
        info!("Game reset with {} players", self.snakes.len());
    }

    /// Clears the whole world and returns the connections that were open.
    ///
    /// Closing those connections is the caller's job.
    pub fn kick_all(&mut self) -> Vec<ConnectionId> {
        let kicked: Vec<ConnectionId> = self.connections.keys().copied().collect();
        self.connections.clear();
        self.snakes.clear();
        self.admins.clear();
        self.food.clear();
        info!("Kicked {} connections", kicked.len());
        kicked
    }

    pub fn player_for(&self, conn: ConnectionId) -> Option<&PlayerId> {
        self.connections.get(&conn)
    }

    pub fn connection_for(&self, player_id: &str) -> Option<ConnectionId> {
        self.connections
            .iter()
            .find(|(_, id)| id.as_str() == player_id)
            .map(|(conn, _)| *conn)
    }

    pub fn is_connected(&self, player_id: &str) -> bool {
        self.connections.values().any(|id| id == player_id)
    }

    pub fn snake(&self, player_id: &str) -> Option<&Snake> {
        self.snakes.get(player_id)
    }

    pub fn food(&self) -> &BTreeSet<Point> {
        &self.food
    }

    pub fn player_count(&self) -> usize {
        self.connections.len()
    }

    pub fn snake_count(&self) -> usize {
        self.snakes.len()
    }

    pub fn admin_count(&self) -> usize {
        self.admins.len()
    }

    /// Puts a specific snake into the world, replacing the player's current one.
    pub fn insert_snake(&mut self, snake: Snake) {
        self.snakes.insert(snake.player_id.clone(), snake);
    }

    /// Puts a food item on a specific cell. Returns false if it was taken.
    pub fn insert_food(&mut self, p: Point) -> bool {
        self.food.insert(p)
    }

    /// Advances the world by one tick.
    ///
    /// Moves every snake, resolves food, then resolves collisions against the
    /// post-move board so no snake sees another one mid-move. Dead snakes are
    /// removed and their players lose admin.
    pub fn step(&mut self) -> TickReport {
        self.tick += 1;

        for snake in self.snakes.values_mut() {
            snake.move_forward();
        }

        self.resolve_food();
        self.resolve_collisions();

        let dead_ids: Vec<PlayerId> = self
            .snakes
            .iter()
            .filter(|(_, snake)| !snake.alive)
            .map(|(id, _)| id.clone())
            .collect();

        let mut dead = Vec::with_capacity(dead_ids.len());
        for player_id in dead_ids {
            self.snakes.remove(&player_id);
            self.admins.remove(&player_id);
            debug!("Player {} died on tick {}", player_id, self.tick);
            let conn = self.connection_for(&player_id);
            dead.push((player_id, conn));
        }

        TickReport {
            tick: self.tick,
            dead,
            snapshot: self.snapshot(),
        }
    }

    fn resolve_food(&mut self) {
        let eaters: Vec<(PlayerId, Point)> = self
            .snakes
            .iter()
            .filter(|(_, snake)| self.food.contains(&snake.head()))
            .map(|(id, snake)| (id.clone(), snake.head()))
            .collect();

        for (player_id, head) in eaters {
            // Two heads on one food item: only the first eater gets it
            if !self.food.remove(&head) {
                continue;
            }
            if let Some(snake) = self.snakes.get_mut(&player_id) {
                snake.grow();
            }
            self.add_food();
        }
    }

    fn resolve_collisions(&mut self) {
        let mut doomed: Vec<PlayerId> = Vec::new();

        for (id, snake) in &self.snakes {
            let head = snake.head();
            let hit = self
                .snakes
                .iter()
                .filter(|(other_id, _)| *other_id != id)
                .any(|(_, other)| other.head() == head || other.occupies(head));
            if hit {
                doomed.push(id.clone());
            }
        }

        for id in doomed {
            if let Some(snake) = self.snakes.get_mut(&id) {
                snake.alive = false;
            }
        }
    }

    /// Current world as an `update` packet.
    pub fn snapshot(&self) -> ServerPacket {
        let snakes: BTreeMap<String, Snake> = self
            .snakes
            .iter()
            .map(|(id, snake)| (id.clone(), snake.clone()))
            .collect();

        ServerPacket::Update {
            snakes,
            food: self.food.iter().copied().collect(),
            state: GameStatus::Playing,
        }
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}
