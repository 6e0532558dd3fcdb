//! Types shared between the Snake Royale server and its clients.
//!
//! The board is a fixed 50x30 grid of cells. Every snake is an ordered list of
//! cells, head first, advancing one cell per server tick. The wire protocol in
//! [`protocol`] carries these types as JSON.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

pub mod protocol;

pub use protocol::{
    decode_client_command, AdminCommand, ClientCommand, ClientPacket, GameStatus, ProtocolError,
    ServerPacket,
};

pub const GRID_WIDTH: i32 = 50;
pub const GRID_HEIGHT: i32 = 30;
pub const TICK_INTERVAL_MS: u64 = 120;

/// Number of cells on the board.
pub const GRID_CAPACITY: usize = (GRID_WIDTH * GRID_HEIGHT) as usize;

/// A cell on the board. `x` grows to the right, `y` grows downwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Returns true if the point lies on the board.
    pub fn in_bounds(&self) -> bool {
        in_bounds(*self)
    }

    /// Returns the neighbouring cell one step in `direction`.
    pub fn step(&self, direction: Direction) -> Point {
        let (dx, dy) = direction.vector();
        Point {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Returns true iff `0 <= p.x < GRID_WIDTH` and `0 <= p.y < GRID_HEIGHT`.
pub fn in_bounds(p: Point) -> bool {
    (0..GRID_WIDTH).contains(&p.x) && (0..GRID_HEIGHT).contains(&p.y)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    #[default]
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Unit offset of one step in this direction.
    pub fn vector(&self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl FromStr for Direction {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            other => Err(ProtocolError::UnknownDirection(other.to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A player's snake.
///
/// `cells` is ordered head first and is never empty. Once `alive` is false the
/// snake no longer moves and is dropped by the server at the end of the tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snake {
    pub player_id: String,
    pub cells: VecDeque<Point>,
    pub direction: Direction,
    pub alive: bool,
}

#[allow(clippy::len_without_is_empty)]
impl Snake {
    /// Creates a single-cell snake at `spawn`, heading right.
    pub fn new(player_id: impl Into<String>, spawn: Point) -> Self {
        Self {
            player_id: player_id.into(),
            cells: VecDeque::from([spawn]),
            direction: Direction::default(),
            alive: true,
        }
    }

    /// Creates a snake from its head followed by the rest of its body.
    pub fn from_cells(
        player_id: impl Into<String>,
        head: Point,
        body: impl IntoIterator<Item = Point>,
        direction: Direction,
    ) -> Self {
        let mut cells = VecDeque::from([head]);
        cells.extend(body);
        Self {
            player_id: player_id.into(),
            cells,
            direction,
            alive: true,
        }
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    /// Advances the snake one cell.
    ///
    /// The new head is pushed and the tail dropped before any collision test,
    /// so moving into the cell the tail just left is safe. Leaving the board or
    /// landing on the remaining body kills the snake.
    pub fn move_forward(&mut self) {
        if !self.alive {
            return;
        }

        let head = self.head().step(self.direction);
        self.cells.push_front(head);
        self.cells.pop_back();

        if !head.in_bounds() {
            self.alive = false;
        }
        if self.cells.iter().skip(1).any(|cell| *cell == head) {
            self.alive = false;
        }
    }

    /// Duplicates the tail cell so the snake is one segment longer after the
    /// next move.
    pub fn grow(&mut self) {
        let tail = self.tail();
        self.cells.push_back(tail);
    }

    pub fn head(&self) -> Point {
        self.cells[0]
    }

    pub fn tail(&self) -> Point {
        self.cells[self.cells.len() - 1]
    }

    pub fn occupies(&self, p: Point) -> bool {
        self.cells.iter().any(|cell| *cell == p)
    }

    /// Number of cells. Never zero.
    pub fn len(&self) -> usize {
        self.cells.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_snake() -> Snake {
        Snake::from_cells(
            "p1",
            Point::new(5, 5),
            [Point::new(4, 5), Point::new(3, 5)],
            Direction::Right,
        )
    }

    #[test]
    fn test_in_bounds_edges() {
        assert!(in_bounds(Point::new(0, 0)));
        assert!(in_bounds(Point::new(GRID_WIDTH - 1, GRID_HEIGHT - 1)));
        assert!(!in_bounds(Point::new(-1, 0)));
        assert!(!in_bounds(Point::new(0, -1)));
        assert!(!in_bounds(Point::new(GRID_WIDTH, 0)));
        assert!(!in_bounds(Point::new(0, GRID_HEIGHT)));
    }

    #[test]
    fn test_direction_parsing() {
        for direction in Direction::ALL {
            assert_eq!(direction.as_str().parse::<Direction>().unwrap(), direction);
        }
        assert!("UP".parse::<Direction>().is_err());
        assert!("north".parse::<Direction>().is_err());
        assert!("".parse::<Direction>().is_err());
    }

    #[test]
    fn test_new_snake_defaults() {
        let snake = Snake::new("p1", Point::new(10, 10));
        assert_eq!(snake.len(), 1);
        assert_eq!(snake.head(), Point::new(10, 10));
        assert_eq!(snake.direction, Direction::Right);
        assert!(snake.alive);
    }

    #[test]
    fn test_move_follows_direction() {
        for direction in Direction::ALL {
            let mut snake = Snake::new("p1", Point::new(10, 10));
            snake.set_direction(direction);
            snake.move_forward();

            let (dx, dy) = direction.vector();
            assert_eq!(snake.head(), Point::new(10 + dx, 10 + dy));
            assert_eq!(snake.len(), 1);
            assert!(snake.alive);
        }
    }

    #[test]
    fn test_move_keeps_length() {
        let mut snake = straight_snake();
        snake.move_forward();

        let cells: Vec<Point> = snake.cells.iter().copied().collect();
        assert_eq!(
            cells,
            vec![Point::new(6, 5), Point::new(5, 5), Point::new(4, 5)]
        );
        assert!(snake.alive);
    }

    #[test]
    fn test_wall_collision() {
        let mut snake = Snake::new("p1", Point::new(GRID_WIDTH - 1, 10));
        snake.move_forward();
        assert!(!snake.alive);
        assert_eq!(snake.head(), Point::new(GRID_WIDTH, 10));

        // Dead snakes stay where they are
        snake.move_forward();
        assert_eq!(snake.head(), Point::new(GRID_WIDTH, 10));
    }

    #[test]
    fn test_wall_collision_all_sides() {
        let cases = [
            (Point::new(0, 10), Direction::Left),
            (Point::new(10, 0), Direction::Up),
            (Point::new(10, GRID_HEIGHT - 1), Direction::Down),
        ];

        for (spawn, direction) in cases {
            let mut snake = Snake::new("p1", spawn);
            snake.set_direction(direction);
            snake.move_forward();
            assert!(!snake.alive, "expected death moving {} from {:?}", direction, spawn);
        }
    }

    #[test]
    fn test_self_collision() {
        let mut snake = Snake::from_cells(
            "p1",
            Point::new(5, 5),
            [
                Point::new(6, 5),
                Point::new(6, 6),
                Point::new(5, 6),
                Point::new(4, 6),
            ],
            Direction::Down,
        );
        snake.move_forward();
        assert!(!snake.alive);
    }

    #[test]
    fn test_chasing_own_tail_is_safe() {
        let mut snake = Snake::from_cells(
            "p1",
            Point::new(5, 5),
            [
                Point::new(6, 5),
                Point::new(6, 6),
                Point::new(5, 6),
            ],
            Direction::Down,
        );
        snake.move_forward();
        assert!(snake.alive);
        assert_eq!(snake.head(), Point::new(5, 6));
    }

    #[test]
    fn test_grow_adds_one_segment() {
        let mut snake = straight_snake();
        snake.move_forward();
        snake.grow();
        assert_eq!(snake.len(), 4);
        assert_eq!(snake.tail(), Point::new(4, 5));

        snake.move_forward();
        assert_eq!(snake.len(), 4);
        assert_eq!(snake.head(), Point::new(7, 5));
        assert!(snake.alive);
    }

    #[test]
    fn test_occupies() {
        let snake = straight_snake();
        assert!(snake.occupies(Point::new(5, 5)));
        assert!(snake.occupies(Point::new(3, 5)));
        assert!(!snake.occupies(Point::new(2, 5)));
    }

    #[test]
    fn test_from_cells_keeps_order() {
        let snake = Snake::from_cells("p1", Point::new(1, 1), [], Direction::Up);
        assert_eq!(snake.len(), 1);
        assert_eq!(snake.head(), snake.tail());

        let snake = straight_snake();
        assert_eq!(snake.head(), Point::new(5, 5));
        assert_eq!(snake.tail(), Point::new(3, 5));
    }
}
