//! Table, seat, and player bookkeeping plus the per-process table registry
//!
//! This module handles the server-side roster of a table, including:
//! - Seat occupancy and the ready/playing player flags
//! - Per-round simulation objects owned by each seat
//! - Snapshots handed to the fan-out bridge for spectators
//! - The explicit per-process registry of running table runtimes
//!
//! Simulation sub-objects (board, piece queue, power bar, block-power
//! progression) exist only while a round is running; every accessor treats a
//! missing object as "nothing to do" so teardown races stay harmless.

use crate::board::Board;
use crate::game::Game;
use crate::game_loop::GameLoop;
use crate::game_teams;
use crate::next_pieces::NextPieces;
use crate::power::PieceBlockPowerManager;
use crate::power_bar::PowerBar;
use crate::runtime::{ProcessServices, TableHandle, TableRuntime};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{PlayerId, SeatSnapshot, TableId, SEAT_COUNT};
use std::collections::HashMap;

/// A player known to the table. `ready` is only meaningful while seated;
/// becoming playing clears it, so the two flags are never set together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePlayer {
    pub id: PlayerId,
    pub ready: bool,
    pub playing: bool,
}

impl TablePlayer {
    pub fn new(id: PlayerId) -> Self {
        Self {
            id,
            ready: false,
            playing: false,
        }
    }

    pub fn mark_playing(&mut self) {
        self.playing = true;
        self.ready = false;
    }
}

/// One seat at the table with its per-round simulation objects.
#[derive(Debug)]
pub struct TableSeat {
    pub number: u8,
    pub occupant: Option<PlayerId>,
    pub board: Option<Board>,
    pub next_pieces: Option<NextPieces>,
    pub power_bar: Option<PowerBar>,
    pub block_powers: Option<PieceBlockPowerManager>,
}

impl TableSeat {
    fn new(number: u8) -> Self {
        Self {
            number,
            occupant: None,
            board: None,
            next_pieces: None,
            power_bar: None,
            block_powers: None,
        }
    }

    pub fn team(&self) -> u8 {
        game_teams::team_of_seat(self.number)
    }

    /// Allocates fresh simulation objects for a new round.
    pub fn allocate_simulation(&mut self, rng: StdRng) {
        self.board = Some(Board::new());
        self.next_pieces = Some(NextPieces::new(rng));
        self.power_bar = Some(PowerBar::new());
        self.block_powers = Some(PieceBlockPowerManager::new());
    }

    /// Tears the round's simulation objects down. They never outlive a round.
    pub fn clear_simulation(&mut self) {
        self.board = None;
        self.next_pieces = None;
        self.power_bar = None;
        self.block_powers = None;
    }
}

/// Authoritative state of one table: seats, known players, the lifecycle
/// state machine, and the per-player game loops of the running round.
///
/// The table exclusively owns its game loops; a loop never owns the board or
/// power bar it operates on - those belong to the seat and are looked up on
/// every access so seat-level resets are always observed.
#[derive(Debug)]
pub struct Table {
    pub id: TableId,
    pub room: String,
    pub rated: bool,
    pub seats: Vec<TableSeat>,
    pub players: HashMap<PlayerId, TablePlayer>,
    pub game: Game,
    pub loops: HashMap<PlayerId, GameLoop>,
    pub rng: StdRng,
}

impl Table {
    pub fn new(id: TableId, rated: bool) -> Self {
        Self::with_rng(id, rated, StdRng::from_entropy())
    }

    pub fn with_rng(id: TableId, rated: bool, rng: StdRng) -> Self {
        Self {
            id,
            room: format!("table-{}", id),
            rated,
            seats: (1..=SEAT_COUNT).map(TableSeat::new).collect(),
            players: HashMap::new(),
            game: Game::new(),
            loops: HashMap::new(),
            rng,
        }
    }

    pub fn seat(&self, number: u8) -> Option<&TableSeat> {
        self.seats.iter().find(|s| s.number == number)
    }

    pub fn seat_mut(&mut self, number: u8) -> Option<&mut TableSeat> {
        self.seats.iter_mut().find(|s| s.number == number)
    }

    /// A player's seat number is derived from seat occupancy, never cached.
    pub fn seat_number_of(&self, player: PlayerId) -> Option<u8> {
        self.seats
            .iter()
            .find(|s| s.occupant == Some(player))
            .map(|s| s.number)
    }

    /// Seats a player, vacating any seat they already hold. Fails when the
    /// seat is taken or the player is mid-round.
    pub fn sit(&mut self, player: PlayerId, seat_number: u8) -> bool {
        if self.players.get(&player).map_or(false, |p| p.playing) {
            return false;
        }
        match self.seat(seat_number) {
            Some(seat) if seat.occupant.is_none() => {}
            _ => return false,
        }
        self.vacate(player);
        if let Some(seat) = self.seat_mut(seat_number) {
            seat.occupant = Some(player);
        }
        self.players
            .entry(player)
            .or_insert_with(|| TablePlayer::new(player));
        true
    }

    /// Clears the player's seat, if any, and returns its number.
    pub fn vacate(&mut self, player: PlayerId) -> Option<u8> {
        let seat = self.seats.iter_mut().find(|s| s.occupant == Some(player))?;
        seat.occupant = None;
        Some(seat.number)
    }

    /// A seat is living while its occupant is still playing behind a board
    /// that has not gone game over.
    pub fn seat_is_living(&self, seat_number: u8) -> bool {
        let Some(seat) = self.seat(seat_number) else {
            return false;
        };
        let Some(player) = seat.occupant else {
            return false;
        };
        if !self.players.get(&player).map_or(false, |p| p.playing) {
            return false;
        }
        seat.board.as_ref().map_or(false, |b| !b.is_game_over())
    }

    pub fn living_opponent_seats(&self, team: u8) -> Vec<u8> {
        self.seats
            .iter()
            .filter(|s| s.team() != team && self.seat_is_living(s.number))
            .map(|s| s.number)
            .collect()
    }

    /// The acting seat's partner, only while that partner is living and
    /// still playing. Always a live lookup - occupancy changes mid-round.
    pub fn living_partner_seat(&self, seat_number: u8) -> Option<u8> {
        let partner = game_teams::partner_seat(seat_number);
        if self.seat_is_living(partner) {
            Some(partner)
        } else {
            None
        }
    }

    pub fn seat_snapshot(&self, seat_number: u8) -> SeatSnapshot {
        let seat = self.seat(seat_number);
        let current_piece = seat
            .and_then(|s| s.occupant)
            .and_then(|player| self.loops.get(&player))
            .and_then(|lp| lp.current_piece.clone());
        SeatSnapshot {
            seat_number,
            board: seat.and_then(|s| s.board.as_ref()).map(|b| b.snapshot()),
            current_piece,
            power_bar: seat
                .and_then(|s| s.power_bar.as_ref())
                .map(|b| b.snapshot())
                .unwrap_or_default(),
            next_pieces: seat
                .and_then(|s| s.next_pieces.as_ref())
                .map(|q| q.snapshot())
                .unwrap_or_default(),
            game_over: seat
                .and_then(|s| s.board.as_ref())
                .map_or(false, |b| b.is_game_over()),
        }
    }

}

/// Per-process registry of running table runtimes
///
/// Replaces any notion of process-global lookup maps: one registry instance
/// is created at boot, handed by reference to whoever needs to address a
/// table, and evicted explicitly when a table is torn down. Tables on other
/// processes are reached through the fan-out bridge, never through here.
pub struct TableRegistry {
    tables: HashMap<TableId, TableHandle>,
    next_table_id: TableId,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            next_table_id: 1,
        }
    }

    /// Spawns a new table runtime and tracks its handle. The caller decides
    /// whether this process should own the table (see `TableAffinity`).
    pub fn create_table(&mut self, rated: bool, services: &ProcessServices) -> TableHandle {
        let table_id = self.next_table_id;
        self.next_table_id += 1;

        let handle = TableRuntime::spawn(table_id, rated, services.clone());
        info!("table {} created (rated: {})", table_id, rated);
        self.tables.insert(table_id, handle.clone());
        handle
    }

    pub fn handle(&self, table_id: TableId) -> Option<&TableHandle> {
        self.tables.get(&table_id)
    }

    /// Evicts a table and shuts its runtime down. Returns true if the table
    /// was found and removed, false if it was already gone.
    pub fn remove_table(&mut self, table_id: TableId) -> bool {
        if let Some(handle) = self.tables.remove(&table_id) {
            handle.shutdown();
            info!("table {} removed", table_id);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl Default for TableRegistry {
    fn default() -> Self {
        Self::new()
    }
}
