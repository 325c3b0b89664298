//! Pure team policy: seat pairing, team membership, and survival counts.
//!
//! Nothing here mutates state; the lifecycle module calls these to decide
//! whether a countdown may proceed and whether a running match is over.

use crate::table::Table;
use std::collections::BTreeSet;

/// Seats pair up into teams: (1,2) (3,4) (5,6) (7,8).
pub fn team_of_seat(seat: u8) -> u8 {
    (seat + 1) / 2
}

/// The other seat of a seat's team pair.
pub fn partner_seat(seat: u8) -> u8 {
    if seat % 2 == 1 {
        seat + 1
    } else {
        seat - 1
    }
}

pub fn min_teams(test_mode: bool) -> usize {
    if test_mode {
        1
    } else {
        2
    }
}

/// Distinct teams with at least one ready, seated player.
pub fn ready_team_count(table: &Table) -> usize {
    let mut teams = BTreeSet::new();
    for seat in &table.seats {
        if let Some(player) = seat.occupant {
            if table.players.get(&player).map_or(false, |p| p.ready) {
                teams.insert(seat.team());
            }
        }
    }
    teams.len()
}

/// Distinct teams with at least one seated player still marked playing.
pub fn playing_team_count(table: &Table) -> usize {
    let mut teams = BTreeSet::new();
    for seat in &table.seats {
        if let Some(player) = seat.occupant {
            if table.players.get(&player).map_or(false, |p| p.playing) {
                teams.insert(seat.team());
            }
        }
    }
    teams.len()
}

/// Teams from this round's roster that still have a living board behind a
/// seated, playing player.
pub fn alive_teams(table: &Table) -> Vec<u8> {
    let mut teams = BTreeSet::new();
    for &(player, team) in &table.game.players_this_round {
        let Some(seat_number) = table.seat_number_of(player) else {
            continue;
        };
        let Some(seat) = table.seat(seat_number) else {
            continue;
        };
        let playing = table.players.get(&player).map_or(false, |p| p.playing);
        let alive = seat.board.as_ref().map_or(false, |b| !b.is_game_over());
        if playing && alive {
            teams.insert(team);
        }
    }
    teams.into_iter().collect()
}

/// The match is over once fewer than the minimum number of teams survive.
pub fn check_if_game_over(alive_team_count: usize, test_mode: bool) -> bool {
    alive_team_count < min_teams(test_mode)
}
