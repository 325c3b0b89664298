//! Per-table match lifecycle.
//!
//! WAITING → COUNTDOWN → PLAYING → GAME_OVER, with the countdown re-checking
//! team readiness every second, a grace window that invalidates rounds
//! instead of scoring them, a departure hook for players who vanish
//! mid-match, and reward distribution (stats, hero codes, ratings) once a
//! round ends for real.

use crate::game_loop::{self, Ticker};
use crate::game_teams;
use crate::persist::{StoreError, SystemMessage};
use crate::runtime::{RuntimeCtx, TableCommand};
use crate::table::{Table, TablePlayer};
use crate::{board::PartnerLink, elo};
use log::{debug, error, info};
use rand::SeedableRng;
use shared::{
    BoardsClearedPayload, CountdownPayload, FanoutEvent, GameOverPayload, MatchState,
    MatchStatePayload, PartnerSide, PlayerId, PlayerResult, TimerPayload, COUNTDOWN_START,
    COUNTDOWN_START_TEST, ELO_K_FACTOR, MIN_GRACE_PERIOD_SECONDS,
};
use std::collections::{BTreeMap, HashSet};

/// Winners need this many recorded wins and a positive record before a hero
/// code is issued.
pub const HERO_CODE_MIN_WINS: u32 = 5;

/// Lifecycle state of one table. Created with the table, reset every round.
#[derive(Debug)]
pub struct Game {
    pub state: MatchState,
    pub countdown: Option<i32>,
    pub timer: Option<i32>,
    pub players_this_round: Vec<(PlayerId, u8)>,
    pub winners: Vec<TablePlayer>,
    pub countdown_ticker: Option<Ticker>,
    pub timer_ticker: Option<Ticker>,
}

impl Game {
    pub fn new() -> Self {
        Self {
            state: MatchState::Waiting,
            countdown: None,
            timer: None,
            players_this_round: Vec::new(),
            winners: Vec::new(),
            countdown_ticker: None,
            timer_ticker: None,
        }
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

fn publish_match_state(table: &Table, ctx: &RuntimeCtx) {
    ctx.publish(FanoutEvent::MatchState(MatchStatePayload {
        table_id: ctx.table_id,
        room: ctx.room.clone(),
        state: table.game.state,
    }));
}

pub fn sit(table: &mut Table, player: PlayerId, seat_number: u8) {
    if table.sit(player, seat_number) {
        info!(
            "table {}: player {} sat at seat {}",
            table.id, player, seat_number
        );
    } else {
        debug!(
            "table {}: player {} could not take seat {}",
            table.id, player, seat_number
        );
    }
}

/// Ready is only meaningful while seated and outside a running round.
pub fn set_ready(table: &mut Table, player: PlayerId, ready: bool) {
    if table.seat_number_of(player).is_none() {
        return;
    }
    if let Some(p) = table.players.get_mut(&player) {
        if !p.playing {
            p.ready = ready;
        }
    }
}

/// Host-only gating happens at the session layer; here only the state and
/// team-count gates apply.
pub fn start_game(table: &mut Table, ctx: &RuntimeCtx, player: PlayerId) {
    if !matches!(table.game.state, MatchState::Waiting | MatchState::GameOver) {
        return;
    }
    if game_teams::ready_team_count(table) < game_teams::min_teams(ctx.services.test_mode) {
        debug!(
            "table {}: player {} tried to start without enough ready teams",
            table.id, player
        );
        return;
    }
    start_countdown(table, ctx);
}

/// Entering COUNTDOWN from any other state resets every seat's simulation
/// objects and broadcasts the cleared boards before counting.
pub fn start_countdown(table: &mut Table, ctx: &RuntimeCtx) {
    if table.game.state == MatchState::Countdown {
        return;
    }
    table.loops.clear();
    for seat in &mut table.seats {
        seat.clear_simulation();
    }
    table.game.players_this_round.clear();
    table.game.winners.clear();
    table.game.timer = None;
    table.game.timer_ticker = None;
    table.game.state = MatchState::Countdown;

    let start = if ctx.services.test_mode {
        COUNTDOWN_START_TEST
    } else {
        COUNTDOWN_START
    };
    table.game.countdown = Some(start);
    table.game.countdown_ticker = Some(Ticker::spawn(1000, ctx.cmd_tx.clone(), || {
        TableCommand::CountdownTick
    }));

    ctx.publish(FanoutEvent::BoardsCleared(BoardsClearedPayload {
        table_id: ctx.table_id,
        room: ctx.room.clone(),
    }));
    publish_match_state(table, ctx);
    ctx.publish(FanoutEvent::Countdown(CountdownPayload {
        table_id: ctx.table_id,
        room: ctx.room.clone(),
        value: start,
    }));
    info!("table {}: countdown started at {}", table.id, start);
}

/// One countdown second. Team readiness is re-validated every tick; at 1 the
/// match starts.
pub fn countdown_tick(table: &mut Table, ctx: &RuntimeCtx) {
    if table.game.state != MatchState::Countdown {
        return;
    }
    if game_teams::ready_team_count(table) < game_teams::min_teams(ctx.services.test_mode) {
        info!(
            "table {}: countdown aborted, ready teams below minimum",
            table.id
        );
        game_over(table, ctx, Vec::new());
        return;
    }
    let value = table.game.countdown.unwrap_or(0) - 1;
    table.game.countdown = Some(value);
    ctx.publish(FanoutEvent::Countdown(CountdownPayload {
        table_id: ctx.table_id,
        room: ctx.room.clone(),
        value,
    }));
    if value <= 1 {
        start_match(table, ctx);
    }
}

fn start_match(table: &mut Table, ctx: &RuntimeCtx) {
    table.game.countdown_ticker = None;
    table.game.countdown = None;
    table.game.state = MatchState::Playing;

    // Allocate per-round objects for every occupied and ready seat
    let mut qualifiers: Vec<(PlayerId, u8)> = Vec::new();
    {
        let Table {
            seats,
            players,
            rng,
            ..
        } = table;
        for seat in seats.iter_mut() {
            let Some(player) = seat.occupant else {
                continue;
            };
            if !players.get(&player).map_or(false, |p| p.ready) {
                continue;
            }
            let fork = rand::rngs::StdRng::seed_from_u64(rand::Rng::gen(rng));
            seat.allocate_simulation(fork);
            qualifiers.push((player, seat.number));
        }
    }

    // Partner boards link adjacent same-team seats for this round only
    for &(_, seat_number) in &qualifiers {
        let partner = game_teams::partner_seat(seat_number);
        if !qualifiers.iter().any(|&(_, s)| s == partner) {
            continue;
        }
        let side = if seat_number % 2 == 1 {
            PartnerSide::Left
        } else {
            PartnerSide::Right
        };
        if let Some(board) = table.seat_mut(seat_number).and_then(|s| s.board.as_mut()) {
            board.set_partner(Some(PartnerLink {
                seat: partner,
                side,
            }));
        }
    }

    // The round roster is fixed before any loop starts ticking
    table.game.players_this_round = qualifiers
        .iter()
        .map(|&(player, seat)| (player, game_teams::team_of_seat(seat)))
        .collect();
    for &(player, _) in &qualifiers {
        if let Some(p) = table.players.get_mut(&player) {
            p.mark_playing();
        }
    }

    for &(player, seat_number) in &qualifiers {
        let mut lp = game_loop::create_for_seat(ctx, player, seat_number);
        if let Some(seat) = table.seat_mut(seat_number) {
            if let (Some(queue), Some(powers)) =
                (seat.next_pieces.as_mut(), seat.block_powers.as_mut())
            {
                lp.current_piece = Some(queue.next_piece(powers));
            }
        }
        table.loops.insert(player, lp);
    }

    table.game.timer = Some(0);
    table.game.timer_ticker = Some(Ticker::spawn(1000, ctx.cmd_tx.clone(), || {
        TableCommand::TimerTick
    }));

    publish_match_state(table, ctx);
    for &(_, seat_number) in &qualifiers {
        ctx.publish_seat_state(table, seat_number);
    }
    info!(
        "table {}: match started with {} players",
        table.id,
        qualifiers.len()
    );
}

/// One match second. Survival is re-evaluated on every tick.
pub fn timer_tick(table: &mut Table, ctx: &RuntimeCtx) {
    if table.game.state != MatchState::Playing {
        return;
    }
    let value = table.game.timer.unwrap_or(0) + 1;
    table.game.timer = Some(value);
    ctx.publish(FanoutEvent::Timer(TimerPayload {
        table_id: ctx.table_id,
        room: ctx.room.clone(),
        value,
    }));
    evaluate_match(table, ctx);
}

fn winning_players(table: &Table, team: u8) -> Vec<TablePlayer> {
    table
        .game
        .players_this_round
        .iter()
        .filter(|&&(_, t)| t == team)
        .filter_map(|&(player, _)| table.players.get(&player).cloned())
        .collect()
}

/// Decides whether the round is over. Inside the grace window a failed
/// minimum-playing-teams check invalidates the round outright; afterwards
/// the alive-team count decides the outcome.
pub fn evaluate_match(table: &mut Table, ctx: &RuntimeCtx) {
    if table.game.state != MatchState::Playing {
        return;
    }
    let min = game_teams::min_teams(ctx.services.test_mode);
    let timer = table.game.timer.unwrap_or(0);
    if timer <= MIN_GRACE_PERIOD_SECONDS && game_teams::playing_team_count(table) < min {
        info!(
            "table {}: match invalidated inside the grace period",
            table.id
        );
        game_over(table, ctx, Vec::new());
        return;
    }
    let alive = game_teams::alive_teams(table);
    if !game_teams::check_if_game_over(alive.len(), ctx.services.test_mode) {
        return;
    }
    let winners = if alive.len() == 1 {
        winning_players(table, alive[0])
    } else {
        Vec::new()
    };
    game_over(table, ctx, winners);
}

/// Terminal transition. Stops every loop, clears playing flags, and - unless
/// the round ended inside the grace window - records results, hero codes,
/// and rating changes before the game-over broadcast goes out.
pub fn game_over(table: &mut Table, ctx: &RuntimeCtx, winners: Vec<TablePlayer>) {
    if table.game.state == MatchState::GameOver {
        return;
    }
    let ended_mid_grace = table.game.state != MatchState::Playing
        || table.game.timer.map_or(true, |t| t <= MIN_GRACE_PERIOD_SECONDS);

    table.game.state = MatchState::GameOver;
    table.game.countdown = None;
    table.game.countdown_ticker = None;
    table.game.timer_ticker = None;
    table.game.winners = winners.clone();

    let in_round: Vec<PlayerId> = table.loops.keys().copied().collect();
    for player in in_round {
        game_loop::stop(table, ctx, player);
    }
    let roster = table.game.players_this_round.clone();
    for &(player, _) in &roster {
        if let Some(p) = table.players.get_mut(&player) {
            p.playing = false;
        }
    }

    publish_match_state(table, ctx);

    let winner_ids: HashSet<PlayerId> = winners.iter().map(|p| p.id).collect();
    let mut results: Vec<PlayerResult> = roster
        .iter()
        .map(|&(player_id, team)| PlayerResult {
            player_id,
            team,
            winner: winner_ids.contains(&player_id),
            rating_delta: None,
        })
        .collect();

    if !ended_mid_grace {
        if let Err(e) = distribute_rewards(table, ctx, &mut results) {
            // The match outcome stands; the collaborator owns retries
            error!("table {}: reward distribution failed: {}", table.id, e);
        }
    } else if !roster.is_empty() {
        info!(
            "table {}: round ended inside the grace window, no results recorded",
            table.id
        );
    }

    ctx.publish(FanoutEvent::GameOver(GameOverPayload {
        table_id: ctx.table_id,
        room: ctx.room.clone(),
        winners: winners.iter().map(|p| p.id).collect(),
        results,
    }));
    info!("table {}: game over, {} winner(s)", table.id, winners.len());
}

fn distribute_rewards(
    table: &Table,
    ctx: &RuntimeCtx,
    results: &mut [PlayerResult],
) -> Result<(), StoreError> {
    let stats = ctx.services.stats.as_ref();
    for result in results.iter() {
        if result.winner {
            stats.record_win(result.player_id)?;
        } else {
            stats.record_loss(result.player_id)?;
        }
    }

    // Hero codes for standout winners
    for result in results.iter().filter(|r| r.winner) {
        let record = stats.stats(result.player_id)?;
        if record.wins >= HERO_CODE_MIN_WINS && record.wins > record.losses {
            if let Ok(mut ciphers) = ctx.services.ciphers.lock() {
                let code = ciphers.generate_hero_code(result.player_id);
                ctx.services
                    .messenger
                    .send(result.player_id, SystemMessage::hero_code(code));
            }
        }
    }

    if !table.rated {
        return Ok(());
    }
    let winning_teams: HashSet<u8> = results.iter().filter(|r| r.winner).map(|r| r.team).collect();
    if winning_teams.is_empty() {
        return Ok(());
    }
    let mut teams: BTreeMap<u8, Vec<(PlayerId, i32)>> = BTreeMap::new();
    for result in results.iter() {
        let rating = stats.rating(result.player_id)?;
        teams
            .entry(result.team)
            .or_default()
            .push((result.player_id, rating));
    }
    if teams.len() < 2 {
        return Ok(());
    }

    let standings = elo::standings(&teams, &winning_teams);
    let deltas = elo::rate_teams(&standings, ELO_K_FACTOR);
    for (standing, delta) in standings.iter().zip(deltas) {
        for &player in &standing.players {
            let new_rating = stats.update_rating(player, delta)?;
            ctx.services
                .messenger
                .send(player, SystemMessage::rating_change(delta, new_rating));
            if let Some(result) = results.iter_mut().find(|r| r.player_id == player) {
                result.rating_delta = Some(delta);
            }
        }
    }
    Ok(())
}

/// A player stood up. During a countdown that can abort the round; during a
/// match it routes through the departure rules.
pub fn stand(table: &mut Table, ctx: &RuntimeCtx, player: PlayerId) {
    if table.vacate(player).is_none() {
        return;
    }
    if let Some(p) = table.players.get_mut(&player) {
        p.ready = false;
        p.playing = false;
    }
    seat_vacated(table, ctx, player);
}

/// A player's connection is gone. Same departure rules as standing, plus the
/// player is forgotten entirely.
pub fn player_left(table: &mut Table, ctx: &RuntimeCtx, player: PlayerId) {
    let was_seated = table.vacate(player).is_some();
    table.players.remove(&player);
    if was_seated {
        seat_vacated(table, ctx, player);
    } else {
        table.loops.remove(&player);
    }
}

fn seat_vacated(table: &mut Table, ctx: &RuntimeCtx, player: PlayerId) {
    game_loop::stop(table, ctx, player);
    table.loops.remove(&player);
    match table.game.state {
        MatchState::Countdown => {
            if game_teams::ready_team_count(table) < game_teams::min_teams(ctx.services.test_mode)
            {
                info!("table {}: countdown aborted after departure", table.id);
                game_over(table, ctx, Vec::new());
            }
        }
        MatchState::Playing => {
            let timer = table.game.timer.unwrap_or(0);
            if timer <= MIN_GRACE_PERIOD_SECONDS {
                // Early departures are simply dropped from the roster
                table.game.players_this_round.retain(|&(p, _)| p != player);
                if game_teams::playing_team_count(table)
                    < game_teams::min_teams(ctx.services.test_mode)
                {
                    info!(
                        "table {}: match invalidated by departure in grace window",
                        table.id
                    );
                    game_over(table, ctx, Vec::new());
                }
            } else {
                evaluate_match(table, ctx);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{MemoryMessenger, MemoryStatsStore, PlayerStatsStore, SystemMessageKind};
    use crate::runtime::ProcessServices;
    use rand::rngs::StdRng;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct Harness {
        table: Table,
        ctx: RuntimeCtx,
        stats: Arc<MemoryStatsStore>,
        messenger: Arc<MemoryMessenger>,
        _cmd_rx: mpsc::UnboundedReceiver<TableCommand>,
    }

    fn harness(rated: bool) -> Harness {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(MemoryStatsStore::new());
        let messenger = Arc::new(MemoryMessenger::new());
        let mut services = ProcessServices::in_memory(false);
        services.stats = stats.clone();
        services.messenger = messenger.clone();
        let ctx = RuntimeCtx {
            table_id: 1,
            room: "table-1".to_string(),
            cmd_tx,
            services,
        };
        Harness {
            table: Table::with_rng(1, rated, StdRng::seed_from_u64(1)),
            ctx,
            stats,
            messenger,
            _cmd_rx: cmd_rx,
        }
    }

    fn seat_four_ready(table: &mut Table) {
        for (player, seat) in [(10u64, 1u8), (11, 2), (12, 3), (13, 4)] {
            table.sit(player, seat);
            table.players.get_mut(&player).unwrap().ready = true;
        }
    }

    fn run_countdown(table: &mut Table, ctx: &RuntimeCtx) {
        start_countdown(table, ctx);
        while table.game.state == MatchState::Countdown {
            countdown_tick(table, ctx);
        }
    }

    #[tokio::test]
    async fn test_countdown_transitions_to_playing_at_one() {
        let mut h = harness(false);
        seat_four_ready(&mut h.table);

        start_countdown(&mut h.table, &h.ctx);
        assert_eq!(h.table.game.state, MatchState::Countdown);
        assert_eq!(h.table.game.countdown, Some(shared::COUNTDOWN_START));

        for _ in 0..shared::COUNTDOWN_START - 1 {
            countdown_tick(&mut h.table, &h.ctx);
        }
        assert_eq!(h.table.game.state, MatchState::Playing);
        assert_eq!(h.table.game.timer, Some(0));
    }

    #[tokio::test]
    async fn test_match_start_builds_round_state() {
        let mut h = harness(false);
        seat_four_ready(&mut h.table);
        run_countdown(&mut h.table, &h.ctx);

        assert_eq!(h.table.game.players_this_round.len(), 4);
        assert_eq!(h.table.loops.len(), 4);
        for seat in [1u8, 2, 3, 4] {
            let seat_ref = h.table.seat(seat).unwrap();
            assert!(seat_ref.board.is_some());
            assert!(seat_ref.next_pieces.is_some());
            assert!(seat_ref.power_bar.is_some());
        }
        // Partner boards for both full pairs
        let board = h.table.seat(1).unwrap().board.as_ref().unwrap();
        let link = board.partner().unwrap();
        assert_eq!(link.seat, 2);
        assert_eq!(link.side, PartnerSide::Left);

        // Playing cleared ready
        for player in [10u64, 11, 12, 13] {
            let p = h.table.players.get(&player).unwrap();
            assert!(p.playing);
            assert!(!p.ready);
        }
    }

    #[tokio::test]
    async fn test_lone_team_never_reaches_countdown() {
        let mut h = harness(false);
        h.table.sit(10, 1);
        h.table.sit(11, 2);
        for player in [10u64, 11] {
            h.table.players.get_mut(&player).unwrap().ready = true;
        }

        start_game(&mut h.table, &h.ctx, 10);
        assert_eq!(h.table.game.state, MatchState::Waiting);
    }

    #[tokio::test]
    async fn test_countdown_aborts_when_a_team_stands_up() {
        let mut h = harness(false);
        seat_four_ready(&mut h.table);
        start_countdown(&mut h.table, &h.ctx);

        // Both players of team 2 leave their seats mid-countdown
        stand(&mut h.table, &h.ctx, 12);
        assert_eq!(h.table.game.state, MatchState::Countdown);
        stand(&mut h.table, &h.ctx, 13);

        assert_eq!(h.table.game.state, MatchState::GameOver);
        assert!(h.table.game.winners.is_empty());
    }

    #[tokio::test]
    async fn test_grace_window_end_records_nothing() {
        let mut h = harness(true);
        seat_four_ready(&mut h.table);
        run_countdown(&mut h.table, &h.ctx);
        h.table.game.timer = Some(MIN_GRACE_PERIOD_SECONDS - 2);

        // Team 2 walks out inside the grace window
        stand(&mut h.table, &h.ctx, 12);
        stand(&mut h.table, &h.ctx, 13);

        assert_eq!(h.table.game.state, MatchState::GameOver);
        assert!(h.table.game.winners.is_empty());
        assert_eq!(h.stats.stats(10).unwrap().wins, 0);
        assert_eq!(h.stats.rating(10).unwrap(), shared::DEFAULT_RATING);
        assert!(h.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn test_post_grace_elimination_pays_the_survivors() {
        let mut h = harness(true);
        seat_four_ready(&mut h.table);
        run_countdown(&mut h.table, &h.ctx);
        h.table.game.timer = Some(MIN_GRACE_PERIOD_SECONDS + 5);

        // Team 2 loses both boards
        for seat in [3u8, 4] {
            h.table
                .seat_mut(seat)
                .unwrap()
                .board
                .as_mut()
                .unwrap()
                .mark_game_over();
        }
        evaluate_match(&mut h.table, &h.ctx);

        assert_eq!(h.table.game.state, MatchState::GameOver);
        let winner_ids: Vec<PlayerId> = h.table.game.winners.iter().map(|p| p.id).collect();
        assert_eq!(winner_ids, vec![10, 11]);

        // Stats and equal-and-opposite rating swings for all four players
        for player in [10u64, 11] {
            assert_eq!(h.stats.stats(player).unwrap().wins, 1);
            assert_eq!(h.stats.rating(player).unwrap(), shared::DEFAULT_RATING + 8);
        }
        for player in [12u64, 13] {
            assert_eq!(h.stats.stats(player).unwrap().losses, 1);
            assert_eq!(h.stats.rating(player).unwrap(), shared::DEFAULT_RATING - 8);
        }
        let rating_messages = h
            .messenger
            .sent()
            .iter()
            .filter(|(_, m)| m.kind == SystemMessageKind::RatingChange)
            .count();
        assert_eq!(rating_messages, 4);
    }

    #[tokio::test]
    async fn test_departure_after_grace_hands_the_win_over() {
        let mut h = harness(false);
        seat_four_ready(&mut h.table);
        run_countdown(&mut h.table, &h.ctx);
        h.table.game.timer = Some(MIN_GRACE_PERIOD_SECONDS + 1);

        player_left(&mut h.table, &h.ctx, 12);
        assert_eq!(h.table.game.state, MatchState::Playing);
        player_left(&mut h.table, &h.ctx, 13);

        assert_eq!(h.table.game.state, MatchState::GameOver);
        let winner_ids: Vec<PlayerId> = h.table.game.winners.iter().map(|p| p.id).collect();
        assert_eq!(winner_ids, vec![10, 11]);
    }

    #[tokio::test]
    async fn test_unrated_tables_skip_rating_updates() {
        let mut h = harness(false);
        seat_four_ready(&mut h.table);
        run_countdown(&mut h.table, &h.ctx);
        h.table.game.timer = Some(MIN_GRACE_PERIOD_SECONDS + 5);

        for seat in [3u8, 4] {
            h.table
                .seat_mut(seat)
                .unwrap()
                .board
                .as_mut()
                .unwrap()
                .mark_game_over();
        }
        evaluate_match(&mut h.table, &h.ctx);

        assert_eq!(h.stats.stats(10).unwrap().wins, 1);
        assert_eq!(h.stats.rating(10).unwrap(), shared::DEFAULT_RATING);
    }

    #[tokio::test]
    async fn test_new_countdown_resets_previous_round() {
        let mut h = harness(false);
        seat_four_ready(&mut h.table);
        run_countdown(&mut h.table, &h.ctx);
        h.table.game.timer = Some(MIN_GRACE_PERIOD_SECONDS + 5);
        for seat in [3u8, 4] {
            h.table
                .seat_mut(seat)
                .unwrap()
                .board
                .as_mut()
                .unwrap()
                .mark_game_over();
        }
        evaluate_match(&mut h.table, &h.ctx);
        assert_eq!(h.table.game.state, MatchState::GameOver);

        // Everyone readies up again
        for player in [10u64, 11, 12, 13] {
            h.table.players.get_mut(&player).unwrap().ready = true;
        }
        start_countdown(&mut h.table, &h.ctx);

        assert_eq!(h.table.game.state, MatchState::Countdown);
        assert!(h.table.loops.is_empty());
        assert!(h.table.game.players_this_round.is_empty());
        assert!(h.table.game.winners.is_empty());
        for seat in [1u8, 2, 3, 4] {
            assert!(h.table.seat(seat).unwrap().board.is_none());
        }
    }
}
