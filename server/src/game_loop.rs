//! Per-player falling-piece loop.
//!
//! Each seated, ready player gets one loop per round. The loop owns the
//! active piece and its tick clock but not the seat's board or power bar -
//! those are looked up through the table on every access. Ticks arrive as
//! commands from a cancellable interval task, so every state mutation still
//! happens inside the table's single runtime task.

use crate::runtime::{RuntimeCtx, TableCommand};
use crate::table::Table;
use shared::{
    BlockKind, BlockPower, BlocksMarkedPayload, FanoutEvent, HooBlocksPayload, Piece, PieceBlock,
    PlayerId, Position, PowerBarItem, PowerKind, RemovalOrigin, NORMAL_TICK_MS,
    SOFT_DROP_TICK_MS, SPEED_DROP_TICKS, SPEED_DROP_TICK_MS,
};
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDir {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickControl {
    Run { interval_ms: u64 },
    Cancelled,
}

/// A cancellable software tick source. The spawned task sleeps for the
/// current interval and sends one command per tick into the table runtime;
/// `cancel` stops it deterministically regardless of timer state.
#[derive(Debug)]
pub struct Ticker {
    ctl: watch::Sender<TickControl>,
}

impl Ticker {
    pub fn spawn<F>(
        interval_ms: u64,
        commands: mpsc::UnboundedSender<TableCommand>,
        mut make_command: F,
    ) -> Ticker
    where
        F: FnMut() -> TableCommand + Send + 'static,
    {
        let (ctl, mut watcher) = watch::channel(TickControl::Run { interval_ms });
        tokio::spawn(async move {
            loop {
                let interval_ms = match *watcher.borrow() {
                    TickControl::Run { interval_ms } => interval_ms,
                    TickControl::Cancelled => break,
                };
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(interval_ms)) => {
                        if commands.send(make_command()).is_err() {
                            break;
                        }
                    }
                    changed = watcher.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Ticker { ctl }
    }

    /// Interval changes apply from the next tick on.
    pub fn set_interval(&self, interval_ms: u64) {
        let _ = self.ctl.send(TickControl::Run { interval_ms });
    }

    pub fn cancel(&self) {
        let _ = self.ctl.send(TickControl::Cancelled);
    }
}

/// Loop state for one player's active round.
#[derive(Debug)]
pub struct GameLoop {
    pub player_id: PlayerId,
    pub seat_number: u8,
    pub current_piece: Option<Piece>,
    pub tick_speed_ms: u64,
    pub piece_locked: bool,
    pub stopped: bool,
    pub tick_in_progress: bool,
    pub soft_dropping: bool,
    pub speed_drop_ticks_remaining: u32,
    pub pending_special_speed_drop: bool,
    ticker: Ticker,
}

impl GameLoop {
    pub fn new(player_id: PlayerId, seat_number: u8, ticker: Ticker) -> Self {
        Self {
            player_id,
            seat_number,
            current_piece: None,
            tick_speed_ms: NORMAL_TICK_MS,
            piece_locked: false,
            stopped: false,
            tick_in_progress: false,
            soft_dropping: false,
            speed_drop_ticks_remaining: 0,
            pending_special_speed_drop: false,
            ticker,
        }
    }

    /// An active speed-drop window overrides even the soft-drop speed.
    fn effective_tick_speed(&self) -> u64 {
        if self.speed_drop_ticks_remaining > 0 {
            SPEED_DROP_TICK_MS
        } else if self.soft_dropping {
            SOFT_DROP_TICK_MS
        } else {
            NORMAL_TICK_MS
        }
    }

    pub fn refresh_tick_speed(&mut self) {
        let speed = self.effective_tick_speed();
        if speed != self.tick_speed_ms {
            self.tick_speed_ms = speed;
            self.ticker.set_interval(speed);
        }
    }

    /// Ends any active or pending speed-drop window.
    pub fn clear_speed_drop(&mut self) {
        self.speed_drop_ticks_remaining = 0;
        self.pending_special_speed_drop = false;
        self.refresh_tick_speed();
    }

    fn halt(&mut self) {
        self.stopped = true;
        self.current_piece = None;
        self.ticker.cancel();
    }
}

/// Spawns the loop's ticker and wires it into the table's command channel.
pub fn create_for_seat(ctx: &RuntimeCtx, player: PlayerId, seat_number: u8) -> GameLoop {
    let ticker = Ticker::spawn(NORMAL_TICK_MS, ctx.cmd_tx.clone(), move || {
        TableCommand::LoopTick { player }
    });
    GameLoop::new(player, seat_number, ticker)
}

/// The single gate for every player-originated command.
pub fn can_process_input(table: &Table, player: PlayerId) -> bool {
    if table.seat_number_of(player).is_none() {
        return false;
    }
    if !table.players.get(&player).map_or(false, |p| p.playing) {
        return false;
    }
    let Some(lp) = table.loops.get(&player) else {
        return false;
    };
    !lp.stopped && !lp.piece_locked && !lp.tick_in_progress && lp.current_piece.is_some()
}

pub fn move_piece_side(table: &mut Table, ctx: &RuntimeCtx, player: PlayerId, dir: MoveDir) {
    if !can_process_input(table, player) {
        return;
    }
    let seat_number = {
        let Table { seats, loops, .. } = table;
        let Some(lp) = loops.get_mut(&player) else {
            return;
        };
        let Some(seat) = seats.iter().find(|s| s.number == lp.seat_number) else {
            return;
        };
        let Some(board) = seat.board.as_ref() else {
            return;
        };
        let Some(piece) = lp.current_piece.as_mut() else {
            return;
        };
        let delta: i16 = match dir {
            MoveDir::Left => -1,
            MoveDir::Right => 1,
        };
        let target = Position::new(piece.position().row, piece.position().col + delta);
        if board.has_collision(&piece.simulated_at(target)) {
            return;
        }
        piece.set_position(target);
        lp.seat_number
    };
    ctx.publish_seat_state(table, seat_number);
}

pub fn cycle_piece_blocks(table: &mut Table, ctx: &RuntimeCtx, player: PlayerId) {
    if !can_process_input(table, player) {
        return;
    }
    let seat_number = {
        let Table { seats, loops, .. } = table;
        let Some(lp) = loops.get_mut(&player) else {
            return;
        };
        let Some(seat) = seats.iter().find(|s| s.number == lp.seat_number) else {
            return;
        };
        let Some(board) = seat.board.as_ref() else {
            return;
        };
        let Some(piece) = lp.current_piece.as_mut() else {
            return;
        };
        let mut probe = piece.clone();
        probe.cycle_blocks();
        if board.has_collision(&probe) {
            return;
        }
        piece.cycle_blocks();
        lp.seat_number
    };
    ctx.publish_seat_state(table, seat_number);
}

/// Soft drop only changes the tick speed; the piece itself moves on ticks.
pub fn move_piece_down(table: &mut Table, player: PlayerId) {
    if !can_process_input(table, player) {
        return;
    }
    if let Some(lp) = table.loops.get_mut(&player) {
        lp.soft_dropping = true;
        lp.refresh_tick_speed();
    }
}

pub fn stop_moving_piece_down(table: &mut Table, player: PlayerId) {
    if !can_process_input(table, player) {
        return;
    }
    if let Some(lp) = table.loops.get_mut(&player) {
        lp.soft_dropping = false;
        lp.refresh_tick_speed();
    }
}

enum TickOutcome {
    Moved {
        seat_number: u8,
    },
    Dead {
        seat_number: u8,
    },
    LockedQuiet,
    LockedMatched {
        seat_number: u8,
        team: u8,
        cells: Vec<(usize, usize)>,
        falls: u32,
    },
}

/// One gravity step. On collision one row down the piece locks: specials
/// resolve, sequences are detected and marked, and the loop either waits out
/// the client fade (guarded against re-entrant ticks) or finishes the lock
/// immediately.
pub fn tick(table: &mut Table, ctx: &RuntimeCtx, player: PlayerId) {
    let outcome = {
        let Table { seats, loops, .. } = table;
        let Some(lp) = loops.get_mut(&player) else {
            return;
        };
        if lp.stopped || lp.tick_in_progress || lp.piece_locked {
            return;
        }
        if lp.speed_drop_ticks_remaining > 0 {
            lp.speed_drop_ticks_remaining -= 1;
            if lp.speed_drop_ticks_remaining == 0 {
                lp.refresh_tick_speed();
            }
        }
        let Some(seat) = seats.iter_mut().find(|s| s.number == lp.seat_number) else {
            return;
        };
        let Some(board) = seat.board.as_mut() else {
            return;
        };
        let Some(piece) = lp.current_piece.as_ref() else {
            return;
        };

        let below = Position::new(piece.position().row + 1, piece.position().col);
        if !board.has_collision(&piece.simulated_at(below)) {
            if let Some(piece) = lp.current_piece.as_mut() {
                piece.set_position(below);
            }
            TickOutcome::Moved {
                seat_number: seat.number,
            }
        } else {
            let Some(locked) = lp.current_piece.take() else {
                return;
            };
            lp.piece_locked = true;
            board.lock_piece(&locked);
            board.apply_special_blocks(&locked);
            if board.check_if_game_over(&locked) {
                TickOutcome::Dead {
                    seat_number: seat.number,
                }
            } else {
                let matches = board.detect_sequences();
                if matches.is_empty() {
                    TickOutcome::LockedQuiet
                } else {
                    let cells: Vec<(usize, usize)> = matches
                        .iter()
                        .flat_map(|m| m.cells.iter().copied())
                        .collect();
                    let falls = matches.iter().map(|m| m.falls).sum();
                    board.mark_for_removal(&cells, RemovalOrigin::Sequence);
                    lp.tick_in_progress = true;
                    TickOutcome::LockedMatched {
                        seat_number: seat.number,
                        team: seat.team(),
                        cells,
                        falls,
                    }
                }
            }
        }
    };

    match outcome {
        TickOutcome::Moved { seat_number } => ctx.publish_seat_state(table, seat_number),
        TickOutcome::Dead { seat_number } => {
            ctx.publish_seat_state(table, seat_number);
            stop(table, ctx, player);
            crate::game::evaluate_match(table, ctx);
        }
        TickOutcome::LockedQuiet => finish_lock(table, ctx, player),
        TickOutcome::LockedMatched {
            seat_number,
            team,
            cells,
            falls,
        } => {
            ctx.publish(FanoutEvent::BlocksMarked(BlocksMarkedPayload {
                table_id: ctx.table_id,
                room: ctx.room.clone(),
                seat: seat_number,
                cells,
            }));
            ctx.publish(FanoutEvent::HooBlocks(HooBlocksPayload {
                table_id: ctx.table_id,
                room: ctx.room.clone(),
                team,
                blocks: falls,
            }));
            ctx.publish_seat_state(table, seat_number);
            ctx.schedule_fade(player);
        }
    }
}

fn account_removed_block(
    block: &PieceBlock,
    powers: &mut crate::power::PieceBlockPowerManager,
    bar: &mut crate::power_bar::PowerBar,
) {
    let BlockKind::Letter(letter) = block.kind else {
        return;
    };
    powers.record_broken(letter);
    match block.power {
        BlockPower::Attack(level) => bar.push(PowerBarItem::Letter {
            letter,
            kind: PowerKind::Attack,
            level,
        }),
        BlockPower::Defense(level) => bar.push(PowerBarItem::Letter {
            letter,
            kind: PowerKind::Defense,
            level,
        }),
        BlockPower::None => {}
    }
}

/// Completes a lock after the fade delay (or immediately when nothing
/// matched): removes marked blocks, accounts earned powers and diamonds,
/// cascades, then draws the next piece and re-opens input.
pub fn finish_lock(table: &mut Table, ctx: &RuntimeCtx, player: PlayerId) {
    let outcome = {
        let Table { seats, loops, .. } = table;
        let Some(lp) = loops.get_mut(&player) else {
            return;
        };
        // Only a pending lock may be finished; stale fade commands from a
        // previous round are dropped here
        if lp.stopped || !lp.piece_locked {
            return;
        }
        let Some(seat) = seats.iter_mut().find(|s| s.number == lp.seat_number) else {
            return;
        };
        let (Some(board), Some(powers), Some(bar), Some(queue)) = (
            seat.board.as_mut(),
            seat.block_powers.as_mut(),
            seat.power_bar.as_mut(),
            seat.next_pieces.as_mut(),
        ) else {
            return;
        };

        let mut cascade_falls = 0u32;
        loop {
            if board.has_marked_blocks() {
                for block in board.remove_marked_blocks() {
                    account_removed_block(&block, powers, bar);
                }
                board.apply_gravity();
            }
            let matches = board.detect_sequences();
            if matches.is_empty() {
                break;
            }
            // Cascades triggered by gravity resolve without another fade
            let cells: Vec<(usize, usize)> = matches
                .iter()
                .flat_map(|m| m.cells.iter().copied())
                .collect();
            cascade_falls += matches.iter().map(|m| m.falls).sum::<u32>();
            board.mark_for_removal(&cells, RemovalOrigin::Sequence);
        }
        for kind in board.pending_diamonds() {
            bar.push(PowerBarItem::Diamond { kind });
        }

        let piece = queue.next_piece(powers);
        let blocked_spawn = board.has_collision(&piece);
        if blocked_spawn {
            board.mark_game_over();
        } else {
            lp.current_piece = Some(piece);
        }
        lp.piece_locked = false;
        lp.tick_in_progress = false;
        if lp.pending_special_speed_drop && !blocked_spawn {
            lp.pending_special_speed_drop = false;
            lp.speed_drop_ticks_remaining = SPEED_DROP_TICKS;
        }
        lp.refresh_tick_speed();
        (seat.number, seat.team(), cascade_falls, blocked_spawn)
    };

    let (seat_number, team, cascade_falls, blocked_spawn) = outcome;
    if cascade_falls > 0 {
        ctx.publish(FanoutEvent::HooBlocks(HooBlocksPayload {
            table_id: ctx.table_id,
            room: ctx.room.clone(),
            team,
            blocks: cascade_falls,
        }));
    }
    ctx.publish_seat_state(table, seat_number);
    if blocked_spawn {
        stop(table, ctx, player);
        crate::game::evaluate_match(table, ctx);
    }
}

/// Idempotent shutdown of one loop: marks it stopped, clears the piece,
/// cancels the ticker, and emits one final seat-state broadcast.
pub fn stop(table: &mut Table, ctx: &RuntimeCtx, player: PlayerId) {
    let seat_number = {
        let Some(lp) = table.loops.get_mut(&player) else {
            return;
        };
        if lp.stopped {
            return;
        }
        lp.halt();
        lp.seat_number
    };
    ctx.publish_seat_state(table, seat_number);
}
