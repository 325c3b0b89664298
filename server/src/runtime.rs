//! Per-table runtime actor and process-wide service wiring.
//!
//! Every table runs as one task that owns its authoritative state and drains
//! a single command channel: player commands from the transport layer, tick
//! commands from the cancellable tickers, and power deliveries looped back
//! from the fan-out bridge. Mutation never happens outside this task, which
//! gives the cooperative single-threaded ordering the simulation relies on.

use crate::bridge::{FanoutBridge, TableAffinity};
use crate::cipher::CipherHeroManager;
use crate::game;
use crate::game_loop::{self, MoveDir};
use crate::persist::{
    MemoryMessenger, MemoryPresence, MemoryStatsStore, PlayerStatsStore, PresenceLookup,
    SystemMessenger,
};
use crate::power::{self, NormalTargeting, PowerEffectRegistry, TargetingPolicy};
use crate::table::Table;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    channels, FanoutEvent, PlayerId, PowerBarItem, SeatStatePayload, TableId, FADE_DELAY_MS,
};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Duration;

/// Everything a table runtime needs to reach the outside world.
#[derive(Clone)]
pub struct ProcessServices {
    pub bridge: Arc<FanoutBridge>,
    pub stats: Arc<dyn PlayerStatsStore>,
    pub messenger: Arc<dyn SystemMessenger>,
    pub presence: Arc<dyn PresenceLookup>,
    pub ciphers: Arc<Mutex<CipherHeroManager>>,
    pub targeting: Arc<dyn TargetingPolicy>,
    pub effects: Arc<PowerEffectRegistry>,
    pub affinity: TableAffinity,
    pub test_mode: bool,
}

impl ProcessServices {
    /// Fully in-memory wiring: the demo binary and the test suites use this;
    /// production deployments swap in real collaborator implementations.
    pub fn in_memory(test_mode: bool) -> Self {
        Self {
            bridge: Arc::new(FanoutBridge::new()),
            stats: Arc::new(MemoryStatsStore::new()),
            messenger: Arc::new(MemoryMessenger::new()),
            presence: Arc::new(MemoryPresence::new()),
            ciphers: Arc::new(Mutex::new(CipherHeroManager::new(StdRng::from_entropy()))),
            targeting: Arc::new(NormalTargeting::new(StdRng::from_entropy())),
            effects: Arc::new(PowerEffectRegistry::with_default_effects()),
            affinity: TableAffinity::single_process(),
            test_mode,
        }
    }
}

/// One queued unit of work for a table runtime.
#[derive(Debug)]
pub enum TableCommand {
    Sit { player: PlayerId, seat: u8 },
    Stand { player: PlayerId },
    SetReady { player: PlayerId, ready: bool },
    StartGame { player: PlayerId },
    MovePieceSide { player: PlayerId, dir: MoveDir },
    CyclePieceBlocks { player: PlayerId },
    MovePieceDown { player: PlayerId },
    StopMovingPieceDown { player: PlayerId },
    UsePower { player: PlayerId, target_seat: Option<u8> },
    PlayerLeft { player: PlayerId },
    LoopTick { player: PlayerId },
    FadeComplete { player: PlayerId },
    CountdownTick,
    TimerTick,
    ApplyPower {
        source_seat: u8,
        target_seat: u8,
        item: PowerBarItem,
    },
    Shutdown,
}

/// Shared context handed down to every state-mutating function.
#[derive(Clone)]
pub struct RuntimeCtx {
    pub table_id: TableId,
    pub room: String,
    pub cmd_tx: mpsc::UnboundedSender<TableCommand>,
    pub services: ProcessServices,
}

impl RuntimeCtx {
    pub fn publish(&self, event: FanoutEvent) {
        if let Err(e) = self.services.bridge.publish(&event) {
            error!(
                "table {}: failed to publish {}: {}",
                self.table_id,
                event.channel(),
                e
            );
        }
    }

    pub fn publish_seat_state(&self, table: &Table, seat_number: u8) {
        self.publish(FanoutEvent::SeatState(SeatStatePayload {
            table_id: self.table_id,
            room: self.room.clone(),
            seat: table.seat_snapshot(seat_number),
        }));
    }

    /// Waits out the client-side removal fade, then finishes the lock.
    pub fn schedule_fade(&self, player: PlayerId) {
        let commands = self.cmd_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(FADE_DELAY_MS)).await;
            let _ = commands.send(TableCommand::FadeComplete { player });
        });
    }
}

/// The actor owning one table's authoritative state.
pub struct TableRuntime {
    table: Table,
    ctx: RuntimeCtx,
    cmd_rx: mpsc::UnboundedReceiver<TableCommand>,
    power_rx: broadcast::Receiver<Vec<u8>>,
}

impl TableRuntime {
    /// Spawns the runtime task and returns the handle used to address it.
    pub fn spawn(table_id: TableId, rated: bool, services: ProcessServices) -> TableHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let power_rx = services.bridge.subscribe(channels::POWER_USED);
        let ctx = RuntimeCtx {
            table_id,
            room: format!("table-{}", table_id),
            cmd_tx: cmd_tx.clone(),
            services,
        };
        let runtime = TableRuntime {
            table: Table::new(table_id, rated),
            ctx,
            cmd_rx,
            power_rx,
        };
        tokio::spawn(runtime.run());
        TableHandle { table_id, cmd_tx }
    }

    async fn run(mut self) {
        info!("table {} runtime started", self.ctx.table_id);
        loop {
            tokio::select! {
                command = self.cmd_rx.recv() => match command {
                    Some(TableCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                payload = self.power_rx.recv() => match payload {
                    Ok(bytes) => self.handle_power_payload(&bytes),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => warn!(
                        "table {}: power channel lagged, {} event(s) dropped",
                        self.ctx.table_id, skipped
                    ),
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        info!("table {} runtime stopped", self.ctx.table_id);
    }

    fn handle_command(&mut self, command: TableCommand) {
        let table = &mut self.table;
        let ctx = &self.ctx;
        match command {
            TableCommand::Sit { player, seat } => game::sit(table, player, seat),
            TableCommand::Stand { player } => game::stand(table, ctx, player),
            TableCommand::SetReady { player, ready } => game::set_ready(table, player, ready),
            TableCommand::StartGame { player } => game::start_game(table, ctx, player),
            TableCommand::MovePieceSide { player, dir } => {
                game_loop::move_piece_side(table, ctx, player, dir)
            }
            TableCommand::CyclePieceBlocks { player } => {
                game_loop::cycle_piece_blocks(table, ctx, player)
            }
            TableCommand::MovePieceDown { player } => game_loop::move_piece_down(table, player),
            TableCommand::StopMovingPieceDown { player } => {
                game_loop::stop_moving_piece_down(table, player)
            }
            TableCommand::UsePower {
                player,
                target_seat,
            } => power::use_power(table, ctx, player, target_seat),
            TableCommand::PlayerLeft { player } => game::player_left(table, ctx, player),
            TableCommand::LoopTick { player } => game_loop::tick(table, ctx, player),
            TableCommand::FadeComplete { player } => game_loop::finish_lock(table, ctx, player),
            TableCommand::CountdownTick => game::countdown_tick(table, ctx),
            TableCommand::TimerTick => game::timer_tick(table, ctx),
            TableCommand::ApplyPower {
                source_seat,
                target_seat,
                item,
            } => {
                debug!(
                    "table {}: applying power from seat {} to seat {}",
                    ctx.table_id, source_seat, target_seat
                );
                power::apply_power(table, ctx, target_seat, &item);
                ctx.publish_seat_state(table, target_seat);
            }
            TableCommand::Shutdown => {}
        }
    }

    /// Cross-seat delivery arrives exclusively over the published event
    /// path. Only the owning process applies it; everyone else forwards.
    fn handle_power_payload(&mut self, bytes: &[u8]) {
        match FanoutEvent::decode(channels::POWER_USED, bytes) {
            Ok(FanoutEvent::PowerUsed(payload)) => {
                if payload.table_id != self.ctx.table_id {
                    return;
                }
                if !self.ctx.services.affinity.owns(payload.table_id) {
                    return;
                }
                let _ = self.ctx.cmd_tx.send(TableCommand::ApplyPower {
                    source_seat: payload.source_seat,
                    target_seat: payload.target_seat,
                    item: payload.item,
                });
            }
            Ok(_) => {}
            Err(e) => warn!(
                "table {}: undecodable power payload: {}",
                self.ctx.table_id, e
            ),
        }
    }
}

/// Fire-and-forget control surface for one table. This is the seam the
/// transport/session collaborator calls into, one method per player action.
#[derive(Debug, Clone)]
pub struct TableHandle {
    table_id: TableId,
    cmd_tx: mpsc::UnboundedSender<TableCommand>,
}

impl TableHandle {
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn sit(&self, player: PlayerId, seat: u8) {
        self.send(TableCommand::Sit { player, seat });
    }

    pub fn stand(&self, player: PlayerId) {
        self.send(TableCommand::Stand { player });
    }

    pub fn set_ready(&self, player: PlayerId, ready: bool) {
        self.send(TableCommand::SetReady { player, ready });
    }

    pub fn start_game(&self, player: PlayerId) {
        self.send(TableCommand::StartGame { player });
    }

    pub fn move_piece_side(&self, player: PlayerId, dir: MoveDir) {
        self.send(TableCommand::MovePieceSide { player, dir });
    }

    pub fn cycle_piece_blocks(&self, player: PlayerId) {
        self.send(TableCommand::CyclePieceBlocks { player });
    }

    pub fn move_piece_down(&self, player: PlayerId) {
        self.send(TableCommand::MovePieceDown { player });
    }

    pub fn stop_moving_piece_down(&self, player: PlayerId) {
        self.send(TableCommand::StopMovingPieceDown { player });
    }

    pub fn use_power(&self, player: PlayerId, target_seat: Option<u8>) {
        self.send(TableCommand::UsePower {
            player,
            target_seat,
        });
    }

    pub fn player_left(&self, player: PlayerId) {
        self.send(TableCommand::PlayerLeft { player });
    }

    pub fn shutdown(&self) {
        self.send(TableCommand::Shutdown);
    }

    fn send(&self, command: TableCommand) {
        if self.cmd_tx.send(command).is_err() {
            warn!(
                "table {}: command dropped, runtime already stopped",
                self.table_id
            );
        }
    }
}
