//! # Towers Match Engine
//!
//! This library provides the authoritative server implementation for the
//! team-based Towers block-matching game. It runs the per-player falling
//! piece simulation, adjudicates team wins and losses, distributes rewards,
//! and fans every externally visible transition out to the realtime fleet.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Every seat's board, piece queue, and power bar live here. Clients only
//! render the snapshots broadcast after each authoritative mutation; nothing
//! a client sends can move a piece into an invalid cell or act out of turn.
//!
//! ### Match Lifecycle
//! Tables move through WAITING → COUNTDOWN → PLAYING → GAME_OVER. The
//! countdown re-validates team readiness every second, an early grace window
//! invalidates rounds instead of scoring them, and terminal rounds drive
//! stats, hero codes, and Elo-style rating updates.
//!
//! ### Distributed Fan-Out
//! The engine never talks to the transport directly. State transitions are
//! published on named channels with fixed payload shapes; each realtime
//! process forwards them to its own audience, and cross-seat power delivery
//! rides the same path so seats on different processes stay consistent.
//!
//! ## Architecture Design
//!
//! ### One Task Per Table
//! Each table's runtime is a single task draining one command channel:
//! player actions, tick commands from cancellable interval tasks, and the
//! power-used loopback. There is no preemption inside a table, so handlers
//! run to completion (or to their next await point) in arrival order.
//!
//! ### Explicit Ownership
//! Rendezvous hashing over (table, process) picks the one process that
//! computes a table's ticks; every other process only forwards
//! observations. No distributed locks, no shared memory.
//!
//! ## Module Organization
//!
//! - [`board`] - per-seat grid: collision, word detection, removal, gravity
//! - [`next_pieces`] - lookahead queue with lazy power attachment
//! - [`power_bar`] - FIFO of earned power items
//! - [`power`] - letter-power progression, targeting policies, effects
//! - [`game_loop`] - per-player tick loop and input gating
//! - [`game_teams`] - pure team policy
//! - [`game`] - per-table lifecycle state machine and rewards
//! - [`elo`] - N-team rating deltas
//! - [`cipher`] - hero-code reward minigame
//! - [`bridge`] - fan-out channels and table affinity
//! - [`table`] - seats, players, registry
//! - [`runtime`] - the per-table actor and process services
//! - [`persist`] - collaborator seams (stats, messages, presence)

pub mod board;
pub mod bridge;
pub mod cipher;
pub mod elo;
pub mod game;
pub mod game_loop;
pub mod game_teams;
pub mod next_pieces;
pub mod persist;
pub mod power;
pub mod power_bar;
pub mod runtime;
pub mod table;
