use serde::{Deserialize, Serialize};

pub const BOARD_COLS: usize = 8;
pub const VISIBLE_ROWS: usize = 13;
pub const HIDDEN_ROWS: usize = 3;
pub const TOTAL_ROWS: usize = VISIBLE_ROWS + HIDDEN_ROWS;
pub const PIECE_BLOCKS: usize = 3;
pub const LOOKAHEAD_PIECES: usize = 3;
pub const SEAT_COUNT: u8 = 8;

pub const NORMAL_TICK_MS: u64 = 1000;
pub const SOFT_DROP_TICK_MS: u64 = 150;
pub const SPEED_DROP_TICK_MS: u64 = 70;
pub const SPEED_DROP_TICKS: u32 = 20;

pub const COUNTDOWN_START: i32 = 5;
pub const COUNTDOWN_START_TEST: i32 = 2;
pub const MIN_GRACE_PERIOD_SECONDS: i32 = 10;
pub const FADE_DELAY_MS: u64 = 500;

pub const POWER_THRESHOLD: u32 = 4;
pub const POWER_THRESHOLD_REDUCED: u32 = 3;
pub const DIAMOND_THRESHOLDS: [(u32, DiamondKind); 3] = [
    (30, DiamondKind::SpeedDrop),
    (60, DiamondKind::RemovePowers),
    (90, DiamondKind::RemoveStones),
];

pub const ELO_K_FACTOR: f64 = 16.0;
pub const DEFAULT_RATING: i32 = 1200;

pub type PlayerId = u64;
pub type TableId = u64;

/// The six Towers letters. Matching the full word on a board is a "hoo".
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TowerLetter {
    T,
    O,
    W,
    E,
    R,
    S,
}

impl TowerLetter {
    pub const ALL: [TowerLetter; 6] = [
        TowerLetter::T,
        TowerLetter::O,
        TowerLetter::W,
        TowerLetter::E,
        TowerLetter::R,
        TowerLetter::S,
    ];

    pub fn as_char(self) -> char {
        match self {
            TowerLetter::T => 'T',
            TowerLetter::O => 'O',
            TowerLetter::W => 'W',
            TowerLetter::E => 'E',
            TowerLetter::R => 'R',
            TowerLetter::S => 'S',
        }
    }
}

/// The word whose appearance on a board triggers the hoo bonus.
pub const TARGET_WORD: [TowerLetter; 6] = TowerLetter::ALL;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Letter(TowerLetter),
    Stone,
    Medusa,
    Midas,
}

impl BlockKind {
    pub fn letter(self) -> Option<TowerLetter> {
        match self {
            BlockKind::Letter(l) => Some(l),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerLevel {
    Minor,
    Normal,
    Mega,
    Berserk,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerKind {
    Attack,
    Defense,
}

/// Power carried by a single block. "No power yet" is a first-class variant,
/// never a missing field.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum BlockPower {
    None,
    Attack(PowerLevel),
    Defense(PowerLevel),
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiamondKind {
    SpeedDrop,
    RemovePowers,
    RemoveStones,
}

impl DiamondKind {
    /// Fixed attack/defense membership for diamonds.
    pub fn power_kind(self) -> PowerKind {
        match self {
            DiamondKind::SpeedDrop => PowerKind::Attack,
            DiamondKind::RemovePowers | DiamondKind::RemoveStones => PowerKind::Defense,
        }
    }
}

/// One earned item in a seat's power bar, consumed strictly FIFO.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PowerBarItem {
    Letter {
        letter: TowerLetter,
        kind: PowerKind,
        level: PowerLevel,
    },
    Diamond {
        kind: DiamondKind,
    },
}

impl PowerBarItem {
    pub fn power_kind(&self) -> PowerKind {
        match self {
            PowerBarItem::Letter { kind, .. } => *kind,
            PowerBarItem::Diamond { kind } => kind.power_kind(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub row: i16,
    pub col: i16,
}

impl Position {
    pub fn new(row: i16, col: i16) -> Self {
        Self { row, col }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOrigin {
    None,
    Sequence,
    Power,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PieceBlock {
    pub kind: BlockKind,
    pub position: Position,
    pub power: BlockPower,
    pub marked_for_removal: bool,
    pub removal_origin: RemovalOrigin,
}

impl PieceBlock {
    pub fn new(kind: BlockKind, position: Position) -> Self {
        Self {
            kind,
            position,
            power: BlockPower::None,
            marked_for_removal: false,
            removal_origin: RemovalOrigin::None,
        }
    }
}

/// An ordered group of three blocks falling as one unit. The blocks always
/// occupy `(anchor.row + index, anchor.col)` and are re-synced on every move.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Piece {
    blocks: [PieceBlock; PIECE_BLOCKS],
    position: Position,
}

impl Piece {
    pub fn new(mut blocks: [PieceBlock; PIECE_BLOCKS], position: Position) -> Self {
        for (index, block) in blocks.iter_mut().enumerate() {
            block.position = Position::new(position.row + index as i16, position.col);
        }
        Self { blocks, position }
    }

    pub fn of_kinds(kinds: [BlockKind; PIECE_BLOCKS], position: Position) -> Self {
        let blocks = kinds.map(|kind| PieceBlock::new(kind, position));
        Self::new(blocks, position)
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
        for (index, block) in self.blocks.iter_mut().enumerate() {
            block.position = Position::new(position.row + index as i16, position.col);
        }
    }

    pub fn blocks(&self) -> &[PieceBlock; PIECE_BLOCKS] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [PieceBlock; PIECE_BLOCKS] {
        &mut self.blocks
    }

    /// Rotates `[a, b, c]` into `[b, c, a]` and re-syncs block cells.
    pub fn cycle_blocks(&mut self) {
        self.blocks.rotate_left(1);
        self.set_position(self.position);
    }

    /// Independent clone for collision probing; the live piece is untouched.
    pub fn simulated_at(&self, position: Position) -> Piece {
        let mut probe = self.clone();
        probe.set_position(position);
        probe
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    Waiting,
    Countdown,
    Playing,
    GameOver,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PartnerSide {
    Left,
    Right,
}

pub type BoardSnapshot = Vec<Vec<Option<PieceBlock>>>;

/// Everything a spectator of one seat needs to render it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SeatSnapshot {
    pub seat_number: u8,
    pub board: Option<BoardSnapshot>,
    pub current_piece: Option<Piece>,
    pub power_bar: Vec<PowerBarItem>,
    pub next_pieces: Vec<Piece>,
    pub game_over: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerResult {
    pub player_id: PlayerId,
    pub team: u8,
    pub winner: bool,
    pub rating_delta: Option<i32>,
}

/// Channel names for the fan-out bridge. Exactly one payload shape per
/// channel; subscribers forward payloads, they never re-derive state.
pub mod channels {
    pub const MATCH_STATE: &str = "towers.match_state";
    pub const COUNTDOWN: &str = "towers.countdown";
    pub const TIMER: &str = "towers.timer";
    pub const SEAT_STATE: &str = "towers.seat_state";
    pub const BOARDS_CLEARED: &str = "towers.boards_cleared";
    pub const POWER_USED: &str = "towers.power_used";
    pub const HOO_BLOCKS: &str = "towers.hoo_blocks";
    pub const BLOCKS_MARKED: &str = "towers.blocks_marked";
    pub const GAME_OVER: &str = "towers.game_over";

    pub const ALL: [&str; 9] = [
        MATCH_STATE,
        COUNTDOWN,
        TIMER,
        SEAT_STATE,
        BOARDS_CLEARED,
        POWER_USED,
        HOO_BLOCKS,
        BLOCKS_MARKED,
        GAME_OVER,
    ];
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MatchStatePayload {
    pub table_id: TableId,
    pub room: String,
    pub state: MatchState,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CountdownPayload {
    pub table_id: TableId,
    pub room: String,
    pub value: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TimerPayload {
    pub table_id: TableId,
    pub room: String,
    pub value: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SeatStatePayload {
    pub table_id: TableId,
    pub room: String,
    pub seat: SeatSnapshot,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BoardsClearedPayload {
    pub table_id: TableId,
    pub room: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PowerUsedPayload {
    pub table_id: TableId,
    pub room: String,
    pub source_seat: u8,
    pub target_seat: u8,
    pub item: PowerBarItem,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HooBlocksPayload {
    pub table_id: TableId,
    pub room: String,
    pub team: u8,
    pub blocks: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BlocksMarkedPayload {
    pub table_id: TableId,
    pub room: String,
    pub seat: u8,
    pub cells: Vec<(usize, usize)>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GameOverPayload {
    pub table_id: TableId,
    pub room: String,
    pub winners: Vec<PlayerId>,
    pub results: Vec<PlayerResult>,
}

/// One published event on the fan-out bridge. Each variant corresponds to
/// exactly one named channel; only the payload is put on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum FanoutEvent {
    MatchState(MatchStatePayload),
    Countdown(CountdownPayload),
    Timer(TimerPayload),
    SeatState(SeatStatePayload),
    BoardsCleared(BoardsClearedPayload),
    PowerUsed(PowerUsedPayload),
    HooBlocks(HooBlocksPayload),
    BlocksMarked(BlocksMarkedPayload),
    GameOver(GameOverPayload),
}

impl FanoutEvent {
    pub fn channel(&self) -> &'static str {
        match self {
            FanoutEvent::MatchState(_) => channels::MATCH_STATE,
            FanoutEvent::Countdown(_) => channels::COUNTDOWN,
            FanoutEvent::Timer(_) => channels::TIMER,
            FanoutEvent::SeatState(_) => channels::SEAT_STATE,
            FanoutEvent::BoardsCleared(_) => channels::BOARDS_CLEARED,
            FanoutEvent::PowerUsed(_) => channels::POWER_USED,
            FanoutEvent::HooBlocks(_) => channels::HOO_BLOCKS,
            FanoutEvent::BlocksMarked(_) => channels::BLOCKS_MARKED,
            FanoutEvent::GameOver(_) => channels::GAME_OVER,
        }
    }

    pub fn encode(&self) -> bincode::Result<Vec<u8>> {
        match self {
            FanoutEvent::MatchState(p) => bincode::serialize(p),
            FanoutEvent::Countdown(p) => bincode::serialize(p),
            FanoutEvent::Timer(p) => bincode::serialize(p),
            FanoutEvent::SeatState(p) => bincode::serialize(p),
            FanoutEvent::BoardsCleared(p) => bincode::serialize(p),
            FanoutEvent::PowerUsed(p) => bincode::serialize(p),
            FanoutEvent::HooBlocks(p) => bincode::serialize(p),
            FanoutEvent::BlocksMarked(p) => bincode::serialize(p),
            FanoutEvent::GameOver(p) => bincode::serialize(p),
        }
    }

    pub fn decode(channel: &str, bytes: &[u8]) -> bincode::Result<FanoutEvent> {
        match channel {
            channels::MATCH_STATE => bincode::deserialize(bytes).map(FanoutEvent::MatchState),
            channels::COUNTDOWN => bincode::deserialize(bytes).map(FanoutEvent::Countdown),
            channels::TIMER => bincode::deserialize(bytes).map(FanoutEvent::Timer),
            channels::SEAT_STATE => bincode::deserialize(bytes).map(FanoutEvent::SeatState),
            channels::BOARDS_CLEARED => {
                bincode::deserialize(bytes).map(FanoutEvent::BoardsCleared)
            }
            channels::POWER_USED => bincode::deserialize(bytes).map(FanoutEvent::PowerUsed),
            channels::HOO_BLOCKS => bincode::deserialize(bytes).map(FanoutEvent::HooBlocks),
            channels::BLOCKS_MARKED => bincode::deserialize(bytes).map(FanoutEvent::BlocksMarked),
            channels::GAME_OVER => bincode::deserialize(bytes).map(FanoutEvent::GameOver),
            other => Err(Box::new(bincode::ErrorKind::Custom(format!(
                "unknown fan-out channel: {}",
                other
            )))),
        }
    }
}
