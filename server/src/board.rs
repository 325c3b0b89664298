//! Per-seat grid simulation: collision checks, target-word ("hoo") sequence
//! detection, block removal and gravity, and the swap heuristics used by
//! rearrange powers.
//!
//! The grid is 8 columns by 16 rows; the top 3 rows are a hidden band where
//! new pieces spawn. Sequence matches and swap heuristics never reach into
//! the hidden band, while raw swaps and collision checks operate on the full
//! grid.

use rand::rngs::StdRng;
use rand::Rng;
use shared::{
    BlockKind, BlockPower, BoardSnapshot, DiamondKind, PartnerSide, Piece, PieceBlock, Position,
    PowerLevel, RemovalOrigin, TowerLetter, BOARD_COLS, DIAMOND_THRESHOLDS, HIDDEN_ROWS,
    TARGET_WORD, TOTAL_ROWS,
};

/// Scan directions for the target word, with their falls bonuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Right,
    DownRight,
    UpRight,
    Down,
}

impl Direction {
    pub const SCAN_ORDER: [Direction; 4] = [
        Direction::Right,
        Direction::DownRight,
        Direction::UpRight,
        Direction::Down,
    ];

    pub fn falls_bonus(self) -> u32 {
        match self {
            Direction::Right => 1,
            Direction::DownRight => 2,
            Direction::UpRight => 2,
            Direction::Down => 3,
        }
    }

    fn step(self) -> (i16, i16) {
        match self {
            Direction::Right => (0, 1),
            Direction::DownRight => (1, 1),
            Direction::UpRight => (-1, 1),
            Direction::Down => (1, 0),
        }
    }
}

/// One occurrence of the target word on the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceMatch {
    pub cells: Vec<(usize, usize)>,
    pub direction: Direction,
    pub falls: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartnerLink {
    pub seat: u8,
    pub side: PartnerSide,
}

/// Ceiling share of blocks a rearrange power may shuffle, by level.
/// Integer arithmetic so `(minor, 100)` is exactly 15, not a float artifact.
pub fn num_blocks_to_rearrange(level: PowerLevel, total: u32) -> u32 {
    let percent = match level {
        PowerLevel::Minor => 15,
        PowerLevel::Normal => 30,
        PowerLevel::Mega | PowerLevel::Berserk => 50,
    };
    (total * percent + 99) / 100
}

#[derive(Debug, Clone)]
pub struct Board {
    grid: [[Option<PieceBlock>; BOARD_COLS]; TOTAL_ROWS],
    removed_blocks: u32,
    diamonds_granted: usize,
    game_over: bool,
    partner: Option<PartnerLink>,
}

impl Board {
    pub fn new() -> Self {
        Self {
            grid: [[None; BOARD_COLS]; TOTAL_ROWS],
            removed_blocks: 0,
            diamonds_granted: 0,
            game_over: false,
            partner: None,
        }
    }

    pub fn in_bounds(row: i16, col: i16) -> bool {
        row >= 0 && (row as usize) < TOTAL_ROWS && col >= 0 && (col as usize) < BOARD_COLS
    }

    pub fn block_at(&self, row: usize, col: usize) -> Option<&PieceBlock> {
        self.grid.get(row).and_then(|r| r.get(col)).and_then(|c| c.as_ref())
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    /// Departure and teardown paths eliminate a board without a losing lock.
    pub fn mark_game_over(&mut self) {
        self.game_over = true;
    }

    pub fn removed_blocks(&self) -> u32 {
        self.removed_blocks
    }

    pub fn partner(&self) -> Option<PartnerLink> {
        self.partner
    }

    pub fn set_partner(&mut self, link: Option<PartnerLink>) {
        self.partner = link;
    }

    /// True when any cell of the probe piece is outside the grid or already
    /// occupied. Callers probe with `Piece::simulated_at` clones.
    pub fn has_collision(&self, piece: &Piece) -> bool {
        piece.blocks().iter().any(|block| {
            let Position { row, col } = block.position;
            if !Self::in_bounds(row, col) {
                return true;
            }
            self.grid[row as usize][col as usize].is_some()
        })
    }

    pub fn lock_piece(&mut self, piece: &Piece) {
        for block in piece.blocks() {
            let Position { row, col } = block.position;
            if Self::in_bounds(row, col) {
                self.grid[row as usize][col as usize] = Some(*block);
            }
        }
    }

    /// A piece that comes to rest inside the hidden band kills the board.
    pub fn check_if_game_over(&mut self, locked: &Piece) -> bool {
        let dead = locked
            .blocks()
            .iter()
            .any(|block| (block.position.row as usize) < HIDDEN_ROWS);
        if dead {
            self.game_over = true;
        }
        dead
    }

    fn letter_at(&self, row: i16, col: i16) -> Option<TowerLetter> {
        if row < HIDDEN_ROWS as i16 || !Self::in_bounds(row, col) {
            return None;
        }
        self.grid[row as usize][col as usize]
            .as_ref()
            .and_then(|b| b.kind.letter())
    }

    fn match_word_at(&self, row: usize, col: usize, direction: Direction) -> Option<Vec<(usize, usize)>> {
        let (dr, dc) = direction.step();
        let mut cells = Vec::with_capacity(TARGET_WORD.len());
        for (index, expected) in TARGET_WORD.iter().enumerate() {
            let r = row as i16 + dr * index as i16;
            let c = col as i16 + dc * index as i16;
            if self.letter_at(r, c) != Some(*expected) {
                return None;
            }
            cells.push((r as usize, c as usize));
        }
        Some(cells)
    }

    /// Scans every cell holding the first target letter in all four
    /// directions. Each (cell, direction) hit is an independent match; no
    /// deduplication of overlapping matches.
    pub fn detect_sequences(&self) -> Vec<SequenceMatch> {
        let mut matches = Vec::new();
        for row in HIDDEN_ROWS..TOTAL_ROWS {
            for col in 0..BOARD_COLS {
                if self.letter_at(row as i16, col as i16) != Some(TARGET_WORD[0]) {
                    continue;
                }
                for direction in Direction::SCAN_ORDER {
                    if let Some(cells) = self.match_word_at(row, col, direction) {
                        matches.push(SequenceMatch {
                            cells,
                            direction,
                            falls: direction.falls_bonus(),
                        });
                    }
                }
            }
        }
        matches
    }

    pub fn mark_for_removal(&mut self, cells: &[(usize, usize)], origin: RemovalOrigin) {
        for &(row, col) in cells {
            let block = self
                .grid
                .get_mut(row)
                .and_then(|r| r.get_mut(col))
                .and_then(|c| c.as_mut());
            if let Some(block) = block {
                block.marked_for_removal = true;
                block.removal_origin = origin;
            }
        }
    }

    pub fn has_marked_blocks(&self) -> bool {
        self.grid
            .iter()
            .flatten()
            .any(|cell| cell.map_or(false, |b| b.marked_for_removal))
    }

    /// Clears every marked cell and returns the removed blocks for power
    /// accounting. The removal counter only ever increases.
    pub fn remove_marked_blocks(&mut self) -> Vec<PieceBlock> {
        let mut removed = Vec::new();
        for row in self.grid.iter_mut() {
            for cell in row.iter_mut() {
                if cell.map_or(false, |b| b.marked_for_removal) {
                    if let Some(block) = cell.take() {
                        removed.push(block);
                    }
                }
            }
        }
        self.removed_blocks += removed.len() as u32;
        removed
    }

    /// Diamond kinds whose removal threshold has been crossed since the last
    /// call. Each kind unlocks once per round.
    pub fn pending_diamonds(&mut self) -> Vec<DiamondKind> {
        let mut unlocked = Vec::new();
        while self.diamonds_granted < DIAMOND_THRESHOLDS.len() {
            let (threshold, kind) = DIAMOND_THRESHOLDS[self.diamonds_granted];
            if self.removed_blocks < threshold {
                break;
            }
            unlocked.push(kind);
            self.diamonds_granted += 1;
        }
        unlocked
    }

    /// Settles every column so blocks rest on the lowest free cells.
    pub fn apply_gravity(&mut self) {
        for col in 0..BOARD_COLS {
            let mut write_row = TOTAL_ROWS;
            for row in (0..TOTAL_ROWS).rev() {
                if let Some(mut block) = self.grid[row][col].take() {
                    write_row -= 1;
                    block.position = Position::new(write_row as i16, col as i16);
                    self.grid[write_row][col] = Some(block);
                }
            }
        }
    }

    /// Raw grid swap over the full grid, including the hidden band. Composed
    /// with itself on the same coordinates it is the identity.
    pub fn swap_blocks(&mut self, r1: usize, c1: usize, r2: usize, c2: usize) {
        if r1.max(r2) >= TOTAL_ROWS || c1.max(c2) >= BOARD_COLS {
            return;
        }
        let a = self.grid[r1][c1].take();
        let b = self.grid[r2][c2].take();
        self.grid[r1][c1] = b.map(|mut blk| {
            blk.position = Position::new(r1 as i16, c1 as i16);
            blk
        });
        self.grid[r2][c2] = a.map(|mut blk| {
            blk.position = Position::new(r2 as i16, c2 as i16);
            blk
        });
    }

    /// Letter lookup through a hypothetical swap of two cells. The grid is
    /// never mutated for predicate checks.
    fn letter_through_swap(
        &self,
        row: i16,
        col: i16,
        swap: ((usize, usize), (usize, usize)),
    ) -> Option<TowerLetter> {
        if row < HIDDEN_ROWS as i16 || !Self::in_bounds(row, col) {
            return None;
        }
        let cell = (row as usize, col as usize);
        let (a, b) = swap;
        let source = if cell == a {
            b
        } else if cell == b {
            a
        } else {
            cell
        };
        self.grid[source.0][source.1]
            .as_ref()
            .and_then(|blk| blk.kind.letter())
    }

    fn has_triple_through<F>(&self, row: usize, col: usize, letter_fn: F) -> bool
    where
        F: Fn(i16, i16) -> Option<TowerLetter>,
    {
        const LINES: [(i16, i16); 4] = [(0, 1), (1, 0), (1, 1), (-1, 1)];
        for (dr, dc) in LINES {
            for start in -2i16..=0 {
                let mut letters = Vec::with_capacity(3);
                for k in 0..3i16 {
                    let r = row as i16 + (start + k) * dr;
                    let c = col as i16 + (start + k) * dc;
                    letters.push(letter_fn(r, c));
                }
                if letters[0].is_some() && letters[0] == letters[1] && letters[1] == letters[2] {
                    return true;
                }
            }
        }
        false
    }

    /// True when the cell sits in a run of three equal letters along any
    /// line through it. Hidden rows never participate.
    pub fn is_setting_up_three_in_row(&self, row: usize, col: usize) -> bool {
        self.has_triple_through(row, col, |r, c| self.letter_at(r, c))
    }

    /// True when the cell shares its letter with a vertical or diagonal
    /// neighbor inside the visible band.
    pub fn are_adjacent_blocks_same(&self, row: usize, col: usize) -> bool {
        let Some(letter) = self.letter_at(row as i16, col as i16) else {
            return false;
        };
        const NEIGHBORS: [(i16, i16); 6] = [(-1, 0), (1, 0), (-1, -1), (-1, 1), (1, -1), (1, 1)];
        NEIGHBORS.iter().any(|&(dr, dc)| {
            self.letter_at(row as i16 + dr, col as i16 + dc) == Some(letter)
        })
    }

    /// Simulates swapping two cells and reports whether either endpoint would
    /// then sit in a three-in-a-row. Pure read, nothing to restore.
    pub fn would_create_three_in_row(
        &self,
        a: (usize, usize),
        b: (usize, usize),
    ) -> bool {
        let swap = (a, b);
        self.has_triple_through(a.0, a.1, |r, c| self.letter_through_swap(r, c, swap))
            || self.has_triple_through(b.0, b.1, |r, c| self.letter_through_swap(r, c, swap))
    }

    fn occupied_visible_cells(&self) -> Vec<(usize, usize)> {
        let mut cells = Vec::new();
        for row in HIDDEN_ROWS..TOTAL_ROWS {
            for col in 0..BOARD_COLS {
                if self.grid[row][col].is_some() {
                    cells.push((row, col));
                }
            }
        }
        cells
    }

    pub fn total_visible_blocks(&self) -> u32 {
        self.occupied_visible_cells().len() as u32
    }

    /// Shuffles a level-scaled share of the visible blocks. Swaps that would
    /// hand the victim a three-in-a-row are skipped.
    pub fn rearrange_blocks(&mut self, level: PowerLevel, rng: &mut StdRng) {
        let cells = self.occupied_visible_cells();
        if cells.len() < 2 {
            return;
        }
        let count = num_blocks_to_rearrange(level, cells.len() as u32);
        let mut swapped = 0;
        let mut attempts = 0;
        while swapped < count && attempts < count * 8 {
            attempts += 1;
            let a = cells[rng.gen_range(0..cells.len())];
            let b = cells[rng.gen_range(0..cells.len())];
            if a == b || self.would_create_three_in_row(a, b) {
                continue;
            }
            self.swap_blocks(a.0, a.1, b.0, b.1);
            swapped += 1;
        }
    }

    /// Drops inert stones onto the lowest free visible cells of random columns.
    pub fn add_stones(&mut self, count: u32, rng: &mut StdRng) {
        let mut placed = 0;
        let mut attempts = 0;
        while placed < count && attempts < count * 8 {
            attempts += 1;
            let col = rng.gen_range(0..BOARD_COLS);
            let Some(row) = (HIDDEN_ROWS..TOTAL_ROWS)
                .rev()
                .find(|&row| self.grid[row][col].is_none())
            else {
                continue;
            };
            let position = Position::new(row as i16, col as i16);
            self.grid[row][col] = Some(PieceBlock::new(BlockKind::Stone, position));
            placed += 1;
        }
    }

    /// Turns random visible letter blocks to stone, shedding their powers.
    pub fn petrify_blocks(&mut self, count: u32, rng: &mut StdRng) {
        let letters: Vec<(usize, usize)> = self
            .occupied_visible_cells()
            .into_iter()
            .filter(|&(row, col)| {
                self.grid[row][col]
                    .map_or(false, |b| matches!(b.kind, BlockKind::Letter(_)))
            })
            .collect();
        if letters.is_empty() {
            return;
        }
        for _ in 0..count {
            let (row, col) = letters[rng.gen_range(0..letters.len())];
            if let Some(block) = self.grid[row][col].as_mut() {
                block.kind = BlockKind::Stone;
                block.power = BlockPower::None;
            }
        }
    }

    /// Dissolves up to `limit` stones, lowest rows first, then settles.
    pub fn remove_stones(&mut self, limit: u32) -> u32 {
        let mut removed = 0;
        'scan: for row in (HIDDEN_ROWS..TOTAL_ROWS).rev() {
            for col in 0..BOARD_COLS {
                if removed >= limit {
                    break 'scan;
                }
                if self.grid[row][col].map_or(false, |b| b.kind == BlockKind::Stone) {
                    self.grid[row][col] = None;
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            self.removed_blocks += removed;
            self.apply_gravity();
        }
        removed
    }

    /// Strips the armed power from every block on the grid.
    pub fn remove_powers(&mut self) {
        for cell in self.grid.iter_mut().flatten() {
            if let Some(block) = cell.as_mut() {
                block.power = BlockPower::None;
            }
        }
    }

    pub fn clear_bottom_row(&mut self) -> u32 {
        let mut removed = 0;
        let row = TOTAL_ROWS - 1;
        for col in 0..BOARD_COLS {
            if self.grid[row][col].take().is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            self.removed_blocks += removed;
            self.apply_gravity();
        }
        removed
    }

    /// Resolves Medusa and Midas blocks of a freshly locked piece. Medusa
    /// petrifies its neighborhood; Midas dissolves neighboring stones and
    /// itself, feeding the removal counter. Returns the dissolved count.
    pub fn apply_special_blocks(&mut self, locked: &Piece) -> u32 {
        const NEIGHBORS: [(i16, i16); 8] = [
            (-1, -1),
            (-1, 0),
            (-1, 1),
            (0, -1),
            (0, 1),
            (1, -1),
            (1, 0),
            (1, 1),
        ];
        let mut dissolved = 0;
        for block in locked.blocks() {
            let Position { row, col } = block.position;
            match block.kind {
                BlockKind::Medusa => {
                    for (dr, dc) in NEIGHBORS {
                        let (r, c) = (row + dr, col + dc);
                        if !Self::in_bounds(r, c) {
                            continue;
                        }
                        if let Some(neighbor) = self.grid[r as usize][c as usize].as_mut() {
                            if matches!(neighbor.kind, BlockKind::Letter(_)) {
                                neighbor.kind = BlockKind::Stone;
                                neighbor.power = BlockPower::None;
                            }
                        }
                    }
                    if let Some(own) = self.grid[row as usize][col as usize].as_mut() {
                        own.kind = BlockKind::Stone;
                    }
                }
                BlockKind::Midas => {
                    for (dr, dc) in NEIGHBORS {
                        let (r, c) = (row + dr, col + dc);
                        if !Self::in_bounds(r, c) {
                            continue;
                        }
                        let cell = &mut self.grid[r as usize][c as usize];
                        if cell.map_or(false, |b| b.kind == BlockKind::Stone) {
                            *cell = None;
                            dissolved += 1;
                        }
                    }
                    if self.grid[row as usize][col as usize].take().is_some() {
                        dissolved += 1;
                    }
                }
                _ => {}
            }
        }
        if dissolved > 0 {
            self.removed_blocks += dissolved;
            self.apply_gravity();
        }
        dissolved
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        self.grid.iter().map(|row| row.to_vec()).collect()
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use shared::PIECE_BLOCKS;

    fn letter_block(letter: TowerLetter, row: usize, col: usize) -> PieceBlock {
        PieceBlock::new(
            BlockKind::Letter(letter),
            Position::new(row as i16, col as i16),
        )
    }

    fn place(board: &mut Board, letter: TowerLetter, row: usize, col: usize) {
        board.grid[row][col] = Some(letter_block(letter, row, col));
    }

    fn place_word(board: &mut Board, start: (usize, usize), direction: Direction) {
        let (dr, dc) = direction.step();
        for (index, letter) in TARGET_WORD.iter().enumerate() {
            let row = (start.0 as i16 + dr * index as i16) as usize;
            let col = (start.1 as i16 + dc * index as i16) as usize;
            place(board, *letter, row, col);
        }
    }

    fn test_piece(kinds: [BlockKind; PIECE_BLOCKS], row: i16, col: i16) -> Piece {
        Piece::of_kinds(kinds, Position::new(row, col))
    }

    #[test]
    fn test_detects_word_in_every_direction_with_falls_bonus() {
        let cases = [
            (Direction::Right, (8, 0), 1),
            (Direction::DownRight, (5, 0), 2),
            (Direction::UpRight, (12, 0), 2),
            (Direction::Down, (6, 4), 3),
        ];

        for (direction, start, expected_falls) in cases {
            let mut board = Board::new();
            place_word(&mut board, start, direction);

            let matches = board.detect_sequences();
            assert_eq!(matches.len(), 1, "direction {:?}", direction);
            assert_eq!(matches[0].direction, direction);
            assert_eq!(matches[0].falls, expected_falls);
            assert_eq!(matches[0].cells.len(), TARGET_WORD.len());
        }
    }

    #[test]
    fn test_no_word_means_no_matches() {
        let mut board = Board::new();
        place(&mut board, TowerLetter::T, 10, 0);
        place(&mut board, TowerLetter::O, 10, 1);
        place(&mut board, TowerLetter::W, 10, 2);

        assert!(board.detect_sequences().is_empty());
    }

    #[test]
    fn test_overlapping_matches_accumulate_independently() {
        // A cross: one horizontal and one vertical word sharing the T.
        let mut board = Board::new();
        place_word(&mut board, (10, 0), Direction::Right);
        place_word(&mut board, (10, 0), Direction::Down);

        let matches = board.detect_sequences();
        assert_eq!(matches.len(), 2);
        let total_falls: u32 = matches.iter().map(|m| m.falls).sum();
        assert_eq!(total_falls, 1 + 3);
    }

    #[test]
    fn test_sequences_never_extend_into_hidden_rows() {
        let mut board = Board::new();
        // Vertical word starting one row inside the hidden band.
        for (index, letter) in TARGET_WORD.iter().enumerate() {
            board.grid[HIDDEN_ROWS - 1 + index][2] = Some(letter_block(
                *letter,
                HIDDEN_ROWS - 1 + index,
                2,
            ));
        }

        assert!(board.detect_sequences().is_empty());
    }

    #[test]
    fn test_swap_blocks_twice_is_identity() {
        let mut board = Board::new();
        place(&mut board, TowerLetter::T, 10, 1);
        place(&mut board, TowerLetter::S, 12, 5);
        let before = board.snapshot();

        board.swap_blocks(10, 1, 12, 5);
        board.swap_blocks(10, 1, 12, 5);

        assert_eq!(board.snapshot(), before);
    }

    #[test]
    fn test_swap_updates_block_positions() {
        let mut board = Board::new();
        place(&mut board, TowerLetter::T, 10, 1);
        board.swap_blocks(10, 1, 14, 6);

        let moved = board.block_at(14, 6).unwrap();
        assert_eq!(moved.position, Position::new(14, 6));
        assert!(board.block_at(10, 1).is_none());
    }

    #[test]
    fn test_num_blocks_to_rearrange_levels() {
        assert_eq!(num_blocks_to_rearrange(PowerLevel::Minor, 100), 15);
        assert_eq!(num_blocks_to_rearrange(PowerLevel::Normal, 100), 30);
        assert_eq!(num_blocks_to_rearrange(PowerLevel::Mega, 100), 50);
        // Ceiling rounding at non-round totals
        assert_eq!(num_blocks_to_rearrange(PowerLevel::Minor, 7), 2);
    }

    #[test]
    fn test_collision_against_walls_and_blocks() {
        let mut board = Board::new();
        let kinds = [
            BlockKind::Letter(TowerLetter::T),
            BlockKind::Letter(TowerLetter::O),
            BlockKind::Letter(TowerLetter::W),
        ];

        assert!(!board.has_collision(&test_piece(kinds, 0, 3)));
        assert!(board.has_collision(&test_piece(kinds, 0, -1)));
        assert!(board.has_collision(&test_piece(kinds, 0, BOARD_COLS as i16)));
        assert!(board.has_collision(&test_piece(kinds, TOTAL_ROWS as i16 - 2, 3)));

        place(&mut board, TowerLetter::S, 10, 3);
        assert!(board.has_collision(&test_piece(kinds, 8, 3)));
        assert!(!board.has_collision(&test_piece(kinds, 7, 3)));
    }

    #[test]
    fn test_lock_then_game_over_in_hidden_band() {
        let mut board = Board::new();
        let kinds = [
            BlockKind::Letter(TowerLetter::T),
            BlockKind::Letter(TowerLetter::O),
            BlockKind::Letter(TowerLetter::W),
        ];
        let piece = test_piece(kinds, 1, 3);
        board.lock_piece(&piece);

        assert!(board.check_if_game_over(&piece));
        assert!(board.is_game_over());
    }

    #[test]
    fn test_lock_in_visible_band_is_not_game_over() {
        let mut board = Board::new();
        let kinds = [
            BlockKind::Letter(TowerLetter::T),
            BlockKind::Letter(TowerLetter::O),
            BlockKind::Letter(TowerLetter::W),
        ];
        let piece = test_piece(kinds, HIDDEN_ROWS as i16, 3);
        board.lock_piece(&piece);

        assert!(!board.check_if_game_over(&piece));
        assert!(!board.is_game_over());
    }

    #[test]
    fn test_remove_marked_and_gravity() {
        let mut board = Board::new();
        place(&mut board, TowerLetter::T, 13, 2);
        place(&mut board, TowerLetter::O, 14, 2);
        place(&mut board, TowerLetter::W, 15, 2);

        board.mark_for_removal(&[(15, 2)], RemovalOrigin::Sequence);
        let removed = board.remove_marked_blocks();
        assert_eq!(removed.len(), 1);
        assert_eq!(board.removed_blocks(), 1);

        board.apply_gravity();
        assert!(board.block_at(15, 2).is_some());
        assert!(board.block_at(14, 2).is_some());
        assert!(board.block_at(13, 2).is_none());
        assert_eq!(
            board.block_at(15, 2).unwrap().position,
            Position::new(15, 2)
        );
    }

    #[test]
    fn test_diamond_unlocks_follow_thresholds() {
        let mut board = Board::new();
        assert!(board.pending_diamonds().is_empty());

        board.removed_blocks = 30;
        assert_eq!(board.pending_diamonds(), vec![DiamondKind::SpeedDrop]);
        // No double grant
        assert!(board.pending_diamonds().is_empty());

        board.removed_blocks = 95;
        assert_eq!(
            board.pending_diamonds(),
            vec![DiamondKind::RemovePowers, DiamondKind::RemoveStones]
        );
    }

    #[test]
    fn test_three_in_row_predicate_does_not_mutate() {
        let mut board = Board::new();
        place(&mut board, TowerLetter::E, 13, 0);
        place(&mut board, TowerLetter::E, 13, 1);
        place(&mut board, TowerLetter::R, 13, 2);
        place(&mut board, TowerLetter::E, 15, 5);
        let before = board.snapshot();

        // Swapping (13,2) with (15,5) lines up E E E horizontally.
        assert!(board.would_create_three_in_row((13, 2), (15, 5)));
        assert_eq!(board.snapshot(), before);

        // Swapping with a non-matching cell does not.
        place(&mut board, TowerLetter::S, 15, 7);
        assert!(!board.would_create_three_in_row((13, 2), (15, 7)));
    }

    #[test]
    fn test_adjacent_same_checks_respect_hidden_boundary() {
        let mut board = Board::new();
        // Same letters stacked across the hidden boundary: the hidden one
        // must not count as a neighbor.
        board.grid[HIDDEN_ROWS - 1][4] = Some(letter_block(TowerLetter::S, HIDDEN_ROWS - 1, 4));
        place(&mut board, TowerLetter::S, HIDDEN_ROWS, 4);
        assert!(!board.are_adjacent_blocks_same(HIDDEN_ROWS, 4));

        place(&mut board, TowerLetter::S, HIDDEN_ROWS + 1, 4);
        assert!(board.are_adjacent_blocks_same(HIDDEN_ROWS, 4));
    }

    #[test]
    fn test_rearrange_keeps_block_count() {
        let mut board = Board::new();
        let mut rng = StdRng::seed_from_u64(7);
        for col in 0..BOARD_COLS {
            place(&mut board, TowerLetter::ALL[col % 6], 15, col);
            place(&mut board, TowerLetter::ALL[(col + 3) % 6], 14, col);
        }
        let before = board.total_visible_blocks();

        board.rearrange_blocks(PowerLevel::Mega, &mut rng);
        assert_eq!(board.total_visible_blocks(), before);
    }

    #[test]
    fn test_add_and_remove_stones() {
        let mut board = Board::new();
        let mut rng = StdRng::seed_from_u64(11);
        board.add_stones(4, &mut rng);

        let stones = board
            .occupied_visible_cells()
            .iter()
            .filter(|&&(r, c)| board.block_at(r, c).unwrap().kind == BlockKind::Stone)
            .count();
        assert_eq!(stones, 4);

        let removed = board.remove_stones(10);
        assert_eq!(removed, 4);
        assert_eq!(board.total_visible_blocks(), 0);
    }

    #[test]
    fn test_medusa_petrifies_neighbors() {
        let mut board = Board::new();
        place(&mut board, TowerLetter::T, 14, 3);
        let medusa = test_piece(
            [BlockKind::Medusa, BlockKind::Medusa, BlockKind::Medusa],
            11,
            3,
        );
        board.lock_piece(&medusa);
        board.apply_special_blocks(&medusa);

        assert_eq!(board.block_at(14, 3).unwrap().kind, BlockKind::Stone);
        assert_eq!(board.block_at(13, 3).unwrap().kind, BlockKind::Stone);
    }

    #[test]
    fn test_midas_dissolves_stones_and_itself() {
        let mut board = Board::new();
        board.grid[14][3] = Some(PieceBlock::new(BlockKind::Stone, Position::new(14, 3)));
        let midas = test_piece(
            [
                BlockKind::Letter(TowerLetter::T),
                BlockKind::Letter(TowerLetter::O),
                BlockKind::Midas,
            ],
            11,
            3,
        );
        board.lock_piece(&midas);
        let dissolved = board.apply_special_blocks(&midas);

        // The neighboring stone plus the midas block itself
        assert_eq!(dissolved, 2);
        assert_eq!(board.removed_blocks(), 2);
    }

    #[test]
    fn test_remove_powers_strips_every_block() {
        let mut board = Board::new();
        let mut armed = letter_block(TowerLetter::W, 15, 0);
        armed.power = BlockPower::Attack(PowerLevel::Mega);
        board.grid[15][0] = Some(armed);

        board.remove_powers();
        assert_eq!(board.block_at(15, 0).unwrap().power, BlockPower::None);
    }
}
