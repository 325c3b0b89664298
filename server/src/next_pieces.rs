//! Per-seat lookahead queue of upcoming pieces.
//!
//! Letter powers are attached lazily when a piece is drawn, not when it is
//! generated, so a power armed while a piece sits in the queue still reaches
//! it. Special pieces pre-empt the queue at the head instead of appending.

use crate::power::PieceBlockPowerManager;
use rand::rngs::StdRng;
use rand::Rng;
use shared::{BlockKind, Piece, Position, TowerLetter, LOOKAHEAD_PIECES, PIECE_BLOCKS};
use std::collections::VecDeque;

/// Anchor cell for freshly drawn pieces, centered in the hidden band.
pub const SPAWN_POSITION: Position = Position { row: 0, col: 3 };

#[derive(Debug)]
pub struct NextPieces {
    queue: VecDeque<Piece>,
    rng: StdRng,
}

impl NextPieces {
    pub fn new(mut rng: StdRng) -> Self {
        let mut queue = VecDeque::with_capacity(LOOKAHEAD_PIECES);
        for _ in 0..LOOKAHEAD_PIECES {
            queue.push_back(Self::generate_piece(&mut rng));
        }
        Self { queue, rng }
    }

    fn generate_piece(rng: &mut StdRng) -> Piece {
        let kinds = [(); PIECE_BLOCKS].map(|_| {
            BlockKind::Letter(TowerLetter::ALL[rng.gen_range(0..TowerLetter::ALL.len())])
        });
        Piece::of_kinds(kinds, SPAWN_POSITION)
    }

    /// Pops the head, attaches any armed letter powers to its blocks, and
    /// refills the tail so the lookahead length stays constant.
    pub fn next_piece(&mut self, powers: &mut PieceBlockPowerManager) -> Piece {
        let mut piece = self
            .queue
            .pop_front()
            .unwrap_or_else(|| Self::generate_piece(&mut self.rng));
        for block in piece.blocks_mut() {
            if let BlockKind::Letter(letter) = block.kind {
                if let Some(power) = powers.take_armed(letter) {
                    block.power = power;
                }
            }
        }
        self.queue.push_back(Self::generate_piece(&mut self.rng));
        piece
    }

    pub fn add_medusa_piece(&mut self) {
        self.splice_special(BlockKind::Medusa);
    }

    pub fn add_midas_piece(&mut self) {
        self.splice_special(BlockKind::Midas);
    }

    fn splice_special(&mut self, kind: BlockKind) {
        self.queue
            .push_front(Piece::of_kinds([kind; PIECE_BLOCKS], SPAWN_POSITION));
        self.queue.truncate(LOOKAHEAD_PIECES);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Piece> {
        self.queue.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use shared::{BlockPower, PowerLevel};

    fn queue() -> NextPieces {
        NextPieces::new(StdRng::seed_from_u64(42))
    }

    #[test]
    fn test_lookahead_length_is_constant() {
        let mut pieces = queue();
        let mut powers = PieceBlockPowerManager::new();
        assert_eq!(pieces.len(), LOOKAHEAD_PIECES);

        for _ in 0..10 {
            pieces.next_piece(&mut powers);
            assert_eq!(pieces.len(), LOOKAHEAD_PIECES);
        }
    }

    #[test]
    fn test_generated_pieces_use_the_towers_alphabet() {
        let mut pieces = queue();
        let mut powers = PieceBlockPowerManager::new();

        for _ in 0..20 {
            let piece = pieces.next_piece(&mut powers);
            for block in piece.blocks() {
                assert!(matches!(block.kind, BlockKind::Letter(_)));
            }
            assert_eq!(piece.position(), SPAWN_POSITION);
        }
    }

    #[test]
    fn test_special_pieces_preempt_the_queue() {
        let mut pieces = queue();
        let mut powers = PieceBlockPowerManager::new();

        pieces.add_medusa_piece();
        assert_eq!(pieces.len(), LOOKAHEAD_PIECES);

        let head = pieces.next_piece(&mut powers);
        assert!(head.blocks().iter().all(|b| b.kind == BlockKind::Medusa));

        pieces.add_midas_piece();
        let head = pieces.next_piece(&mut powers);
        assert!(head.blocks().iter().all(|b| b.kind == BlockKind::Midas));
    }

    #[test]
    fn test_armed_powers_attach_at_draw_time() {
        let mut pieces = queue();
        let mut powers = PieceBlockPowerManager::new();

        // Escalate one letter until a power is armed.
        for _ in 0..shared::POWER_THRESHOLD {
            powers.record_broken(TowerLetter::T);
        }

        // Draw until a piece containing a T comes up; its T blocks must
        // carry the armed attack-minor power.
        let mut attached = false;
        for _ in 0..50 {
            let piece = pieces.next_piece(&mut powers);
            for block in piece.blocks() {
                if block.kind == BlockKind::Letter(TowerLetter::T)
                    && block.power == BlockPower::Attack(PowerLevel::Minor)
                {
                    attached = true;
                }
            }
            if attached {
                break;
            }
        }
        assert!(attached, "armed power never attached to a drawn T block");
    }
}
