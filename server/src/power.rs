//! Power accumulation and dispatch.
//!
//! Breaking blocks escalates each letter's next power along a fixed
//! progression; armed powers attach to freshly drawn blocks and come back as
//! power-bar items when those blocks break. Using an item resolves its
//! target through an injected policy and travels to the target seat over the
//! published event path, never by calling into another seat directly.

use crate::board::Board;
use crate::game_loop::{self, GameLoop};
use crate::next_pieces::NextPieces;
use crate::power_bar::PowerBar;
use crate::runtime::RuntimeCtx;
use crate::table::Table;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::Rng;
use shared::{
    BlockPower, DiamondKind, FanoutEvent, PlayerId, PowerBarItem, PowerKind, PowerLevel,
    PowerUsedPayload, TowerLetter, POWER_THRESHOLD, POWER_THRESHOLD_REDUCED,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// The fixed escalation ladder. The final stage is terminal and repeats.
pub const PROGRESSION: [(PowerKind, PowerLevel); 7] = [
    (PowerKind::Attack, PowerLevel::Minor),
    (PowerKind::Defense, PowerLevel::Minor),
    (PowerKind::Attack, PowerLevel::Normal),
    (PowerKind::Defense, PowerLevel::Normal),
    (PowerKind::Attack, PowerLevel::Mega),
    (PowerKind::Defense, PowerLevel::Mega),
    (PowerKind::Attack, PowerLevel::Berserk),
];

#[derive(Debug, Clone)]
struct LetterProgress {
    broken: u32,
    stage: usize,
    armed: Option<(PowerKind, PowerLevel)>,
}

impl LetterProgress {
    fn new() -> Self {
        Self {
            broken: 0,
            stage: 0,
            armed: None,
        }
    }
}

/// Per-seat tracker of broken-block counters and the next power each letter
/// grants. Progression is independent per letter.
#[derive(Debug, Clone)]
pub struct PieceBlockPowerManager {
    letters: HashMap<TowerLetter, LetterProgress>,
    threshold: u32,
}

impl PieceBlockPowerManager {
    pub fn new() -> Self {
        Self {
            letters: TowerLetter::ALL
                .into_iter()
                .map(|letter| (letter, LetterProgress::new()))
                .collect(),
            threshold: POWER_THRESHOLD,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Counts a broken block of the letter. Reaching the threshold arms the
    /// letter's current stage for lazy attachment and advances the ladder.
    /// Once every letter has climbed past defense-mega the threshold drops
    /// to its reduced value for good.
    pub fn record_broken(&mut self, letter: TowerLetter) {
        let threshold = self.threshold;
        if let Some(progress) = self.letters.get_mut(&letter) {
            progress.broken += 1;
            if progress.broken >= threshold {
                progress.broken = 0;
                progress.armed = Some(PROGRESSION[progress.stage]);
                if progress.stage < PROGRESSION.len() - 1 {
                    progress.stage += 1;
                }
            }
        }
        if self.threshold == POWER_THRESHOLD
            && self
                .letters
                .values()
                .all(|p| p.stage >= PROGRESSION.len() - 1)
        {
            self.threshold = POWER_THRESHOLD_REDUCED;
        }
    }

    /// Takes the armed power for a letter, if any. Called at piece draw
    /// time; the grant is consumed by the first matching block.
    pub fn take_armed(&mut self, letter: TowerLetter) -> Option<BlockPower> {
        let progress = self.letters.get_mut(&letter)?;
        let (kind, level) = progress.armed.take()?;
        Some(match kind {
            PowerKind::Attack => BlockPower::Attack(level),
            PowerKind::Defense => BlockPower::Defense(level),
        })
    }
}

impl Default for PieceBlockPowerManager {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetResolution {
    Rejected(&'static str),
    NoTargets,
    Targets(Vec<u8>),
}

/// Decides who a power lands on. Injected at construction so tests can swap
/// the whole resolution strategy instead of toggling a flag inside it.
pub trait TargetingPolicy: Send + Sync {
    fn resolve(
        &self,
        table: &Table,
        acting_seat: u8,
        kind: PowerKind,
        explicit: Option<u8>,
    ) -> TargetResolution;
}

/// Production rules: attacks need living opponents, defense dual-casts to a
/// living partner. Partner and opponent lookups are always live.
pub struct NormalTargeting {
    rng: Mutex<StdRng>,
}

impl NormalTargeting {
    pub fn new(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }
}

impl TargetingPolicy for NormalTargeting {
    fn resolve(
        &self,
        table: &Table,
        acting_seat: u8,
        kind: PowerKind,
        explicit: Option<u8>,
    ) -> TargetResolution {
        let acting_team = crate::game_teams::team_of_seat(acting_seat);
        match kind {
            PowerKind::Attack => {
                if let Some(target) = explicit {
                    let living = table.seat_is_living(target);
                    let opponent = crate::game_teams::team_of_seat(target) != acting_team;
                    if living && opponent {
                        TargetResolution::Targets(vec![target])
                    } else {
                        TargetResolution::Rejected("attack must target a living opponent")
                    }
                } else {
                    let opponents = table.living_opponent_seats(acting_team);
                    if opponents.is_empty() {
                        return TargetResolution::NoTargets;
                    }
                    let Ok(mut rng) = self.rng.lock() else {
                        return TargetResolution::NoTargets;
                    };
                    let pick = opponents[rng.gen_range(0..opponents.len())];
                    TargetResolution::Targets(vec![pick])
                }
            }
            PowerKind::Defense => {
                if let Some(target) = explicit {
                    if table.seat_is_living(target) {
                        TargetResolution::Targets(vec![target])
                    } else {
                        TargetResolution::Rejected("defense target is not in the round")
                    }
                } else {
                    let mut targets = vec![acting_seat];
                    if let Some(partner) = table.living_partner_seat(acting_seat) {
                        targets.push(partner);
                    }
                    TargetResolution::Targets(targets)
                }
            }
        }
    }
}

/// Forces every resolution back to the acting seat. Deterministic testing
/// strategy; explicit targets and team rules are ignored on purpose.
pub struct SelfTargeting;

impl TargetingPolicy for SelfTargeting {
    fn resolve(
        &self,
        _table: &Table,
        acting_seat: u8,
        _kind: PowerKind,
        _explicit: Option<u8>,
    ) -> TargetResolution {
        TargetResolution::Targets(vec![acting_seat])
    }
}

/// Consumes the acting seat's oldest power item and publishes one power-used
/// event per resolved target. Rejected or unresolvable targets leave the
/// power bar untouched.
pub fn use_power(table: &mut Table, ctx: &RuntimeCtx, player: PlayerId, explicit: Option<u8>) {
    if !game_loop::can_process_input(table, player) {
        return;
    }
    let Some(seat_number) = table.seat_number_of(player) else {
        return;
    };
    let Some(item) = table
        .seat(seat_number)
        .and_then(|s| s.power_bar.as_ref())
        .and_then(|bar| bar.peek().copied())
    else {
        return;
    };

    match ctx
        .services
        .targeting
        .resolve(table, seat_number, item.power_kind(), explicit)
    {
        TargetResolution::Rejected(reason) => {
            warn!(
                "table {}: seat {} power target rejected: {}",
                ctx.table_id, seat_number, reason
            );
        }
        TargetResolution::NoTargets => {
            debug!(
                "table {}: seat {} has no valid power target",
                ctx.table_id, seat_number
            );
        }
        TargetResolution::Targets(targets) => {
            if let Some(bar) = table
                .seat_mut(seat_number)
                .and_then(|s| s.power_bar.as_mut())
            {
                bar.pop();
            }
            for target_seat in targets {
                ctx.publish(FanoutEvent::PowerUsed(PowerUsedPayload {
                    table_id: ctx.table_id,
                    room: ctx.room.clone(),
                    source_seat: seat_number,
                    target_seat,
                    item,
                }));
            }
            ctx.publish_seat_state(table, seat_number);
        }
    }
}

/// Applies a delivered power item to the target seat's objects. Arrives via
/// the power-used loopback; missing simulation objects degrade to no-ops.
pub fn apply_power(table: &mut Table, ctx: &RuntimeCtx, target_seat: u8, item: &PowerBarItem) {
    let Table {
        seats, loops, rng, ..
    } = table;
    let Some(seat) = seats.iter_mut().find(|s| s.number == target_seat) else {
        debug!(
            "table {}: power delivery for unknown seat {}, dropped",
            ctx.table_id, target_seat
        );
        return;
    };
    let game_loop = seat.occupant.and_then(|player| loops.get_mut(&player));
    let mut args = EffectArgs {
        board: seat.board.as_mut(),
        power_bar: seat.power_bar.as_mut(),
        next_pieces: seat.next_pieces.as_mut(),
        game_loop,
        level: PowerLevel::Minor,
        rng,
    };
    ctx.services.effects.apply(item, &mut args);
}

/// Mutable view of a target seat handed to effect functions. Every field is
/// optional so a race with teardown degrades to a no-op.
pub struct EffectArgs<'a> {
    pub board: Option<&'a mut Board>,
    pub power_bar: Option<&'a mut PowerBar>,
    pub next_pieces: Option<&'a mut NextPieces>,
    pub game_loop: Option<&'a mut GameLoop>,
    pub level: PowerLevel,
    pub rng: &'a mut StdRng,
}

pub type EffectFn = fn(&mut EffectArgs);

/// Registered effect implementations keyed by (letter, attack/defense) and
/// diamond kind. Unknown combinations are logged and ignored so one bad item
/// never ends the simulation for a whole table.
pub struct PowerEffectRegistry {
    letter_effects: HashMap<(TowerLetter, PowerKind), EffectFn>,
    diamond_effects: HashMap<DiamondKind, EffectFn>,
}

impl PowerEffectRegistry {
    pub fn new() -> Self {
        Self {
            letter_effects: HashMap::new(),
            diamond_effects: HashMap::new(),
        }
    }

    pub fn with_default_effects() -> Self {
        let mut registry = Self::new();
        registry.register_letter(TowerLetter::T, PowerKind::Attack, effect_rearrange);
        registry.register_letter(TowerLetter::T, PowerKind::Defense, effect_remove_stones);
        registry.register_letter(TowerLetter::O, PowerKind::Attack, effect_add_stones);
        registry.register_letter(TowerLetter::O, PowerKind::Defense, effect_remove_powers);
        registry.register_letter(TowerLetter::W, PowerKind::Attack, effect_medusa_next);
        registry.register_letter(TowerLetter::W, PowerKind::Defense, effect_midas_next);
        registry.register_letter(TowerLetter::E, PowerKind::Attack, effect_speed_drop);
        registry.register_letter(TowerLetter::E, PowerKind::Defense, effect_steady);
        registry.register_letter(TowerLetter::R, PowerKind::Attack, effect_petrify);
        registry.register_letter(TowerLetter::R, PowerKind::Defense, effect_clear_bottom_row);
        registry.register_letter(TowerLetter::S, PowerKind::Attack, effect_strip_power_bar);
        registry.register_letter(TowerLetter::S, PowerKind::Defense, effect_settle);
        registry.register_diamond(DiamondKind::SpeedDrop, effect_speed_drop);
        registry.register_diamond(DiamondKind::RemovePowers, effect_remove_powers);
        registry.register_diamond(DiamondKind::RemoveStones, effect_remove_all_stones);
        registry
    }

    pub fn register_letter(&mut self, letter: TowerLetter, kind: PowerKind, effect: EffectFn) {
        self.letter_effects.insert((letter, kind), effect);
    }

    pub fn register_diamond(&mut self, kind: DiamondKind, effect: EffectFn) {
        self.diamond_effects.insert(kind, effect);
    }

    pub fn apply(&self, item: &PowerBarItem, args: &mut EffectArgs) {
        match item {
            PowerBarItem::Letter {
                letter,
                kind,
                level,
            } => match self.letter_effects.get(&(*letter, *kind)) {
                Some(effect) => {
                    args.level = *level;
                    effect(args);
                }
                None => warn!(
                    "no effect registered for letter power {:?}/{:?}, ignoring",
                    letter, kind
                ),
            },
            PowerBarItem::Diamond { kind } => match self.diamond_effects.get(kind) {
                Some(effect) => effect(args),
                None => warn!("no effect registered for diamond {:?}, ignoring", kind),
            },
        }
    }
}

impl Default for PowerEffectRegistry {
    fn default() -> Self {
        Self::with_default_effects()
    }
}

fn level_count(level: PowerLevel, base: u32) -> u32 {
    let multiplier = match level {
        PowerLevel::Minor => 1,
        PowerLevel::Normal => 2,
        PowerLevel::Mega => 3,
        PowerLevel::Berserk => 4,
    };
    base * multiplier
}

fn effect_rearrange(args: &mut EffectArgs) {
    if let Some(board) = args.board.as_deref_mut() {
        board.rearrange_blocks(args.level, args.rng);
    }
}

fn effect_remove_stones(args: &mut EffectArgs) {
    if let Some(board) = args.board.as_deref_mut() {
        board.remove_stones(level_count(args.level, 2));
    }
}

fn effect_remove_all_stones(args: &mut EffectArgs) {
    if let Some(board) = args.board.as_deref_mut() {
        board.remove_stones(u32::MAX);
    }
}

fn effect_add_stones(args: &mut EffectArgs) {
    if let Some(board) = args.board.as_deref_mut() {
        board.add_stones(level_count(args.level, 2), args.rng);
    }
}

fn effect_remove_powers(args: &mut EffectArgs) {
    if let Some(board) = args.board.as_deref_mut() {
        board.remove_powers();
    }
}

fn effect_medusa_next(args: &mut EffectArgs) {
    if let Some(queue) = args.next_pieces.as_deref_mut() {
        queue.add_medusa_piece();
    }
}

fn effect_midas_next(args: &mut EffectArgs) {
    if let Some(queue) = args.next_pieces.as_deref_mut() {
        queue.add_midas_piece();
    }
}

fn effect_speed_drop(args: &mut EffectArgs) {
    if let Some(game_loop) = args.game_loop.as_deref_mut() {
        game_loop.pending_special_speed_drop = true;
    }
}

fn effect_steady(args: &mut EffectArgs) {
    if let Some(game_loop) = args.game_loop.as_deref_mut() {
        game_loop.clear_speed_drop();
    }
}

fn effect_petrify(args: &mut EffectArgs) {
    if let Some(board) = args.board.as_deref_mut() {
        board.petrify_blocks(level_count(args.level, 1), args.rng);
    }
}

fn effect_clear_bottom_row(args: &mut EffectArgs) {
    if let Some(board) = args.board.as_deref_mut() {
        board.clear_bottom_row();
    }
}

fn effect_strip_power_bar(args: &mut EffectArgs) {
    if let Some(bar) = args.power_bar.as_deref_mut() {
        for _ in 0..level_count(args.level, 1) {
            if bar.pop().is_none() {
                break;
            }
        }
    }
}

fn effect_settle(args: &mut EffectArgs) {
    if let Some(board) = args.board.as_deref_mut() {
        board.apply_gravity();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_teams;
    use rand::SeedableRng;

    fn seated_table() -> Table {
        let mut table = Table::with_rng(1, false, StdRng::seed_from_u64(1));
        for (player, seat) in [(10u64, 1u8), (11, 2), (12, 3), (13, 4)] {
            table.sit(player, seat);
            table.players.get_mut(&player).unwrap().mark_playing();
            let rng = StdRng::seed_from_u64(player);
            table.seat_mut(seat).unwrap().allocate_simulation(rng);
        }
        table
    }

    #[test]
    fn test_progression_escalates_in_order() {
        let mut powers = PieceBlockPowerManager::new();

        let expected = [
            BlockPower::Attack(PowerLevel::Minor),
            BlockPower::Defense(PowerLevel::Minor),
            BlockPower::Attack(PowerLevel::Normal),
            BlockPower::Defense(PowerLevel::Normal),
            BlockPower::Attack(PowerLevel::Mega),
            BlockPower::Defense(PowerLevel::Mega),
            BlockPower::Attack(PowerLevel::Berserk),
            // Terminal stage repeats
            BlockPower::Attack(PowerLevel::Berserk),
        ];

        for stage in expected {
            for _ in 0..POWER_THRESHOLD {
                powers.record_broken(TowerLetter::W);
            }
            assert_eq!(powers.take_armed(TowerLetter::W), Some(stage));
        }
    }

    #[test]
    fn test_progression_is_independent_per_letter() {
        let mut powers = PieceBlockPowerManager::new();

        for _ in 0..POWER_THRESHOLD {
            powers.record_broken(TowerLetter::T);
        }
        for _ in 0..POWER_THRESHOLD * 2 {
            powers.record_broken(TowerLetter::S);
        }

        assert_eq!(
            powers.take_armed(TowerLetter::T),
            Some(BlockPower::Attack(PowerLevel::Minor))
        );
        // S armed twice; only the latest stage is pending
        assert_eq!(
            powers.take_armed(TowerLetter::S),
            Some(BlockPower::Defense(PowerLevel::Minor))
        );
        assert_eq!(powers.take_armed(TowerLetter::O), None);
    }

    #[test]
    fn test_armed_power_is_consumed_once() {
        let mut powers = PieceBlockPowerManager::new();
        for _ in 0..POWER_THRESHOLD {
            powers.record_broken(TowerLetter::E);
        }

        assert!(powers.take_armed(TowerLetter::E).is_some());
        assert_eq!(powers.take_armed(TowerLetter::E), None);
    }

    #[test]
    fn test_threshold_drops_once_every_letter_reaches_defense_mega() {
        let mut powers = PieceBlockPowerManager::new();
        assert_eq!(powers.threshold(), POWER_THRESHOLD);

        // Walk every letter through the whole ladder
        for letter in TowerLetter::ALL {
            for _ in 0..POWER_THRESHOLD * (PROGRESSION.len() as u32 - 1) {
                powers.record_broken(letter);
            }
        }
        assert_eq!(powers.threshold(), POWER_THRESHOLD_REDUCED);

        // Reduced threshold arms the terminal stage
        powers.take_armed(TowerLetter::T);
        for _ in 0..POWER_THRESHOLD_REDUCED {
            powers.record_broken(TowerLetter::T);
        }
        assert_eq!(
            powers.take_armed(TowerLetter::T),
            Some(BlockPower::Attack(PowerLevel::Berserk))
        );
    }

    #[test]
    fn test_random_attack_never_hits_own_team() {
        let table = seated_table();
        let policy = NormalTargeting::new(StdRng::seed_from_u64(9));

        for _ in 0..200 {
            match policy.resolve(&table, 1, PowerKind::Attack, None) {
                TargetResolution::Targets(targets) => {
                    assert_eq!(targets.len(), 1);
                    assert_ne!(game_teams::team_of_seat(targets[0]), 1);
                }
                other => panic!("unexpected resolution: {:?}", other),
            }
        }
    }

    #[test]
    fn test_explicit_attack_on_teammate_is_rejected() {
        let table = seated_table();
        let policy = NormalTargeting::new(StdRng::seed_from_u64(9));

        assert!(matches!(
            policy.resolve(&table, 1, PowerKind::Attack, Some(2)),
            TargetResolution::Rejected(_)
        ));
        assert!(matches!(
            policy.resolve(&table, 1, PowerKind::Attack, Some(3)),
            TargetResolution::Targets(_)
        ));
    }

    #[test]
    fn test_explicit_attack_on_dead_seat_is_rejected() {
        let mut table = seated_table();
        table
            .seat_mut(3)
            .unwrap()
            .board
            .as_mut()
            .unwrap()
            .mark_game_over();
        let policy = NormalTargeting::new(StdRng::seed_from_u64(9));

        assert!(matches!(
            policy.resolve(&table, 1, PowerKind::Attack, Some(3)),
            TargetResolution::Rejected(_)
        ));
    }

    #[test]
    fn test_attack_without_opponents_resolves_to_nothing() {
        let mut table = seated_table();
        for seat in [3u8, 4] {
            table
                .seat_mut(seat)
                .unwrap()
                .board
                .as_mut()
                .unwrap()
                .mark_game_over();
        }
        let policy = NormalTargeting::new(StdRng::seed_from_u64(9));

        assert_eq!(
            policy.resolve(&table, 1, PowerKind::Attack, None),
            TargetResolution::NoTargets
        );
    }

    #[test]
    fn test_defense_dual_casts_to_living_partner() {
        let mut table = seated_table();
        let policy = NormalTargeting::new(StdRng::seed_from_u64(9));

        assert_eq!(
            policy.resolve(&table, 1, PowerKind::Defense, None),
            TargetResolution::Targets(vec![1, 2])
        );

        // Partner leaves: defense falls back to self only
        table.vacate(11);
        assert_eq!(
            policy.resolve(&table, 1, PowerKind::Defense, None),
            TargetResolution::Targets(vec![1])
        );
    }

    #[test]
    fn test_explicit_defense_may_target_anyone_living() {
        let table = seated_table();
        let policy = NormalTargeting::new(StdRng::seed_from_u64(9));

        assert_eq!(
            policy.resolve(&table, 1, PowerKind::Defense, Some(4)),
            TargetResolution::Targets(vec![4])
        );
        assert!(matches!(
            policy.resolve(&table, 1, PowerKind::Defense, Some(7)),
            TargetResolution::Rejected(_)
        ));
    }

    #[test]
    fn test_self_targeting_overrides_everything() {
        let table = seated_table();
        let policy = SelfTargeting;

        for kind in [PowerKind::Attack, PowerKind::Defense] {
            for explicit in [None, Some(3), Some(2)] {
                assert_eq!(
                    policy.resolve(&table, 1, kind, explicit),
                    TargetResolution::Targets(vec![1])
                );
            }
        }
    }

    #[test]
    fn test_unknown_power_combinations_are_ignored() {
        let registry = PowerEffectRegistry::new();
        let mut rng = StdRng::seed_from_u64(2);
        let mut args = EffectArgs {
            board: None,
            power_bar: None,
            next_pieces: None,
            game_loop: None,
            level: PowerLevel::Minor,
            rng: &mut rng,
        };

        registry.apply(
            &PowerBarItem::Letter {
                letter: TowerLetter::T,
                kind: PowerKind::Attack,
                level: PowerLevel::Minor,
            },
            &mut args,
        );
        registry.apply(
            &PowerBarItem::Diamond {
                kind: DiamondKind::SpeedDrop,
            },
            &mut args,
        );
    }

    #[test]
    fn test_effects_no_op_without_simulation_objects() {
        let registry = PowerEffectRegistry::with_default_effects();
        let mut rng = StdRng::seed_from_u64(2);
        let mut args = EffectArgs {
            board: None,
            power_bar: None,
            next_pieces: None,
            game_loop: None,
            level: PowerLevel::Mega,
            rng: &mut rng,
        };

        for letter in TowerLetter::ALL {
            for kind in [PowerKind::Attack, PowerKind::Defense] {
                registry.apply(
                    &PowerBarItem::Letter {
                        letter,
                        kind,
                        level: PowerLevel::Mega,
                    },
                    &mut args,
                );
            }
        }
    }

    #[test]
    fn test_remove_stones_diamond_clears_the_board() {
        let registry = PowerEffectRegistry::with_default_effects();
        let mut board = Board::new();
        let mut board_rng = StdRng::seed_from_u64(3);
        board.add_stones(5, &mut board_rng);

        let mut rng = StdRng::seed_from_u64(4);
        let mut args = EffectArgs {
            board: Some(&mut board),
            power_bar: None,
            next_pieces: None,
            game_loop: None,
            level: PowerLevel::Minor,
            rng: &mut rng,
        };
        registry.apply(
            &PowerBarItem::Diamond {
                kind: DiamondKind::RemoveStones,
            },
            &mut args,
        );
        drop(args);

        assert_eq!(board.total_visible_blocks(), 0);
    }

    #[test]
    fn test_strip_power_bar_effect_pops_items() {
        let registry = PowerEffectRegistry::with_default_effects();
        let mut bar = PowerBar::new();
        for _ in 0..3 {
            bar.push(PowerBarItem::Diamond {
                kind: DiamondKind::SpeedDrop,
            });
        }

        let mut rng = StdRng::seed_from_u64(4);
        let mut args = EffectArgs {
            board: None,
            power_bar: Some(&mut bar),
            next_pieces: None,
            game_loop: None,
            level: PowerLevel::Minor,
            rng: &mut rng,
        };
        registry.apply(
            &PowerBarItem::Letter {
                letter: TowerLetter::S,
                kind: PowerKind::Attack,
                level: PowerLevel::Normal,
            },
            &mut args,
        );
        drop(args);

        // Normal level strips two items
        assert_eq!(bar.len(), 1);
    }
}
