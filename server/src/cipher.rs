//! Hero-code reward minigame: encrypted phrases for top winners and a
//! per-user drip of cipher key pairs for everyone trying to crack them.
//!
//! The substitution map is involutive (each character maps to its partner in
//! both directions), so one table serves encryption and decryption alike.
//! Spaces pass through untouched.

use rand::rngs::StdRng;
use rand::Rng;
use shared::PlayerId;
use std::collections::HashMap;

/// Involutive substitution pairs over letters and digits. Letters pair up
/// half an alphabet apart, digits half a decade apart, so applying the map
/// twice is the identity.
const SUBSTITUTION_PAIRS: [(char, char); 18] = [
    ('A', 'N'),
    ('B', 'O'),
    ('C', 'P'),
    ('D', 'Q'),
    ('E', 'R'),
    ('F', 'S'),
    ('G', 'T'),
    ('H', 'U'),
    ('I', 'V'),
    ('J', 'W'),
    ('K', 'X'),
    ('L', 'Y'),
    ('M', 'Z'),
    ('0', '5'),
    ('1', '6'),
    ('2', '7'),
    ('3', '8'),
    ('4', '9'),
];

const ADJECTIVES: [&str; 8] = [
    "MIGHTY", "SILENT", "GOLDEN", "SWIFT", "CLEVER", "FEARLESS", "ANCIENT", "BRIGHT",
];
const NOUNS: [&str; 8] = [
    "TOWER", "KNIGHT", "DRAGON", "WIZARD", "GIANT", "FALCON", "CASTLE", "TITAN",
];
const VERBS: [&str; 8] = [
    "GUARDS", "CONQUERS", "DEFENDS", "TOPPLES", "RAISES", "SHATTERS", "CLAIMS", "HOLDS",
];
const ADVERBS: [&str; 8] = [
    "BRAVELY", "SWIFTLY", "PROUDLY", "QUIETLY", "FIERCELY", "WISELY", "BOLDLY", "TRULY",
];

fn substitute(ch: char) -> char {
    for &(a, b) in &SUBSTITUTION_PAIRS {
        if ch == a {
            return b;
        }
        if ch == b {
            return a;
        }
    }
    ch
}

/// Applies the substitution map to an uppercased phrase. Involutive: calling
/// this on its own output returns the input.
pub fn transcode(text: &str) -> String {
    text.to_uppercase().chars().map(substitute).collect()
}

#[derive(Debug)]
pub struct CipherHeroManager {
    codes: HashMap<PlayerId, String>,
    granted_keys: HashMap<PlayerId, usize>,
    rng: StdRng,
}

impl CipherHeroManager {
    pub fn new(rng: StdRng) -> Self {
        Self {
            codes: HashMap::new(),
            granted_keys: HashMap::new(),
            rng,
        }
    }

    fn build_phrase(&mut self) -> String {
        let adjective = ADJECTIVES[self.rng.gen_range(0..ADJECTIVES.len())];
        let noun = NOUNS[self.rng.gen_range(0..NOUNS.len())];
        let verb = VERBS[self.rng.gen_range(0..VERBS.len())];
        let adverb = ADVERBS[self.rng.gen_range(0..ADVERBS.len())];
        format!("THE {} {} {} {}", adjective, noun, verb, adverb)
    }

    /// Issues a fresh encrypted phrase for the user and remembers it.
    /// Returns the ciphertext handed out in the reward message.
    pub fn generate_hero_code(&mut self, user: PlayerId) -> String {
        let phrase = self.build_phrase();
        let ciphertext = transcode(&phrase);
        self.codes.insert(user, ciphertext.clone());
        ciphertext
    }

    /// Case-insensitive substring check of the guess against the decrypted
    /// stored phrase. A guess wrapping the phrase in extra words still counts.
    pub fn guess_matches_hero_code(&self, user: PlayerId, guess: &str) -> bool {
        let Some(ciphertext) = self.codes.get(&user) else {
            return false;
        };
        let plaintext = transcode(ciphertext);
        guess.to_uppercase().contains(&plaintext)
    }

    /// Grants the user's next unseen (plain, cipher) pair from the fixed
    /// map, or `None` once every pair has been handed out.
    pub fn cipher_key(&mut self, user: PlayerId) -> Option<(char, char)> {
        let granted = self.granted_keys.entry(user).or_insert(0);
        let pair = SUBSTITUTION_PAIRS.get(*granted).copied()?;
        *granted += 1;
        Some(pair)
    }
}
