//! Elo-style rating for an arbitrary number of teams.
//!
//! Winning teams share placement 1; losing teams are ranked by descending
//! average rating. Every member of a team receives the same rounded delta.

use shared::PlayerId;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub struct TeamStanding {
    pub team: u8,
    pub players: Vec<PlayerId>,
    pub ratings: Vec<i32>,
    pub placement: u32,
}

impl TeamStanding {
    pub fn average_rating(&self) -> f64 {
        if self.ratings.is_empty() {
            return 0.0;
        }
        self.ratings.iter().map(|&r| f64::from(r)).sum::<f64>() / self.ratings.len() as f64
    }
}

/// Builds placements from end-of-round team rosters and the set of winning
/// teams. Losers are placed 2..k in order of descending average rating.
pub fn standings(
    teams: &BTreeMap<u8, Vec<(PlayerId, i32)>>,
    winning_teams: &HashSet<u8>,
) -> Vec<TeamStanding> {
    let mut result: Vec<TeamStanding> = teams
        .iter()
        .map(|(&team, members)| TeamStanding {
            team,
            players: members.iter().map(|&(id, _)| id).collect(),
            ratings: members.iter().map(|&(_, rating)| rating).collect(),
            placement: 0,
        })
        .collect();

    for standing in result.iter_mut().filter(|s| winning_teams.contains(&s.team)) {
        standing.placement = 1;
    }

    let mut losers: Vec<usize> = result
        .iter()
        .enumerate()
        .filter(|(_, s)| !winning_teams.contains(&s.team))
        .map(|(index, _)| index)
        .collect();
    losers.sort_by(|&a, &b| {
        result[b]
            .average_rating()
            .partial_cmp(&result[a].average_rating())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for (rank, index) in losers.into_iter().enumerate() {
        result[index].placement = 2 + rank as u32;
    }

    result
}

/// Per-team rating delta. The classic pairwise expected score is summed
/// against every other team; actual score is 1/0/0.5 by placement order.
pub fn rate_teams(standings: &[TeamStanding], k: f64) -> Vec<i32> {
    standings
        .iter()
        .map(|standing| {
            let mut expected = 0.0;
            let mut actual = 0.0;
            for other in standings {
                if other.team == standing.team {
                    continue;
                }
                let diff = other.average_rating() - standing.average_rating();
                expected += 1.0 / (1.0 + 10f64.powf(diff / 400.0));
                actual += match standing.placement.cmp(&other.placement) {
                    std::cmp::Ordering::Less => 1.0,
                    std::cmp::Ordering::Greater => 0.0,
                    std::cmp::Ordering::Equal => 0.5,
                };
            }
            (k * (actual - expected)).round() as i32
        })
        .collect()
}
