use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{candidate::Candidate, mongodb::Id, vote::Vote};

/// One candidate's line in the tally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTally {
    pub candidate_id: Id,
    pub name: String,
    pub party: String,
    pub position_id: Id,
    pub votes: u64,
    /// Share of the election's total votes; `0.0` when nobody has voted,
    /// never NaN.
    pub percentage: f64,
}

/// The aggregated results of an election.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectionResults {
    pub election_id: Id,
    pub total_votes: u64,
    /// Candidates ordered by vote count descending, ties broken by
    /// candidate ID so recomputation never reshuffles equals.
    pub candidates: Vec<CandidateTally>,
    /// The front-runner, absent while every count is zero.
    pub leader: Option<Id>,
}

/// Recompute the full tally from the raw vote rows.
///
/// Always a from-scratch recomputation: vote volumes are modest and a
/// rebuild cannot drift from the ledger the way an incrementally patched
/// count could. Votes referencing candidates outside the slate (e.g. rows
/// surviving an out-of-band catalog edit) are ignored rather than invented
/// into the totals.
pub fn tally(election_id: Id, candidates: &[Candidate], votes: &[Vote]) -> ElectionResults {
    let mut counts: HashMap<Id, u64> = HashMap::new();
    for candidate in candidates {
        counts.insert(candidate.id, 0);
    }
    for vote in votes {
        if let Some(count) = counts.get_mut(&vote.candidate_id) {
            *count += 1;
        }
    }
    let total_votes: u64 = counts.values().sum();

    let mut tallies: Vec<CandidateTally> = candidates
        .iter()
        .map(|candidate| {
            let votes = counts[&candidate.id];
            let percentage = if total_votes > 0 {
                votes as f64 / total_votes as f64 * 100.0
            } else {
                0.0
            };
            CandidateTally {
                candidate_id: candidate.id,
                name: candidate.name.clone(),
                party: candidate.party.clone(),
                position_id: candidate.position_id,
                votes,
                percentage,
            }
        })
        .collect();
    tallies.sort_by(|a, b| {
        b.votes
            .cmp(&a.votes)
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    });

    let leader = tallies
        .first()
        .filter(|t| t.votes > 0)
        .map(|t| t.candidate_id);

    ElectionResults {
        election_id,
        total_votes,
        candidates: tallies,
        leader,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::{election::Election, position::Position, vote::VoteCore};

    fn slate(n: usize) -> (Election, Position, Vec<Candidate>) {
        let election = Election::example();
        let position = Position::example(election.id);
        let candidates = (0..n)
            .map(|i| {
                let mut candidate = Candidate::example(&position);
                candidate.id = Id::new();
                candidate.name = format!("Candidate {i}");
                candidate
            })
            .collect();
        (election, position, candidates)
    }

    fn vote_for(candidate: &Candidate) -> Vote {
        Vote {
            id: Id::new(),
            vote: VoteCore::new(Id::new(), candidate, Utc::now()),
        }
    }

    #[test]
    fn empty_tally_has_no_leader_and_no_nan() {
        let (election, _, candidates) = slate(3);
        let results = tally(election.id, &candidates, &[]);

        assert_eq!(results.total_votes, 0);
        assert_eq!(results.leader, None);
        assert_eq!(results.candidates.len(), 3);
        for line in &results.candidates {
            assert_eq!(line.votes, 0);
            assert_eq!(line.percentage, 0.0);
        }
    }

    #[test]
    fn counts_percentages_and_leader() {
        let (election, _, candidates) = slate(3);
        let mut votes = Vec::new();
        for _ in 0..3 {
            votes.push(vote_for(&candidates[1]));
        }
        votes.push(vote_for(&candidates[0]));

        let results = tally(election.id, &candidates, &votes);
        assert_eq!(results.total_votes, 4);
        assert_eq!(results.leader, Some(candidates[1].id));

        // Ordered by count descending.
        assert_eq!(results.candidates[0].candidate_id, candidates[1].id);
        assert_eq!(results.candidates[0].votes, 3);
        assert_eq!(results.candidates[0].percentage, 75.0);
        assert_eq!(results.candidates[1].votes, 1);
        assert_eq!(results.candidates[1].percentage, 25.0);
        assert_eq!(results.candidates[2].votes, 0);
        assert_eq!(results.candidates[2].percentage, 0.0);

        let sum: f64 = results.candidates.iter().map(|c| c.percentage).sum();
        assert!((sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn ties_are_broken_stably_by_candidate_id() {
        let (election, _, candidates) = slate(4);
        let votes: Vec<Vote> = candidates.iter().map(vote_for).collect();

        let first = tally(election.id, &candidates, &votes);
        let leader = first.leader.unwrap();
        let expected = candidates.iter().map(|c| c.id).min().unwrap();
        assert_eq!(leader, expected);

        // Recomputation with the slate in a different order changes nothing.
        let mut shuffled = candidates.clone();
        shuffled.reverse();
        let second = tally(election.id, &shuffled, &votes);
        assert_eq!(second, first);
    }

    #[test]
    fn votes_for_unknown_candidates_are_ignored() {
        let (election, position, candidates) = slate(2);
        let stranger = Candidate::example(&position);
        let votes = vec![vote_for(&candidates[0]), vote_for(&stranger)];

        let results = tally(election.id, &candidates, &votes);
        assert_eq!(results.total_votes, 1);
        assert_eq!(results.leader, Some(candidates[0].id));
    }
}
