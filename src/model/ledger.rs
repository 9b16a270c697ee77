use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    candidate::Candidate,
    election::{Election, ElectionState},
    mongodb::Id,
    participant::Participant,
    position::Position,
    vote::{NewVote, Vote, VoteCore, VoteOutcome},
};

/// The storage operations the vote ledger needs from its backing store.
///
/// `insert_vote` is the one operation with a cross-request ordering
/// requirement: it must be an atomic conditional insert that fails with
/// [`Error::VoteConflict`] when a row for the same `(voter_id, position_id)`
/// already exists. The MongoDB binding backs this with a unique index;
/// find-then-insert at the application level is never sufficient on its own.
#[rocket::async_trait]
pub trait LedgerStore {
    async fn candidate(&self, id: Id) -> Result<Option<Candidate>>;
    async fn position(&self, id: Id) -> Result<Option<Position>>;
    async fn election(&self, id: Id) -> Result<Option<Election>>;
    async fn participant(&self, id: Id) -> Result<Option<Participant>>;
    async fn find_vote(&self, voter_id: Id, position_id: Id) -> Result<Option<Vote>>;
    async fn insert_vote(&self, vote: &NewVote) -> Result<Id>;
    /// Reassign an existing vote row to a different candidate, in place.
    /// Row identity and creation time are preserved.
    async fn reassign_vote(&self, vote_id: Id, candidate_id: Id) -> Result<()>;
}

/// The result of a successful cast-or-change call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub outcome: VoteOutcome,
    pub election_id: Id,
    pub position_id: Id,
    pub candidate_id: Id,
}

/// Cast a vote, or change an existing one, for the position the candidate
/// stands for.
///
/// Preconditions run in order, cheapest first, and each failure is a distinct
/// error so callers can give precise feedback. A storage-detected write race
/// is retried transparently exactly once: the loser of the race re-runs the
/// protocol, finds the winner's row, and lands in the change/unchanged branch.
pub async fn cast_or_change_vote<S>(
    store: &S,
    voter_id: Id,
    candidate_id: Id,
    now: DateTime<Utc>,
) -> Result<VoteReceipt>
where
    S: LedgerStore + Sync,
{
    match attempt(store, voter_id, candidate_id, now).await {
        Err(Error::VoteConflict) => {
            info!("Vote write race for voter {voter_id}, retrying once");
            attempt(store, voter_id, candidate_id, now).await
        }
        other => other,
    }
}

async fn attempt<S>(
    store: &S,
    voter_id: Id,
    candidate_id: Id,
    now: DateTime<Utc>,
) -> Result<VoteReceipt>
where
    S: LedgerStore + Sync,
{
    // Resolve the candidate and its position.
    let candidate = store
        .candidate(candidate_id)
        .await?
        .ok_or(Error::UnknownCandidate(candidate_id))?;
    let position = store
        .position(candidate.position_id)
        .await?
        .ok_or(Error::InconsistentCatalog {
            candidate: candidate_id,
        })?;

    // The candidate's election must be the position's election.
    if candidate.election_id != position.election_id {
        warn!(
            "Catalog corruption: candidate {} claims election {} but position {} belongs to {}",
            candidate_id, candidate.election_id, position.id, position.election_id
        );
        return Err(Error::InconsistentCatalog {
            candidate: candidate_id,
        });
    }

    // The election must exist and its voting window must be open right now.
    let election = store
        .election(position.election_id)
        .await?
        .ok_or(Error::UnknownElection(position.election_id))?;
    match election.state_at(now) {
        ElectionState::Active => {}
        state => return Err(Error::VotingNotOpen(state)),
    }

    // The voter must exist and be an approved voter.
    let voter = store
        .participant(voter_id)
        .await?
        .ok_or(Error::UnknownParticipant(voter_id))?;
    if !voter.can_vote() {
        return Err(Error::VoterNotEligible(voter_id));
    }

    // One row per (voter, position): create, reassign, or leave alone.
    let outcome = match store.find_vote(voter_id, position.id).await? {
        None => {
            let vote = VoteCore::new(voter_id, &candidate, now);
            store.insert_vote(&vote).await?;
            VoteOutcome::Cast
        }
        Some(existing) if existing.candidate_id == candidate_id => VoteOutcome::Unchanged,
        Some(existing) => {
            store.reassign_vote(existing.id, candidate_id).await?;
            VoteOutcome::Changed
        }
    };

    Ok(VoteReceipt {
        outcome,
        election_id: election.id,
        position_id: position.id,
        candidate_id,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use chrono::Duration;

    use super::*;
    use crate::model::participant::Role;

    /// An in-memory ledger store with the same conditional-insert contract
    /// as the MongoDB binding.
    #[derive(Default)]
    struct MemoryStore {
        elections: HashMap<Id, Election>,
        positions: HashMap<Id, Position>,
        candidates: HashMap<Id, Candidate>,
        participants: HashMap<Id, Participant>,
        votes: Mutex<Vec<Vote>>,
    }

    impl MemoryStore {
        fn vote_rows(&self, voter_id: Id, position_id: Id) -> Vec<Vote> {
            self.votes
                .lock()
                .unwrap()
                .iter()
                .filter(|v| v.voter_id == voter_id && v.position_id == position_id)
                .cloned()
                .collect()
        }
    }

    #[rocket::async_trait]
    impl LedgerStore for MemoryStore {
        async fn candidate(&self, id: Id) -> Result<Option<Candidate>> {
            Ok(self.candidates.get(&id).cloned())
        }

        async fn position(&self, id: Id) -> Result<Option<Position>> {
            Ok(self.positions.get(&id).cloned())
        }

        async fn election(&self, id: Id) -> Result<Option<Election>> {
            Ok(self.elections.get(&id).cloned())
        }

        async fn participant(&self, id: Id) -> Result<Option<Participant>> {
            Ok(self.participants.get(&id).cloned())
        }

        async fn find_vote(&self, voter_id: Id, position_id: Id) -> Result<Option<Vote>> {
            Ok(self
                .votes
                .lock()
                .unwrap()
                .iter()
                .find(|v| v.voter_id == voter_id && v.position_id == position_id)
                .cloned())
        }

        async fn insert_vote(&self, vote: &NewVote) -> Result<Id> {
            let mut votes = self.votes.lock().unwrap();
            if votes
                .iter()
                .any(|v| v.voter_id == vote.voter_id && v.position_id == vote.position_id)
            {
                return Err(Error::VoteConflict);
            }
            let id = Id::new();
            votes.push(Vote {
                id,
                vote: vote.clone(),
            });
            Ok(id)
        }

        async fn reassign_vote(&self, vote_id: Id, candidate_id: Id) -> Result<()> {
            let mut votes = self.votes.lock().unwrap();
            let vote = votes
                .iter_mut()
                .find(|v| v.id == vote_id)
                .expect("reassigning a vote that does not exist");
            vote.candidate_id = candidate_id;
            Ok(())
        }
    }

    /// A store fixture: one election with one position and two candidates,
    /// plus an approved voter.
    struct Fixture {
        store: MemoryStore,
        election: Election,
        position: Position,
        first: Candidate,
        second: Candidate,
        voter_id: Id,
    }

    impl Fixture {
        fn new() -> Self {
            let election = Election::example();
            let position = Position::example(election.id);
            let first = Candidate::example(&position);
            let mut second = Candidate::example(&position);
            second.id = Id::new();
            second.name = "Sam Jones".to_string();

            let mut voter = Participant::example();
            voter.set_role(Role::Voter, election.start_time - Duration::days(1));

            let mut store = MemoryStore::default();
            store.elections.insert(election.id, election.clone());
            store.positions.insert(position.id, position.clone());
            store.candidates.insert(first.id, first.clone());
            store.candidates.insert(second.id, second.clone());
            let voter_id = voter.id;
            store.participants.insert(voter.id, voter);

            Self {
                store,
                election,
                position,
                first,
                second,
                voter_id,
            }
        }

        fn mid_window(&self) -> DateTime<Utc> {
            self.election.start_time + Duration::minutes(30)
        }
    }

    #[rocket::async_test]
    async fn cast_change_and_window_scenario() {
        let fx = Fixture::new();
        let too_early = fx.election.start_time - Duration::minutes(1);
        let too_late = fx.election.end_time + Duration::minutes(1);

        // Before the window opens.
        let err = cast_or_change_vote(&fx.store, fx.voter_id, fx.first.id, too_early)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::VotingNotOpen(ElectionState::Upcoming)));

        // First cast.
        let receipt = cast_or_change_vote(&fx.store, fx.voter_id, fx.first.id, fx.mid_window())
            .await
            .unwrap();
        assert_eq!(receipt.outcome, VoteOutcome::Cast);
        assert_eq!(receipt.election_id, fx.election.id);
        assert_eq!(receipt.position_id, fx.position.id);

        // Same candidate again: idempotent.
        let receipt = cast_or_change_vote(&fx.store, fx.voter_id, fx.first.id, fx.mid_window())
            .await
            .unwrap();
        assert_eq!(receipt.outcome, VoteOutcome::Unchanged);

        // Change of heart: reassigned in place.
        let receipt = cast_or_change_vote(&fx.store, fx.voter_id, fx.second.id, fx.mid_window())
            .await
            .unwrap();
        assert_eq!(receipt.outcome, VoteOutcome::Changed);
        let rows = fx.store.vote_rows(fx.voter_id, fx.position.id);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].candidate_id, fx.second.id);

        // After the window closes.
        let err = cast_or_change_vote(&fx.store, fx.voter_id, fx.first.id, too_late)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::VotingNotOpen(ElectionState::Ended)));

        // The closed window did not disturb the existing row.
        let rows = fx.store.vote_rows(fx.voter_id, fx.position.id);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].candidate_id, fx.second.id);
    }

    #[rocket::async_test]
    async fn change_preserves_row_identity_and_creation_time() {
        let fx = Fixture::new();
        cast_or_change_vote(&fx.store, fx.voter_id, fx.first.id, fx.mid_window())
            .await
            .unwrap();
        let before = fx.store.vote_rows(fx.voter_id, fx.position.id)[0].clone();

        cast_or_change_vote(
            &fx.store,
            fx.voter_id,
            fx.second.id,
            fx.mid_window() + Duration::minutes(1),
        )
        .await
        .unwrap();
        let after = fx.store.vote_rows(fx.voter_id, fx.position.id)[0].clone();

        assert_eq!(after.id, before.id);
        assert_eq!(after.creation_time, before.creation_time);
        assert_eq!(after.candidate_id, fx.second.id);
    }

    #[rocket::async_test]
    async fn unknown_references_are_rejected() {
        let fx = Fixture::new();
        let now = fx.mid_window();

        let err = cast_or_change_vote(&fx.store, fx.voter_id, Id::new(), now)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownCandidate(_)));

        let err = cast_or_change_vote(&fx.store, Id::new(), fx.first.id, now)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownParticipant(_)));
    }

    #[rocket::async_test]
    async fn catalog_inconsistency_is_rejected() {
        let mut fx = Fixture::new();
        // Corrupt the candidate's denormalised election reference.
        fx.store
            .candidates
            .get_mut(&fx.first.id)
            .unwrap()
            .election_id = Id::new();

        let err = cast_or_change_vote(&fx.store, fx.voter_id, fx.first.id, fx.mid_window())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InconsistentCatalog { candidate } if candidate == fx.first.id));
        assert!(fx.store.vote_rows(fx.voter_id, fx.position.id).is_empty());
    }

    #[rocket::async_test]
    async fn ineligible_participants_cannot_vote() {
        let mut fx = Fixture::new();
        let now = fx.mid_window();

        // Pending participant.
        let pending = Participant::example();
        let pending_id = pending.id;
        fx.store.participants.insert(pending_id, pending);
        let err = cast_or_change_vote(&fx.store, pending_id, fx.first.id, now)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::VoterNotEligible(_)));

        // Voter role without an approval timestamp: still ineligible.
        let mut unapproved = Participant::example();
        unapproved.id = Id::new();
        unapproved.role = Role::Voter;
        unapproved.approved_at = None;
        let unapproved_id = unapproved.id;
        fx.store.participants.insert(unapproved_id, unapproved);
        let err = cast_or_change_vote(&fx.store, unapproved_id, fx.first.id, now)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::VoterNotEligible(_)));
    }

    #[rocket::async_test]
    async fn one_vote_per_position_not_per_election() {
        let mut fx = Fixture::new();
        // A second position in the same election, with its own candidate.
        let other_position = Position::example(fx.election.id);
        let other_candidate = Candidate::example(&other_position);
        fx.store
            .positions
            .insert(other_position.id, other_position.clone());
        fx.store
            .candidates
            .insert(other_candidate.id, other_candidate.clone());

        let now = fx.mid_window();
        let first = cast_or_change_vote(&fx.store, fx.voter_id, fx.first.id, now)
            .await
            .unwrap();
        let second = cast_or_change_vote(&fx.store, fx.voter_id, other_candidate.id, now)
            .await
            .unwrap();
        assert_eq!(first.outcome, VoteOutcome::Cast);
        assert_eq!(second.outcome, VoteOutcome::Cast);
        assert_eq!(fx.store.vote_rows(fx.voter_id, fx.position.id).len(), 1);
        assert_eq!(
            fx.store.vote_rows(fx.voter_id, other_position.id).len(),
            1
        );
    }

    /// Wraps a [`MemoryStore`] and makes a rival vote win the race just
    /// before the first insert, so the insert hits the uniqueness conflict.
    struct RacingStore {
        inner: MemoryStore,
        rival_candidate: Id,
        raced: AtomicBool,
    }

    #[rocket::async_trait]
    impl LedgerStore for RacingStore {
        async fn candidate(&self, id: Id) -> Result<Option<Candidate>> {
            self.inner.candidate(id).await
        }

        async fn position(&self, id: Id) -> Result<Option<Position>> {
            self.inner.position(id).await
        }

        async fn election(&self, id: Id) -> Result<Option<Election>> {
            self.inner.election(id).await
        }

        async fn participant(&self, id: Id) -> Result<Option<Participant>> {
            self.inner.participant(id).await
        }

        async fn find_vote(&self, voter_id: Id, position_id: Id) -> Result<Option<Vote>> {
            self.inner.find_vote(voter_id, position_id).await
        }

        async fn insert_vote(&self, vote: &NewVote) -> Result<Id> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                let rival_candidate = self
                    .inner
                    .candidate(self.rival_candidate)
                    .await?
                    .unwrap();
                let rival = VoteCore::new(vote.voter_id, &rival_candidate, vote.creation_time);
                self.inner.insert_vote(&rival).await?;
            }
            self.inner.insert_vote(vote).await
        }

        async fn reassign_vote(&self, vote_id: Id, candidate_id: Id) -> Result<()> {
            self.inner.reassign_vote(vote_id, candidate_id).await
        }
    }

    #[rocket::async_test]
    async fn write_race_is_retried_and_leaves_one_row() {
        let fx = Fixture::new();
        let voter_id = fx.voter_id;
        let position_id = fx.position.id;
        let first = fx.first.id;
        let second = fx.second.id;
        let now = fx.mid_window();
        let store = RacingStore {
            inner: fx.store,
            rival_candidate: second,
            raced: AtomicBool::new(false),
        };

        // Our insert loses the race to the rival; the retry finds the
        // rival's row and reassigns it.
        let receipt = cast_or_change_vote(&store, voter_id, first, now)
            .await
            .unwrap();
        assert_eq!(receipt.outcome, VoteOutcome::Changed);

        let rows = store.inner.vote_rows(voter_id, position_id);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].candidate_id, first);
    }
}
