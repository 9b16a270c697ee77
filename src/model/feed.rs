use rocket::tokio::sync::broadcast::{self, Receiver, Sender};

use crate::model::mongodb::Id;

/// A mutation that downstream viewers may need to react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// A vote was cast or changed in the given election.
    Votes { election_id: Id },
    /// The election/position/candidate catalog changed.
    Catalog { election_id: Id },
    /// Participant roles or membership changed.
    Participants,
}

impl Change {
    /// Does this change invalidate the tally of the given election?
    pub fn touches_election(&self, election_id: Id) -> bool {
        match self {
            Self::Votes { election_id: id } | Self::Catalog { election_id: id } => {
                *id == election_id
            }
            Self::Participants => false,
        }
    }
}

/// Broadcast feed of changes, kept in managed state. Publishers are the
/// mutating routes; subscribers are live-results streams. Delivery to slow
/// or disconnected subscribers is the subscriber's problem, per broadcast
/// channel semantics.
#[derive(Debug)]
pub struct ChangeFeed {
    sender: Sender<Change>,
}

impl ChangeFeed {
    const CAPACITY: usize = 1024;

    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(Self::CAPACITY);
        Self { sender }
    }

    /// Announce a change. Having no subscribers is not an error.
    pub fn publish(&self, change: Change) {
        let _ = self.sender.send(change);
    }

    pub fn subscribe(&self) -> Receiver<Change> {
        self.sender.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rocket::async_test]
    async fn published_changes_reach_subscribers() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe();

        let election_id = Id::new();
        feed.publish(Change::Votes { election_id });
        assert_eq!(rx.recv().await.unwrap(), Change::Votes { election_id });
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let feed = ChangeFeed::new();
        feed.publish(Change::Participants);
    }

    #[test]
    fn change_election_filter() {
        let election_id = Id::new();
        assert!(Change::Votes { election_id }.touches_election(election_id));
        assert!(Change::Catalog { election_id }.touches_election(election_id));
        assert!(!Change::Votes { election_id }.touches_election(Id::new()));
        assert!(!Change::Participants.touches_election(election_id));
    }
}
