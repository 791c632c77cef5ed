use dashmap::DashMap;
use std::collections::HashSet;
use std::net::IpAddr;

/// A (connection, user, UDP endpoint) tuple registered for a board's pushes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscriber {
    pub connection_id: String,
    pub user_id: String,
    pub address: IpAddr,
    pub port: u16,
}

impl Subscriber {
    pub fn new(
        connection_id: impl Into<String>,
        user_id: impl Into<String>,
        address: IpAddr,
        port: u16,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            user_id: user_id.into(),
            address,
            port,
        }
    }
}

/// Board subscriptions, indexed two ways.
///
/// `by_board` drives fanout. `by_connection` remembers which buckets each
/// connection sits in so teardown removes them without scanning every board.
/// A subscriber is in a board bucket iff the matching `(board, subscriber)`
/// pair is in its connection's entry. Empty buckets are dropped.
///
/// Never hold a guard into one map while touching the same key's shard again;
/// every method below releases its guard before calling `remove_if`.
pub struct SubscriptionRegistry {
    by_board: DashMap<String, HashSet<Subscriber>>,
    by_connection: DashMap<String, HashSet<(String, Subscriber)>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            by_board: DashMap::new(),
            by_connection: DashMap::new(),
        }
    }

    /// Idempotent. Returns true if the subscription was new.
    pub fn subscribe(&self, board_id: &str, sub: Subscriber) -> bool {
        let added = self
            .by_board
            .entry(board_id.to_string())
            .or_default()
            .insert(sub.clone());
        self.by_connection
            .entry(sub.connection_id.clone())
            .or_default()
            .insert((board_id.to_string(), sub));
        added
    }

    /// Removes exactly `sub` from `board_id`. Returns true if it was present.
    pub fn unsubscribe(&self, board_id: &str, sub: &Subscriber) -> bool {
        let removed = match self.by_board.get_mut(board_id) {
            Some(mut bucket) => bucket.remove(sub),
            None => false,
        };
        self.by_board.remove_if(board_id, |_, bucket| bucket.is_empty());

        let key = (board_id.to_string(), sub.clone());
        if let Some(mut entries) = self.by_connection.get_mut(&sub.connection_id) {
            entries.remove(&key);
        }
        self.by_connection
            .remove_if(&sub.connection_id, |_, entries| entries.is_empty());
        removed
    }

    /// Removes every subscription `connection_id` holds on `board_id`,
    /// whatever endpoint it was registered with.
    pub fn unsubscribe_connection_from_board(&self, board_id: &str, connection_id: &str) -> usize {
        let targets: Vec<Subscriber> = match self.by_connection.get(connection_id) {
            Some(entries) => entries
                .iter()
                .filter(|(b, _)| b == board_id)
                .map(|(_, s)| s.clone())
                .collect(),
            None => return 0,
        };
        targets
            .iter()
            .filter(|sub| self.unsubscribe(board_id, sub))
            .count()
    }

    /// Drops every subscription held by `connection_id`. Returns how many
    /// board subscriptions were removed.
    pub fn unsubscribe_all_for_connection(&self, connection_id: &str) -> usize {
        let Some((_, entries)) = self.by_connection.remove(connection_id) else {
            return 0;
        };
        for (board_id, sub) in &entries {
            if let Some(mut bucket) = self.by_board.get_mut(board_id) {
                bucket.remove(sub);
            }
            self.by_board
                .remove_if(board_id, |_, bucket| bucket.is_empty());
        }
        entries.len()
    }

    /// Point-in-time copy of a board's subscribers.
    pub fn subscribers_for_board(&self, board_id: &str) -> Vec<Subscriber> {
        self.by_board
            .get(board_id)
            .map(|bucket| bucket.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Boards `connection_id` is currently subscribed to.
    pub fn boards_for_connection(&self, connection_id: &str) -> Vec<String> {
        let mut boards: Vec<String> = self
            .by_connection
            .get(connection_id)
            .map(|entries| entries.iter().map(|(b, _)| b.clone()).collect())
            .unwrap_or_default();
        boards.sort();
        boards.dedup();
        boards
    }

    /// Boards with at least one subscriber.
    pub fn board_count(&self) -> usize {
        self.by_board.len()
    }

    /// Connections with at least one subscription.
    pub fn connection_count(&self) -> usize {
        self.by_connection.len()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
