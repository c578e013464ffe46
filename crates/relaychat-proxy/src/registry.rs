//! Downstream servers connected to the proxy and the players they host.

use std::collections::{BTreeMap, HashMap};

use relaychat_protocol::{PlayerPresence, RosterEntry, ServerHello, ServerId};
use relaychat_transport::ConnectionId;
use tokio::sync::mpsc;

/// Outbound frame queue of one downstream connection.
pub type DownstreamSender = mpsc::UnboundedSender<Vec<u8>>;

/// A roster entry tagged with when the proxy last heard about it.
#[derive(Debug, Clone)]
struct Seen {
    entry: RosterEntry,
    seq: u64,
}

#[derive(Debug)]
struct Downstream {
    display_name: String,
    connection: ConnectionId,
    sender: DownstreamSender,
    /// Keyed by lowercased login name.
    roster: HashMap<String, Seen>,
}

/// Every registered downstream, keyed by server id.
///
/// Each roster update is stamped with a registry-wide sequence number. A
/// player who moved servers may briefly show up in two rosters; the most
/// recent report wins.
#[derive(Debug, Default)]
pub struct DownstreamRegistry {
    servers: BTreeMap<ServerId, Downstream>,
    next_seq: u64,
}

impl DownstreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a downstream from its hello. A previous registration
    /// under the same id is replaced, which drops its sender and ends that
    /// connection's write side.
    ///
    /// Returns `true` if an earlier registration was replaced.
    pub fn register(
        &mut self,
        hello: ServerHello,
        connection: ConnectionId,
        sender: DownstreamSender,
    ) -> bool {
        let ServerHello {
            server_id,
            server_display_name,
            players,
        } = hello;

        let mut downstream = Downstream {
            display_name: server_display_name,
            connection,
            sender,
            roster: HashMap::new(),
        };
        for entry in players {
            let seq = self.bump();
            downstream
                .roster
                .insert(entry.name.to_lowercase(), Seen { entry, seq });
        }

        let server = downstream.display_name.clone();
        let players = downstream.roster.len();
        let replaced = self.servers.insert(server_id.clone(), downstream).is_some();
        if replaced {
            tracing::info!(%server_id, %server, %connection, players, "downstream re-registered");
        } else {
            tracing::info!(%server_id, %server, %connection, players, "downstream registered");
        }
        replaced
    }

    /// Replaces the roster of a registered downstream without touching its
    /// connection. Used when a connected server says hello again.
    pub fn replace_roster(
        &mut self,
        server_id: &ServerId,
        connection: ConnectionId,
        players: Vec<RosterEntry>,
    ) -> bool {
        let mut roster = HashMap::with_capacity(players.len());
        for entry in players {
            let seq = self.bump();
            roster.insert(entry.name.to_lowercase(), Seen { entry, seq });
        }
        match self.servers.get_mut(server_id) {
            Some(downstream) if downstream.connection == connection => {
                downstream.roster = roster;
                true
            }
            _ => false,
        }
    }

    /// Removes a downstream, but only if `connection` is still the one
    /// registered under `server_id`. A connection that was replaced by a
    /// newer one must not unregister its successor.
    pub fn unregister(&mut self, server_id: &ServerId, connection: ConnectionId) -> bool {
        match self.servers.get(server_id) {
            Some(downstream) if downstream.connection == connection => {
                self.servers.remove(server_id);
                tracing::info!(%server_id, %connection, "downstream unregistered");
                true
            }
            _ => false,
        }
    }

    /// Applies a join or quit reported by `server_id` over `connection`.
    ///
    /// Returns `false` if the server is not registered, or if `connection`
    /// has been superseded by a newer one.
    pub fn apply_presence(
        &mut self,
        server_id: &ServerId,
        connection: ConnectionId,
        presence: PlayerPresence,
    ) -> bool {
        let seq = self.bump();
        let Some(downstream) = self
            .servers
            .get_mut(server_id)
            .filter(|d| d.connection == connection)
        else {
            return false;
        };

        let key = presence.player_name.to_lowercase();
        if presence.online {
            let entry = RosterEntry::new(presence.player_name, presence.display_name);
            downstream.roster.insert(key, Seen { entry, seq });
        } else {
            downstream.roster.remove(&key);
        }
        true
    }

    /// Finds the server hosting `name`, matching login names and display
    /// names without regard to case.
    pub fn locate(&self, name: &str) -> Option<&ServerId> {
        self.servers
            .iter()
            .flat_map(|(id, downstream)| {
                downstream
                    .roster
                    .values()
                    .filter(|seen| seen.entry.matches(name))
                    .map(move |seen| (seen.seq, id))
            })
            .max_by_key(|(seq, _)| *seq)
            .map(|(_, id)| id)
    }

    pub fn contains(&self, server_id: &ServerId) -> bool {
        self.servers.contains_key(server_id)
    }

    pub fn sender(&self, server_id: &ServerId) -> Option<&DownstreamSender> {
        self.servers.get(server_id).map(|d| &d.sender)
    }

    /// Every registered downstream with its outbound queue.
    pub fn senders(&self) -> impl Iterator<Item = (&ServerId, &DownstreamSender)> {
        self.servers.iter().map(|(id, d)| (id, &d.sender))
    }

    pub fn player_count(&self, server_id: &ServerId) -> Option<usize> {
        self.servers.get(server_id).map(|d| d.roster.len())
    }

    pub fn server_ids(&self) -> Vec<ServerId> {
        self.servers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    fn bump(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello(id: &str, players: &[&str]) -> ServerHello {
        ServerHello {
            server_id: ServerId::new(id),
            server_display_name: id.to_uppercase(),
            players: players.iter().map(|p| RosterEntry::new(*p, *p)).collect(),
        }
    }

    fn presence(name: &str, online: bool) -> PlayerPresence {
        PlayerPresence {
            player_name: name.into(),
            display_name: name.into(),
            online,
        }
    }

    fn sender() -> DownstreamSender {
        mpsc::unbounded_channel().0
    }

    #[test]
    fn test_register_replaces_previous_registration() {
        let mut registry = DownstreamRegistry::new();
        assert!(!registry.register(hello("s1", &["ann"]), ConnectionId::new(1), sender()));
        assert!(registry.register(hello("s1", &[]), ConnectionId::new(2), sender()));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.player_count(&ServerId::new("s1")), Some(0));
    }

    #[test]
    fn test_unregister_ignores_stale_connection() {
        let mut registry = DownstreamRegistry::new();
        registry.register(hello("s1", &[]), ConnectionId::new(1), sender());
        registry.register(hello("s1", &[]), ConnectionId::new(2), sender());

        assert!(!registry.unregister(&ServerId::new("s1"), ConnectionId::new(1)));
        assert!(registry.contains(&ServerId::new("s1")));
        assert!(registry.unregister(&ServerId::new("s1"), ConnectionId::new(2)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_locate_matches_display_name_ignoring_case() {
        let mut registry = DownstreamRegistry::new();
        registry.register(hello("s1", &[]), ConnectionId::new(1), sender());
        registry.apply_presence(
            &ServerId::new("s1"),
            ConnectionId::new(1),
            PlayerPresence {
                player_name: "bob_42".into(),
                display_name: "Bobby".into(),
                online: true,
            },
        );

        assert_eq!(registry.locate("BOBBY"), Some(&ServerId::new("s1")));
        assert_eq!(registry.locate("bob_42"), Some(&ServerId::new("s1")));
        assert_eq!(registry.locate("bob"), None);
    }

    #[test]
    fn test_locate_prefers_most_recent_presence() {
        let mut registry = DownstreamRegistry::new();
        registry.register(hello("s1", &["ann"]), ConnectionId::new(1), sender());
        registry.register(hello("s2", &[]), ConnectionId::new(2), sender());

        // Ann joined s2 before s1 reported her quit.
        registry.apply_presence(&ServerId::new("s2"), ConnectionId::new(2), presence("Ann", true));
        assert_eq!(registry.locate("ann"), Some(&ServerId::new("s2")));

        registry.apply_presence(&ServerId::new("s1"), ConnectionId::new(1), presence("ann", false));
        assert_eq!(registry.locate("ann"), Some(&ServerId::new("s2")));
    }

    #[test]
    fn test_apply_presence_unknown_server_returns_false() {
        let mut registry = DownstreamRegistry::new();
        assert!(!registry.apply_presence(
            &ServerId::new("nope"),
            ConnectionId::new(1),
            presence("ann", true)
        ));
    }

    #[test]
    fn test_apply_presence_from_superseded_connection_is_ignored() {
        let mut registry = DownstreamRegistry::new();
        let s1 = ServerId::new("s1");
        registry.register(hello("s1", &["ann"]), ConnectionId::new(1), sender());
        registry.register(hello("s1", &["ann"]), ConnectionId::new(2), sender());

        assert!(!registry.apply_presence(&s1, ConnectionId::new(1), presence("ann", false)));
        assert!(!registry.apply_presence(&s1, ConnectionId::new(1), presence("bob", true)));
        assert_eq!(registry.locate("ann"), Some(&s1));
        assert_eq!(registry.locate("bob"), None);

        assert!(registry.apply_presence(&s1, ConnectionId::new(2), presence("ann", false)));
        assert_eq!(registry.locate("ann"), None);
    }

    #[test]
    fn test_locate_non_ascii_name_ignoring_case() {
        let mut registry = DownstreamRegistry::new();
        registry.register(hello("s1", &["Émile"]), ConnectionId::new(1), sender());

        assert_eq!(registry.locate("émile"), Some(&ServerId::new("s1")));
        assert_eq!(registry.locate("ÉMILE"), Some(&ServerId::new("s1")));
    }

    #[test]
    fn test_replace_roster_requires_current_connection() {
        let mut registry = DownstreamRegistry::new();
        let s1 = ServerId::new("s1");
        registry.register(hello("s1", &["ann"]), ConnectionId::new(1), sender());

        assert!(!registry.replace_roster(&s1, ConnectionId::new(9), vec![]));
        assert_eq!(registry.player_count(&s1), Some(1));

        assert!(registry.replace_roster(&s1, ConnectionId::new(1), vec![RosterEntry::new("bob", "Bob")]));
        assert_eq!(registry.locate("bob"), Some(&s1));
        assert_eq!(registry.locate("ann"), None);
    }
}
