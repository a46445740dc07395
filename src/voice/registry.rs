use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serenity::model::id::GuildId;

use super::transport::VoiceConn;

enum Slot {
    /// A join is in flight; the slot is taken but carries no connection yet.
    Joining,
    Connected(Arc<dyn VoiceConn>),
}

/// Map of active voice connections, one slot per guild; the single source of
/// truth for "are we connected, and to which channel".
///
/// Owned by the application context and shared by reference, so tests build
/// isolated instances instead of poking at process-wide state.
///
/// A slot is claimed *before* the transport is dialled: the transport keys
/// its underlying calls per guild, so two in-flight connects for one guild
/// would stomp each other. Claiming first means two racing joins resolve to
/// exactly one dial attempt.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<GuildId, Slot>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, guild_id: GuildId) -> Option<Arc<dyn VoiceConn>> {
        match self.sessions.lock().unwrap().get(&guild_id) {
            Some(Slot::Connected(conn)) => Some(Arc::clone(conn)),
            _ => None,
        }
    }

    /// Claims the guild's slot ahead of a join. `None` means the slot is
    /// already taken, by a live connection or by another in-flight join.
    /// The claim releases itself on drop unless it is fulfilled.
    pub fn claim(&self, guild_id: GuildId) -> Option<JoinClaim<'_>> {
        match self.sessions.lock().unwrap().entry(guild_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(Slot::Joining);
                Some(JoinClaim {
                    registry: self,
                    guild_id,
                    fulfilled: false,
                })
            }
        }
    }

    /// Removes and returns the guild's live connection. An in-flight claim
    /// is not touched; it belongs to the join that holds it.
    pub fn deregister(&self, guild_id: GuildId) -> Option<Arc<dyn VoiceConn>> {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get(&guild_id) {
            Some(Slot::Connected(_)) => match sessions.remove(&guild_id) {
                Some(Slot::Connected(conn)) => Some(conn),
                _ => None,
            },
            _ => None,
        }
    }

    /// Empties the registry of live connections. Shutdown path; in-flight
    /// claims are left to clean up after themselves.
    pub fn drain(&self) -> Vec<(GuildId, Arc<dyn VoiceConn>)> {
        let mut sessions = self.sessions.lock().unwrap();
        let guilds: Vec<GuildId> = sessions
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Connected(_)))
            .map(|(guild_id, _)| *guild_id)
            .collect();
        guilds
            .into_iter()
            .filter_map(|guild_id| match sessions.remove(&guild_id) {
                Some(Slot::Connected(conn)) => Some((guild_id, conn)),
                _ => None,
            })
            .collect()
    }
}

/// A held slot for a join in flight. Fulfilling it installs the connection;
/// dropping it unfulfilled releases the slot.
pub struct JoinClaim<'a> {
    registry: &'a SessionRegistry,
    guild_id: GuildId,
    fulfilled: bool,
}

impl JoinClaim<'_> {
    pub fn fulfill(mut self, conn: Arc<dyn VoiceConn>) {
        self.registry
            .sessions
            .lock()
            .unwrap()
            .insert(self.guild_id, Slot::Connected(conn));
        self.fulfilled = true;
    }
}

impl Drop for JoinClaim<'_> {
    fn drop(&mut self) {
        if self.fulfilled {
            return;
        }
        let mut sessions = self.registry.sessions.lock().unwrap();
        if matches!(sessions.get(&self.guild_id), Some(Slot::Joining)) {
            sessions.remove(&self.guild_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::FakeConn;
    use super::*;
    use serenity::model::id::ChannelId;

    const GUILD: GuildId = GuildId::new(101);

    fn conn(channel: u64) -> Arc<dyn VoiceConn> {
        Arc::new(FakeConn::new(ChannelId::new(channel)))
    }

    #[test]
    fn lookup_on_empty_registry_is_none() {
        let registry = SessionRegistry::new();
        assert!(registry.lookup(GUILD).is_none());
    }

    #[test]
    fn fulfilled_claim_registers_the_connection() {
        let registry = SessionRegistry::new();

        let claim = registry.claim(GUILD).expect("slot was free");
        claim.fulfill(conn(7));

        let found = registry.lookup(GUILD).expect("registered connection");
        assert_eq!(found.channel_id(), ChannelId::new(7));

        assert!(registry.deregister(GUILD).is_some());
        assert!(registry.lookup(GUILD).is_none());
        assert!(registry.deregister(GUILD).is_none());
    }

    #[test]
    fn taken_slot_rejects_a_second_claim() {
        let registry = SessionRegistry::new();

        let held = registry.claim(GUILD).expect("slot was free");
        assert!(registry.claim(GUILD).is_none());

        held.fulfill(conn(7));
        assert!(registry.claim(GUILD).is_none());
    }

    #[test]
    fn dropped_claim_releases_the_slot() {
        let registry = SessionRegistry::new();

        drop(registry.claim(GUILD).expect("slot was free"));

        assert!(registry.lookup(GUILD).is_none());
        assert!(registry.claim(GUILD).is_some());
    }

    #[test]
    fn in_flight_claim_is_invisible_to_lookup_and_deregister() {
        let registry = SessionRegistry::new();

        let held = registry.claim(GUILD).expect("slot was free");
        assert!(registry.lookup(GUILD).is_none());
        // Leave cannot steal the slot out from under the join.
        assert!(registry.deregister(GUILD).is_none());
        assert!(registry.claim(GUILD).is_none());

        held.fulfill(conn(7));
        assert!(registry.lookup(GUILD).is_some());
    }

    #[test]
    fn drain_takes_connections_and_spares_claims() {
        let registry = SessionRegistry::new();
        let other = GuildId::new(102);

        let held = registry.claim(GUILD).expect("slot was free");
        registry.claim(other).expect("slot was free").fulfill(conn(9));

        let drained = registry.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0, other);

        // The in-flight join still owns its slot.
        assert!(registry.claim(GUILD).is_none());
        drop(held);
        assert!(registry.claim(GUILD).is_some());
    }
}
