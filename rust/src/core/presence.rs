// Online peer set, rebuilt by snapshots and adjusted by deltas.

use std::collections::BTreeSet;

use crate::state::Chat;

#[derive(Debug, Default)]
pub(crate) struct PresenceTracker {
    online: BTreeSet<String>,
}

impl PresenceTracker {
    pub(crate) fn online(&self) -> &BTreeSet<String> {
        &self.online
    }

    pub(crate) fn is_online(&self, peer_id: &str) -> bool {
        self.online.contains(peer_id)
    }

    pub(crate) fn clear(&mut self) {
        self.online.clear();
    }

    pub(crate) fn apply_snapshot(&mut self, ids: impl IntoIterator<Item = String>) {
        self.online = ids.into_iter().collect();
    }

    /// Returns whether the set changed.
    pub(crate) fn apply_delta(&mut self, peer_id: &str, is_online: bool) -> bool {
        if is_online {
            self.online.insert(peer_id.to_string())
        } else {
            self.online.remove(peer_id)
        }
    }

    /// Recompute `online` for every chat. Only one-to-one chats can be online.
    pub(crate) fn overlay(&self, chats: &mut [Chat], self_id: Option<&str>) {
        for chat in chats.iter_mut() {
            chat.online = self_id
                .and_then(|me| chat.direct_peer(me))
                .is_some_and(|peer| self.is_online(peer));
        }
    }
}
