// Window merge rules. Pure: no I/O, no actor state.
//
// Every function leaves the window ascending by `(created_at, id)` with unique ids.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::state::{Chat, Message, MessageDeliveryState};

fn order(a: &Message, b: &Message) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

fn insert_sorted(window: &mut Vec<Message>, msg: Message) {
    let at = window.partition_point(|m| order(m, &msg) != Ordering::Greater);
    window.insert(at, msg);
}

/// Put the entry at `idx` back in order after its timestamp changed.
fn resettle(window: &mut Vec<Message>, idx: usize) {
    let fits_left = idx == 0 || order(&window[idx - 1], &window[idx]) != Ordering::Greater;
    let fits_right =
        idx + 1 >= window.len() || order(&window[idx], &window[idx + 1]) != Ordering::Greater;
    if fits_left && fits_right {
        return;
    }
    let msg = window.remove(idx);
    insert_sorted(window, msg);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfirmOutcome {
    /// The pending entry became the canonical message in place.
    Replaced,
    /// The canonical id was already present; the pending entry was dropped.
    AlreadyPresent,
    /// No pending entry left (e.g. a page-1 reload matched it); canonical inserted.
    Inserted,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct MessageReconciler {
    /// How far apart a push placeholder and its canonical copy may be stamped.
    pub(crate) match_window_ms: i64,
}

impl MessageReconciler {
    pub(crate) fn new(match_window_ms: i64) -> Self {
        Self {
            match_window_ms: match_window_ms.max(0),
        }
    }

    fn same_content(&self, a: &Message, b: &Message) -> bool {
        a.sender_id == b.sender_id
            && a.text == b.text
            && (a.created_at - b.created_at).abs() <= self.match_window_ms
    }

    /// Claim the first open page entry with `local`'s content.
    fn claim(&self, local: &Message, page: &[Message], open: &mut [bool]) -> bool {
        let hit = page
            .iter()
            .zip(open.iter())
            .position(|(c, free)| *free && self.same_content(local, c));
        match hit {
            Some(i) => {
                open[i] = false;
                true
            }
            None => false,
        }
    }

    /// Page 1: confirmed entries are replaced wholesale by `page`.
    ///
    /// Only page entries the window did not hold yet can stand in for a local
    /// entry, and each stands in for at most one. Pending entries and push
    /// placeholders without such a copy survive (placeholders only if not
    /// older than the page). Failed entries always survive.
    pub(crate) fn replace_window(&self, window: &mut Vec<Message>, page: Vec<Message>) {
        let known: HashSet<String> = window.iter().map(|m| m.id.clone()).collect();
        let mut next: Vec<Message> = Vec::with_capacity(page.len() + 4);
        let mut seen = HashSet::new();
        for m in page {
            if seen.insert(m.id.clone()) {
                next.push(m);
            }
        }
        next.sort_by(order);
        let oldest = next.first().map(|m| m.created_at).unwrap_or(i64::MIN);
        let mut open: Vec<bool> = next.iter().map(|m| !known.contains(&m.id)).collect();

        let mut carried = Vec::new();
        for m in window.drain(..) {
            if seen.contains(&m.id) {
                continue;
            }
            let keep = if m.is_push_placeholder() {
                m.created_at >= oldest && !self.claim(&m, &next, &mut open)
            } else if matches!(m.delivery, MessageDeliveryState::Pending) {
                !self.claim(&m, &next, &mut open)
            } else {
                m.is_local_only()
            };
            if keep {
                carried.push(m);
            }
        }

        for m in carried {
            insert_sorted(&mut next, m);
        }
        *window = next;
    }

    /// Page > 1: older history merged by timestamp, duplicates skipped.
    /// Returns how many entries were added.
    pub(crate) fn merge_page(&self, window: &mut Vec<Message>, page: Vec<Message>) -> usize {
        let mut present: HashSet<String> = window.iter().map(|m| m.id.clone()).collect();
        let mut added = 0;
        for m in page {
            if !present.insert(m.id.clone()) {
                continue;
            }
            if let Some(idx) = window
                .iter()
                .position(|p| p.is_push_placeholder() && self.same_content(p, &m))
            {
                window.remove(idx);
            } else {
                added += 1;
            }
            insert_sorted(window, m);
        }
        added
    }

    /// Push-delivered message. `None` means the chat's window is not cached,
    /// so the message is left for a later fetch.
    ///
    /// The push is folded into a fetched entry only if that entry is not
    /// older than the push and no earlier push was folded into it; `claimed`
    /// holds those entries' ids. Anything else becomes a placeholder.
    pub(crate) fn merge_inbound(
        &self,
        window: Option<&mut Vec<Message>>,
        claimed: &mut HashSet<String>,
        msg: Message,
    ) -> bool {
        let Some(window) = window else {
            return false;
        };
        if window.iter().any(|m| m.id == msg.id) {
            return false;
        }
        let fetched = window.iter().find(|m| {
            !m.is_push_placeholder()
                && !m.is_local_only()
                && !claimed.contains(&m.id)
                && m.created_at >= msg.created_at
                && self.same_content(m, &msg)
        });
        if let Some(m) = fetched {
            claimed.insert(m.id.clone());
            return false;
        }
        insert_sorted(window, msg);
        true
    }

    /// Swap the pending entry `local_id` for the server's canonical message.
    pub(crate) fn confirm_pending(
        &self,
        window: &mut Vec<Message>,
        local_id: &str,
        mut canonical: Message,
    ) -> ConfirmOutcome {
        canonical.local_id = Some(local_id.to_string());
        canonical.delivery = MessageDeliveryState::Confirmed;

        let pending_idx = window.iter().position(|m| m.id == local_id);
        if window.iter().any(|m| m.id == canonical.id) {
            if let Some(idx) = pending_idx {
                window.remove(idx);
            }
            return ConfirmOutcome::AlreadyPresent;
        }
        match pending_idx {
            Some(idx) => {
                window[idx] = canonical;
                resettle(window, idx);
                ConfirmOutcome::Replaced
            }
            None => {
                insert_sorted(window, canonical);
                ConfirmOutcome::Inserted
            }
        }
    }
}

/// Optimistic entry for a local send.
pub(crate) fn insert_local(window: &mut Vec<Message>, msg: Message) {
    if window.iter().any(|m| m.id == msg.id) {
        return;
    }
    insert_sorted(window, msg);
}

pub(crate) fn mark_failed(window: &mut [Message], local_id: &str, reason: &str) -> bool {
    match window.iter_mut().find(|m| m.id == local_id) {
        Some(m) if matches!(m.delivery, MessageDeliveryState::Pending) => {
            m.delivery = MessageDeliveryState::Failed {
                reason: reason.to_string(),
            };
            true
        }
        _ => false,
    }
}

/// A send failed. Marks the pending entry, or puts `sent` back as failed if
/// the entry was dropped meanwhile. Returns true when it had to be restored.
pub(crate) fn fail_send(window: &mut Vec<Message>, mut sent: Message, reason: &str) -> bool {
    if window.iter().any(|m| m.id == sent.id) {
        mark_failed(window, &sent.id, reason);
        return false;
    }
    sent.delivery = MessageDeliveryState::Failed {
        reason: reason.to_string(),
    };
    insert_sorted(window, sent);
    true
}

/// `failed -> pending`; returns the entry to re-post.
pub(crate) fn mark_retrying(window: &mut [Message], local_id: &str) -> Option<Message> {
    let m = window.iter_mut().find(|m| m.id == local_id)?;
    if !matches!(m.delivery, MessageDeliveryState::Failed { .. }) {
        return None;
    }
    m.delivery = MessageDeliveryState::Pending;
    Some(m.clone())
}

/// Redact in place; position and `created_at` are kept.
pub(crate) fn tombstone(
    window: &mut [Message],
    message_id: &str,
    marker: &str,
    now: i64,
) -> Option<Message> {
    let m = window.iter_mut().find(|m| m.id == message_id)?;
    m.text = marker.to_string();
    m.image = None;
    m.deleted = true;
    m.updated_at = now;
    Some(m.clone())
}

pub(crate) fn add_reader(window: &mut [Message], message_id: &str, reader: &str) -> bool {
    let Some(m) = window.iter_mut().find(|m| m.id == message_id) else {
        return false;
    };
    if m.read_by.iter().any(|r| r == reader) {
        return false;
    }
    m.read_by.push(reader.to_string());
    true
}

/// Most recent activity first; ties keep their current relative order.
pub(crate) fn sort_chat_list(chats: &mut [Chat]) {
    chats.sort_by_key(|c| std::cmp::Reverse(c.last_activity_at()));
}

#[cfg(test)]
pub(crate) fn is_well_formed(window: &[Message]) -> bool {
    let mut ids = HashSet::new();
    window.iter().all(|m| ids.insert(m.id.as_str()))
        && window
            .windows(2)
            .all(|w| order(&w[0], &w[1]) != Ordering::Greater)
}
