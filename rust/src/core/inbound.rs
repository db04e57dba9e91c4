// Push-channel events: presence, delivered messages, typing.

use super::*;

use crate::api::{PresenceStatus, PushIncomingMessage, ServerEvent, TypingPayload};
use crate::state::{now_millis, Message, MessageDeliveryState, MessagePreview, PUSH_ID_PREFIX};

impl AppCore {
    pub(super) fn handle_push(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::OnlineUsers(ids) => {
                tracing::debug!(count = ids.len(), "presence snapshot");
                self.presence.apply_snapshot(ids);
                self.emit_state();
            }
            ServerEvent::UserStatus(status) => {
                let online = status.status == PresenceStatus::Online;
                if self.presence.apply_delta(&status.user_id, online) {
                    self.emit_state();
                }
            }
            ServerEvent::ReceiveMessage(msg) => self.on_push_message(msg),
            ServerEvent::UserTyping(t) => self.on_peer_typing(t),
            ServerEvent::UserStopTyping(t) => {
                if self.typing.inbound_stop(&t.chat_id, &t.user_id) {
                    self.emit_state();
                }
            }
        }
    }

    fn on_push_message(&mut self, incoming: PushIncomingMessage) {
        let chat_id = incoming.chat_id;
        if self.chat_is_gone(&chat_id) {
            tracing::debug!(%chat_id, "push for removed chat dropped");
            return;
        }
        if self.state.chat(&chat_id).is_none() {
            // Picked up by the next chat list load.
            tracing::debug!(%chat_id, "push for unknown chat");
            return;
        }

        let created_at = incoming
            .created_at
            .map(|t| t.timestamp_millis())
            .unwrap_or_else(now_millis);
        let msg = Message {
            id: format!("{PUSH_ID_PREFIX}{}", uuid::Uuid::new_v4()),
            local_id: None,
            chat_id: chat_id.clone(),
            sender_id: incoming.sender_id,
            text: incoming.text,
            image: None,
            read_by: vec![],
            reply_to: None,
            created_at,
            updated_at: created_at,
            delivery: MessageDeliveryState::Confirmed,
            deleted: false,
        };

        let from_self = self.state.self_id.as_deref() == Some(msg.sender_id.as_str());
        let is_active = self.state.active_chat_id.as_deref() == Some(chat_id.as_str());
        let preview = MessagePreview::from(&msg);
        let claimed = self.push_claims.entry(chat_id.clone()).or_default();
        let merged = self.reconciler.merge_inbound(
            self.state.windows.get_mut(&chat_id).map(|w| &mut w.messages),
            claimed,
            msg,
        );
        tracing::debug!(%chat_id, merged, "push message");

        if let Some(chat) = self.state.chat_list.iter_mut().find(|c| c.id == chat_id) {
            let newer = chat
                .latest_message
                .as_ref()
                .map_or(true, |p| preview.created_at >= p.created_at);
            if newer {
                chat.latest_message = Some(preview);
            }
            if !is_active && !from_self {
                chat.unread_count = chat.unread_count.saturating_add(1);
            }
        }
        self.emit_state();
    }

    fn on_peer_typing(&mut self, t: TypingPayload) {
        if self.state.self_id.as_deref() == Some(t.user_id.as_str()) {
            return;
        }
        if self.chat_is_gone(&t.chat_id) {
            return;
        }
        let Some(expiry) = self.typing.inbound_start(&t.chat_id, &t.user_id) else {
            return;
        };
        if let Some(cmd) = expiry {
            self.run_typing(cmd);
        }
        self.emit_state();
    }
}
