// Chat list operations and their async results.

use super::*;

use crate::api::ApiChat;
use crate::state::Chat;

/// Keep a locally newer preview (e.g. from push) over a stale server one.
fn keep_newer_preview(incoming: &mut Chat, existing: Option<&Chat>) {
    let Some(existing) = existing else {
        return;
    };
    let local_at = existing.latest_message.as_ref().map(|m| m.created_at);
    let server_at = incoming.latest_message.as_ref().map(|m| m.created_at);
    if local_at > server_at {
        incoming.latest_message = existing.latest_message.clone();
    }
}

impl AppCore {
    pub(super) fn load_chats(&mut self, self_id: String, reply: Reply) {
        self.remember_self(&self_id);
        self.set_busy(|b| b.loading_chats = true);
        let epoch = self.removal_epoch;
        self.spawn_api(move |api| async move {
            let result = api.list_chats(&self_id).await;
            InternalEvent::ChatsLoaded {
                self_id,
                epoch,
                result,
                reply,
            }
        });
    }

    pub(super) fn on_chats_loaded(
        &mut self,
        self_id: String,
        epoch: u64,
        result: Result<Vec<ApiChat>, ApiError>,
        reply: Reply,
    ) {
        self.state.busy.loading_chats = false;
        if self.state.self_id.as_deref() != Some(self_id.as_str()) {
            tracing::info!(%self_id, "dropping chat list for a previous session user");
            self.emit_state();
            send_reply(reply, ActionOutcome::Ignored);
            return;
        }
        match result {
            Ok(chats) => {
                let mut seen = HashSet::new();
                let mut list = Vec::with_capacity(chats.len());
                for c in chats {
                    if !seen.insert(c.id.clone()) {
                        continue;
                    }
                    // Listed before the removal landed.
                    if self.removed_since(&c.id, epoch) {
                        tracing::debug!(chat_id = %c.id, "stale listing of removed chat skipped");
                        continue;
                    }
                    let existing = self.state.chat(&c.id);
                    let mut chat = c.into_chat();
                    keep_newer_preview(&mut chat, existing);
                    list.push(chat);
                }
                tracing::info!(count = list.len(), "chats loaded");
                self.state.chat_list = list;
                if let Some(active) = self.state.active_chat_id.clone() {
                    if self.state.chat(&active).is_none() {
                        tracing::debug!(chat_id = %active, "active chat not in refreshed list");
                    }
                }
                self.emit_state();
                send_reply(reply, ActionOutcome::Done);
            }
            Err(e) => {
                self.record_error("Failed to load chats", &e);
                self.emit_state();
                send_reply(
                    reply,
                    ActionOutcome::Failed {
                        error: e.to_string(),
                    },
                );
            }
        }
    }

    pub(super) fn open_or_create_chat(&mut self, self_id: String, peer_id: String, reply: Reply) {
        let peer_id = peer_id.trim().to_string();
        if peer_id.is_empty() || peer_id == self_id {
            self.state.error = Some("Pick someone else to chat with".to_string());
            self.emit_state();
            send_reply(
                reply,
                ActionOutcome::Failed {
                    error: "invalid peer".to_string(),
                },
            );
            return;
        }
        self.remember_self(&self_id);
        self.set_busy(|b| b.opening_chat = true);
        self.spawn_api(move |api| async move {
            let result = api.open_chat(&self_id, &peer_id).await;
            InternalEvent::ChatOpened { result, reply }
        });
    }

    pub(super) fn on_chat_opened(&mut self, result: Result<ApiChat, ApiError>, reply: Reply) {
        self.state.busy.opening_chat = false;
        let api_chat = match result {
            Ok(c) => c,
            Err(e) => {
                self.record_error("Failed to open chat", &e);
                self.emit_state();
                send_reply(
                    reply,
                    ActionOutcome::Failed {
                        error: e.to_string(),
                    },
                );
                return;
            }
        };

        let mut chat = api_chat.into_chat();
        let chat_id = chat.id.clone();
        match self.state.chat_list.iter_mut().find(|c| c.id == chat_id) {
            Some(existing) => {
                keep_newer_preview(&mut chat, Some(&*existing));
                *existing = chat;
            }
            None => self.state.chat_list.insert(0, chat),
        }
        self.activate_chat(Some(chat_id.clone()));
        self.emit_state();

        let outcome = match self.state.chat(&chat_id) {
            Some(c) => ActionOutcome::Chat(c.clone()),
            None => ActionOutcome::Ignored,
        };
        send_reply(reply, outcome);
    }

    /// Switch the active chat; an outbound typing signal for the chat being
    /// left is stopped.
    pub(super) fn activate_chat(&mut self, chat_id: Option<String>) {
        if self.state.active_chat_id == chat_id {
            return;
        }
        if let Some(prev) = self.state.active_chat_id.take() {
            if let Some(cmd) = self.typing.stop(Some(&prev)) {
                self.run_typing(cmd);
            }
        }
        tracing::debug!(chat_id = ?chat_id, "active chat");
        self.state.active_chat_id = chat_id;
    }

    pub(super) fn select_chat(&mut self, chat_id: Option<String>, reply: Reply) {
        if let Some(id) = chat_id.as_deref() {
            if self.state.chat(id).is_none() {
                send_reply(
                    reply,
                    ActionOutcome::Failed {
                        error: "chat not found".to_string(),
                    },
                );
                return;
            }
        }
        self.activate_chat(chat_id);
        self.emit_state();
        send_reply(reply, ActionOutcome::Done);
    }

    pub(super) fn acknowledge_read(&mut self, chat_id: String, self_id: String, reply: Reply) {
        if self.chat_is_gone(&chat_id) {
            send_reply(reply, ActionOutcome::Ignored);
            return;
        }
        self.remember_self(&self_id);
        self.spawn_api(move |api| async move {
            let result = api.mark_chat_read(&chat_id, &self_id).await;
            InternalEvent::ChatReadAcknowledged {
                chat_id,
                result,
                reply,
            }
        });
    }

    pub(super) fn on_chat_read_acknowledged(
        &mut self,
        chat_id: String,
        result: Result<(), ApiError>,
        reply: Reply,
    ) {
        if let Err(e) = result {
            self.record_error("Failed to mark chat as read", &e);
            self.emit_state();
            send_reply(
                reply,
                ActionOutcome::Failed {
                    error: e.to_string(),
                },
            );
            return;
        }
        if let Some(chat) = self.state.chat_list.iter_mut().find(|c| c.id == chat_id) {
            if chat.unread_count != 0 {
                chat.unread_count = 0;
                self.emit_state();
            }
        }
        send_reply(reply, ActionOutcome::Done);
    }

    pub(super) fn remove_chat(&mut self, chat_id: String, self_id: String, reply: Reply) {
        self.remember_self(&self_id);
        self.spawn_api(move |api| async move {
            let result = api.delete_chat(&chat_id, &self_id).await;
            InternalEvent::ChatRemoved {
                chat_id,
                result,
                reply,
            }
        });
    }

    pub(super) fn on_chat_removed(
        &mut self,
        chat_id: String,
        result: Result<(), ApiError>,
        reply: Reply,
    ) {
        if let Err(e) = result {
            self.record_error("Failed to delete chat", &e);
            self.emit_state();
            send_reply(
                reply,
                ActionOutcome::Failed {
                    error: e.to_string(),
                },
            );
            return;
        }
        tracing::info!(%chat_id, "chat removed");
        self.removal_epoch += 1;
        self.removed_at.insert(chat_id.clone(), self.removal_epoch);
        self.push_claims.remove(&chat_id);
        self.state.chat_list.retain(|c| c.id != chat_id);
        self.state.windows.remove(&chat_id);
        self.state.busy.loading_messages.remove(&chat_id);
        self.pages_in_flight.retain(|(c, _)| c != &chat_id);
        if self.state.active_chat_id.as_deref() == Some(chat_id.as_str()) {
            self.activate_chat(None);
        }
        if let Some(cmd) = self.typing.forget_chat(&chat_id) {
            self.run_typing(cmd);
        }
        self.emit_state();
        send_reply(reply, ActionOutcome::Done);
    }
}
