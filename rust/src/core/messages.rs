// Message window operations: paging, optimistic send, delete, read receipts.

use super::*;

use crate::api::{ApiMessage, ClientEvent, MessagePage, NewMessage, PushOutgoingMessage, ReadReceipt};
use crate::state::{
    now_millis, Message, MessageDeliveryState, MessagePreview, PaginationState, LOCAL_ID_PREFIX,
};

impl AppCore {
    /// Local timestamps must be strictly increasing so rapid sends keep their order.
    fn next_outgoing_ts(&mut self) -> i64 {
        let now = now_millis();
        if now <= self.last_outgoing_ts {
            self.last_outgoing_ts += 1;
        } else {
            self.last_outgoing_ts = now;
        }
        self.last_outgoing_ts
    }

    /// Point the chat-list preview at `msg` if it is at least as new.
    fn bump_preview(&mut self, msg: &Message) {
        let Some(chat) = self
            .state
            .chat_list
            .iter_mut()
            .find(|c| c.id == msg.chat_id)
        else {
            return;
        };
        let current = chat.latest_message.as_ref().map(|p| p.created_at);
        if current.map_or(true, |at| msg.created_at >= at) {
            chat.latest_message = Some(MessagePreview::from(msg));
        }
    }

    /// Re-point a preview that referenced `old_id` (pending -> canonical, tombstone).
    fn repoint_preview(&mut self, chat_id: &str, old_id: &str, msg: &Message) {
        if let Some(chat) = self.state.chat_list.iter_mut().find(|c| c.id == chat_id) {
            if chat
                .latest_message
                .as_ref()
                .is_some_and(|p| p.message_id == old_id)
            {
                chat.latest_message = Some(MessagePreview::from(msg));
            }
        }
    }

    pub(super) fn load_messages(
        &mut self,
        chat_id: String,
        self_id: String,
        page: u32,
        page_size: Option<u32>,
        reply: Reply,
    ) {
        if self.chat_is_gone(&chat_id) {
            send_reply(reply, ActionOutcome::Ignored);
            return;
        }
        let page = page.max(1);
        let limit = page_size
            .filter(|n| *n > 0)
            .unwrap_or_else(|| self.config.page_size());
        if !self.pages_in_flight.insert((chat_id.clone(), page)) {
            tracing::debug!(%chat_id, page, "page already in flight; suppressed");
            send_reply(reply, ActionOutcome::Ignored);
            return;
        }
        self.remember_self(&self_id);
        let busy_chat = chat_id.clone();
        self.set_busy(|b| {
            b.loading_messages.insert(busy_chat);
        });
        let epoch = self.removal_epoch;
        self.spawn_api(move |api| async move {
            let result = api.list_messages(&chat_id, page, limit).await;
            InternalEvent::MessagesLoaded {
                chat_id,
                self_id,
                page,
                epoch,
                result,
                reply,
            }
        });
    }

    pub(super) fn on_messages_loaded(
        &mut self,
        chat_id: String,
        self_id: String,
        page: u32,
        epoch: u64,
        result: Result<MessagePage, ApiError>,
        reply: Reply,
    ) {
        self.pages_in_flight.remove(&(chat_id.clone(), page));
        if !self.pages_in_flight.iter().any(|(c, _)| c == &chat_id) {
            self.state.busy.loading_messages.remove(&chat_id);
        }
        if self.removed_since(&chat_id, epoch) {
            tracing::debug!(%chat_id, page, "dropping page for removed chat");
            self.emit_state();
            send_reply(reply, ActionOutcome::Ignored);
            return;
        }

        let fetched = match result {
            Ok(p) => p,
            Err(e) => {
                self.record_error("Failed to load messages", &e);
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

        let messages: Vec<Message> = fetched
            .messages
            .into_iter()
            .map(ApiMessage::into_message)
            .filter(|m| m.chat_id == chat_id)
            .collect();
        let count = messages.len();
        let window = self.state.windows.entry(chat_id.clone()).or_default();
        if page == 1 {
            self.reconciler.replace_window(&mut window.messages, messages);
            window.pagination = PaginationState {
                page: 1,
                has_more: fetched.has_more,
                total: fetched.total_messages,
            };
        } else {
            self.reconciler.merge_page(&mut window.messages, messages);
            let p = &mut window.pagination;
            if page >= p.page {
                p.page = page;
                p.has_more = fetched.has_more;
            }
            p.total = fetched.total_messages;
        }
        let newest = window.messages.last().cloned();
        tracing::info!(%chat_id, page, count, has_more = fetched.has_more, "messages loaded");

        if let Some(newest) = newest {
            self.bump_preview(&newest);
        }
        self.emit_state();

        if page == 1 {
            self.acknowledge_read(chat_id, self_id, None);
        }
        send_reply(reply, ActionOutcome::Done);
    }

    pub(super) fn send_message(
        &mut self,
        chat_id: String,
        self_id: String,
        text: String,
        image: Option<String>,
        reply_to: Option<String>,
        reply: Reply,
    ) {
        let text = text.trim().to_string();
        let image = image.filter(|i| !i.trim().is_empty());
        if text.is_empty() && image.is_none() {
            self.state.error = Some("Message is empty".to_string());
            self.emit_state();
            send_reply(
                reply,
                ActionOutcome::Failed {
                    error: "empty message".to_string(),
                },
            );
            return;
        }
        if self.chat_is_gone(&chat_id) {
            send_reply(
                reply,
                ActionOutcome::Failed {
                    error: "chat not found".to_string(),
                },
            );
            return;
        }
        self.remember_self(&self_id);

        let ts = self.next_outgoing_ts();
        let local_id = format!("{LOCAL_ID_PREFIX}{}", uuid::Uuid::new_v4());
        let msg = Message {
            id: local_id.clone(),
            local_id: Some(local_id),
            chat_id: chat_id.clone(),
            sender_id: self_id,
            text,
            image,
            read_by: vec![],
            reply_to,
            created_at: ts,
            updated_at: ts,
            delivery: MessageDeliveryState::Pending,
            deleted: false,
        };

        // Optimistic UI: the entry exists before any I/O starts.
        let window = self.state.windows.entry(chat_id.clone()).or_default();
        reconcile::insert_local(&mut window.messages, msg.clone());
        self.bump_preview(&msg);
        if let Some(cmd) = self.typing.stop(Some(&chat_id)) {
            self.run_typing(cmd);
        }
        self.emit_state();

        self.post_message(msg, reply);
    }

    /// Push for immediate peer delivery, then persist over request/response.
    fn post_message(&mut self, msg: Message, reply: Reply) {
        let recipient = self
            .state
            .chat(&msg.chat_id)
            .and_then(|c| c.first_peer(&msg.sender_id))
            .map(ToString::to_string);
        match recipient {
            Some(recipient_id) => self.push.emit(ClientEvent::SendMessage(PushOutgoingMessage {
                chat_id: msg.chat_id.clone(),
                sender_id: msg.sender_id.clone(),
                recipient_id,
                text: msg.text.clone(),
            })),
            None => {
                tracing::warn!(chat_id = %msg.chat_id, "no known recipient; skipping push delivery")
            }
        }

        let new_message = NewMessage {
            chat_id: msg.chat_id.clone(),
            sender_id: msg.sender_id.clone(),
            text: msg.text.clone(),
            image: msg.image.clone(),
            reply_to: msg.reply_to.clone(),
        };
        let epoch = self.removal_epoch;
        self.spawn_api(move |api| async move {
            let result = api.send_message(new_message).await;
            InternalEvent::MessageSendResult {
                message: msg,
                epoch,
                result,
                reply,
            }
        });
    }

    pub(super) fn on_message_send_result(
        &mut self,
        message: Message,
        epoch: u64,
        result: Result<ApiMessage, ApiError>,
        reply: Reply,
    ) {
        let chat_id = message.chat_id.clone();
        let local_id = message.id.clone();
        if self.removed_since(&chat_id, epoch) {
            tracing::debug!(%chat_id, %local_id, "send result for removed chat dropped");
            send_reply(reply, ActionOutcome::Ignored);
            return;
        }
        let window = self.state.windows.entry(chat_id.clone()).or_default();
        match result {
            Ok(api_msg) => {
                let canonical = api_msg.into_message();
                let canonical_id = canonical.id.clone();
                let outcome =
                    self.reconciler
                        .confirm_pending(&mut window.messages, &local_id, canonical);
                let confirmed = window
                    .messages
                    .iter()
                    .find(|m| m.id == canonical_id)
                    .cloned();
                tracing::info!(%chat_id, %local_id, %canonical_id, ?outcome, "message confirmed");
                if let Some(m) = confirmed.as_ref() {
                    self.repoint_preview(&chat_id, &local_id, m);
                    self.bump_preview(m);
                }
                self.emit_state();
                send_reply(
                    reply,
                    confirmed.map_or(ActionOutcome::Ignored, ActionOutcome::Message),
                );
            }
            Err(e) => {
                tracing::warn!(%chat_id, %local_id, %e, "message send failed");
                let error = e.to_string();
                if reconcile::fail_send(&mut window.messages, message, &error) {
                    tracing::debug!(%chat_id, %local_id, "failed send restored after reload");
                }
                self.emit_state();
                send_reply(reply, ActionOutcome::Failed { error });
            }
        }
    }

    pub(super) fn retry_message(&mut self, chat_id: String, local_id: String, reply: Reply) {
        let retry = self
            .state
            .windows
            .get_mut(&chat_id)
            .and_then(|w| reconcile::mark_retrying(&mut w.messages, &local_id));
        let Some(msg) = retry else {
            tracing::debug!(%chat_id, %local_id, "nothing to retry");
            send_reply(
                reply,
                ActionOutcome::Failed {
                    error: "nothing to retry".to_string(),
                },
            );
            return;
        };
        self.emit_state();
        self.post_message(msg, reply);
    }

    pub(super) fn delete_message(
        &mut self,
        message_id: String,
        self_id: String,
        chat_id: String,
        reply: Reply,
    ) {
        let is_server_message = self
            .state
            .messages(&chat_id)
            .iter()
            .find(|m| m.id == message_id)
            .map_or(true, |m| !m.is_local_only() && !m.is_push_placeholder());
        if !is_server_message {
            send_reply(
                reply,
                ActionOutcome::Failed {
                    error: "message is not on the server yet".to_string(),
                },
            );
            return;
        }
        self.remember_self(&self_id);
        self.spawn_api(move |api| async move {
            let result = api.delete_message(&message_id, &self_id).await;
            InternalEvent::MessageDeleted {
                chat_id,
                message_id,
                result,
                reply,
            }
        });
    }

    pub(super) fn on_message_deleted(
        &mut self,
        chat_id: String,
        message_id: String,
        result: Result<(), ApiError>,
        reply: Reply,
    ) {
        if let Err(e) = result {
            self.record_error("Failed to delete message", &e);
            self.emit_state();
            send_reply(
                reply,
                ActionOutcome::Failed {
                    error: e.to_string(),
                },
            );
            return;
        }
        let marker = self.config.deleted_message_text().to_string();
        let now = now_millis();
        let tombstoned = self
            .state
            .windows
            .get_mut(&chat_id)
            .and_then(|w| reconcile::tombstone(&mut w.messages, &message_id, &marker, now));
        match tombstoned {
            Some(m) => {
                self.repoint_preview(&chat_id, &message_id, &m);
            }
            None => {
                // Not cached; still redact a preview that points at it.
                if let Some(chat) = self.state.chat_list.iter_mut().find(|c| c.id == chat_id) {
                    if let Some(p) = chat
                        .latest_message
                        .as_mut()
                        .filter(|p| p.message_id == message_id)
                    {
                        p.text = marker;
                        p.has_image = false;
                    }
                }
            }
        }
        self.emit_state();
        send_reply(reply, ActionOutcome::Done);
    }

    pub(super) fn mark_message_read(
        &mut self,
        message_id: String,
        self_id: String,
        chat_id: String,
        reply: Reply,
    ) {
        if self.chat_is_gone(&chat_id) {
            send_reply(reply, ActionOutcome::Ignored);
            return;
        }
        self.remember_self(&self_id);
        let epoch = self.removal_epoch;
        self.spawn_api(move |api| async move {
            let result = api.mark_message_read(&message_id, &self_id).await;
            InternalEvent::MessageReadResult {
                chat_id,
                message_id,
                self_id,
                epoch,
                result,
                reply,
            }
        });
    }

    pub(super) fn on_message_read(
        &mut self,
        chat_id: String,
        message_id: String,
        self_id: String,
        epoch: u64,
        result: Result<ReadReceipt, ApiError>,
        reply: Reply,
    ) {
        if self.removed_since(&chat_id, epoch) {
            send_reply(reply, ActionOutcome::Ignored);
            return;
        }
        let receipt = match result {
            Ok(r) => r,
            Err(e) => {
                self.record_error("Failed to mark message as read", &e);
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
        if let Some(w) = self.state.windows.get_mut(&chat_id) {
            reconcile::add_reader(&mut w.messages, &message_id, &self_id);
        }
        // Server count is authoritative; concurrent reads would double count locally.
        if let Some(chat) = self.state.chat_list.iter_mut().find(|c| c.id == chat_id) {
            chat.unread_count = receipt.unread_count;
        }
        self.emit_state();
        send_reply(reply, ActionOutcome::Done);
    }
}
