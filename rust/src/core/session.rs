// Session lifecycle and outbound typing side effects.

use super::*;

use crate::api::{ClientEvent, TypingPayload};
use super::typing::TypingCommand;

impl AppCore {
    pub(super) fn connect(&mut self, self_id: String, reply: Reply) {
        let self_id = self_id.trim().to_string();
        if self_id.is_empty() {
            send_reply(
                reply,
                ActionOutcome::Failed {
                    error: "empty user id".to_string(),
                },
            );
            return;
        }

        // Stop goes out under the identity that started it.
        if let Some(cmd) = self.typing.reset() {
            self.run_typing(cmd);
        }
        self.presence.clear();

        let switching = self
            .state
            .self_id
            .as_deref()
            .is_some_and(|prev| prev != self_id);
        if switching {
            tracing::info!(%self_id, "switching session user; dropping cached chats");
            self.state.chat_list.clear();
            self.state.windows.clear();
            self.state.active_chat_id = None;
            self.state.busy = BusyState::idle();
            self.pages_in_flight.clear();
            self.removed_at.clear();
            self.push_claims.clear();
        }
        self.remember_self(&self_id);

        tracing::info!(%self_id, "connect");
        self.push.emit(ClientEvent::UserConnect(self_id));
        self.emit_state();
        send_reply(reply, ActionOutcome::Done);
    }

    pub(super) fn disconnect(&mut self, reply: Reply) {
        if let Some(cmd) = self.typing.reset() {
            self.run_typing(cmd);
        }
        self.presence.clear();
        tracing::info!("disconnect");
        self.emit_state();
        send_reply(reply, ActionOutcome::Done);
    }

    pub(super) fn typing_keystroke(&mut self, chat_id: String, reply: Reply) {
        if self.chat_is_gone(&chat_id) {
            send_reply(reply, ActionOutcome::Ignored);
            return;
        }
        for cmd in self.typing.keystroke(&chat_id) {
            self.run_typing(cmd);
        }
        send_reply(reply, ActionOutcome::Done);
    }

    pub(super) fn stop_typing(&mut self, chat_id: String, reply: Reply) {
        if !self.typing.is_signaling(&chat_id) {
            send_reply(reply, ActionOutcome::Ignored);
            return;
        }
        if let Some(cmd) = self.typing.stop(Some(&chat_id)) {
            self.run_typing(cmd);
        }
        send_reply(reply, ActionOutcome::Done);
    }

    pub(super) fn run_typing(&mut self, cmd: TypingCommand) {
        match cmd {
            TypingCommand::EmitStart { chat_id } => {
                if let Some(user_id) = self.state.self_id.clone() {
                    self.push
                        .emit(ClientEvent::Typing(TypingPayload { chat_id, user_id }));
                }
            }
            TypingCommand::EmitStop { chat_id } => {
                if let Some(user_id) = self.state.self_id.clone() {
                    self.push
                        .emit(ClientEvent::StopTyping(TypingPayload { chat_id, user_id }));
                }
            }
            TypingCommand::ScheduleIdle {
                chat_id,
                token,
                after,
            } => self.spawn_timer(after, InternalEvent::TypingIdle { chat_id, token }),
            TypingCommand::ScheduleExpiry {
                chat_id,
                token,
                after,
            } => self.spawn_timer(after, InternalEvent::InboundTypingExpired { chat_id, token }),
        }
    }

    pub(super) fn on_typing_idle(&mut self, chat_id: &str, token: u64) {
        if let Some(cmd) = self.typing.on_idle(chat_id, token) {
            tracing::debug!(chat_id, "typing idle");
            self.run_typing(cmd);
        }
    }

    pub(super) fn on_inbound_typing_expired(&mut self, chat_id: &str, token: u64) {
        if self.typing.on_inbound_expired(chat_id, token) {
            tracing::debug!(chat_id, "inbound typing expired");
            self.emit_state();
        }
    }
}
