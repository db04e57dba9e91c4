// Typing indicators: outbound debounce and inbound per-chat state.
//
// Timers are not owned here. Each scheduled timer carries a token; when it
// fires the actor hands the token back and a stale token is ignored. Bumping
// the token is therefore how a timer gets cancelled.

use std::collections::HashMap;
use std::time::Duration;

use crate::state::Chat;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TypingCommand {
    EmitStart { chat_id: String },
    EmitStop { chat_id: String },
    ScheduleIdle { chat_id: String, token: u64, after: Duration },
    ScheduleExpiry { chat_id: String, token: u64, after: Duration },
}

#[derive(Debug)]
struct Signal {
    chat_id: String,
    token: u64,
}

#[derive(Debug)]
struct Inbound {
    user_id: String,
    token: u64,
}

#[derive(Debug)]
pub(crate) struct TypingCoordinator {
    idle_after: Duration,
    inbound_expiry: Option<Duration>,
    next_token: u64,
    outbound: Option<Signal>,
    inbound: HashMap<String, Inbound>,
}

impl TypingCoordinator {
    pub(crate) fn new(idle_after: Duration, inbound_expiry: Option<Duration>) -> Self {
        Self {
            idle_after,
            inbound_expiry,
            next_token: 0,
            outbound: None,
            inbound: HashMap::new(),
        }
    }

    fn token(&mut self) -> u64 {
        self.next_token = self.next_token.wrapping_add(1);
        self.next_token
    }

    pub(crate) fn is_signaling(&self, chat_id: &str) -> bool {
        self.outbound.as_ref().is_some_and(|s| s.chat_id == chat_id)
    }

    /// Local keystroke in `chat_id`.
    pub(crate) fn keystroke(&mut self, chat_id: &str) -> Vec<TypingCommand> {
        let mut cmds = Vec::with_capacity(3);
        match self.outbound.take() {
            Some(prev) if prev.chat_id == chat_id => {}
            Some(prev) => {
                cmds.push(TypingCommand::EmitStop {
                    chat_id: prev.chat_id,
                });
                cmds.push(TypingCommand::EmitStart {
                    chat_id: chat_id.to_string(),
                });
            }
            None => cmds.push(TypingCommand::EmitStart {
                chat_id: chat_id.to_string(),
            }),
        }
        let token = self.token();
        self.outbound = Some(Signal {
            chat_id: chat_id.to_string(),
            token,
        });
        cmds.push(TypingCommand::ScheduleIdle {
            chat_id: chat_id.to_string(),
            token,
            after: self.idle_after,
        });
        cmds
    }

    /// The inactivity timer fired.
    pub(crate) fn on_idle(&mut self, chat_id: &str, token: u64) -> Option<TypingCommand> {
        match &self.outbound {
            Some(s) if s.chat_id == chat_id && s.token == token => {
                self.outbound = None;
                Some(TypingCommand::EmitStop {
                    chat_id: chat_id.to_string(),
                })
            }
            _ => None,
        }
    }

    /// Stop signaling now. With `Some(chat)`, only if signaling for that chat.
    pub(crate) fn stop(&mut self, chat_id: Option<&str>) -> Option<TypingCommand> {
        let matches = match (&self.outbound, chat_id) {
            (Some(s), Some(c)) => s.chat_id == c,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !matches {
            return None;
        }
        self.outbound.take().map(|s| TypingCommand::EmitStop {
            chat_id: s.chat_id,
        })
    }

    /// Peer started typing. Returns `None` when nothing changed.
    pub(crate) fn inbound_start(
        &mut self,
        chat_id: &str,
        user_id: &str,
    ) -> Option<Option<TypingCommand>> {
        let already = self
            .inbound
            .get(chat_id)
            .is_some_and(|i| i.user_id == user_id);
        if already && self.inbound_expiry.is_none() {
            return None;
        }
        let token = self.token();
        self.inbound.insert(
            chat_id.to_string(),
            Inbound {
                user_id: user_id.to_string(),
                token,
            },
        );
        let expiry = self.inbound_expiry.map(|after| TypingCommand::ScheduleExpiry {
            chat_id: chat_id.to_string(),
            token,
            after,
        });
        Some(expiry)
    }

    /// Peer stopped typing. Ignored if someone else is the current typer.
    pub(crate) fn inbound_stop(&mut self, chat_id: &str, user_id: &str) -> bool {
        if self
            .inbound
            .get(chat_id)
            .is_some_and(|i| i.user_id == user_id)
        {
            self.inbound.remove(chat_id);
            return true;
        }
        false
    }

    pub(crate) fn on_inbound_expired(&mut self, chat_id: &str, token: u64) -> bool {
        if self.inbound.get(chat_id).is_some_and(|i| i.token == token) {
            self.inbound.remove(chat_id);
            return true;
        }
        false
    }

    pub(crate) fn typer(&self, chat_id: &str) -> Option<&str> {
        self.inbound.get(chat_id).map(|i| i.user_id.as_str())
    }

    pub(crate) fn forget_chat(&mut self, chat_id: &str) -> Option<TypingCommand> {
        self.inbound.remove(chat_id);
        self.stop(Some(chat_id))
    }

    /// Drop everything (reconnect). Returns the stop to emit, if any.
    pub(crate) fn reset(&mut self) -> Option<TypingCommand> {
        self.inbound.clear();
        self.stop(None)
    }

    pub(crate) fn overlay(&self, chats: &mut [Chat]) {
        for chat in chats.iter_mut() {
            let typer = self.typer(&chat.id).map(ToString::to_string);
            chat.typing = typer.is_some();
            chat.typing_user_id = typer;
        }
    }
}
