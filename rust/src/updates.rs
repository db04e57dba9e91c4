use flume::Sender;

use crate::api::{ApiChat, ApiError, ApiMessage, MessagePage, ReadReceipt, ServerEvent};
use crate::state::{AppState, Chat, Message};
use crate::AppAction;

#[derive(Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
        }
    }
}

/// Result of an action dispatched through `ChatSyncApp::request`.
#[derive(Clone, Debug, PartialEq)]
pub enum ActionOutcome {
    Done,
    Chat(Chat),
    Message(Message),
    Failed { error: String },
    /// Not applied: a duplicate in flight, or the chat is gone.
    Ignored,
}

pub(crate) type Reply = Option<Sender<ActionOutcome>>;

pub(crate) fn send_reply(reply: Reply, outcome: ActionOutcome) {
    if let Some(tx) = reply {
        // The requester may have stopped waiting.
        let _ = tx.send(outcome);
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Request(AppAction, Sender<ActionOutcome>),
    Push(ServerEvent),
    Internal(Box<InternalEvent>),
    /// Ends the actor loop.
    Shutdown,
}

#[derive(Debug)]
pub enum InternalEvent {
    // Request/response results
    ChatsLoaded {
        self_id: String,
        epoch: u64,
        result: Result<Vec<ApiChat>, ApiError>,
        reply: Reply,
    },
    ChatOpened {
        result: Result<ApiChat, ApiError>,
        reply: Reply,
    },
    ChatReadAcknowledged {
        chat_id: String,
        result: Result<(), ApiError>,
        reply: Reply,
    },
    ChatRemoved {
        chat_id: String,
        result: Result<(), ApiError>,
        reply: Reply,
    },
    MessagesLoaded {
        chat_id: String,
        self_id: String,
        page: u32,
        epoch: u64,
        result: Result<MessagePage, ApiError>,
        reply: Reply,
    },
    MessageSendResult {
        /// The entry as posted; restored as failed if a reload dropped it.
        message: Message,
        epoch: u64,
        result: Result<ApiMessage, ApiError>,
        reply: Reply,
    },
    MessageDeleted {
        chat_id: String,
        message_id: String,
        result: Result<(), ApiError>,
        reply: Reply,
    },
    MessageReadResult {
        chat_id: String,
        message_id: String,
        self_id: String,
        epoch: u64,
        result: Result<ReadReceipt, ApiError>,
        reply: Reply,
    },

    // Timers
    TypingIdle {
        chat_id: String,
        token: u64,
    },
    InboundTypingExpired {
        chat_id: String,
        token: u64,
    },
}
