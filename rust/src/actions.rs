#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    // Session
    Connect {
        self_id: String,
    },
    Disconnect,

    // Chats
    LoadChats {
        self_id: String,
    },
    OpenOrCreateChat {
        self_id: String,
        peer_id: String,
    },
    /// Switch the active chat without touching the network; `None` closes it.
    SelectChat {
        chat_id: Option<String>,
    },
    AcknowledgeRead {
        chat_id: String,
        self_id: String,
    },
    RemoveChat {
        chat_id: String,
        self_id: String,
    },

    // Messages
    LoadMessages {
        chat_id: String,
        self_id: String,
        page: u32,
        page_size: Option<u32>,
    },
    SendMessage {
        chat_id: String,
        self_id: String,
        text: String,
        image: Option<String>,
        reply_to: Option<String>,
    },
    RetryMessage {
        chat_id: String,
        local_id: String,
    },
    DeleteMessage {
        message_id: String,
        self_id: String,
        chat_id: String,
    },
    MarkMessageRead {
        message_id: String,
        self_id: String,
        chat_id: String,
    },

    // Typing
    TypingKeystroke {
        chat_id: String,
    },
    StopTyping {
        chat_id: String,
    },

    // UI
    ClearError,
}

impl AppAction {
    /// Log-safe action tag (never includes message text).
    pub fn tag(&self) -> &'static str {
        match self {
            // Session
            AppAction::Connect { .. } => "Connect",
            AppAction::Disconnect => "Disconnect",

            // Chats
            AppAction::LoadChats { .. } => "LoadChats",
            AppAction::OpenOrCreateChat { .. } => "OpenOrCreateChat",
            AppAction::SelectChat { .. } => "SelectChat",
            AppAction::AcknowledgeRead { .. } => "AcknowledgeRead",
            AppAction::RemoveChat { .. } => "RemoveChat",

            // Messages
            AppAction::LoadMessages { .. } => "LoadMessages",
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::RetryMessage { .. } => "RetryMessage",
            AppAction::DeleteMessage { .. } => "DeleteMessage",
            AppAction::MarkMessageRead { .. } => "MarkMessageRead",

            // Typing
            AppAction::TypingKeystroke { .. } => "TypingKeystroke",
            AppAction::StopTyping { .. } => "StopTyping",

            // UI
            AppAction::ClearError => "ClearError",
        }
    }

    /// Convenience constructor using the configured page size.
    pub fn load_messages(chat_id: impl Into<String>, self_id: impl Into<String>, page: u32) -> Self {
        AppAction::LoadMessages {
            chat_id: chat_id.into(),
            self_id: self_id.into(),
            page,
            page_size: None,
        }
    }

    pub fn send_text(
        chat_id: impl Into<String>,
        self_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        AppAction::SendMessage {
            chat_id: chat_id.into(),
            self_id: self_id.into(),
            text: text.into(),
            image: None,
            reply_to: None,
        }
    }
}
