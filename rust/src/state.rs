use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppState {
    pub rev: u64,
    /// Session user, set by `Connect` or the first operation that names one.
    pub self_id: Option<String>,
    pub busy: BusyState,
    /// Ordered by most recent activity, newest first.
    pub chat_list: Vec<Chat>,
    pub active_chat_id: Option<String>,
    /// chat_id -> cached message window.
    pub windows: BTreeMap<String, ChatWindow>,
    pub online_users: BTreeSet<String>,
    /// The single current error surfaced to the UI.
    pub error: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn chat(&self, chat_id: &str) -> Option<&Chat> {
        self.chat_list.iter().find(|c| c.id == chat_id)
    }

    pub fn active_chat(&self) -> Option<&Chat> {
        self.active_chat_id.as_deref().and_then(|id| self.chat(id))
    }

    pub fn messages(&self, chat_id: &str) -> &[Message] {
        self.windows
            .get(chat_id)
            .map(|w| w.messages.as_slice())
            .unwrap_or(&[])
    }
}

/// "In flight" flags for operations the UI should reflect.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BusyState {
    pub loading_chats: bool,
    pub opening_chat: bool,
    /// Chats with at least one page request outstanding.
    pub loading_messages: BTreeSet<String>,
}

impl BusyState {
    pub fn idle() -> Self {
        Self::default()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Chat {
    pub id: String,
    pub participants: Vec<String>,
    pub latest_message: Option<MessagePreview>,
    pub unread_count: u32,
    pub updated_at: i64,
    // Derived, never sent by the server.
    pub online: bool,
    pub typing: bool,
    pub typing_user_id: Option<String>,
}

impl Chat {
    /// The lone other participant of a one-to-one chat.
    pub fn direct_peer(&self, self_id: &str) -> Option<&str> {
        if self.participants.len() != 2 {
            return None;
        }
        self.participants
            .iter()
            .map(String::as_str)
            .find(|p| *p != self_id)
    }

    /// Anyone in the chat other than `self_id`; used as the push recipient.
    pub fn first_peer(&self, self_id: &str) -> Option<&str> {
        self.participants
            .iter()
            .map(String::as_str)
            .find(|p| *p != self_id)
    }

    /// Sort key for the chat list.
    pub fn last_activity_at(&self) -> i64 {
        self.latest_message
            .as_ref()
            .map(|m| m.created_at)
            .unwrap_or(self.updated_at)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessagePreview {
    pub message_id: String,
    pub sender_id: String,
    pub text: String,
    pub has_image: bool,
    pub created_at: i64,
}

impl From<&Message> for MessagePreview {
    fn from(m: &Message) -> Self {
        Self {
            message_id: m.id.clone(),
            sender_id: m.sender_id.clone(),
            text: m.text.clone(),
            has_image: m.image.is_some(),
            created_at: m.created_at,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatWindow {
    /// Ascending by `(created_at, id)`, identities unique.
    pub messages: Vec<Message>,
    pub pagination: PaginationState,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaginationState {
    pub page: u32,
    pub has_more: bool,
    pub total: u64,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            page: 0,
            has_more: true,
            total: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// Server id once confirmed; `local_id` while pending or failed;
    /// `push:<uuid>` for push-delivered entries awaiting their canonical copy.
    pub id: String,
    /// Set for messages this client originated.
    pub local_id: Option<String>,
    pub chat_id: String,
    pub sender_id: String,
    pub text: String,
    pub image: Option<String>,
    pub read_by: Vec<String>,
    pub reply_to: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub delivery: MessageDeliveryState,
    pub deleted: bool,
}

impl Message {
    pub fn is_local_only(&self) -> bool {
        !matches!(self.delivery, MessageDeliveryState::Confirmed)
    }

    pub fn is_push_placeholder(&self) -> bool {
        self.id.starts_with(PUSH_ID_PREFIX)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageDeliveryState {
    Confirmed,
    Pending,
    Failed { reason: String },
}

pub const PUSH_ID_PREFIX: &str = "push:";
pub const LOCAL_ID_PREFIX: &str = "local:";

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
