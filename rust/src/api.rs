//! Interfaces of the two transports the engine drives, plus their wire shapes.
//!
//! The request/response side is [`ChatApi`]; the push side is split in two:
//! outbound events go through [`PushChannel::emit`], inbound ones are handed
//! to [`crate::PushSink`] by whatever owns the socket.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{Chat, Message, MessageDeliveryState, MessagePreview};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Network failure or an unusable HTTP response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with `success: false`.
    #[error("{message}")]
    Application { message: String },

    #[error("decode error: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn application(message: impl Into<String>) -> Self {
        Self::Application {
            message: message.into(),
        }
    }
}

/// Common response envelope: `{ success, message?, data? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn into_result(self) -> Result<T, ApiError> {
        if !self.success {
            return Err(ApiError::application(
                self.message.unwrap_or_else(|| "request failed".into()),
            ));
        }
        self.data
            .ok_or_else(|| ApiError::Decode("missing response data".into()))
    }

    /// Like `into_result`, for endpoints whose payload is irrelevant.
    pub fn into_ack(self) -> Result<(), ApiError> {
        if self.success {
            Ok(())
        } else {
            Err(ApiError::application(
                self.message.unwrap_or_else(|| "request failed".into()),
            ))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiChat {
    #[serde(alias = "_id")]
    pub id: String,
    pub participants: Vec<String>,
    #[serde(default)]
    pub latest_message: Option<ApiMessage>,
    #[serde(default)]
    pub unread_count: u32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMessage {
    #[serde(alias = "_id")]
    pub id: String,
    pub chat_id: String,
    #[serde(alias = "sender")]
    pub sender_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub read_by: Vec<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<ApiMessage>,
    pub has_more: bool,
    pub page: u32,
    pub total_messages: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub unread_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub chat_id: String,
    pub sender_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

/// Request/response channel. Every call is independent; the engine may have
/// several in flight at once.
#[async_trait]
pub trait ChatApi: Send + Sync + 'static {
    async fn list_chats(&self, self_id: &str) -> Result<Vec<ApiChat>, ApiError>;
    async fn open_chat(&self, self_id: &str, peer_id: &str) -> Result<ApiChat, ApiError>;
    async fn mark_chat_read(&self, chat_id: &str, self_id: &str) -> Result<(), ApiError>;
    async fn delete_chat(&self, chat_id: &str, self_id: &str) -> Result<(), ApiError>;
    async fn list_messages(
        &self,
        chat_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage, ApiError>;
    async fn send_message(&self, message: NewMessage) -> Result<ApiMessage, ApiError>;
    async fn delete_message(&self, message_id: &str, self_id: &str) -> Result<(), ApiError>;
    async fn mark_message_read(
        &self,
        message_id: &str,
        self_id: &str,
    ) -> Result<ReadReceipt, ApiError>;
}

/// Outbound half of the push channel. Must not block.
pub trait PushChannel: Send + Sync + 'static {
    fn emit(&self, event: ClientEvent);
}

/// Client -> server push events, framed as `{ "event": ..., "data": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    UserConnect(String),
    SendMessage(PushOutgoingMessage),
    Typing(TypingPayload),
    StopTyping(TypingPayload),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::UserConnect(_) => "user_connect",
            ClientEvent::SendMessage(_) => "send_message",
            ClientEvent::Typing(_) => "typing",
            ClientEvent::StopTyping(_) => "stop_typing",
        }
    }
}

/// Server -> client push events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    OnlineUsers(Vec<String>),
    UserStatus(UserStatusPayload),
    ReceiveMessage(PushIncomingMessage),
    UserTyping(TypingPayload),
    UserStopTyping(TypingPayload),
}

impl ServerEvent {
    pub fn from_json(text: &str) -> Result<Self, ApiError> {
        serde_json::from_str(text).map_err(|e| ApiError::Decode(e.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::OnlineUsers(_) => "online_users",
            ServerEvent::UserStatus(_) => "user_status",
            ServerEvent::ReceiveMessage(_) => "receive_message",
            ServerEvent::UserTyping(_) => "user_typing",
            ServerEvent::UserStopTyping(_) => "user_stop_typing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOutgoingMessage {
    pub chat_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushIncomingMessage {
    pub chat_id: String,
    pub sender_id: String,
    pub text: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub chat_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusPayload {
    pub user_id: String,
    pub status: PresenceStatus,
}

impl ApiMessage {
    pub fn into_message(self) -> Message {
        let created_at = self.created_at.timestamp_millis();
        Message {
            id: self.id,
            local_id: None,
            chat_id: self.chat_id,
            sender_id: self.sender_id,
            text: self.text,
            image: self.image,
            read_by: self.read_by,
            reply_to: self.reply_to,
            created_at,
            updated_at: self
                .updated_at
                .map(|t| t.timestamp_millis())
                .unwrap_or(created_at),
            delivery: MessageDeliveryState::Confirmed,
            deleted: false,
        }
    }
}

impl ApiChat {
    /// Derived fields (`online`, `typing`) start cleared; the caller overlays them.
    pub fn into_chat(self) -> Chat {
        Chat {
            latest_message: self
                .latest_message
                .map(|m| MessagePreview::from(&m.into_message())),
            id: self.id,
            participants: self.participants,
            unread_count: self.unread_count,
            updated_at: self.updated_at.timestamp_millis(),
            online: false,
            typing: false,
            typing_user_id: None,
        }
    }
}
