// reqwest-backed `ChatApi`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::{
    ApiChat, ApiError, ApiMessage, ApiResponse, ChatApi, MessagePage, NewMessage, ReadReceipt,
};

#[derive(Clone)]
pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRef<'a> {
    chat_id: &'a str,
    self_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageRef<'a> {
    message_id: &'a str,
    self_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OpenChat<'a> {
    self_id: &'a str,
    peer_id: &'a str,
}

impl HttpChatApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// `base_url` plus `segments`, each percent-encoded as one path segment.
    fn url(&self, segments: &[&str]) -> Result<reqwest::Url, ApiError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ApiError::Transport(format!("bad base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::Transport(format!("base url has no path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<ApiResponse<T>, ApiError> {
        let resp = req
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        match serde_json::from_slice::<ApiResponse<T>>(&body) {
            Ok(envelope) => Ok(envelope),
            // Error pages from proxies etc. are not envelopes.
            Err(_) if !status.is_success() => Err(ApiError::Transport(format!("http {status}"))),
            Err(e) => Err(ApiError::Decode(e.to_string())),
        }
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn list_chats(&self, self_id: &str) -> Result<Vec<ApiChat>, ApiError> {
        let req = self.client.get(self.url(&["chats", self_id])?);
        self.call(req).await?.into_result()
    }

    async fn open_chat(&self, self_id: &str, peer_id: &str) -> Result<ApiChat, ApiError> {
        let req = self
            .client
            .post(self.url(&["chats"])?)
            .json(&OpenChat { self_id, peer_id });
        self.call(req).await?.into_result()
    }

    async fn mark_chat_read(&self, chat_id: &str, self_id: &str) -> Result<(), ApiError> {
        let req = self
            .client
            .put(self.url(&["chats", "read"])?)
            .json(&ChatRef { chat_id, self_id });
        self.call::<serde_json::Value>(req).await?.into_ack()
    }

    async fn delete_chat(&self, chat_id: &str, self_id: &str) -> Result<(), ApiError> {
        let req = self
            .client
            .delete(self.url(&["chats"])?)
            .json(&ChatRef { chat_id, self_id });
        self.call::<serde_json::Value>(req).await?.into_ack()
    }

    async fn list_messages(
        &self,
        chat_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage, ApiError> {
        let req = self
            .client
            .get(self.url(&["messages", chat_id])?)
            .query(&[("page", page), ("limit", limit)]);
        self.call(req).await?.into_result()
    }

    async fn send_message(&self, message: NewMessage) -> Result<ApiMessage, ApiError> {
        let req = self.client.post(self.url(&["messages"])?).json(&message);
        self.call(req).await?.into_result()
    }

    async fn delete_message(&self, message_id: &str, self_id: &str) -> Result<(), ApiError> {
        let req = self
            .client
            .delete(self.url(&["messages"])?)
            .json(&MessageRef {
                message_id,
                self_id,
            });
        self.call::<serde_json::Value>(req).await?.into_ack()
    }

    async fn mark_message_read(
        &self,
        message_id: &str,
        self_id: &str,
    ) -> Result<ReadReceipt, ApiError> {
        let req = self
            .client
            .put(self.url(&["messages", "read"])?)
            .json(&MessageRef {
                message_id,
                self_id,
            });
        self.call(req).await?.into_result()
    }
}
