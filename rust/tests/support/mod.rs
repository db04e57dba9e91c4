#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chatsync_core::api::{ApiChat, ApiMessage, MessagePage, NewMessage, ReadReceipt};
use chatsync_core::{ApiError, AppReconciler, AppUpdate, ChatApi, ClientEvent, PushChannel};
use chrono::{DateTime, TimeZone, Utc};

pub fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

pub fn write_config(data_dir: &str, v: serde_json::Value) {
    let path = std::path::Path::new(data_dir).join("chatsync_config.json");
    std::fs::write(path, serde_json::to_vec(&v).unwrap()).unwrap();
}

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn api_chat(id: &str, participants: &[&str], unread: u32, updated_secs: i64) -> ApiChat {
    ApiChat {
        id: id.into(),
        participants: participants.iter().map(|p| p.to_string()).collect(),
        latest_message: None,
        unread_count: unread,
        updated_at: ts(updated_secs),
    }
}

pub fn api_message(id: &str, chat_id: &str, sender: &str, text: &str, secs: i64) -> ApiMessage {
    ApiMessage {
        id: id.into(),
        chat_id: chat_id.into(),
        sender_id: sender.into(),
        text: text.into(),
        image: None,
        read_by: vec![],
        reply_to: None,
        created_at: ts(secs),
        updated_at: None,
    }
}

/// Releases one held call per `open()`.
#[derive(Clone)]
pub struct Gate {
    tx: flume::Sender<()>,
    rx: flume::Receiver<()>,
}

impl Gate {
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { tx, rx }
    }

    pub fn open(&self) {
        self.tx.send(()).unwrap();
    }

    async fn pass(&self) {
        let _ = self.rx.recv_async().await;
    }
}

#[derive(Default)]
struct Store {
    chats: Vec<ApiChat>,
    // chat_id -> ascending by created_at.
    messages: HashMap<String, Vec<ApiMessage>>,
    next_id: u64,
    fail_sends: usize,
    fail_list_chats: Option<ApiError>,
}

/// In-memory backend with the REST semantics the engine expects.
#[derive(Default)]
pub struct FakeChatApi {
    store: Mutex<Store>,
    send_gate: Mutex<Option<Gate>>,
    page_gate: Mutex<Option<Gate>>,
    pub list_messages_calls: AtomicUsize,
    pub send_calls: AtomicUsize,
    pub mark_chat_read_calls: AtomicUsize,
}

impl FakeChatApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_chat(&self, chat: ApiChat) {
        self.store.lock().unwrap().chats.push(chat);
    }

    pub fn add_message(&self, msg: ApiMessage) {
        let mut store = self.store.lock().unwrap();
        let list = store.messages.entry(msg.chat_id.clone()).or_default();
        list.push(msg);
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    }

    pub fn unread(&self, chat_id: &str) -> Option<u32> {
        let store = self.store.lock().unwrap();
        store
            .chats
            .iter()
            .find(|c| c.id == chat_id)
            .map(|c| c.unread_count)
    }

    pub fn fail_next_sends(&self, n: usize) {
        self.store.lock().unwrap().fail_sends = n;
    }

    pub fn fail_list_chats(&self, err: ApiError) {
        self.store.lock().unwrap().fail_list_chats = Some(err);
    }

    /// Hold every `send_message` until the returned gate is opened.
    pub fn gate_sends(&self) -> Gate {
        let gate = Gate::new();
        *self.send_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Hold every `list_messages` until the returned gate is opened.
    pub fn gate_pages(&self) -> Gate {
        let gate = Gate::new();
        *self.page_gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl ChatApi for FakeChatApi {
    async fn list_chats(&self, self_id: &str) -> Result<Vec<ApiChat>, ApiError> {
        let mut store = self.store.lock().unwrap();
        if let Some(err) = store.fail_list_chats.take() {
            return Err(err);
        }
        Ok(store
            .chats
            .iter()
            .filter(|c| c.participants.iter().any(|p| p == self_id))
            .cloned()
            .collect())
    }

    async fn open_chat(&self, self_id: &str, peer_id: &str) -> Result<ApiChat, ApiError> {
        let mut store = self.store.lock().unwrap();
        let existing = store.chats.iter().find(|c| {
            c.participants.len() == 2
                && c.participants.iter().any(|p| p == self_id)
                && c.participants.iter().any(|p| p == peer_id)
        });
        if let Some(c) = existing {
            return Ok(c.clone());
        }
        store.next_id += 1;
        let chat = ApiChat {
            id: format!("chat{}", store.next_id),
            participants: vec![self_id.to_string(), peer_id.to_string()],
            latest_message: None,
            unread_count: 0,
            updated_at: Utc::now(),
        };
        store.chats.push(chat.clone());
        Ok(chat)
    }

    async fn mark_chat_read(&self, chat_id: &str, _self_id: &str) -> Result<(), ApiError> {
        self.mark_chat_read_calls.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        match store.chats.iter_mut().find(|c| c.id == chat_id) {
            Some(c) => {
                c.unread_count = 0;
                Ok(())
            }
            None => Err(ApiError::application("Chat not found")),
        }
    }

    async fn delete_chat(&self, chat_id: &str, _self_id: &str) -> Result<(), ApiError> {
        let mut store = self.store.lock().unwrap();
        store.chats.retain(|c| c.id != chat_id);
        Ok(())
    }

    async fn list_messages(
        &self,
        chat_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage, ApiError> {
        self.list_messages_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.page_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        let store = self.store.lock().unwrap();
        let all = store.messages.get(chat_id).cloned().unwrap_or_default();
        let total = all.len();
        // Page 1 is the newest `limit` messages.
        let skip = (page.saturating_sub(1) * limit) as usize;
        let end = total.saturating_sub(skip);
        let start = end.saturating_sub(limit as usize);
        Ok(MessagePage {
            messages: all[start..end].to_vec(),
            has_more: start > 0,
            page,
            total_messages: total as u64,
        })
    }

    async fn send_message(&self, message: NewMessage) -> Result<ApiMessage, ApiError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.send_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        let mut store = self.store.lock().unwrap();
        if store.fail_sends > 0 {
            store.fail_sends -= 1;
            return Err(ApiError::Transport("connection reset".into()));
        }
        store.next_id += 1;
        let msg = ApiMessage {
            id: format!("m{}", store.next_id),
            chat_id: message.chat_id,
            sender_id: message.sender_id,
            text: message.text,
            image: message.image,
            read_by: vec![],
            reply_to: message.reply_to,
            created_at: Utc::now(),
            updated_at: None,
        };
        store
            .messages
            .entry(msg.chat_id.clone())
            .or_default()
            .push(msg.clone());
        Ok(msg)
    }

    async fn delete_message(&self, message_id: &str, _self_id: &str) -> Result<(), ApiError> {
        let mut store = self.store.lock().unwrap();
        for list in store.messages.values_mut() {
            if let Some(m) = list.iter_mut().find(|m| m.id == message_id) {
                m.text = "This message was deleted".into();
                m.image = None;
                return Ok(());
            }
        }
        Err(ApiError::application("Message not found"))
    }

    async fn mark_message_read(
        &self,
        message_id: &str,
        self_id: &str,
    ) -> Result<ReadReceipt, ApiError> {
        let mut store = self.store.lock().unwrap();
        let mut chat_id = None;
        for list in store.messages.values_mut() {
            if let Some(m) = list.iter_mut().find(|m| m.id == message_id) {
                if !m.read_by.iter().any(|r| r == self_id) {
                    m.read_by.push(self_id.to_string());
                }
                chat_id = Some(m.chat_id.clone());
            }
        }
        let chat_id = chat_id.ok_or_else(|| ApiError::application("Message not found"))?;
        let chat = store
            .chats
            .iter_mut()
            .find(|c| c.id == chat_id)
            .ok_or_else(|| ApiError::application("Chat not found"))?;
        chat.unread_count = chat.unread_count.saturating_sub(1);
        Ok(ReadReceipt {
            unread_count: chat.unread_count,
        })
    }
}

/// Records outbound push events.
#[derive(Default)]
pub struct RecordingPush {
    events: Mutex<Vec<ClientEvent>>,
}

impl RecordingPush {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ClientEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.name() == name)
            .count()
    }
}

impl PushChannel for RecordingPush {
    fn emit(&self, event: ClientEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct TestReconciler {
    updates: Arc<Mutex<Vec<AppUpdate>>>,
}

impl TestReconciler {
    pub fn new() -> (Self, Arc<Mutex<Vec<AppUpdate>>>) {
        let updates = Arc::new(Mutex::new(vec![]));
        (
            Self {
                updates: updates.clone(),
            },
            updates,
        )
    }
}

impl AppReconciler for TestReconciler {
    fn reconcile(&self, update: AppUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}
