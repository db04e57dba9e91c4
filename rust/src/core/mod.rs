mod chats;
mod config;
mod inbound;
mod messages;
mod presence;
mod reconcile;
mod session;
mod typing;

pub(crate) use config::{default_app_config_json, load_app_config};

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use flume::Sender;

use crate::actions::AppAction;
use crate::api::{ApiError, ChatApi, PushChannel};
use crate::state::{AppState, BusyState};
use crate::updates::{send_reply, ActionOutcome, AppUpdate, CoreMsg, InternalEvent, Reply};

use presence::PresenceTracker;
use reconcile::MessageReconciler;
use typing::TypingCoordinator;

/// The single-threaded owner of all chat state. Every input arrives as a
/// `CoreMsg` and is applied to completion before the next one is looked at.
pub struct AppCore {
    pub state: AppState,
    rev: u64,
    last_outgoing_ts: i64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    config: config::AppConfig,
    runtime: tokio::runtime::Runtime,
    api: Arc<dyn ChatApi>,
    push: Arc<dyn PushChannel>,

    reconciler: MessageReconciler,
    presence: PresenceTracker,
    typing: TypingCoordinator,

    // (chat_id, page) requests awaiting a response.
    pages_in_flight: HashSet<(String, u32)>,
    // Bumped on every chat removal. Requests carry the value current when
    // they were issued; a response older than its chat's removal is dropped.
    removal_epoch: u64,
    removed_at: HashMap<String, u64>,
    // chat_id -> canonical ids a push was already folded into.
    push_claims: HashMap<String, HashSet<String>>,
}

pub(crate) struct CoreDeps {
    pub(crate) update_sender: Sender<AppUpdate>,
    pub(crate) core_sender: Sender<CoreMsg>,
    pub(crate) shared_state: Arc<RwLock<AppState>>,
    pub(crate) runtime: tokio::runtime::Runtime,
    pub(crate) api: Arc<dyn ChatApi>,
    pub(crate) push: Arc<dyn PushChannel>,
}

impl AppCore {
    pub(crate) fn new(deps: CoreDeps, data_dir: &str) -> Self {
        let config = config::load_app_config(data_dir);
        tracing::debug!(?config, "config loaded");

        let this = Self {
            state: AppState::empty(),
            rev: 0,
            last_outgoing_ts: 0,
            update_sender: deps.update_sender,
            core_sender: deps.core_sender,
            shared_state: deps.shared_state,
            reconciler: MessageReconciler::new(config.push_dedup_window_ms()),
            presence: PresenceTracker::default(),
            typing: TypingCoordinator::new(
                config.typing_idle_timeout(),
                config.inbound_typing_timeout(),
            ),
            config,
            runtime: deps.runtime,
            api: deps.api,
            push: deps.push,
            pages_in_flight: HashSet::new(),
            removal_epoch: 0,
            removed_at: HashMap::new(),
            push_claims: HashMap::new(),
        };

        // Ensure ChatSyncApp::state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    /// Re-derive presence/typing flags and chat order, then publish.
    fn emit_state(&mut self) {
        self.refresh_derived();
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn refresh_derived(&mut self) {
        let self_id = self.state.self_id.clone();
        self.presence
            .overlay(&mut self.state.chat_list, self_id.as_deref());
        self.typing.overlay(&mut self.state.chat_list);
        reconcile::sort_chat_list(&mut self.state.chat_list);
        if self.state.online_users != *self.presence.online() {
            self.state.online_users = self.presence.online().clone();
        }
    }

    fn set_busy(&mut self, f: impl FnOnce(&mut BusyState)) {
        let mut next = self.state.busy.clone();
        f(&mut next);
        if next != self.state.busy {
            self.state.busy = next;
            self.emit_state();
        }
    }

    fn record_error(&mut self, context: &str, err: &ApiError) {
        tracing::warn!(%err, context, "operation failed");
        self.state.error = Some(format!("{context}: {err}"));
    }

    fn remember_self(&mut self, self_id: &str) {
        if self.state.self_id.as_deref() != Some(self_id) {
            tracing::info!(self_id, "session user set");
            self.state.self_id = Some(self_id.to_string());
        }
    }

    /// Removed locally and not listed again since.
    fn chat_is_gone(&self, chat_id: &str) -> bool {
        self.removed_at.contains_key(chat_id) && self.state.chat(chat_id).is_none()
    }

    /// True when `chat_id` was removed after a request stamped `epoch` went out.
    fn removed_since(&self, chat_id: &str, epoch: u64) -> bool {
        self.removed_at.get(chat_id).is_some_and(|at| *at > epoch)
    }

    /// Run one request/response call off the actor; its result comes back
    /// as an `InternalEvent` on the core queue.
    fn spawn_api<F, Fut>(&self, call: F)
    where
        F: FnOnce(Arc<dyn ChatApi>) -> Fut + Send + 'static,
        Fut: Future<Output = InternalEvent> + Send + 'static,
    {
        let api = self.api.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let event = call(api).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(event)));
        });
    }

    fn spawn_timer(&self, after: Duration, event: InternalEvent) {
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(event)));
        });
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => {
                // Never log `?action` directly: it carries message text.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action, None);
            }
            CoreMsg::Request(action, reply) => {
                tracing::info!(action = action.tag(), "request");
                self.handle_action(action, Some(reply));
            }
            CoreMsg::Push(event) => {
                tracing::debug!(event = event.name(), "push");
                self.handle_push(event);
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
            CoreMsg::Shutdown => {}
        }
    }

    fn handle_action(&mut self, action: AppAction, reply: Reply) {
        match action {
            // Session
            AppAction::Connect { self_id } => self.connect(self_id, reply),
            AppAction::Disconnect => self.disconnect(reply),

            // Chats
            AppAction::LoadChats { self_id } => self.load_chats(self_id, reply),
            AppAction::OpenOrCreateChat { self_id, peer_id } => {
                self.open_or_create_chat(self_id, peer_id, reply)
            }
            AppAction::SelectChat { chat_id } => self.select_chat(chat_id, reply),
            AppAction::AcknowledgeRead { chat_id, self_id } => {
                self.acknowledge_read(chat_id, self_id, reply)
            }
            AppAction::RemoveChat { chat_id, self_id } => self.remove_chat(chat_id, self_id, reply),

            // Messages
            AppAction::LoadMessages {
                chat_id,
                self_id,
                page,
                page_size,
            } => self.load_messages(chat_id, self_id, page, page_size, reply),
            AppAction::SendMessage {
                chat_id,
                self_id,
                text,
                image,
                reply_to,
            } => self.send_message(chat_id, self_id, text, image, reply_to, reply),
            AppAction::RetryMessage { chat_id, local_id } => {
                self.retry_message(chat_id, local_id, reply)
            }
            AppAction::DeleteMessage {
                message_id,
                self_id,
                chat_id,
            } => self.delete_message(message_id, self_id, chat_id, reply),
            AppAction::MarkMessageRead {
                message_id,
                self_id,
                chat_id,
            } => self.mark_message_read(message_id, self_id, chat_id, reply),

            // Typing
            AppAction::TypingKeystroke { chat_id } => self.typing_keystroke(chat_id, reply),
            AppAction::StopTyping { chat_id } => self.stop_typing(chat_id, reply),

            // UI
            AppAction::ClearError => {
                if self.state.error.take().is_some() {
                    self.emit_state();
                }
                send_reply(reply, ActionOutcome::Done);
            }
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::ChatsLoaded {
                self_id,
                epoch,
                result,
                reply,
            } => self.on_chats_loaded(self_id, epoch, result, reply),
            InternalEvent::ChatOpened { result, reply } => self.on_chat_opened(result, reply),
            InternalEvent::ChatReadAcknowledged {
                chat_id,
                result,
                reply,
            } => self.on_chat_read_acknowledged(chat_id, result, reply),
            InternalEvent::ChatRemoved {
                chat_id,
                result,
                reply,
            } => self.on_chat_removed(chat_id, result, reply),
            InternalEvent::MessagesLoaded {
                chat_id,
                self_id,
                page,
                epoch,
                result,
                reply,
            } => self.on_messages_loaded(chat_id, self_id, page, epoch, result, reply),
            InternalEvent::MessageSendResult {
                message,
                epoch,
                result,
                reply,
            } => self.on_message_send_result(message, epoch, result, reply),
            InternalEvent::MessageDeleted {
                chat_id,
                message_id,
                result,
                reply,
            } => self.on_message_deleted(chat_id, message_id, result, reply),
            InternalEvent::MessageReadResult {
                chat_id,
                message_id,
                self_id,
                epoch,
                result,
                reply,
            } => self.on_message_read(chat_id, message_id, self_id, epoch, result, reply),
            InternalEvent::TypingIdle { chat_id, token } => self.on_typing_idle(&chat_id, token),
            InternalEvent::InboundTypingExpired { chat_id, token } => {
                self.on_inbound_typing_expired(&chat_id, token)
            }
        }
    }
}
