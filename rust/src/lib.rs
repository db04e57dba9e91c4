mod actions;
pub mod api;
mod core;
mod http;
mod logging;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use anyhow::Context;
use flume::{Receiver, Sender};

pub use actions::AppAction;
pub use api::{ApiError, ChatApi, ClientEvent, PushChannel, ServerEvent};
pub use http::HttpChatApi;
pub use logging::init_logging;
pub use state::*;
pub use updates::*;

/// Return the default `chatsync_config.json` payload used when no config file exists.
pub fn default_config_json() -> String {
    core::default_app_config_json()
}

pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

/// Host handle. Owns the queue into the actor thread, which owns all state.
pub struct ChatSyncApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
}

impl ChatSyncApp {
    pub fn new(
        data_dir: impl Into<String>,
        api: Arc<dyn ChatApi>,
        push: Arc<dyn PushChannel>,
    ) -> anyhow::Result<Arc<Self>> {
        let data_dir = data_dir.into();
        logging::init_logging();
        tracing::info!(data_dir = %data_dir, "ChatSyncApp::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("chatsync-io")
            .enable_all()
            .build()
            .context("build tokio runtime")?;

        // Actor loop thread (single threaded "app actor").
        let deps = core::CoreDeps {
            update_sender: update_tx,
            core_sender: core_tx.clone(),
            shared_state: shared_state.clone(),
            runtime,
            api,
            push,
        };
        thread::Builder::new()
            .name("chatsync-core".into())
            .spawn(move || {
                let mut core = core::AppCore::new(deps, &data_dir);
                while let Ok(msg) = core_rx.recv() {
                    if matches!(msg, CoreMsg::Shutdown) {
                        tracing::info!("actor shutting down");
                        break;
                    }
                    core.handle_message(msg);
                }
            })
            .context("spawn actor thread")?;

        Ok(Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
        }))
    }

    /// Build with the reqwest REST adapter pointed at the configured `api_base_url`.
    pub fn with_http(
        data_dir: impl Into<String>,
        push: Arc<dyn PushChannel>,
    ) -> anyhow::Result<Arc<Self>> {
        let data_dir = data_dir.into();
        let base_url = core::load_app_config(&data_dir)
            .api_base_url
            .filter(|u| !u.trim().is_empty())
            .context("api_base_url missing from chatsync_config.json")?;
        let api: Arc<dyn ChatApi> = Arc::new(HttpChatApi::new(base_url));
        Self::new(data_dir, api, push)
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    /// Like `dispatch`, but the outcome is delivered on the returned channel.
    pub fn request(&self, action: AppAction) -> Receiver<ActionOutcome> {
        let (tx, rx) = flume::bounded(1);
        let _ = self.core_tx.send(CoreMsg::Request(action, tx));
        rx
    }

    pub fn push_sink(&self) -> PushSink {
        PushSink {
            core_tx: self.core_tx.clone(),
        }
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }
}

impl Drop for ChatSyncApp {
    fn drop(&mut self) {
        let _ = self.core_tx.send(CoreMsg::Shutdown);
    }
}

/// Entry point for whatever owns the push socket.
#[derive(Clone)]
pub struct PushSink {
    core_tx: Sender<CoreMsg>,
}

impl PushSink {
    pub fn deliver(&self, event: ServerEvent) {
        let _ = self.core_tx.send(CoreMsg::Push(event));
    }

    /// Decode a `{ "event": ..., "data": ... }` frame and deliver it.
    pub fn deliver_json(&self, text: &str) -> Result<(), ApiError> {
        let event = ServerEvent::from_json(text)?;
        self.deliver(event);
        Ok(())
    }
}
