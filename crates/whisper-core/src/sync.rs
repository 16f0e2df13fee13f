//! Polling synchronization for a single chat.
//!
//! [`ChatSync::refresh`] reloads the chat on demand; [`ChatSync::spawn`] runs
//! the same refresh on a tokio interval. Every successful load is published
//! on a `watch` channel. A failed refresh is logged and leaves the last
//! published view in place.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use whisper_proto::Address;

use crate::client::{ChatClient, ChatView};
use crate::errors::ClientError;

pub struct ChatSync {
    client: Arc<ChatClient>,
    chat: Address,
    latest: watch::Sender<Option<ChatView>>,
}

impl ChatSync {
    pub fn new(client: Arc<ChatClient>, chat: Address) -> Self {
        let (latest, _) = watch::channel(None);
        Self { client, chat, latest }
    }

    pub fn chat(&self) -> &Address {
        &self.chat
    }

    /// Receiver that sees every published view. `None` means "not loaded
    /// yet" or "chat does not exist".
    pub fn subscribe(&self) -> watch::Receiver<Option<ChatView>> {
        self.latest.subscribe()
    }

    /// Most recently published view.
    pub fn latest(&self) -> Option<ChatView> {
        self.latest.borrow().clone()
    }

    /// Reload the chat now and publish the result.
    pub async fn refresh(&self) -> Result<Option<ChatView>, ClientError> {
        let view = self.client.load_chat_at(&self.chat).await?;
        debug!(
            chat = %hex::encode(self.chat.as_bytes()),
            messages = view.as_ref().map_or(0, |v| v.messages.len()),
            "chat refreshed"
        );
        self.latest.send_replace(view.clone());
        Ok(view)
    }

    /// Refresh every `interval` until the returned task is aborted.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.refresh().await {
                    warn!(
                        chat = %hex::encode(self.chat.as_bytes()),
                        error = %e,
                        "chat refresh failed, keeping last view"
                    );
                }
            }
        })
    }
}
