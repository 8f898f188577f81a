// Argus Host Monitoring Service - Notifier
// Consumes alert events, renders templates once, dispatches across channels

use super::rate_limit::RateLimiter;
use super::templates::TemplateRegistry;
use super::{ChannelType, NotificationChannel, NotifierConfig};
use crate::alerts::{AlertEvent, AlertState};
use crate::clock::Clock;
use crate::pool::{string_pool, StringPool};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Dispatch state shared between the public handle and the consumer loop.
struct NotifyCore {
    channels: RwLock<HashMap<ChannelType, Arc<dyn NotificationChannel>>>,
    templates: TemplateRegistry,
    rate_limiter: RateLimiter,
    strings: StringPool,
}

impl NotifyCore {
    /// Handle one event: filter, render once, dispatch per channel.
    async fn process_event(&self, event: &AlertEvent) {
        if !is_relevant(event) {
            debug!(
                alert_id = %event.alert_id,
                from = %event.old_state,
                to = %event.new_state,
                "Ignoring uninteresting transition"
            );
            return;
        }

        let (subject, body) = match self.templates.render(event, &self.strings) {
            Ok(rendered) => rendered,
            Err(e) => {
                error!(alert_id = %event.alert_id, "Template rendering failed: {e}");
                return;
            }
        };

        for notification in event.config.notifications.iter().filter(|n| n.enabled) {
            let channel_type = notification.target.channel_type();
            let channel = {
                let channels = self.channels.read().expect("channel registry poisoned");
                channels.get(&channel_type).cloned()
            };
            let Some(channel) = channel else {
                warn!(
                    alert_id = %event.alert_id,
                    channel = %channel_type,
                    "No channel registered for notification target"
                );
                continue;
            };

            if !self.rate_limiter.allow(channel_type, &event.alert_id) {
                info!(
                    alert_id = %event.alert_id,
                    channel = %channel_type,
                    "Notification rate limited"
                );
                continue;
            }

            match channel.send(event, &subject, &body).await {
                Ok(()) => debug!(
                    alert_id = %event.alert_id,
                    channel = channel.name(),
                    "Notification delivered"
                ),
                Err(e) => error!(
                    alert_id = %event.alert_id,
                    channel = channel.name(),
                    "Notification delivery failed: {e}"
                ),
            }
        }

        self.strings.release(subject);
        self.strings.release(body);
    }
}

/// Event consumer bridging the evaluator to delivery channels.
///
/// Processes events strictly in arrival order. Rendering happens once per
/// event and is shared across channels; rate limiting and delivery failures
/// are per channel and never cascade.
pub struct Notifier {
    core: Arc<NotifyCore>,
    started: AtomicBool,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Notifier {
    pub fn new(config: &NotifierConfig, templates: TemplateRegistry, clock: Arc<dyn Clock>) -> Self {
        Self {
            core: Arc::new(NotifyCore {
                channels: RwLock::new(HashMap::new()),
                templates,
                rate_limiter: RateLimiter::new(
                    config.rate_limit,
                    config.rate_limit_window_secs,
                    clock,
                ),
                strings: string_pool(4),
            }),
            started: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Register a delivery channel. Later registrations of the same type
    /// replace earlier ones.
    pub fn register_channel(&self, channel: Arc<dyn NotificationChannel>) {
        info!(channel = channel.name(), "Registered notification channel");
        self.core
            .channels
            .write()
            .expect("channel registry poisoned")
            .insert(channel.channel_type(), channel);
    }

    /// Start consuming the evaluator's event stream.
    ///
    /// The loop exits when the channel closes (evaluator stopped) or on an
    /// explicit [`Notifier::stop`].
    pub async fn start(&self, mut events: mpsc::Receiver<AlertEvent>) {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Notifier already started");
            return;
        }

        info!("Starting notifier");

        let (tx, mut rx) = watch::channel(false);
        *self.shutdown.lock().await = Some(tx);

        let core = Arc::clone(&self.core);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => {
                        match event {
                            Some(event) => core.process_event(&event).await,
                            None => {
                                debug!("Event channel closed, notifier loop exiting");
                                break;
                            }
                        }
                    }
                    _ = rx.changed() => {
                        debug!("Notifier shutdown requested");
                        break;
                    }
                }
            }
        });
        *self.handle.lock().await = Some(handle);
    }

    /// Stop the consumer loop and wait for it to exit.
    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("Notifier loop join failed: {e}");
            }
        }
        info!("Notifier stopped");
    }

    /// Handle one event outside the consumer loop.
    pub async fn process_event(&self, event: &AlertEvent) {
        self.core.process_event(event).await;
    }
}

/// Only activations and active-to-inactive resolutions notify.
fn is_relevant(event: &AlertEvent) -> bool {
    match event.new_state {
        AlertState::Active => true,
        AlertState::Inactive => event.old_state == AlertState::Active,
        AlertState::Pending => false,
    }
}
