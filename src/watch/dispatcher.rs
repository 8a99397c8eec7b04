use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::FutureExt;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::WatchCallback;
use super::WatchEvent;
use crate::async_task::task_with_timeout_and_exponential_backoff;
use crate::metrics::CALLBACK_FAILURES;
use crate::metrics::WATCH_EVENTS;
use crate::Result;
use crate::StoreGateway;
use crate::WatchConfig;
use crate::WatchStream;

pub type WatchId = u64;

struct Subscription {
    callbacks: Vec<(WatchId, Arc<dyn WatchCallback>)>,
    cancel: CancellationToken,
    /// Cleared when the pump exits
    live: Arc<AtomicBool>,
}

struct Delivery {
    prefix: String,
    event: WatchEvent,
}

type Registry = Arc<Mutex<HashMap<String, Subscription>>>;

/// Bridges backend watch streams into ordered callback invocations.
///
/// Each watched prefix has one backend watch read by its own pump task. Pumps
/// hand events through a bounded queue to a single dispatch task, which runs
/// callbacks one at a time in arrival order.
pub struct WatchDispatcher {
    gateway: Arc<StoreGateway>,
    config: WatchConfig,
    subscriptions: Registry,
    next_id: AtomicU64,
    /// Serializes backend watch setup so each prefix gets exactly one
    setup_lock: tokio::sync::Mutex<()>,
    tx: mpsc::Sender<Delivery>,
    rx: Mutex<Option<mpsc::Receiver<Delivery>>>,
    shutdown: CancellationToken,
    dispatch_handle: Mutex<Option<JoinHandle<()>>>,
}

impl WatchDispatcher {
    pub fn new(
        gateway: Arc<StoreGateway>,
        config: WatchConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.event_queue_size);
        Self {
            gateway,
            config,
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            setup_lock: tokio::sync::Mutex::new(()),
            tx,
            rx: Mutex::new(Some(rx)),
            shutdown: CancellationToken::new(),
            dispatch_handle: Mutex::new(None),
        }
    }

    /// Spawn the dispatch task. Calling it again has no effect.
    pub fn start(&self) {
        let Some(rx) = self.rx.lock().take() else {
            return;
        };
        let handle = tokio::spawn(run_dispatch(
            rx,
            self.subscriptions.clone(),
            self.shutdown.clone(),
        ));
        *self.dispatch_handle.lock() = Some(handle);
        debug!("Watch dispatcher started");
    }

    /// Cancel every backend watch and the dispatch task
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let drained: Vec<Subscription> = self.subscriptions.lock().drain().map(|(_, s)| s).collect();
        for subscription in drained {
            subscription.cancel.cancel();
        }

        let handle = self.dispatch_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("dispatch task failed: {:?}", e);
            }
        }
        info!("Watch dispatcher stopped");
    }

    /// Register `callback` on `prefix`. The first registration on a prefix
    /// opens the backend watch; later ones share it.
    pub async fn watch(
        &self,
        prefix: &str,
        callback: Arc<dyn WatchCallback>,
    ) -> Result<WatchId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if self.attach(prefix, id, &callback) {
            return Ok(id);
        }

        let _guard = self.setup_lock.lock().await;
        if self.attach(prefix, id, &callback) {
            return Ok(id);
        }

        let stream = self.gateway.watch_prefix(prefix).await?;
        let cancel = self.shutdown.child_token();
        let live = Arc::new(AtomicBool::new(true));
        self.subscriptions.lock().insert(
            prefix.to_string(),
            Subscription {
                callbacks: vec![(id, callback)],
                cancel: cancel.clone(),
                live: live.clone(),
            },
        );

        tokio::spawn(run_pump(Pump {
            prefix: prefix.to_string(),
            gateway: self.gateway.clone(),
            config: self.config.clone(),
            tx: self.tx.clone(),
            cancel,
            live,
        }, stream));

        info!(prefix = %prefix, "Backend watch started");
        Ok(id)
    }

    /// Remove one callback. The backend watch is cancelled with the last one.
    pub fn unwatch(
        &self,
        prefix: &str,
        id: WatchId,
    ) -> bool {
        let mut subscriptions = self.subscriptions.lock();
        let Some(subscription) = subscriptions.get_mut(prefix) else {
            return false;
        };

        let before = subscription.callbacks.len();
        subscription.callbacks.retain(|(cid, _)| *cid != id);
        let removed = subscription.callbacks.len() != before;

        if subscription.callbacks.is_empty() {
            if let Some(subscription) = subscriptions.remove(prefix) {
                subscription.cancel.cancel();
                info!(prefix = %prefix, "Backend watch cancelled");
            }
        }
        removed
    }

    /// Number of prefixes with a backend watch
    pub fn prefix_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    pub fn callback_count(
        &self,
        prefix: &str,
    ) -> usize {
        self.subscriptions
            .lock()
            .get(prefix)
            .map(|s| s.callbacks.len())
            .unwrap_or(0)
    }

    /// Whether the backend watch on `prefix` is still delivering
    pub fn is_live(
        &self,
        prefix: &str,
    ) -> bool {
        self.subscriptions
            .lock()
            .get(prefix)
            .map(|s| s.live.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    fn attach(
        &self,
        prefix: &str,
        id: WatchId,
        callback: &Arc<dyn WatchCallback>,
    ) -> bool {
        match self.subscriptions.lock().get_mut(prefix) {
            Some(subscription) => {
                subscription.callbacks.push((id, callback.clone()));
                true
            }
            None => false,
        }
    }
}

async fn run_dispatch(
    mut rx: mpsc::Receiver<Delivery>,
    subscriptions: Registry,
    shutdown: CancellationToken,
) {
    loop {
        let delivery = tokio::select! {
            _ = shutdown.cancelled() => break,
            delivery = rx.recv() => match delivery {
                Some(d) => d,
                None => break,
            },
        };
        dispatch(&subscriptions, delivery).await;
    }
    debug!("dispatch task exited");
}

async fn dispatch(
    subscriptions: &Registry,
    delivery: Delivery,
) {
    let callbacks = subscriptions
        .lock()
        .get(&delivery.prefix)
        .map(|s| s.callbacks.clone())
        .unwrap_or_default();

    for (id, callback) in callbacks {
        match AssertUnwindSafe(callback.on_event(&delivery.event)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                CALLBACK_FAILURES.inc();
                warn!(
                    prefix = %delivery.prefix,
                    watch_id = id,
                    key = %delivery.event.key(),
                    error = %e,
                    "Watch callback failed"
                );
            }
            Err(_) => {
                CALLBACK_FAILURES.inc();
                error!(
                    prefix = %delivery.prefix,
                    watch_id = id,
                    key = %delivery.event.key(),
                    "Watch callback panicked"
                );
            }
        }
    }
}

struct Pump {
    prefix: String,
    gateway: Arc<StoreGateway>,
    config: WatchConfig,
    tx: mpsc::Sender<Delivery>,
    cancel: CancellationToken,
    live: Arc<AtomicBool>,
}

/// Reads one backend stream and forwards its events to the dispatch task
async fn run_pump(
    pump: Pump,
    mut stream: WatchStream,
) {
    loop {
        if !forward(&pump, &mut stream).await {
            break;
        }

        if !pump.config.resubscribe_on_disconnect {
            info!(prefix = %pump.prefix, "Watch stream ended");
            break;
        }

        warn!(prefix = %pump.prefix, "Watch stream ended, resubscribing");
        let resubscribe = task_with_timeout_and_exponential_backoff(
            &pump.prefix,
            || pump.gateway.watch_prefix(&pump.prefix),
            pump.config.resubscribe,
        );
        stream = tokio::select! {
            _ = pump.cancel.cancelled() => break,
            result = resubscribe => match result {
                Ok(stream) => stream,
                Err(e) => {
                    error!(prefix = %pump.prefix, error = %e, "Giving up on watch");
                    break;
                }
            },
        };
        info!(prefix = %pump.prefix, "Watch re-established");
    }
    pump.live.store(false, Ordering::Release);
}

/// Returns `false` when the pump was cancelled or the dispatcher is gone,
/// `true` when the backend stream ended.
async fn forward(
    pump: &Pump,
    stream: &mut WatchStream,
) -> bool {
    loop {
        let next = tokio::select! {
            _ = pump.cancel.cancelled() => return false,
            next = stream.next() => next,
        };

        let raw = match next {
            Some(Ok(raw)) => raw,
            Some(Err(e)) => {
                warn!(prefix = %pump.prefix, error = %e, "Watch stream failed");
                return true;
            }
            None => return true,
        };

        let event = WatchEvent::from_raw(raw);
        WATCH_EVENTS.with_label_values(&[event.kind_label()]).inc();
        let delivery = Delivery {
            prefix: pump.prefix.clone(),
            event,
        };

        tokio::select! {
            _ = pump.cancel.cancelled() => return false,
            sent = pump.tx.send(delivery) => {
                if sent.is_err() {
                    return false;
                }
            }
        }
    }
}
