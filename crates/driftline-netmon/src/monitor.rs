use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::types::{classify_from_bandwidth, classify_from_downlink, classify_from_latency, BandwidthClass, NetworkMonitorConfig, Quality};

/// Tracks online/offline state and a coarse connection-quality label.
///
/// A single process-wide instance is the expected usage; lifecycle is
/// explicit via [`NetworkMonitor::init`] / [`NetworkMonitor::destroy`].
pub struct NetworkMonitor {
    config: NetworkMonitorConfig,
    client: reqwest::Client,
    online_tx: watch::Sender<bool>,
    quality_tx: watch::Sender<Quality>,
    declared: Mutex<Option<BandwidthClass>>,
    downlink_mbps: Mutex<Option<f64>>,
    ping_task: Mutex<Option<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl NetworkMonitor {
    pub fn new(config: NetworkMonitorConfig) -> Arc<Self> {
        let (online_tx, _) = watch::channel(true);
        let (quality_tx, _) = watch::channel(Quality::Excellent);
        Arc::new(Self {
            client: reqwest::Client::builder()
                .timeout(config.ping_timeout)
                .build()
                .unwrap_or_default(),
            config,
            online_tx,
            quality_tx,
            declared: Mutex::new(None),
            downlink_mbps: Mutex::new(None),
            ping_task: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Starts the periodic ping probe used as a fallback signal when no
    /// declared bandwidth class or measured downlink is available.
    pub fn init(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let interval = this.config.ping_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if this.destroyed.load(Ordering::Acquire) {
                    break;
                }
                this.probe_and_update().await;
            }
        });
        *self.ping_task.lock().unwrap() = Some(handle);
    }

    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
        if let Some(handle) = self.ping_task.lock().unwrap().take() {
            handle.abort();
        }
    }

    pub fn is_online(&self) -> bool {
        *self.online_tx.borrow()
    }

    pub fn quality(&self) -> Quality {
        *self.quality_tx.borrow()
    }

    pub fn status(&self) -> watch::Receiver<bool> {
        self.online_tx.subscribe()
    }

    pub fn quality_stream(&self) -> watch::Receiver<Quality> {
        self.quality_tx.subscribe()
    }

    pub fn report_bandwidth_class(&self, class: BandwidthClass) {
        *self.declared.lock().unwrap() = Some(class);
        self.set_quality(classify_from_bandwidth(class));
        self.set_online(true);
    }

    pub fn report_downlink_mbps(&self, mbps: f64) {
        *self.downlink_mbps.lock().unwrap() = Some(mbps);
        if self.declared.lock().unwrap().is_none() {
            self.set_quality(classify_from_downlink(mbps));
        }
        self.set_online(true);
    }

    /// One-shot probe with the configured `pingTimeout`.
    pub async fn check_connectivity(&self) -> bool {
        self.probe_and_update().await
    }

    async fn probe_and_update(&self) -> bool {
        if self.declared.lock().unwrap().is_some() || self.downlink_mbps.lock().unwrap().is_some() {
            // A declared signal takes precedence; the probe still confirms
            // liveness but does not override the reported quality.
            let reachable = self.ping_once().await.is_some();
            self.set_online(reachable);
            return reachable;
        }

        match self.ping_once().await {
            Some(latency) => {
                self.set_online(true);
                self.set_quality(classify_from_latency(latency));
                true
            }
            None => {
                self.set_online(false);
                self.set_quality(Quality::Offline);
                false
            }
        }
    }

    async fn ping_once(&self) -> Option<std::time::Duration> {
        let started = Instant::now();
        let result = tokio::time::timeout(
            self.config.ping_timeout,
            self.client.head(&self.config.ping_url).send(),
        )
        .await;
        match result {
            Ok(Ok(response)) if response.status().is_success() || response.status().as_u16() == 204 => {
                Some(started.elapsed())
            }
            _ => None,
        }
    }

    fn set_online(&self, online: bool) {
        let was_online = *self.online_tx.borrow();
        let _ = self.online_tx.send(online);
        if online && !was_online {
            tracing::info!("network monitor: transitioned to online");
        } else if !online && was_online {
            tracing::info!("network monitor: transitioned to offline");
            let _ = self.quality_tx.send(Quality::Offline);
        }
    }

    fn set_quality(&self, quality: Quality) {
        let _ = self.quality_tx.send(quality);
    }
}
