use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use shared::domain::{ConnectionType, NetworkStatus};
use tokio::{
    sync::watch,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info};
use url::Url;

use crate::ticker::ScheduledTask;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn probe(&self) -> NetworkStatus;
}

/// Reports online whenever the endpoint answers at all, whatever the status.
pub struct HttpProbe {
    http: Client,
    url: Url,
}

impl HttpProbe {
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build connectivity probe client")?;
        Ok(Self { http, url })
    }

    pub fn parse(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("invalid probe url: {url}"))?;
        Self::new(url, timeout)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn probe(&self) -> NetworkStatus {
        match self.http.head(self.url.clone()).send().await {
            Ok(response) => {
                debug!("network: probe {} -> {}", self.url, response.status());
                NetworkStatus::online(ConnectionType::Unknown)
            }
            Err(err) => {
                debug!("network: probe {} failed: {err}", self.url);
                NetworkStatus::offline()
            }
        }
    }
}

/// Always answers with the same status. Used when no probe url is configured.
pub struct StaticProbe(pub NetworkStatus);

#[async_trait]
impl ConnectivityProbe for StaticProbe {
    async fn probe(&self) -> NetworkStatus {
        self.0
    }
}

/// Latest known connectivity, shared by every clone.
///
/// Subscribers are only woken when the reported status actually differs from
/// the current one.
#[derive(Clone)]
pub struct NetworkStatusObserver {
    status: Arc<watch::Sender<NetworkStatus>>,
}

impl Default for NetworkStatusObserver {
    fn default() -> Self {
        Self::new(NetworkStatus::default())
    }
}

impl NetworkStatusObserver {
    pub fn new(initial: NetworkStatus) -> Self {
        let (status, _) = watch::channel(initial);
        Self {
            status: Arc::new(status),
        }
    }

    pub fn current(&self) -> NetworkStatus {
        *self.status.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current().is_connected
    }

    /// Returns whether the status changed.
    pub fn report(&self, status: NetworkStatus) -> bool {
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
        if changed {
            info!(
                "network: connected={} type={:?}",
                status.is_connected, status.connection_type
            );
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.status.subscribe()
    }

    /// Calls `listener` on every change until the handle is removed or dropped.
    pub fn add_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(NetworkStatus) + Send + 'static,
    {
        let mut rx = self.subscribe();
        rx.mark_unchanged();
        let task = ScheduledTask::spawn("network-listener", async move {
            while rx.changed().await.is_ok() {
                let status = *rx.borrow_and_update();
                listener(status);
            }
        });
        ListenerHandle { task }
    }

    pub async fn refresh(&self, probe: &dyn ConnectivityProbe) -> NetworkStatus {
        let status = probe.probe().await;
        self.report(status);
        status
    }

    /// Probes immediately, then every `period` for as long as the task lives.
    pub fn start_polling(&self, probe: Arc<dyn ConnectivityProbe>, period: Duration) -> ScheduledTask {
        let observer = self.clone();
        let period = period.max(Duration::from_millis(1));
        ScheduledTask::spawn("network-poll", async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                observer.refresh(probe.as_ref()).await;
            }
        })
    }
}

pub struct ListenerHandle {
    task: ScheduledTask,
}

impl ListenerHandle {
    pub fn is_active(&self) -> bool {
        self.task.is_running()
    }

    pub fn remove(mut self) {
        self.task.cancel();
    }
}

#[cfg(test)]
#[path = "tests/network_tests.rs"]
mod tests;
