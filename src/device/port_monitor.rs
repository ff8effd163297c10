use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use super::PortList;
use crate::serial::SerialBackend;
use crate::settings::Settings;

/// Events emitted by the port monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortEvent {
    /// A serial port was added
    PortAdded(String),
    /// A serial port was removed
    PortRemoved(String),
}

impl PortEvent {
    pub fn port_name(&self) -> &str {
        match self {
            PortEvent::PortAdded(name) | PortEvent::PortRemoved(name) => name,
        }
    }
}

/// Trait for watching serial ports come and go
#[async_trait::async_trait]
pub trait PortMonitor: Send + Sync {
    /// Start monitoring for port changes
    async fn start(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Stop monitoring
    async fn stop(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Get receiver for port events
    fn get_receiver(&mut self) -> Option<mpsc::Receiver<PortEvent>>;
}

/// Drops repeated events for the same port inside the debounce window, so a
/// flapping connector does not produce a storm of add/remove pairs.
pub struct PortEventDebouncer {
    tx: mpsc::Sender<PortEvent>,
    last_event_time: HashMap<String, Instant>,
    debounce_duration: Duration,
}

impl PortEventDebouncer {
    pub fn new(tx: mpsc::Sender<PortEvent>, debounce_ms: u64) -> Self {
        Self {
            tx,
            last_event_time: HashMap::new(),
            debounce_duration: Duration::from_millis(debounce_ms),
        }
    }

    pub async fn send_event(&mut self, event: PortEvent) -> Result<(), mpsc::error::SendError<PortEvent>> {
        let now = Instant::now();
        if let Some(last) = self.last_event_time.get(event.port_name()) {
            if now.duration_since(*last) < self.debounce_duration {
                log::debug!("Port event debounced: {:?}", event);
                return Ok(());
            }
        }
        self.last_event_time.insert(event.port_name().to_string(), now);
        self.tx.send(event).await
    }
}

/// Events turning `previous` into `current`: removals first, then additions,
/// each in listing order.
pub fn diff_ports(previous: &PortList, current: &PortList) -> Vec<PortEvent> {
    let removed = previous
        .iter()
        .filter(|p| !current.contains(p))
        .map(|p| PortEvent::PortRemoved(p.to_string()));
    let added = current
        .iter()
        .filter(|p| !previous.contains(p))
        .map(|p| PortEvent::PortAdded(p.to_string()));
    removed.chain(added).collect()
}

/// Detects hot-plugged ports by refreshing a [`PortList`] on an interval.
pub struct PollingPortMonitor {
    backend: Arc<dyn SerialBackend>,
    interval: Duration,
    debounce_ms: u64,
    tx: Option<mpsc::Sender<PortEvent>>,
    rx: Option<mpsc::Receiver<PortEvent>>,
    stop_tx: Option<mpsc::Sender<()>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl PollingPortMonitor {
    pub fn new(backend: Arc<dyn SerialBackend>, settings: &Settings) -> Self {
        let (tx, rx) = mpsc::channel(100);

        Self {
            backend,
            interval: Duration::from_millis(settings.monitor_interval_ms.max(1)),
            debounce_ms: settings.monitor_debounce_ms,
            tx: Some(tx),
            rx: Some(rx),
            stop_tx: None,
            task_handle: None,
        }
    }
}

async fn refresh_blocking(backend: Arc<dyn SerialBackend>, mut list: PortList) -> (PortList, bool) {
    let fallback = list.clone();
    match tokio::task::spawn_blocking(move || {
        let ok = match list.refresh(backend.as_ref()) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Port enumeration failed: {}", e);
                false
            }
        };
        (list, ok)
    })
    .await
    {
        Ok(result) => result,
        Err(e) => {
            log::error!("Port enumeration task failed: {}", e);
            (fallback, false)
        }
    }
}

#[async_trait::async_trait]
impl PortMonitor for PollingPortMonitor {
    async fn start(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let tx = self.tx.take().ok_or("Already started")?;
        let (stop_tx, mut stop_rx) = mpsc::channel(1);
        self.stop_tx = Some(stop_tx);

        let backend = self.backend.clone();
        let period = self.interval;
        let debounce_ms = self.debounce_ms;

        // Ports already present at start are the baseline, not events.
        let (mut previous, _) = refresh_blocking(backend.clone(), PortList::new()).await;
        let mut current = PortList::new();

        let handle = tokio::spawn(async move {
            let mut debouncer = PortEventDebouncer::new(tx, debounce_ms);
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => {
                        log::info!("Port monitor stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        let (list, ok) = refresh_blocking(backend.clone(), current).await;
                        current = list;
                        if !ok {
                            continue;
                        }

                        for event in diff_ports(&previous, &current) {
                            if let Err(e) = debouncer.send_event(event).await {
                                log::error!("Failed to send port event: {}", e);
                            }
                        }
                        std::mem::swap(&mut previous, &mut current);
                    }
                }
            }
        });

        self.task_handle = Some(handle);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(()).await;
        }

        if let Some(handle) = self.task_handle.take() {
            handle.await?;
        }

        Ok(())
    }

    fn get_receiver(&mut self) -> Option<mpsc::Receiver<PortEvent>> {
        self.rx.take()
    }
}

/// Create a monitor polling the given backend
pub fn create_port_monitor(backend: Arc<dyn SerialBackend>, settings: &Settings) -> Box<dyn PortMonitor> {
    Box::new(PollingPortMonitor::new(backend, settings))
}
