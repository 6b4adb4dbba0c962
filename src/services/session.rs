//! Connection Session
//!
//! Owns one connected sensor for its lifetime. Starting a session spawns:
//!
//! - the reader task, sole owner of the [`Pipeline`];
//! - the staleness watchdog, which alerts when readings stop arriving;
//! - signal-strength polling for BLE links that expose RSSI.
//!
//! All tasks share a cancellation token. Disconnecting, or the source reaching
//! end of stream, cancels the timers, flushes the open bucket and waits for
//! its local write. Remote pushes already in flight are left to finish.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::events::{ConnectionState, DeviceId, ServiceEvent, emit};
use super::pipeline::{DataPulse, Pipeline};
use super::transport::{ChunkSource, DeviceHandle, SignalProbe, TransportKind, signal_bars};
use crate::config::AppConfig;
use crate::constants::{SIGNAL_POLL_INTERVAL_SECS, STALE_AFTER_SECS, WATCHDOG_INTERVAL_SECS};
use crate::error::{Error, Result};
use crate::helpers::Clock;

#[derive(Clone)]
pub struct SessionOptions {
    /// Alert after this long without a reading
    pub stale_after: Duration,
    pub watchdog_interval: Duration,
    pub signal_interval: Duration,
    /// RSSI source; only used for BLE devices
    pub signal_probe: Option<Arc<dyn SignalProbe>>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(STALE_AFTER_SECS),
            watchdog_interval: Duration::from_secs(WATCHDOG_INTERVAL_SECS),
            signal_interval: Duration::from_secs(SIGNAL_POLL_INTERVAL_SECS),
            signal_probe: None,
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            stale_after: config.stale_after(),
            watchdog_interval: config.watchdog_interval(),
            signal_interval: config.signal_poll_interval(),
            signal_probe: None,
        }
    }

    pub fn with_signal_probe(mut self, probe: Arc<dyn SignalProbe>) -> Self {
        self.signal_probe = Some(probe);
        self
    }
}

pub struct Session {
    device: DeviceHandle,
    id: Uuid,
    cancel: CancellationToken,
    reader: JoinHandle<Pipeline>,
    timers: Vec<JoinHandle<()>>,
}

impl Session {
    /// Spawn the session tasks; must be called inside a tokio runtime
    pub fn start(
        device: DeviceHandle,
        source: Box<dyn ChunkSource>,
        pipeline: Pipeline,
        options: SessionOptions,
        events: Sender<ServiceEvent>,
    ) -> Self {
        let id = Uuid::now_v7();
        let cancel = CancellationToken::new();
        let connection_event = |state: ConnectionState, detail: &str| ServiceEvent::ConnectionState {
            device: device.id.clone(),
            state,
            detail: detail.into(),
        };
        emit(&events, connection_event(ConnectionState::Connecting, "opening"));

        let pulse = pipeline.pulse();
        let clock = pipeline.clock();
        pulse.mark(clock.now());

        let mut timers = vec![tokio::spawn(watchdog(
            device.id.clone(),
            pulse,
            clock,
            options.stale_after,
            options.watchdog_interval,
            cancel.clone(),
            events.clone(),
        ))];
        if device.kind == TransportKind::Ble {
            if let Some(probe) = options.signal_probe.clone() {
                timers.push(tokio::spawn(poll_signal(
                    device.id.clone(),
                    probe,
                    options.signal_interval,
                    cancel.clone(),
                    events.clone(),
                )));
            }
        }

        let reader = tokio::spawn(read_loop(
            device.id.clone(),
            source,
            pipeline,
            cancel.clone(),
            events.clone(),
        ));

        info!(session = %id, device = %device.id, name = %device.name, kind = ?device.kind, "Session started");
        emit(&events, connection_event(ConnectionState::Connected, "connected"));

        Self {
            device,
            id,
            cancel,
            reader,
            timers,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the session stops, either by disconnect or end of stream
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    /// Stop all tasks, flush the open bucket and hand the pipeline back
    pub async fn disconnect(self) -> Result<Pipeline> {
        info!(session = %self.id, device = %self.device.id, "Disconnecting");
        self.cancel.cancel();
        for timer in self.timers {
            if let Err(e) = timer.await {
                warn!(error = %e, "Session timer ended abnormally");
            }
        }
        self.reader.await.map_err(|e| Error::Transport {
            message: format!("reader task failed: {e}"),
        })
    }
}

async fn read_loop(
    device: DeviceId,
    mut source: Box<dyn ChunkSource>,
    mut pipeline: Pipeline,
    cancel: CancellationToken,
    events: Sender<ServiceEvent>,
) -> Pipeline {
    let detail = loop {
        tokio::select! {
            _ = cancel.cancelled() => break "disconnected",
            chunk = source.next_chunk() => match chunk {
                Ok(Some(text)) => {
                    if pipeline.on_chunk(&text).is_none() {
                        debug!(len = text.len(), "Chunk without reading");
                    }
                }
                Ok(None) => {
                    info!(device = %device, "Sensor stream ended");
                    break "end of stream";
                }
                Err(e) => {
                    warn!(device = %device, error = %e, "Sensor transport failed");
                    break "transport error";
                }
            },
        }
    };

    cancel.cancel();
    pipeline.flush();
    pipeline.settle_persist().await;

    emit(
        &events,
        ServiceEvent::ConnectionState {
            device,
            state: ConnectionState::Disconnected,
            detail: detail.into(),
        },
    );
    pipeline
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn watchdog(
    device: DeviceId,
    pulse: DataPulse,
    clock: Arc<dyn Clock>,
    stale_after: Duration,
    period: Duration,
    cancel: CancellationToken,
    events: Sender<ServiceEvent>,
) {
    let mut ticker = ticker(period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(last) = pulse.last() else {
                    continue;
                };
                let silent = (clock.now() - last).to_std().unwrap_or_default();
                if silent > stale_after {
                    warn!(device = %device, silent_secs = silent.as_secs(), "No data from sensor");
                    emit(&events, ServiceEvent::DataStale {
                        device: device.clone(),
                        silent_secs: silent.as_secs(),
                    });
                }
            }
        }
    }
}

async fn poll_signal(
    device: DeviceId,
    probe: Arc<dyn SignalProbe>,
    period: Duration,
    cancel: CancellationToken,
    events: Sender<ServiceEvent>,
) {
    let mut ticker = ticker(period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => match probe.read_rssi().await {
                Ok(rssi) => emit(&events, ServiceEvent::SignalStrength {
                    device: device.clone(),
                    rssi,
                    bars: signal_bars(rssi),
                }),
                Err(e) => debug!(device = %device, error = %e, "RSSI read failed"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::ManualClock;
    use crate::services::kv::MemoryKvStore;
    use crate::services::store::LocalStore;
    use crate::services::testing::RecordingRemote;
    use crate::services::transport::{BleNotificationSource, LineSource};
    use async_trait::async_trait;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use chrono::{TimeZone, Utc};
    use crossbeam_channel::Receiver;

    struct FixedRssi(i16);

    #[async_trait]
    impl SignalProbe for FixedRssi {
        async fn read_rssi(&self) -> Result<i16> {
            Ok(self.0)
        }
    }

    fn setup() -> (
        Pipeline,
        Arc<LocalStore>,
        Arc<ManualClock>,
        Sender<ServiceEvent>,
        Receiver<ServiceEvent>,
    ) {
        let start = Utc
            .with_ymd_and_hms(2026, 6, 1, 8, 1, 0)
            .single()
            .expect("valid time");
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(
            LocalStore::new(Arc::new(MemoryKvStore::new())).with_clock(clock.clone()),
        );
        let (tx, rx) = crossbeam_channel::unbounded();
        let pipeline = Pipeline::new(
            DeviceId::from("PM-01"),
            store.clone(),
            Arc::new(RecordingRemote::default()),
            tx.clone(),
        )
        .with_clock(clock.clone());
        (pipeline, store, clock, tx, rx)
    }

    fn states(rx: &Receiver<ServiceEvent>) -> Vec<ConnectionState> {
        rx.try_iter()
            .filter_map(|e| match e {
                ServiceEvent::ConnectionState { state, .. } => Some(state),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_end_of_stream_flushes_and_disconnects() {
        let (pipeline, store, _clock, tx, rx) = setup();
        let input: &'static [u8] = b"boot ok\nPM2.5(ATM): 10 ug/m3\nPM2.5(ATM): 20 ug/m3\n";
        let device = DeviceHandle::new("PM-01", "Vayu Sensor", TransportKind::Classic);

        let session = Session::start(
            device,
            Box::new(LineSource::new(input)),
            pipeline,
            SessionOptions::default(),
            tx,
        );
        session.closed().await;
        let pipeline = session.disconnect().await.expect("disconnect");

        assert!(pipeline.open_bucket_start().is_none());
        let stored = store.load_all().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].count, 2);
        assert_eq!(stored[0].avg_value, 15.0);

        assert_eq!(
            states(&rx),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Disconnected
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_flushes_open_bucket() {
        let (pipeline, store, _clock, tx, _rx) = setup();
        let (ble_tx, source) = BleNotificationSource::channel(4);
        let device = DeviceHandle::new("PM-01", "Vayu BLE", TransportKind::Ble);
        let session = Session::start(
            device,
            Box::new(source),
            pipeline,
            SessionOptions::default(),
            tx,
        );

        ble_tx
            .send(STANDARD.encode("PM2.5(ATM): 8 ug/m3"))
            .await
            .expect("send");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!session.is_closed());

        let pipeline = session.disconnect().await.expect("disconnect");
        assert_eq!(pipeline.live_feed().len(), 1);
        assert_eq!(store.load_all().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_and_signal_events() {
        let (pipeline, _store, clock, tx, rx) = setup();
        let (_ble_tx, source) = BleNotificationSource::channel(4);
        let device = DeviceHandle::new("PM-01", "Vayu BLE", TransportKind::Ble);
        let options = SessionOptions::default().with_signal_probe(Arc::new(FixedRssi(-65)));
        let session = Session::start(device, Box::new(source), pipeline, options, tx);

        clock.advance(chrono::Duration::seconds(20));
        tokio::time::sleep(Duration::from_secs(11)).await;

        let events: Vec<ServiceEvent> = rx.try_iter().collect();
        let stale = events.iter().find_map(|e| match e {
            ServiceEvent::DataStale { silent_secs, .. } => Some(*silent_secs),
            _ => None,
        });
        assert_eq!(stale, Some(20));
        let bars = events.iter().find_map(|e| match e {
            ServiceEvent::SignalStrength { bars, .. } => Some(*bars),
            _ => None,
        });
        assert_eq!(bars, Some(3));

        session.disconnect().await.expect("disconnect");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_stale_alert_while_data_flows() {
        let (pipeline, _store, clock, tx, rx) = setup();
        let (ble_tx, source) = BleNotificationSource::channel(4);
        let device = DeviceHandle::new("PM-01", "Vayu BLE", TransportKind::Ble);
        let session = Session::start(
            device,
            Box::new(source),
            pipeline,
            SessionOptions::default(),
            tx,
        );

        clock.advance(chrono::Duration::seconds(9));
        ble_tx
            .send(STANDARD.encode("PM2.5(ATM): 8 ug/m3"))
            .await
            .expect("send");
        tokio::time::sleep(Duration::from_secs(11)).await;

        let stale = rx
            .try_iter()
            .any(|e| matches!(e, ServiceEvent::DataStale { .. }));
        assert!(!stale);
        session.disconnect().await.expect("disconnect");
    }
}
