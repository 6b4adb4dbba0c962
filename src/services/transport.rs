//! Sensor Transports
//!
//! The Bluetooth stack lives outside this crate. Its only contract with the
//! pipeline is "deliver opaque text chunks". Each transport flavour is adapted
//! to a [`ChunkSource`]:
//!
//! - BLE notifications arrive base64-encoded and are decoded here.
//! - Classic (SPP) ports are polled for available bytes on a fixed period.
//! - Any line-oriented reader (stdin, a log file) yields one chunk per line.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, warn};

use super::events::DeviceId;
use crate::config::AppConfig;
use crate::constants::CLASSIC_POLL_INTERVAL_MS;
use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    /// Bluetooth Low Energy (characteristic notifications)
    Ble,
    /// Classic Bluetooth serial profile
    Classic,
}

/// A connected (or connecting) sensor
#[derive(Clone, Debug)]
pub struct DeviceHandle {
    pub id: DeviceId,
    pub name: Arc<str>,
    pub kind: TransportKind,
}

impl DeviceHandle {
    pub fn new(id: impl Into<DeviceId>, name: impl Into<Arc<str>>, kind: TransportKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
        }
    }
}

/// Asynchronous stream of text chunks
#[async_trait]
pub trait ChunkSource: Send {
    /// Next chunk, or `Ok(None)` once the stream has ended
    async fn next_chunk(&mut self) -> Result<Option<String>>;
}

/// Decodes base64 notification payloads pushed by the BLE stack
pub struct BleNotificationSource {
    rx: mpsc::Receiver<String>,
}

impl BleNotificationSource {
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx }
    }

    /// A source plus the sender the BLE callback should feed
    pub fn channel(buffer: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl ChunkSource for BleNotificationSource {
    async fn next_chunk(&mut self) -> Result<Option<String>> {
        while let Some(payload) = self.rx.recv().await {
            match STANDARD.decode(payload.trim()) {
                Ok(bytes) => return Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
                Err(e) => warn!(error = %e, "Dropping undecodable BLE notification"),
            }
        }
        Ok(None)
    }
}

/// Minimal serial port surface of a Classic Bluetooth connection
#[async_trait]
pub trait SerialPort: Send {
    /// False once the remote end has gone away
    fn is_open(&self) -> bool;
    /// Bytes waiting to be read
    async fn available(&mut self) -> Result<usize>;
    async fn read(&mut self) -> Result<String>;
}

/// Polls a serial port until it closes
pub struct ClassicPollSource<P: SerialPort> {
    port: P,
    ticker: Interval,
}

impl<P: SerialPort> ClassicPollSource<P> {
    pub fn new(port: P) -> Self {
        Self::with_interval(port, Duration::from_millis(CLASSIC_POLL_INTERVAL_MS))
    }

    /// Poll on the `transport.classic_poll_ms` period
    pub fn from_config(port: P, config: &AppConfig) -> Self {
        Self::with_interval(port, config.classic_poll_interval())
    }

    pub fn with_interval(port: P, period: Duration) -> Self {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { port, ticker }
    }
}

#[async_trait]
impl<P: SerialPort> ChunkSource for ClassicPollSource<P> {
    async fn next_chunk(&mut self) -> Result<Option<String>> {
        loop {
            self.ticker.tick().await;
            if !self.port.is_open() {
                debug!("Serial port closed");
                return Ok(None);
            }
            match self.port.available().await {
                Ok(0) => continue,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Serial available() failed");
                    continue;
                }
            }
            match self.port.read().await {
                Ok(text) if !text.is_empty() => return Ok(Some(text)),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Serial read failed"),
            }
        }
    }
}

/// One chunk per line of a buffered reader
pub struct LineSource<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin + Send> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> ChunkSource for LineSource<R> {
    async fn next_chunk(&mut self) -> Result<Option<String>> {
        Ok(self.lines.next_line().await?)
    }
}

/// Reads the received signal strength of a BLE link
#[async_trait]
pub trait SignalProbe: Send + Sync {
    async fn read_rssi(&self) -> Result<i16>;
}

/// Convert RSSI (dBm) to 0..=4 signal bars
pub fn signal_bars(rssi: i16) -> u8 {
    match rssi {
        r if r > -60 => 4,
        r if r > -70 => 3,
        r if r > -80 => 2,
        r if r > -90 => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::collections::VecDeque;

    #[test]
    fn test_signal_bars() {
        assert_eq!(signal_bars(-40), 4);
        assert_eq!(signal_bars(-60), 3);
        assert_eq!(signal_bars(-75), 2);
        assert_eq!(signal_bars(-80), 1);
        assert_eq!(signal_bars(-89), 1);
        assert_eq!(signal_bars(-90), 0);
        assert_eq!(signal_bars(-120), 0);
    }

    #[tokio::test]
    async fn test_ble_source_decodes_base64() {
        let (tx, mut source) = BleNotificationSource::channel(8);
        tx.send(STANDARD.encode("PM2.5(ATM): 34.7 ug/m3"))
            .await
            .expect("send");
        tx.send("%%%not base64%%%".to_string()).await.expect("send");
        tx.send(STANDARD.encode([0x50u8, 0xff, 0x4d])).await.expect("send");
        drop(tx);

        assert_eq!(
            source.next_chunk().await.expect("chunk").as_deref(),
            Some("PM2.5(ATM): 34.7 ug/m3")
        );
        // The undecodable payload is skipped; invalid UTF-8 is replaced.
        assert_eq!(
            source.next_chunk().await.expect("chunk").as_deref(),
            Some("P\u{fffd}M")
        );
        assert_eq!(source.next_chunk().await.expect("end"), None);
    }

    enum Step {
        Available(usize),
        AvailableErr,
        Read(&'static str),
        ReadErr,
    }

    struct ScriptedPort {
        steps: VecDeque<Step>,
        polls: usize,
    }

    #[async_trait]
    impl SerialPort for ScriptedPort {
        fn is_open(&self) -> bool {
            !self.steps.is_empty()
        }

        async fn available(&mut self) -> Result<usize> {
            self.polls += 1;
            match self.steps.pop_front() {
                Some(Step::Available(n)) => Ok(n),
                _ => Err(Error::Transport {
                    message: "port glitch".to_string(),
                }),
            }
        }

        async fn read(&mut self) -> Result<String> {
            match self.steps.pop_front() {
                Some(Step::Read(text)) => Ok(text.to_string()),
                _ => Err(Error::Transport {
                    message: "read failed".to_string(),
                }),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_classic_poll_skips_idle_and_errors() {
        let port = ScriptedPort {
            steps: VecDeque::from([
                Step::Available(0),
                Step::AvailableErr,
                Step::Available(4),
                Step::ReadErr,
                Step::Available(22),
                Step::Read("PM2.5(ATM): 12 ug/m3"),
            ]),
            polls: 0,
        };
        let mut source = ClassicPollSource::new(port);

        let started = tokio::time::Instant::now();
        let chunk = source.next_chunk().await.expect("chunk");
        assert_eq!(chunk.as_deref(), Some("PM2.5(ATM): 12 ug/m3"));
        assert_eq!(source.port.polls, 4);
        // First tick is immediate, then one per second.
        assert_eq!(started.elapsed(), Duration::from_secs(3));

        assert_eq!(source.next_chunk().await.expect("end"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_classic_poll_period_from_config() {
        let mut config = AppConfig::default();
        config.transport.classic_poll_ms = 250;
        let port = ScriptedPort {
            steps: VecDeque::from([
                Step::Available(0),
                Step::Available(0),
                Step::Available(3),
                Step::Read("PM2.5(ATM): 7 ug/m3"),
            ]),
            polls: 0,
        };
        let mut source = ClassicPollSource::from_config(port, &config);

        let started = tokio::time::Instant::now();
        let chunk = source.next_chunk().await.expect("chunk");
        assert_eq!(chunk.as_deref(), Some("PM2.5(ATM): 7 ug/m3"));
        assert_eq!(started.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_line_source() {
        let input: &[u8] = b"first\nPM2.5(ATM): 1 ug/m3\n";
        let mut source = LineSource::new(input);
        assert_eq!(source.next_chunk().await.expect("line").as_deref(), Some("first"));
        assert_eq!(
            source.next_chunk().await.expect("line").as_deref(),
            Some("PM2.5(ATM): 1 ug/m3")
        );
        assert_eq!(source.next_chunk().await.expect("end"), None);
    }
}
