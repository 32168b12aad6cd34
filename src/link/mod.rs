//! # Link Module
//!
//! Concurrent transport between the host and the drone.
//!
//! This module handles:
//! - A background receive task feeding a bounded queue of serial chunks
//! - Decoding queued bytes and dispatching packets to storage and callbacks
//! - A keep-alive task polling `State` while a drone is connected
//! - Serialised transmission under a single transmit lock
//!
//! ```text
//! serial ─▶ receive task ─▶ queue ─▶ drain_once ─▶ decoder ─▶ dispatch
//!                                                             ├─ storage
//!                                                             ├─ link hooks
//!                                                             ├─ watchdog
//!                                                             ├─ packet tap
//!                                                             └─ callback
//! ```

pub mod commands;
pub mod discovery;
pub mod fetch;
pub mod storage;
pub mod timer;
pub mod watchdog;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::time::Duration;

use bytes::{Buf, Bytes};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::error::{LinkError, Result};
use crate::packet::decoder::{DecodeStatus, DecodedPacket, FrameDecoder};
use crate::packet::encoder::encode;
use crate::packet::payload::{Payload, Request};
use crate::packet::protocol::{DataType, Header};
use crate::serial;
use crate::serial::port_trait::{SerialPortIO, SerialPortRead};
use discovery::LinkStatus;
use storage::Storage;
use timer::Timer;
use watchdog::Watchdog;

pub use watchdog::Event;

/// Largest single read from the port
const READ_CHUNK_SIZE: usize = 256;

/// How often the keep-alive task checks its timer and the run flag
const KEEPALIVE_TICK: Duration = Duration::from_millis(50);

/// Pause between clearing the run flag and joining, and between close retries
const CLOSE_SETTLE: Duration = Duration::from_millis(10);

const CLOSE_ATTEMPTS: usize = 3;

pub type PacketCallback = Arc<dyn Fn(&Payload) + Send + Sync>;

/// Observer of every decoded packet, with the packet's count for its type
pub type PacketTap = Arc<dyn Fn(&DecodedPacket, u64) + Send + Sync>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A chunk read from the port, stamped with its arrival time
type Chunk = (Instant, Bytes);

/// Everything behind the decode lock
struct RxState {
    queue: mpsc::Receiver<Chunk>,
    /// Undecoded chunks; the front one is partially consumed
    pending: VecDeque<Chunk>,
    pending_len: usize,
    decoder: FrameDecoder,
}

/// State reached by both background tasks and foreground calls
struct Shared {
    config: Config,
    writer: tokio::sync::Mutex<Option<Box<dyn SerialPortIO>>>,
    rx: tokio::sync::Mutex<RxState>,
    storage: Storage,
    handlers: RwLock<HashMap<DataType, PacketCallback>>,
    tap: RwLock<Option<PacketTap>>,
    watchdog: Watchdog,
    status: LinkStatus,
    running: AtomicBool,
    open: AtomicBool,
    decode_failures: AtomicU64,
}

impl Shared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    async fn send_frame(&self, header: &Header, payload: &Payload) -> Result<Bytes> {
        let frame = encode(header, payload)?;

        let mut writer = self.writer.lock().await;
        let port = writer.as_mut().ok_or(LinkError::NotOpen)?;
        port.write_all(&frame).await?;
        port.flush().await?;

        trace!("TX {}", hex(&frame));
        Ok(frame)
    }

    fn count_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Move queued chunks into the reassembly buffer, enforcing its ceiling
    fn pull_chunks(&self, rx: &mut RxState) {
        let limit = self.config.transport.max_pending_bytes;

        while let Ok((arrived_at, chunk)) = rx.queue.try_recv() {
            if chunk.is_empty() {
                continue;
            }
            if rx.pending_len + chunk.len() > limit {
                warn!(
                    "Receive buffer would exceed {} bytes, discarding {} buffered bytes",
                    limit, rx.pending_len
                );
                rx.pending.clear();
                rx.pending_len = 0;
                rx.decoder.reset();
                self.count_failure();
            }
            rx.pending_len += chunk.len();
            rx.pending.push_back((arrived_at, chunk));
        }
    }

    /// Next undecoded byte and the time its chunk arrived
    fn next_byte(rx: &mut RxState) -> Option<(u8, Instant)> {
        let (arrived_at, chunk) = rx.pending.front_mut()?;
        let byte = chunk.get_u8();
        let arrived_at = *arrived_at;

        if chunk.is_empty() {
            rx.pending.pop_front();
        }
        rx.pending_len -= 1;
        Some((byte, arrived_at))
    }

    async fn drain_once(&self) -> Option<DataType> {
        let mut guard = self.rx.lock().await;
        let rx = &mut *guard;

        loop {
            if rx.pending.is_empty() {
                self.pull_chunks(rx);
            }
            let (byte, arrived_at) = Self::next_byte(rx)?;

            // Inactivity is judged on arrival, not on when the caller drains
            match rx.decoder.feed(byte, arrived_at) {
                DecodeStatus::Loaded => {
                    let packet = rx.decoder.take_packet();
                    rx.decoder.checked();

                    if let Some(packet) = packet {
                        let data_type = packet.header.data_type;
                        self.dispatch(packet);
                        return Some(data_type);
                    }
                }
                DecodeStatus::Failure(e) => {
                    warn!("Dropped frame: {}", e);
                    self.count_failure();
                }
                DecodeStatus::Idle | DecodeStatus::Accumulating => {}
            }
        }
    }

    fn dispatch(&self, packet: DecodedPacket) {
        let data_type = packet.header.data_type;
        let count = self.storage.record(&packet);
        debug!("Received {:?} #{}", data_type, count);

        self.status.observe(&packet.payload);

        if let Payload::State(state) = &packet.payload {
            self.watchdog.evaluate(state, packet.received_at);
        }

        let tap = read(&self.tap).clone();
        if let Some(tap) = tap {
            tap(&packet, count);
        }

        let handler = read(&self.handlers).get(&data_type).cloned();
        if let Some(handler) = handler {
            handler(&packet.payload);
        }
    }

    /// Queue a chunk, waiting while the queue is full
    async fn enqueue(&self, queue: &mpsc::Sender<Chunk>, chunk: Chunk) -> bool {
        let wait = self.config.serial.read_timeout();

        loop {
            match timeout(wait, queue.reserve()).await {
                Ok(Ok(permit)) => {
                    permit.send(chunk);
                    return true;
                }
                Ok(Err(_)) => return false,
                Err(_) if !self.is_running() => return false,
                Err(_) => {}
            }
        }
    }
}

async fn receive_loop(
    shared: Arc<Shared>,
    mut reader: Box<dyn SerialPortRead>,
    queue: mpsc::Sender<Chunk>,
) {
    let read_timeout = shared.config.serial.read_timeout();
    let background = shared.config.transport.background_processing;
    let mut buf = [0u8; READ_CHUNK_SIZE];

    debug!("Receive loop started");

    while shared.is_running() {
        match timeout(read_timeout, reader.read(&mut buf)).await {
            Err(_) => {}
            Ok(Ok(0)) => sleep(read_timeout).await,
            Ok(Ok(n)) => {
                trace!("RX {}", hex(&buf[..n]));

                let chunk = (Instant::now(), Bytes::copy_from_slice(&buf[..n]));
                if !shared.enqueue(&queue, chunk).await {
                    break;
                }

                if background {
                    while shared.drain_once().await.is_some() {}
                }
            }
            Ok(Err(e)) => {
                warn!("Serial read failed: {}", e);
                sleep(read_timeout).await;
            }
        }
    }

    debug!("Receive loop stopped");
}

async fn keepalive_loop(shared: Arc<Shared>) {
    let mut timer = Timer::new(shared.config.transport.keepalive_interval());
    let request: Payload = Request {
        data_type: DataType::State,
    }
    .into();
    let header = Header::for_payload(&request);

    debug!("Keep-alive loop started");

    while shared.is_running() {
        if shared.status.is_connected() && timer.due_and_reset(Instant::now()) {
            if let Err(e) = shared.send_frame(&header, &request).await {
                warn!("Keep-alive request failed: {}", e);
            }
        }
        sleep(KEEPALIVE_TICK).await;
    }

    debug!("Keep-alive loop stopped");
}

/// Connection to one drone through a link dongle
///
/// Owns the serial port halves and the two background tasks. Dropping a
/// `Link` stops the tasks; [`close`](Link::close) also releases the port.
pub struct Link {
    shared: Arc<Shared>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("open", &self.is_open())
            .field("connected", &self.shared.status.is_connected())
            .finish_non_exhaustive()
    }
}

impl Link {
    /// Open the configured serial port and start the background tasks
    ///
    /// # Errors
    ///
    /// Returns error if no port can be found or opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use codrone_link::config::Config;
    /// use codrone_link::link::Link;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let mut link = Link::open(&Config::default())?;
    ///     link.connect(None).await?;
    ///     link.close().await;
    ///     Ok(())
    /// }
    /// ```
    pub fn open(config: &Config) -> Result<Self> {
        let (reader, writer, _path) = serial::open(&config.serial)?;
        Ok(Self::with_port(Box::new(reader), Box::new(writer), config))
    }

    /// Start a link over already opened port halves
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_port(
        reader: Box<dyn SerialPortRead>,
        writer: Box<dyn SerialPortIO>,
        config: &Config,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.transport.queue_capacity);

        let shared = Arc::new(Shared {
            config: config.clone(),
            writer: tokio::sync::Mutex::new(Some(writer)),
            rx: tokio::sync::Mutex::new(RxState {
                queue: rx,
                pending: VecDeque::new(),
                pending_len: 0,
                decoder: FrameDecoder::new(config.transport.frame_timeout()),
            }),
            storage: Storage::new(),
            handlers: RwLock::new(HashMap::new()),
            tap: RwLock::new(None),
            watchdog: Watchdog::new(&config.events),
            status: LinkStatus::default(),
            running: AtomicBool::new(true),
            open: AtomicBool::new(true),
            decode_failures: AtomicU64::new(0),
        });

        let tasks = vec![
            tokio::spawn(receive_loop(shared.clone(), reader, tx)),
            tokio::spawn(keepalive_loop(shared.clone())),
        ];

        info!(
            "Link started (background processing {})",
            if config.transport.background_processing { "on" } else { "off" }
        );

        Self { shared, tasks }
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    /// Encode and transmit a payload, returning the bytes written
    ///
    /// # Errors
    ///
    /// Returns `NotOpen` after `close()`, or the underlying write error
    pub async fn send(&self, payload: impl Into<Payload>) -> Result<Bytes> {
        let payload = payload.into();
        self.shared
            .send_frame(&Header::for_payload(&payload), &payload)
            .await
    }

    /// Transmit a payload under an explicit header
    ///
    /// # Errors
    ///
    /// Returns `Encode` if the header does not describe the payload
    pub async fn send_frame(&self, header: &Header, payload: &Payload) -> Result<Bytes> {
        self.shared.send_frame(header, payload).await
    }

    /// Decode queued bytes until one packet is dispatched
    ///
    /// Returns `None` once the queue and reassembly buffer are empty. Only
    /// needed when background processing is off.
    pub async fn drain_once(&self) -> Option<DataType> {
        self.shared.drain_once().await
    }

    async fn drain_all(&self) {
        while self.shared.drain_once().await.is_some() {}
    }

    /// Poll `condition` until it holds or `limit` elapses
    async fn wait_for<F>(&self, limit: Duration, condition: F) -> bool
    where
        F: Fn(&LinkStatus) -> bool,
    {
        let start = Instant::now();
        let poll = self.shared.config.fetch.poll_interval();
        let background = self.shared.config.transport.background_processing;

        loop {
            if !background {
                self.drain_all().await;
            }
            if condition(&self.shared.status) {
                return true;
            }
            if start.elapsed() >= limit {
                return false;
            }
            sleep(poll).await;
        }
    }

    /// Stop the background tasks and release the port
    ///
    /// Closing an already closed link does nothing.
    pub async fn close(&mut self) {
        if !self.shared.open.swap(false, Ordering::AcqRel) {
            return;
        }

        self.shared.running.store(false, Ordering::Release);
        sleep(CLOSE_SETTLE).await;

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }

        let writer = self.shared.writer.lock().await.take();
        if let Some(mut port) = writer {
            for attempt in 1..=CLOSE_ATTEMPTS {
                match port.close().await {
                    Ok(()) => break,
                    Err(e) => {
                        warn!(
                            "Closing serial port failed (attempt {}/{}): {}",
                            attempt, CLOSE_ATTEMPTS, e
                        );
                        if attempt < CLOSE_ATTEMPTS {
                            sleep(CLOSE_SETTLE).await;
                        }
                    }
                }
            }
        }

        info!("Link closed");
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Link over a [`MockLine`](crate::serial::port_trait::mocks::MockLine)
#[cfg(test)]
pub(crate) fn mock_link(config: &Config) -> (Link, crate::serial::port_trait::mocks::MockLine) {
    use crate::serial::port_trait::mocks::MockLine;

    let (line, reader, writer) = MockLine::new();
    (Link::with_port(Box::new(reader), Box::new(writer), config), line)
}

/// Sleep in small steps until `condition` holds, up to `limit`
#[cfg(test)]
pub(crate) async fn settle<F: Fn() -> bool>(limit: Duration, condition: F) -> bool {
    let start = Instant::now();
    while !condition() {
        if start.elapsed() >= limit {
            return false;
        }
        sleep(Duration::from_millis(5)).await;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::encoder::encode_payload;
    use crate::packet::payload::{Attitude, Control, LinkDiscoveredDevice, LinkEvent, State};
    use crate::packet::protocol::{EventLink, ModeFlight, ModeVehicle, SensorOrientation};
    use crate::serial::port_trait::mocks::MockLine;
    use crate::serial::port_trait::MockSerialPortIO;
    use std::io;
    use std::sync::atomic::AtomicUsize;

    fn foreground_config() -> Config {
        let mut config = Config::default();
        config.transport.background_processing = false;
        config
    }

    fn device(index: u8, name: &str, rssi: i8) -> LinkDiscoveredDevice {
        let mut raw = [0u8; 20];
        raw[..name.len()].copy_from_slice(name.as_bytes());
        LinkDiscoveredDevice {
            index,
            address: [index; 6],
            name: raw,
            rssi,
        }
    }

    fn state(mode_flight: ModeFlight) -> State {
        State {
            mode_vehicle: ModeVehicle::FlightGuard,
            mode_system: 0,
            mode_flight,
            mode_drive: 0,
            sensor_orientation: SensorOrientation::Normal,
            coordinate: 0,
            battery: 80,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_counts_and_keeps_latest() {
        let (mut link, line) = mock_link(&Config::default());

        for roll in 1..=10 {
            line.inject_payload(Attitude { roll, pitch: 0, yaw: 0 });
        }

        assert!(settle(Duration::from_secs(1), || link.count(DataType::Attitude) == 10).await);
        assert_eq!(link.latest::<Attitude>().map(|a| a.roll), Some(10));
        assert_eq!(link.header(DataType::Attitude), Some(Header::new(DataType::Attitude)));
        assert_eq!(link.decode_failures(), 0);

        link.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_sees_packets_in_order() {
        let (mut link, line) = mock_link(&Config::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        link.on_packet(DataType::Control, move |payload| {
            if let Payload::Control(control) = payload {
                s.lock().unwrap().push(control.throttle);
            }
        });

        // All three frames in a single chunk
        let mut bytes = Vec::new();
        for throttle in [10, 20, 30] {
            bytes.extend_from_slice(&encode_payload(&Control::new(0, 0, 0, throttle).into()));
        }
        line.inject(bytes);

        assert!(settle(Duration::from_secs(1), || seen.lock().unwrap().len() == 3).await);
        assert_eq!(*seen.lock().unwrap(), vec![10, 20, 30]);

        link.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_packet_tap_gets_count() {
        let (mut link, line) = mock_link(&Config::default());
        let counts = Arc::new(Mutex::new(Vec::new()));
        let c = counts.clone();
        link.set_packet_tap(move |packet, count| {
            c.lock().unwrap().push((packet.header.data_type, count));
        });

        line.inject_payload(Control::default());
        line.inject_payload(Control::default());
        line.inject_payload(Attitude::default());

        assert!(settle(Duration::from_secs(1), || counts.lock().unwrap().len() == 3).await);
        assert_eq!(
            *counts.lock().unwrap(),
            vec![
                (DataType::Control, 1),
                (DataType::Control, 2),
                (DataType::Attitude, 1)
            ]
        );

        link.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_layer_hooks() {
        let (mut link, line) = mock_link(&Config::default());

        line.inject_payload(device(0, "STALE_DEVICE", -90));
        assert!(settle(Duration::from_secs(1), || link.devices().len() == 1).await);

        line.inject_payload(LinkEvent { event: EventLink::Scanning, result: 0 });
        line.inject_payload(device(1, "PETRONE_0001", -60));
        line.inject_payload(device(2, "PETRONE_0002", -40));
        line.inject_payload(LinkEvent { event: EventLink::ScanStop, result: 0 });

        assert!(settle(Duration::from_secs(1), || link.count(DataType::LinkEvent) == 2).await);
        let names: Vec<String> = link.devices().iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["PETRONE_0001", "PETRONE_0002"]);
        assert!(!link.shared.status.is_discovering());
        assert!(!link.is_connected());

        line.inject_payload(LinkEvent { event: EventLink::Connected, result: 0 });
        assert!(settle(Duration::from_secs(1), || link.is_connected()).await);

        line.inject_payload(LinkEvent { event: EventLink::Disconnected, result: 0 });
        assert!(settle(Duration::from_secs(1), || !link.is_connected()).await);

        link.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_packets_drive_watchdog() {
        let (mut link, line) = mock_link(&Config::default());
        let crashes = Arc::new(AtomicUsize::new(0));
        let c = crashes.clone();
        link.on_event(Event::Crash, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        line.inject_payload(state(ModeFlight::Accident));
        line.inject_payload(state(ModeFlight::Accident));

        assert!(settle(Duration::from_secs(1), || link.count(DataType::State) == 2).await);
        assert_eq!(crashes.load(Ordering::SeqCst), 1);

        link.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_only_while_connected() {
        let (mut link, line) = mock_link(&Config::default());

        sleep(Duration::from_secs(4)).await;
        assert!(line.requests().is_empty());

        line.inject_payload(LinkEvent { event: EventLink::Connected, result: 0 });
        assert!(settle(Duration::from_secs(1), || link.is_connected()).await);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(line.requests(), vec![DataType::State]);

        sleep(Duration::from_secs(3)).await;
        assert_eq!(line.requests(), vec![DataType::State, DataType::State]);

        line.inject_payload(LinkEvent { event: EventLink::Disconnected, result: 0 });
        assert!(settle(Duration::from_secs(1), || !link.is_connected()).await);
        sleep(Duration::from_secs(10)).await;
        assert_eq!(line.requests().len(), 2);

        link.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_returns_frame() {
        let (mut link, line) = mock_link(&Config::default());

        let frame = link.send(Control::new(10, -5, 0, 50)).await.unwrap();
        assert_eq!(&frame[..8], &[0x0A, 0x55, 0x10, 0x04, 0x0A, 0xFB, 0x00, 0x32]);
        assert_eq!(line.written(), vec![frame.to_vec()]);

        link.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_frame_rejects_mismatched_header() {
        let (mut link, line) = mock_link(&Config::default());

        let result = link
            .send_frame(&Header::new(DataType::State), &Control::default().into())
            .await;
        assert!(matches!(result, Err(LinkError::Encode(_))));
        assert!(line.written().is_empty());

        link.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent() {
        let (mut link, line) = mock_link(&Config::default());
        assert!(link.is_open());

        link.close().await;
        link.close().await;

        assert!(!link.is_open());
        assert_eq!(line.close_calls(), 1);
        assert!(matches!(
            link.send(Control::default()).await,
            Err(LinkError::NotOpen)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_retries_port_close() {
        let (mut link, line) = mock_link(&Config::default());
        line.fail_closes(2);

        link.close().await;
        assert_eq!(line.close_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_gives_up_after_three_attempts() {
        let (mut link, line) = mock_link(&Config::default());
        line.fail_closes(10);

        link.close().await;
        assert_eq!(line.close_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_propagates() {
        let (_line, reader, _writer) = MockLine::new();
        let mut port = MockSerialPortIO::new();
        port.expect_write_all()
            .returning(|_| Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")));
        port.expect_close().returning(|| Ok(()));

        let mut link = Link::with_port(Box::new(reader), Box::new(port), &Config::default());

        match link.send(Control::default()).await {
            Err(LinkError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("Expected Io error, got: {:?}", other),
        }

        link.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_failure_propagates() {
        let (_line, reader, _writer) = MockLine::new();
        let mut port = MockSerialPortIO::new();
        port.expect_write_all().returning(|_| Ok(()));
        port.expect_flush()
            .returning(|| Err(io::Error::new(io::ErrorKind::TimedOut, "stalled")));
        port.expect_close().returning(|| Ok(()));

        let mut link = Link::with_port(Box::new(reader), Box::new(port), &Config::default());
        assert!(matches!(link.send(Control::default()).await, Err(LinkError::Io(_))));

        link.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_frame_is_counted_and_skipped() {
        let (mut link, line) = mock_link(&Config::default());

        let mut corrupt = encode_payload(&Control::new(1, 1, 1, 1).into()).to_vec();
        corrupt[5] ^= 0xFF;
        line.inject(corrupt);
        line.inject_payload(Control::new(2, 2, 2, 2));

        assert!(settle(Duration::from_secs(1), || link.count(DataType::Control) == 1).await);
        assert_eq!(link.decode_failures(), 1);
        assert_eq!(link.latest::<Control>(), Some(Control::new(2, 2, 2, 2)));

        link.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreground_drain() {
        let (mut link, line) = mock_link(&foreground_config());

        line.inject_payload(Control::default());
        line.inject_payload(Attitude::default());
        sleep(Duration::from_millis(50)).await;

        // Nothing is decoded until the caller drains
        assert_eq!(link.count(DataType::Control), 0);

        assert_eq!(link.drain_once().await, Some(DataType::Control));
        assert_eq!(link.drain_once().await, Some(DataType::Attitude));
        assert_eq!(link.drain_once().await, None);
        assert_eq!(link.count(DataType::Control), 1);

        link.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreground_split_frame_survives_late_drain() {
        let (mut link, line) = mock_link(&foreground_config());
        let frame = encode_payload(&Control::new(4, 3, 2, 1).into());

        line.inject(frame[..5].to_vec());
        sleep(Duration::from_millis(20)).await;
        assert_eq!(link.drain_once().await, None);

        // Second half arrives right away but is drained much later
        line.inject(frame[5..].to_vec());
        sleep(Duration::from_secs(1)).await;

        assert_eq!(link.drain_once().await, Some(DataType::Control));
        assert_eq!(link.latest::<Control>(), Some(Control::new(4, 3, 2, 1)));
        assert_eq!(link.decode_failures(), 0);

        link.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreground_stale_partial_frame_is_dropped() {
        let (mut link, line) = mock_link(&foreground_config());
        let frame = encode_payload(&Control::new(4, 3, 2, 1).into());

        line.inject(frame[..5].to_vec());
        sleep(Duration::from_secs(1)).await;
        line.inject(frame[5..].to_vec());
        line.inject_payload(Control::new(9, 9, 9, 9));
        sleep(Duration::from_millis(20)).await;

        assert_eq!(link.drain_once().await, Some(DataType::Control));
        assert_eq!(link.drain_once().await, None);
        assert_eq!(link.count(DataType::Control), 1);
        assert_eq!(link.latest::<Control>(), Some(Control::new(9, 9, 9, 9)));

        link.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_ceiling_discards_backlog() {
        let mut config = foreground_config();
        config.transport.max_pending_bytes = crate::packet::protocol::MAX_FRAME_SIZE;
        let (mut link, line) = mock_link(&config);

        for _ in 0..3 {
            line.inject(vec![0u8; 200]);
        }
        line.inject_payload(Control::new(3, 3, 3, 3));
        sleep(Duration::from_millis(100)).await;

        assert_eq!(link.drain_once().await, Some(DataType::Control));
        assert_eq!(link.decode_failures(), 2);
        assert_eq!(link.latest::<Control>(), Some(Control::new(3, 3, 3, 3)));

        link.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_tasks() {
        let (link, line) = mock_link(&Config::default());
        let shared = link.shared.clone();
        drop(link);

        assert!(!shared.is_running());
        // Writer is untouched by drop
        assert_eq!(line.close_calls(), 0);
    }
}
