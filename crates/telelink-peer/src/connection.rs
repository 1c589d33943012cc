use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use telelink_frame::{check_frame_size, PacketCodec};
use telelink_message::Packet;
use telelink_transport::{Endpoint, LinkReader, LinkStream, LinkWriter};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval_at, sleep_until, timeout, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ConnectionConfig;
use crate::error::{PeerError, Result};
use crate::inbound::InboundPipeline;
use crate::state::{transition, ConnectionStatus, Effect, LinkEvent, LinkState};
use crate::subscription::{PacketStream, Sink, SubscriptionId, SubscriptionTable};

const MIN_REFRESH_PERIOD: Duration = Duration::from_millis(1);

type Opening = Pin<Box<dyn Future<Output = telelink_transport::Result<LinkStream>> + Send>>;

enum Command {
    /// A complete, delimited frame.
    Send(Bytes),
    SendRejected,
    Register {
        id: SubscriptionId,
        topic: String,
        sink: Sink,
    },
    Unregister(SubscriptionId),
}

/// Handle to a reconnecting device connection.
///
/// A background task owns the socket, the frame finder, the lifecycle state
/// and the subscription table; handles talk to it through a command queue
/// and never block. Cloning is cheap. Dropping the last clone closes the
/// connection.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

struct Shared {
    endpoint: Endpoint,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionStatus>,
    cancel: CancellationToken,
    codec: PacketCodec,
    max_frame_size: usize,
    driver: Mutex<Option<JoinHandle<u64>>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Connection {
    /// Start connecting to `url` with default settings.
    ///
    /// Returns immediately; the first connection attempt runs in the
    /// background. Must be called within a tokio runtime.
    pub fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(ConnectionConfig::parse(url)?)
    }

    /// Start connecting with explicit configuration.
    pub fn connect_with_config(config: ConnectionConfig) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| PeerError::NoRuntime)?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
        let cancel = CancellationToken::new();
        let endpoint = config.endpoint.clone();
        let max_frame_size = config.frame.max_frame_size;

        let driver = Driver::new(config, commands_rx, status_tx, cancel.clone());
        let handle = runtime.spawn(driver.run());

        Ok(Self {
            shared: Arc::new(Shared {
                endpoint,
                commands: commands_tx,
                status: status_rx,
                cancel,
                codec: PacketCodec::new(),
                max_frame_size,
                driver: Mutex::new(Some(handle)),
            }),
        })
    }

    /// Encode and queue `packet` for writing.
    ///
    /// Returns `false` without queueing when the connection is not open, and
    /// the status becomes [`ConnectionStatus::Error`]. Packets that fail to
    /// encode, or whose frame a receiver bounded at `max_frame_size` would
    /// discard, are also refused with `false`. A `true` result means the
    /// frame was queued; write failures surface through the status and
    /// through [`shutdown`](Self::shutdown).
    pub fn send(&self, packet: &Packet) -> bool {
        if self.is_closed() {
            return false;
        }
        if self.status() != ConnectionStatus::Open {
            debug!(endpoint = %self.shared.endpoint, id = packet.id, "send rejected, connection not open");
            let _ = self.shared.commands.send(Command::SendRejected);
            return false;
        }

        let frame = self.shared.codec.encode_frame(packet).and_then(|frame| {
            check_frame_size(stuffed_len(&frame), self.shared.max_frame_size)?;
            Ok(frame)
        });
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                error!(endpoint = %self.shared.endpoint, id = packet.id, error = %err, "failed to encode packet");
                return false;
            }
        };
        self.shared.commands.send(Command::Send(frame)).is_ok()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.borrow()
    }

    /// Receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.clone()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    /// Deliver packets for `topic` to `callback`.
    ///
    /// `callback` runs on the connection task and must not block. The
    /// returned guard unregisters on drop.
    pub fn register_topic<F>(&self, topic: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&Packet) + Send + 'static,
    {
        self.register(topic.into(), Sink::callback(callback))
    }

    /// Deliver packets for `topic` through a [`PacketStream`].
    pub fn register_channel(&self, topic: impl Into<String>) -> (Subscription, PacketStream) {
        let (sink, stream) = Sink::channel();
        (self.register(topic.into(), sink), stream)
    }

    fn register(&self, topic: String, sink: Sink) -> Subscription {
        let id = SubscriptionId::next();
        let _ = self.shared.commands.send(Command::Register {
            id,
            topic: topic.clone(),
            sink,
        });
        Subscription {
            id,
            topic,
            commands: self.shared.commands.clone(),
            active: true,
        }
    }

    /// Tear the connection down: cancel timers, close the socket, end all
    /// packet streams. Frames already accepted by [`send`](Self::send) are
    /// written first, bounded by the configured flush timeout. Idempotent.
    pub fn close(&self) {
        self.shared.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// [`close`](Self::close) and wait for the background task to finish.
    ///
    /// Fails with [`PeerError::Unflushed`] when frames accepted by
    /// [`send`](Self::send) never reached the socket, because the link
    /// dropped or the flush timed out. Later calls return `Ok`.
    pub async fn shutdown(&self) -> Result<()> {
        self.close();
        let handle = match self.shared.driver.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return Ok(());
        };
        match handle.await? {
            0 => Ok(()),
            frames => Err(PeerError::Unflushed { frames }),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.shared.endpoint)
            .field("status", &self.status())
            .finish()
    }
}

/// Registration guard returned by [`Connection::register_topic`] and
/// [`Connection::register_channel`].
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    topic: String,
    commands: mpsc::UnboundedSender<Command>,
    active: bool,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Remove exactly this registration. Safe to call more than once.
    pub fn unregister(&mut self) {
        if self.active {
            self.active = false;
            let _ = self.commands.send(Command::Unregister(self.id));
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unregister();
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Send(frame) => f.debug_tuple("Send").field(&frame.len()).finish(),
            Self::SendRejected => f.write_str("SendRejected"),
            Self::Register { id, topic, .. } => f
                .debug_struct("Register")
                .field("id", id)
                .field("topic", topic)
                .finish(),
            Self::Unregister(id) => f.debug_tuple("Unregister").field(id).finish(),
        }
    }
}

/// Frames bound for the socket. A dedicated task writes them so a peer
/// that stops reading never stalls the driver.
struct Outbound {
    frames: mpsc::UnboundedSender<Outgoing>,
    task: JoinHandle<telelink_transport::Result<()>>,
}

struct Outgoing {
    frame: Bytes,
    /// Accepted by [`Connection::send`], as opposed to an announcement.
    tracked: bool,
}

/// Background task state. Single writer for everything below.
struct Driver {
    config: ConnectionConfig,
    state: LinkState,
    status: watch::Sender<ConnectionStatus>,
    commands: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
    codec: PacketCodec,
    inbound: InboundPipeline,
    subscriptions: SubscriptionTable,
    opening: Option<Opening>,
    reader: Option<LinkReader>,
    outbound: Option<Outbound>,
    reconnect_at: Option<Instant>,
    refresh: Option<Interval>,
    /// Frames handed over by `send`, written or not.
    accepted: u64,
    /// Tracked frames the writer tasks completed.
    written: Arc<AtomicU64>,
}

impl Driver {
    fn new(
        config: ConnectionConfig,
        commands: mpsc::UnboundedReceiver<Command>,
        status: watch::Sender<ConnectionStatus>,
        cancel: CancellationToken,
    ) -> Self {
        let inbound = InboundPipeline::new(config.delivery, config.frame.max_frame_size);
        Self {
            config,
            state: LinkState::new(),
            status,
            commands,
            cancel,
            codec: PacketCodec::new(),
            inbound,
            subscriptions: SubscriptionTable::new(),
            opening: None,
            reader: None,
            outbound: None,
            reconnect_at: None,
            refresh: None,
            accepted: 0,
            written: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Drive the link until cancelled. Returns how many frames accepted by
    /// `send` were never written.
    async fn run(mut self) -> u64 {
        debug!(endpoint = %self.config.endpoint, "connection task started");
        self.apply(LinkEvent::Connect);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },

                opened = wait_open(&mut self.opening) => {
                    self.opening = None;
                    match opened {
                        Ok(stream) => {
                            self.attach(stream);
                            self.apply(LinkEvent::Opened);
                        }
                        Err(err) => {
                            warn!(endpoint = %self.config.endpoint, error = %err, "connection attempt failed");
                            self.apply(LinkEvent::Failed);
                        }
                    }
                }

                read = recv_chunk(&mut self.reader) => match read {
                    Ok(Some(chunk)) => self.deliver(&chunk),
                    Ok(None) => {
                        info!(endpoint = %self.config.endpoint, "connection closed by peer");
                        self.apply(LinkEvent::Closed);
                    }
                    Err(err) => {
                        warn!(endpoint = %self.config.endpoint, error = %err, "socket read failed");
                        self.apply(LinkEvent::Failed);
                    }
                },

                written = writer_exit(&mut self.outbound) => {
                    self.outbound = None;
                    match written {
                        Ok(Ok(())) => debug!(endpoint = %self.config.endpoint, "writer finished"),
                        Ok(Err(err)) => {
                            warn!(endpoint = %self.config.endpoint, error = %err, "socket write failed");
                            self.apply(LinkEvent::Failed);
                        }
                        Err(err) => {
                            warn!(endpoint = %self.config.endpoint, error = %err, "writer task ended abnormally");
                            self.apply(LinkEvent::Failed);
                        }
                    }
                }

                _ = sleep_opt(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.apply(LinkEvent::ReconnectElapsed);
                }

                _ = tick_opt(&mut self.refresh) => self.reannounce(),
            }
        }

        self.flush_queued().await;
        self.apply(LinkEvent::Shutdown);

        let lost = self
            .accepted
            .saturating_sub(self.written.load(Ordering::Acquire));
        if lost > 0 {
            warn!(endpoint = %self.config.endpoint, lost, "queued frames were not written");
        }
        debug!(endpoint = %self.config.endpoint, "connection task stopped");
        lost
    }

    /// Take ownership of a freshly opened link and start its writer task.
    fn attach(&mut self, stream: LinkStream) {
        let (reader, writer) = stream.into_split();
        self.reader = Some(reader.with_chunk_size(self.config.frame.read_chunk_size));

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(write_frames(writer, frames_rx, Arc::clone(&self.written)));
        self.outbound = Some(Outbound {
            frames: frames_tx,
            task,
        });
    }

    /// Run the state machine, executing effects in order. A failing effect
    /// feeds a `Failed` event back in.
    fn apply(&mut self, event: LinkEvent) {
        let mut next = Some(event);
        while let Some(event) = next.take() {
            let (state, effects) = transition(self.state, event);
            self.state = state;
            self.publish(state.status);

            for effect in effects {
                if let Err(err) = self.execute(effect) {
                    warn!(endpoint = %self.config.endpoint, ?effect, error = %err, "connection effect failed");
                    next = Some(LinkEvent::Failed);
                    break;
                }
            }
        }
    }

    fn execute(&mut self, effect: Effect) -> Result<()> {
        match effect {
            Effect::OpenSocket => {
                self.close_socket();
                self.inbound.reset();
                let endpoint = self.config.endpoint.clone();
                debug!(%endpoint, "opening connection");
                self.opening = Some(Box::pin(async move { LinkStream::connect(&endpoint).await }));
            }
            Effect::CancelReconnect => self.reconnect_at = None,
            Effect::ScheduleReconnect => {
                debug!(
                    endpoint = %self.config.endpoint,
                    delay_ms = self.config.reconnect_delay.as_millis() as u64,
                    "reconnect scheduled"
                );
                self.reconnect_at = Some(Instant::now() + self.config.reconnect_delay);
            }
            Effect::StartRefresh => {
                let period = self.config.subscription_refresh.max(MIN_REFRESH_PERIOD);
                let mut refresh = interval_at(Instant::now() + period, period);
                refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.refresh = Some(refresh);
                self.announce()?;
            }
            Effect::StopRefresh => self.refresh = None,
            Effect::CloseSocket => self.close_socket(),
        }
        Ok(())
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send(frame) => {
                self.accepted += 1;
                if !self.enqueue(frame, true) {
                    debug!(endpoint = %self.config.endpoint, "dropping queued frame, connection left open state");
                }
            }
            Command::SendRejected => self.apply(LinkEvent::SendRejected),
            Command::Register { id, topic, sink } => {
                debug!(endpoint = %self.config.endpoint, %id, %topic, "subscription registered");
                self.subscriptions.insert_with_id(id, topic, sink);
                self.reannounce();
            }
            Command::Unregister(id) => {
                let removal = self.subscriptions.remove(id);
                debug!(endpoint = %self.config.endpoint, %id, ?removal, "subscription removed");
                if removal.topic_emptied {
                    self.reannounce();
                }
            }
        }
    }

    /// Hand `frame` to the writer task. False when no link is open.
    fn enqueue(&mut self, frame: Bytes, tracked: bool) -> bool {
        if self.state.status != ConnectionStatus::Open {
            return false;
        }
        match &self.outbound {
            Some(outbound) => outbound.frames.send(Outgoing { frame, tracked }).is_ok(),
            None => false,
        }
    }

    /// Write frames that were queued before close, giving up after the flush
    /// timeout. Other pending commands are dropped.
    async fn flush_queued(&mut self) {
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            if let Command::Send(frame) = command {
                self.accepted += 1;
                self.enqueue(frame, true);
            }
        }

        let Some(Outbound { frames, mut task }) = self.outbound.take() else {
            return;
        };
        // Closing the queue lets the writer finish and close its half.
        drop(frames);
        match timeout(self.config.flush_timeout, &mut task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(err))) => {
                warn!(endpoint = %self.config.endpoint, error = %err, "failed to flush queued frames");
            }
            Ok(Err(err)) => {
                warn!(endpoint = %self.config.endpoint, error = %err, "writer task ended abnormally");
            }
            Err(_) => {
                warn!(
                    endpoint = %self.config.endpoint,
                    timeout_ms = self.config.flush_timeout.as_millis() as u64,
                    "flush timed out, abandoning queued frames"
                );
                task.abort();
            }
        }
    }

    /// Announce immediately if open.
    fn reannounce(&mut self) {
        if self.state.status != ConnectionStatus::Open {
            return;
        }
        if let Err(err) = self.announce() {
            warn!(endpoint = %self.config.endpoint, error = %err, "subscription announcement failed");
            self.apply(LinkEvent::Failed);
        }
    }

    fn announce(&mut self) -> Result<()> {
        let now_us = now_micros();
        let Some(packet) = self.subscriptions.announcement(now_us, message_id(now_us)) else {
            return Ok(());
        };
        let frame = self.codec.encode_frame(&packet)?;
        if let Err(err) = check_frame_size(stuffed_len(&frame), self.config.frame.max_frame_size) {
            error!(
                endpoint = %self.config.endpoint,
                topics = self.subscriptions.active_topics().len(),
                error = %err,
                "subscription announcement does not fit in a frame, not sent"
            );
            return Ok(());
        }
        if !self.enqueue(frame, false) {
            return Err(PeerError::Closed);
        }
        Ok(())
    }

    fn deliver(&mut self, chunk: &[u8]) {
        for packet in self.inbound.push(chunk) {
            self.subscriptions.dispatch(&packet);
        }
    }

    fn close_socket(&mut self) {
        self.opening = None;
        self.reader = None;
        if let Some(outbound) = self.outbound.take() {
            outbound.task.abort();
        }
    }

    fn publish(&self, status: ConnectionStatus) {
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
        if changed {
            info!(endpoint = %self.config.endpoint, %status, "connection status changed");
        }
    }
}

/// Writer task body: write frames in order until the queue closes, then
/// close the write half.
async fn write_frames(
    mut writer: LinkWriter,
    mut frames: mpsc::UnboundedReceiver<Outgoing>,
    written: Arc<AtomicU64>,
) -> telelink_transport::Result<()> {
    while let Some(Outgoing { frame, tracked }) = frames.recv().await {
        writer.send(frame).await?;
        if tracked {
            written.fetch_add(1, Ordering::Release);
        }
    }
    writer.close().await
}

/// Stuffed length of a delimited frame.
fn stuffed_len(frame: &[u8]) -> usize {
    frame.len().saturating_sub(2)
}

async fn wait_open(opening: &mut Option<Opening>) -> telelink_transport::Result<LinkStream> {
    match opening {
        Some(fut) => fut.await,
        None => pending().await,
    }
}

async fn recv_chunk(reader: &mut Option<LinkReader>) -> telelink_transport::Result<Option<Bytes>> {
    match reader {
        Some(reader) => reader.recv().await,
        None => pending().await,
    }
}

async fn writer_exit(
    outbound: &mut Option<Outbound>,
) -> std::result::Result<telelink_transport::Result<()>, JoinError> {
    match outbound {
        Some(outbound) => (&mut outbound.task).await,
        None => pending().await,
    }
}

async fn sleep_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn tick_opt(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

/// Microseconds since the Unix epoch.
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_micros() as u64)
        .unwrap_or(0)
}

/// Millisecond clock folded into the 32-bit id space.
fn message_id(now_us: u64) -> u32 {
    ((now_us / 1_000) % u64::from(u32::MAX)) as u32
}
