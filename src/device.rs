//! Async device handle over any byte stream.
//!
//! A spawned reader task owns the read half of the transport and runs every
//! inbound byte through a [`FrameDecoder`]. Responses resolve pending
//! requests through the shared [`Dispatcher`]; events are decoded and fanned
//! out to subscribers. Writes share the write half behind an async mutex.

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex as AsyncMutex, broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace, warn};

use crate::commands::{Commander, Opcode, Response};
use crate::dispatch::Dispatcher;
use crate::events::{Event, Fields, StreamingMask, decode_event, decode_response};
use crate::protocol::metrics::{Failure, Metrics};
use crate::protocol::{
    Error, Frame, FrameDecoder, FrameKind, MIN_FRAME_SIZE, Options, Result, encode,
};

/// Device configuration options.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceConfig {
    /// How long to wait for a response; `None` waits forever.
    pub response_timeout: Option<Duration>,
    /// Ask the robot to answer every command.
    pub request_ack: bool,
    /// Reset the robot's inactivity timer with every command.
    pub reset_inactivity_timer: bool,
    /// Events buffered per subscriber before the slowest one lags.
    pub event_capacity: usize,
    /// Size of the transport read buffer in bytes.
    pub read_buffer_size: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            response_timeout: Some(Duration::from_secs(10)),
            request_ack: true,
            reset_inactivity_timer: true,
            event_capacity: 256,
            read_buffer_size: 1024,
        }
    }
}

impl DeviceConfig {
    /// Option bits sent with every command
    #[must_use]
    pub const fn options(&self) -> Options {
        Options {
            request_ack: self.request_ack,
            reset_inactivity_timer: self.reset_inactivity_timer,
        }
    }
}

/// Everything the reader task publishes
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// A response frame, matched or not
    Response(Frame),
    /// A decoded async event
    Event(Event),
    /// Reading from the transport failed; [`DeviceEvent::Closed`] follows
    Error(Arc<io::Error>),
    /// The transport is gone. Nothing is published after this.
    Closed,
}

#[derive(Debug)]
struct Shared {
    dispatcher: Mutex<Dispatcher>,
    closed: AtomicBool,
    streaming: AtomicU64,
    events: broadcast::Sender<DeviceEvent>,
}

impl Shared {
    fn dispatcher(&self) -> MutexGuard<'_, Dispatcher> {
        self.dispatcher.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn streaming_mask(&self) -> StreamingMask {
        StreamingMask::from_u64(self.streaming.load(Ordering::Acquire))
    }

    fn handle_frame(&self, frame: Frame) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        Metrics::record_received(frame.kind());
        trace!(
            kind = %frame.kind(),
            sequence = frame.sequence(),
            len = frame.payload().len(),
            "frame received"
        );

        match frame.kind() {
            FrameKind::Response => {
                let _ = self.events.send(DeviceEvent::Response(frame.clone()));
                // Unmatched responses are counted and logged by the dispatcher.
                let _ = self.dispatcher().resolve(frame);
            }
            FrameKind::Event => match decode_event(&frame, self.streaming_mask()) {
                Ok(event) => {
                    if matches!(event, Event::Unknown(_)) {
                        Metrics::record_unknown_event();
                        debug!(id = frame.event_id(), "unknown event id");
                    }
                    let _ = self.events.send(DeviceEvent::Event(event));
                }
                Err(err) => {
                    Metrics::record_failure(Failure::Malformed);
                    warn!(error = %err, "dropping malformed event");
                }
            },
        }
    }

    /// Mark the link closed, fail pending requests and tell subscribers.
    ///
    /// Only the first call has any effect.
    fn shutdown(&self, cause: Option<io::Error>) {
        let cause = cause.map(Arc::new);
        {
            let mut dispatcher = self.dispatcher();
            if self.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            if let Some(err) = &cause {
                let _ = self.events.send(DeviceEvent::Error(Arc::clone(err)));
            }
            dispatcher.fail_all(|| match &cause {
                Some(err) => Error::Transport(Arc::clone(err)),
                None => Error::Closed,
            });
        }
        let _ = self.events.send(DeviceEvent::Closed);
    }
}

async fn read_loop<R>(mut reader: R, shared: Arc<Shared>, buffer_size: usize)
where
    R: AsyncRead + Unpin,
{
    let mut decoder = FrameDecoder::with_capacity(buffer_size);
    let mut buf = vec![0u8; buffer_size.max(MIN_FRAME_SIZE)];

    let cause = loop {
        let used = match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("transport closed");
                break None;
            }
            Ok(used) => used,
            Err(err) => {
                warn!(error = %err, "transport read failed");
                break Some(err);
            }
        };

        decoder.push(&buf[..used]);
        while let Some(result) = decoder.next_frame() {
            match result {
                Ok(frame) => shared.handle_frame(frame),
                Err(err @ Error::ChecksumMismatch { .. }) => {
                    Metrics::record_failure(Failure::Checksum);
                    warn!(error = %err, "discarding corrupt frame");
                }
                Err(err) => warn!(error = %err, "discarding undecodable frame"),
            }
        }
    };

    shared.shutdown(cause);
}

/// Resolves with the response frame for one sequence.
///
/// Dropping it before it resolves abandons the sequence slot.
struct PendingResponse {
    rx: oneshot::Receiver<Result<Frame>>,
    sequence: u8,
    shared: Arc<Shared>,
    done: bool,
}

impl Future for PendingResponse {
    type Output = Result<Frame>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = ready!(Pin::new(&mut self.rx).poll(cx));
        self.done = true;
        Poll::Ready(result.unwrap_or(Err(Error::Closed)))
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if !self.done {
            self.shared.dispatcher().abandon(self.sequence);
        }
    }
}

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Handle to one connected robot
pub struct Device {
    shared: Arc<Shared>,
    writer: AsyncMutex<Writer>,
    reader: JoinHandle<()>,
    config: DeviceConfig,
}

impl Device {
    /// Take over `stream` and start the reader task
    ///
    /// Must be called from within a tokio runtime.
    pub fn open<S>(stream: S, config: DeviceConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let shared = Arc::new(Shared {
            dispatcher: Mutex::new(Dispatcher::new()),
            closed: AtomicBool::new(false),
            streaming: AtomicU64::new(0),
            events,
        });

        let reader = tokio::spawn(read_loop(
            read_half,
            Arc::clone(&shared),
            config.read_buffer_size,
        ));
        debug!(?config, "device opened");

        Self {
            shared,
            writer: AsyncMutex::new(Box::new(write_half)),
            reader,
            config,
        }
    }

    /// Send a command and wait for its response
    ///
    /// Without acknowledgement the call returns once the frame is written,
    /// reusing the current sequence number.
    ///
    /// # Errors
    ///
    /// - [`Error::PayloadTooLarge`] if `payload` exceeds 254 bytes
    /// - [`Error::SequenceExhausted`] if the sequence slot is still taken
    /// - [`Error::Device`] if the robot answers with a failure status
    /// - [`Error::Timeout`] if no answer arrives in time
    /// - [`Error::Closed`] if the transport is gone
    /// - [`Error::Transport`] if the transport failed while this request waited
    #[instrument(level = "debug", skip_all, fields(opcode = %opcode))]
    pub async fn command(&self, opcode: Opcode, payload: Vec<u8>) -> Result<Response> {
        let options = self.config.options();

        if self.is_closed() {
            return Err(Error::Closed);
        }

        if !options.request_ack {
            let sequence = self.shared.dispatcher().current_sequence();
            let bytes = encode(opcode.device, opcode.command, sequence, &payload, options)?;
            self.write(&bytes).await?;
            return Ok(Response {
                opcode,
                sequence,
                frame: None,
                fields: Fields::default(),
            });
        }

        let (tx, rx) = oneshot::channel();
        let (sequence, bytes) = {
            let mut dispatcher = self.shared.dispatcher();
            if self.shared.closed.load(Ordering::Acquire) {
                return Err(Error::Closed);
            }
            let sequence = dispatcher.next_sequence();
            let bytes = encode(opcode.device, opcode.command, sequence, &payload, options)?;
            dispatcher.register(sequence, move |result| {
                let _ = tx.send(result);
            })?;
            (sequence, bytes)
        };

        let pending = PendingResponse {
            rx,
            sequence,
            shared: Arc::clone(&self.shared),
            done: false,
        };

        self.write(&bytes).await?;

        let frame = match self.config.response_timeout {
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(sequence, ?limit, "no response in time");
                    return Err(Error::Timeout { sequence });
                }
            },
            None => pending.await?,
        };

        let fields = match decode_response(opcode.device, opcode.command, frame.payload()) {
            Ok(fields) => fields,
            Err(err) => {
                Metrics::record_failure(Failure::Malformed);
                warn!(error = %err, "response payload does not match its descriptor");
                Fields::default()
            }
        };

        Ok(Response {
            opcode,
            sequence,
            frame: Some(frame),
            fields,
        })
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Metrics::record_sent();
        trace!(len = bytes.len(), "frame written");
        Ok(())
    }

    /// Receive every response and event from now on
    ///
    /// The stream ends with [`DeviceEvent::Closed`] once the transport goes
    /// away, whether by [`Device::close`], end of stream or a read error.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.shared.events.subscribe()
    }

    /// Sensor selection used to decode streaming frames
    #[must_use]
    pub fn streaming_mask(&self) -> StreamingMask {
        self.shared.streaming_mask()
    }

    /// Replace the sensor selection used to decode streaming frames
    pub fn set_streaming_mask(&self, mask: StreamingMask) {
        self.shared.streaming.store(mask.to_u64(), Ordering::Release);
    }

    /// Number of requests waiting on a response
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.dispatcher().in_flight()
    }

    /// Check if the transport has closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Get configuration
    #[must_use]
    pub const fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Stop the reader, fail pending requests and shut the write half
    pub async fn close(&self) -> Result<()> {
        self.reader.abort();
        self.shared.shutdown(None);
        let mut writer = self.writer.lock().await;
        writer.shutdown().await?;
        debug!("device closed");
        Ok(())
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("config", &self.config)
            .field("streaming", &self.streaming_mask())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl Commander for Device {
    fn command(
        &self,
        opcode: Opcode,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<Response>> + Send {
        Device::command(self, opcode, payload)
    }

    fn streaming_mask(&self) -> StreamingMask {
        Device::streaming_mask(self)
    }

    fn set_streaming_mask(&self, mask: StreamingMask) {
        Device::set_streaming_mask(self, mask);
    }
}
