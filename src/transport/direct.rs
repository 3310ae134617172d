// MIT License - Copyright (c) 2026 Peter Wright
// TCP session to the Envisalink TPI

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::ConnectionConfig;
use crate::constants::{ack, client, login, MAX_FRAME_LEN};
use crate::error::{EvlError, LoginFailure, Result};
use crate::flow::CommandFlow;
use crate::protocol::Packet;
use crate::transport::command::CommandEngine;
use crate::transport::reply::{Completion, Continuation};
use crate::transport::{transition, ConnectionState, Dispatch, UnsolicitedHandler};

/// A flow queued for the writer task.
///
/// `outcome` reports the head packet's send result; `done` is the completion
/// of a tracked chain this flow continues.
struct QueuedSend {
    flow: CommandFlow,
    outcome: Option<oneshot::Sender<Result<()>>>,
    done: Option<Completion>,
}

/// Completion handle returned by [`EvlConnection::send_async`].
pub struct SendHandle {
    rx: oneshot::Receiver<Result<()>>,
}

impl SendHandle {
    /// Wait for the queued flow's head packet to be sent and acknowledged.
    pub async fn outcome(self) -> Result<()> {
        self.rx.await.unwrap_or(Err(EvlError::ChannelClosed))
    }
}

/// An authenticated TPI session.
///
/// Owns the socket, a receive loop that classifies every inbound packet,
/// and a writer task that sends queued flows (flow continuations and
/// [`send_async`](Self::send_async) calls) one at a time.
pub struct EvlConnection {
    engine: Arc<CommandEngine>,
    state: Arc<watch::Sender<ConnectionState>>,
    queue_tx: mpsc::UnboundedSender<QueuedSend>,
    shutdown_tx: watch::Sender<bool>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
    flow_timeout: Duration,
}

impl EvlConnection {
    /// Connect, log in and start the receive loop.
    ///
    /// `credentials` is called once, when the panel asks for the password.
    /// Unsolicited packets are passed to `handler` in arrival order.
    pub async fn open<C, H>(config: &ConnectionConfig, credentials: C, handler: H) -> Result<Self>
    where
        C: FnOnce() -> String,
        H: UnsolicitedHandler,
    {
        let state = Arc::new(watch::Sender::new(ConnectionState::Connecting));
        let address = config.address();
        info!("Connecting to {}", address);

        let stream = match timeout(config.connect_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                error!("TCP connect to {} failed: {}", address, e);
                transition(&state, ConnectionState::Failed);
                return Err(EvlError::Io(e));
            }
            Err(_) => {
                error!("TCP connect to {} timed out", address);
                transition(&state, ConnectionState::Failed);
                return Err(EvlError::ConnectTimeout);
            }
        };
        debug!("TCP socket connected");

        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let engine = Arc::new(CommandEngine::new(Box::new(write_half), config.ack_timeout));

        transition(&state, ConnectionState::LoggingIn);
        let outcome = match timeout(config.login_timeout, login(&mut reader, &engine, credentials)).await {
            Ok(result) => result,
            Err(_) => Err(EvlError::LoginTimeout),
        };
        if let Err(e) = outcome {
            error!("Login failed: {}", e);
            transition(&state, ConnectionState::Failed);
            engine.shutdown().await;
            return Err(e);
        }
        info!("Password correct, session established");
        transition(&state, ConnectionState::Ready);

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let reader_task = spawn_reader_task(
            reader,
            engine.clone(),
            Arc::new(handler),
            queue_tx.clone(),
            state.clone(),
            shutdown_rx.clone(),
        );
        let sender_task = spawn_sender_task(engine.clone(), queue_rx, shutdown_rx);

        Ok(Self {
            engine,
            state,
            queue_tx,
            shutdown_tx,
            tasks: StdMutex::new(vec![reader_task, sender_task]),
            flow_timeout: config.flow_timeout,
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// True while the session is `Ready`.
    pub fn is_alive(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(EvlError::Disconnected)
        }
    }

    /// Send one packet and wait for the acknowledgement window.
    pub async fn send(&self, packet: &Packet) -> Result<()> {
        self.ensure_ready()?;
        self.engine.send(packet).await
    }

    /// Send a flow; its continuation (if any) fires from the receive loop.
    pub async fn send_flow(&self, flow: CommandFlow) -> Result<()> {
        self.ensure_ready()?;
        self.engine.send_flow(flow).await
    }

    /// Send a flow and wait until its whole continuation chain has been sent.
    ///
    /// Fails with [`EvlError::FlowTimeout`] when the panel does not produce the
    /// replies the chain waits for within the configured flow timeout. The
    /// unfinished chain is then abandoned and will not fire later.
    pub async fn send_confirmed(&self, flow: CommandFlow) -> Result<()> {
        self.ensure_ready()?;
        let head = flow.packet()?;
        let (tx, rx) = oneshot::channel();
        self.engine.send_tracked(flow, &mut Some(tx)).await?;
        match timeout(self.flow_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) if !self.is_alive() => Err(EvlError::Disconnected),
            Ok(Err(_)) => Err(EvlError::ChannelClosed),
            Err(_) => {
                warn!("Abandoning flow {} after {:?}", head, self.flow_timeout);
                Err(EvlError::FlowTimeout {
                    packet: head,
                    timeout: self.flow_timeout,
                })
            }
        }
    }

    /// Send flows in order, stopping at the first error.
    ///
    /// Each flow's continuation chain must finish (see
    /// [`send_confirmed`](Self::send_confirmed)) before the next flow is sent.
    pub async fn send_all<I>(&self, flows: I) -> Result<()>
    where
        I: IntoIterator<Item = CommandFlow>,
    {
        for flow in flows {
            self.send_confirmed(flow).await?;
        }
        Ok(())
    }

    /// Queue a flow on the writer task and return immediately.
    pub fn send_async(&self, flow: CommandFlow) -> SendHandle {
        let (tx, rx) = oneshot::channel();
        let queued = QueuedSend {
            flow,
            outcome: Some(tx),
            done: None,
        };
        if let Err(mpsc::error::SendError(queued)) = self.queue_tx.send(queued)
            && let Some(tx) = queued.outcome
        {
            let _ = tx.send(Err(EvlError::ChannelClosed));
        }
        SendHandle { rx }
    }

    /// Number of registered flow continuations.
    pub fn pending_replies(&self) -> usize {
        self.engine.replies().len()
    }

    /// Drop every registered flow continuation.
    pub fn clear_pending_replies(&self) {
        let count = self.engine.replies().len();
        self.engine.replies().clear();
        info!("Cleared {} pending replies", count);
    }

    /// Shut down the socket and both tasks. Calling it again does nothing.
    pub async fn close(&self) {
        if self.state() == ConnectionState::Closing {
            return;
        }
        let was_open = transition(&self.state, ConnectionState::Closing);
        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();
        if !was_open && tasks.is_empty() {
            debug!("Connection already {}", self.state());
            return;
        }

        let _ = self.shutdown_tx.send(true);
        self.engine.shutdown().await;
        for handle in tasks {
            handle.abort();
        }
        if was_open {
            transition(&self.state, ConnectionState::Closed);
        }
    }
}

impl Drop for EvlConnection {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        for handle in tasks.drain(..) {
            handle.abort();
        }
    }
}

/// Read and decode one line during the login interaction.
async fn read_packet<R>(reader: &mut BufReader<R>) -> Result<Packet>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        match read_frame(reader, &mut buf).await? {
            Frame::Eof => return Err(EvlError::Disconnected),
            Frame::Overlong => {
                warn!("Dropping line longer than {} bytes", MAX_FRAME_LEN);
                continue;
            }
            Frame::Line => {}
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            continue;
        }
        let packet = Packet::deserialize(line)?;
        debug!("Received {}", packet);
        return Ok(packet);
    }
}

/// `505/3 -> 005<password> -> 500 -> 505/<result>`
async fn login<R, C>(reader: &mut BufReader<R>, engine: &CommandEngine, credentials: C) -> Result<()>
where
    R: AsyncRead + Unpin,
    C: FnOnce() -> String,
{
    let request = read_packet(reader).await?;
    if request.code() != ack::LOGIN_INTERACTION || request.data() != login::PASSWORD_REQUEST {
        return Err(EvlError::LoginProtocol {
            details: format!("expected login request, got {}", request),
        });
    }

    debug!("Sending network login");
    let password = Packet::new(client::NETWORK_LOGIN, credentials())?;
    engine.write_raw(&password).await?;

    let acked = read_packet(reader).await?;
    if acked.code() != ack::COMMAND_ACK {
        return Err(EvlError::LoginProtocol {
            details: format!("login command failed ack {}", acked),
        });
    }

    let result = read_packet(reader).await?;
    if result.code() != ack::LOGIN_INTERACTION {
        return Err(EvlError::LoginProtocol {
            details: format!("login interaction failed, resp={}", result),
        });
    }
    match result.data() {
        login::SUCCESS => Ok(()),
        login::INCORRECT_PASSWORD => Err(EvlError::LoginFailed(LoginFailure::IncorrectPassword)),
        login::TIMED_OUT => Err(EvlError::LoginFailed(LoginFailure::TimedOut)),
        login::PASSWORD_REQUEST => Err(EvlError::LoginFailed(LoginFailure::NoPassword)),
        _ => Err(EvlError::LoginProtocol {
            details: format!("unexpected login result {}", result),
        }),
    }
}

/// Spawn the receive loop: one line at a time, classified as ack, flow
/// reply or unsolicited packet, in that order.
fn spawn_reader_task<R>(
    mut reader: BufReader<R>,
    engine: Arc<CommandEngine>,
    handler: Arc<dyn UnsolicitedHandler>,
    queue_tx: mpsc::UnboundedSender<QueuedSend>,
    state: Arc<watch::Sender<ConnectionState>>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::with_capacity(128);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    debug!("Reader: shutdown requested");
                    break;
                }
                read = read_frame(&mut reader, &mut buf) => match read {
                    Ok(Frame::Eof) => {
                        info!("Reader: connection closed by panel");
                        connection_lost(&engine, &state);
                        break;
                    }
                    Ok(Frame::Overlong) => {
                        warn!("Dropping line longer than {} bytes", MAX_FRAME_LEN);
                    }
                    Ok(Frame::Line) => {
                        let line = String::from_utf8_lossy(&buf);
                        let line = line.trim_end_matches(['\r', '\n']);
                        if line.is_empty() {
                            continue;
                        }
                        match Packet::deserialize(line) {
                            Ok(packet) => process_packet(packet, &engine, handler.as_ref(), &queue_tx),
                            Err(e) => warn!("Dropping undecodable line: {}", e),
                        }
                    }
                    Err(e) => {
                        error!("Reader: read error: {}", e);
                        connection_lost(&engine, &state);
                        break;
                    }
                }
            }
        }
    })
}

fn connection_lost(engine: &CommandEngine, state: &watch::Sender<ConnectionState>) {
    engine.release_waiter();
    engine.replies().clear();
    let lost = state.send_if_modified(|current| {
        if *current == ConnectionState::Ready {
            *current = ConnectionState::Closed;
            true
        } else {
            false
        }
    });
    if lost {
        warn!("Connection lost");
    }
}

fn process_packet(
    packet: Packet,
    engine: &CommandEngine,
    handler: &dyn UnsolicitedHandler,
    queue_tx: &mpsc::UnboundedSender<QueuedSend>,
) {
    debug!("Received {}", packet);
    if engine.resolve_ack(&packet) {
        return;
    }
    if let Some(Continuation { next, done }) = engine.replies().take_match(&packet) {
        debug!("Processing reply action for packet {}", packet);
        let queued = QueuedSend {
            flow: next,
            outcome: None,
            done,
        };
        if queue_tx.send(queued).is_err() {
            warn!("Writer task gone, dropping continuation for {}", packet);
        }
        return;
    }
    if handler.handle(&packet) == Dispatch::Unrecognized {
        warn!("Did not process packet {}", packet);
    }
}

/// Spawn the writer task that sends queued flows one at a time.
fn spawn_sender_task(
    engine: Arc<CommandEngine>,
    mut queue_rx: mpsc::UnboundedReceiver<QueuedSend>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let queued = tokio::select! {
                _ = shutdown_rx.changed() => break,
                queued = queue_rx.recv() => match queued {
                    Some(queued) => queued,
                    None => break,
                },
            };
            let mut done = queued.done;
            let result = engine.send_tracked(queued.flow, &mut done).await;
            if let Err(e) = &result {
                error!("Failed to send queued flow: {}", e);
            }
            if let Some(tx) = queued.outcome.or(done) {
                let _ = tx.send(result);
            }
        }
        debug!("Sender task stopped");
    })
}

/// Outcome of reading one newline-terminated line.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Line,
    Overlong,
    Eof,
}

/// Read one line into `buf`, reading at most [`MAX_FRAME_LEN`] bytes per line.
///
/// A longer line is consumed up to its newline and reported as `Overlong`.
async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let n = (&mut *reader)
        .take(MAX_FRAME_LEN as u64)
        .read_until(b'\n', buf)
        .await?;
    if n == 0 {
        return Ok(Frame::Eof);
    }
    if n < MAX_FRAME_LEN || buf.ends_with(b"\n") {
        return Ok(Frame::Line);
    }
    loop {
        buf.clear();
        let n = (&mut *reader)
            .take(MAX_FRAME_LEN as u64)
            .read_until(b'\n', buf)
            .await?;
        if n == 0 || buf.ends_with(b"\n") {
            buf.clear();
            return Ok(Frame::Overlong);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_frame_lines() {
        let mut reader = BufReader::new(&b"00090\r\n6543D2\r\n"[..]);
        let mut buf = Vec::new();
        assert_eq!(read_frame(&mut reader, &mut buf).await.unwrap(), Frame::Line);
        assert_eq!(buf, b"00090\r\n");
        assert_eq!(read_frame(&mut reader, &mut buf).await.unwrap(), Frame::Line);
        assert_eq!(buf, b"6543D2\r\n");
        assert_eq!(read_frame(&mut reader, &mut buf).await.unwrap(), Frame::Eof);
    }

    #[tokio::test]
    async fn test_read_frame_drops_overlong_line() {
        let mut input = vec![b'7'; MAX_FRAME_LEN * 3];
        input.extend_from_slice(b"\r\n00090\r\n");
        let mut reader = BufReader::new(&input[..]);
        let mut buf = Vec::new();
        assert_eq!(read_frame(&mut reader, &mut buf).await.unwrap(), Frame::Overlong);
        assert!(buf.len() <= MAX_FRAME_LEN);
        assert_eq!(read_frame(&mut reader, &mut buf).await.unwrap(), Frame::Line);
        assert_eq!(buf, b"00090\r\n");
    }

    #[tokio::test]
    async fn test_read_frame_line_at_limit() {
        let mut input = vec![b'1'; MAX_FRAME_LEN - 1];
        input.push(b'\n');
        let mut reader = BufReader::new(&input[..]);
        let mut buf = Vec::new();
        assert_eq!(read_frame(&mut reader, &mut buf).await.unwrap(), Frame::Line);
        assert_eq!(buf.len(), MAX_FRAME_LEN);
    }
}
