// MIT License - Copyright (c) 2026 Peter Wright
// Serialized send / acknowledgement engine

use std::sync::{Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::constants::{ack, EOT};
use crate::error::{describe_system_error, EvlError, Result, SYSTEM_ERROR_REJECT_THRESHOLD};
use crate::flow::CommandFlow;
use crate::protocol::{parse_field, Packet};
use crate::transport::reply::{Completion, PendingReplies};

/// Write half of the session, boxed so tests can drive the engine over a duplex pipe.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// How the panel answered the last command.
#[derive(Debug)]
enum AckOutcome {
    Positive,
    Negative {
        reply: Packet,
        reason: Option<&'static str>,
    },
}

struct AckWaiter {
    code: u16,
    tx: oneshot::Sender<AckOutcome>,
}

/// Writes packets one at a time and matches the panel's acknowledgements.
///
/// The writer lock is held from the write until the acknowledgement window
/// closes, so at most one acknowledgement wait is outstanding.
pub struct CommandEngine {
    writer: Mutex<BoxedWriter>,
    waiter: StdMutex<Option<AckWaiter>>,
    replies: PendingReplies,
    ack_timeout: Duration,
}

impl CommandEngine {
    pub fn new(writer: BoxedWriter, ack_timeout: Duration) -> Self {
        Self {
            writer: Mutex::new(writer),
            waiter: StdMutex::new(None),
            replies: PendingReplies::new(),
            ack_timeout,
        }
    }

    fn waiter(&self) -> MutexGuard<'_, Option<AckWaiter>> {
        self.waiter.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn replies(&self) -> &PendingReplies {
        &self.replies
    }

    /// Send a packet and wait for its acknowledgement.
    ///
    /// No answer within the ack timeout counts as success. A negative answer
    /// fails with [`EvlError::NegativeAck`]; the session stays usable.
    pub async fn send(&self, packet: &Packet) -> Result<()> {
        let mut writer = self.writer.lock().await;

        let (tx, rx) = oneshot::channel();
        *self.waiter() = Some(AckWaiter {
            code: packet.code(),
            tx,
        });

        debug!("Sending {}", packet);
        if let Err(e) = write_frame(&mut writer, packet).await {
            self.waiter().take();
            error!("Failed to write {}: {}", packet, e);
            return Err(e);
        }

        let result = match timeout(self.ack_timeout, rx).await {
            Ok(Ok(AckOutcome::Positive)) => {
                debug!("Got ack for {}", packet);
                Ok(())
            }
            Ok(Ok(AckOutcome::Negative { reply, reason })) => Err(EvlError::NegativeAck {
                packet: packet.clone(),
                reply,
                reason,
            }),
            // Waiter dropped by close()
            Ok(Err(_)) => Err(EvlError::Disconnected),
            Err(_) => {
                self.waiter().take();
                debug!("No ack for {} within {:?}", packet, self.ack_timeout);
                Ok(())
            }
        };
        drop(writer);
        result
    }

    /// Write a packet without waiting for an acknowledgement.
    pub async fn write_raw(&self, packet: &Packet) -> Result<()> {
        let mut writer = self.writer.lock().await;
        write_frame(&mut writer, packet).await
    }

    /// Send a flow's head packet, registering its continuation first.
    ///
    /// A head step that fails validation is never sent. If the send fails the
    /// registration is withdrawn.
    pub async fn send_flow(&self, flow: CommandFlow) -> Result<()> {
        self.send_tracked(flow, &mut None).await
    }

    /// [`send_flow`](Self::send_flow) that also reports when the whole chain is done.
    ///
    /// With a continuation, `done` moves into the registration and travels down
    /// the chain; without one it resolves once the head packet is through its
    /// ack window. On error `done` is left in place for the caller.
    pub async fn send_tracked(&self, flow: CommandFlow, done: &mut Option<Completion>) -> Result<()> {
        let (step, reply) = flow.into_parts();
        let packet = step()?;
        let registration =
            reply.map(|(predicate, next)| self.replies.insert(predicate, next, done.take()));

        let result = self.send(&packet).await;
        match (&result, registration) {
            (Err(_), Some(id)) => {
                if let Some(withdrawn) = self.replies.remove(id) {
                    *done = withdrawn.done;
                }
            }
            (Ok(()), None) => {
                if let Some(tx) = done.take() {
                    let _ = tx.send(Ok(()));
                }
            }
            _ => {}
        }
        result
    }

    /// Resolve the pending acknowledgement wait if `packet` is an ack code.
    ///
    /// Returns false when the packet is not an acknowledgement at all.
    pub fn resolve_ack(&self, packet: &Packet) -> bool {
        let outcome = match packet.code() {
            ack::COMMAND_ACK => {
                let acked = parse_field(packet.data(), 0..3);
                let mut waiter = self.waiter();
                let matches = match (waiter.as_ref(), acked) {
                    (Some(w), Some(code)) => w.code == code,
                    (Some(_), None) => true,
                    (None, _) => false,
                };
                if matches {
                    if let Some(w) = waiter.take() {
                        let _ = w.tx.send(AckOutcome::Positive);
                    }
                } else {
                    debug!("Ignoring ack {} with no matching command", packet);
                }
                return true;
            }
            ack::BAD_CHECKSUM => {
                error!("A command had been sent with a bad checksum");
                AckOutcome::Negative {
                    reply: packet.clone(),
                    reason: Some("bad checksum"),
                }
            }
            ack::SYSTEM_ERROR => {
                let Some(code) = parse_field(packet.data(), 0..3) else {
                    warn!("Malformed system error packet {}", packet);
                    return true;
                };
                let description = describe_system_error(code);
                error!("System error code = {:03}, message = {}", code, description);
                if code < SYSTEM_ERROR_REJECT_THRESHOLD {
                    return true;
                }
                AckOutcome::Negative {
                    reply: packet.clone(),
                    reason: Some(description),
                }
            }
            ack::INVALID_ACCESS_CODE => {
                error!("An access code that was entered was invalid");
                AckOutcome::Negative {
                    reply: packet.clone(),
                    reason: Some("invalid access code"),
                }
            }
            _ => return false,
        };

        match self.waiter().take() {
            Some(w) => {
                let _ = w.tx.send(outcome);
            }
            None => info!("Negative ack {} arrived with no command waiting", packet),
        }
        true
    }

    /// Release any acknowledgement waiter with [`EvlError::Disconnected`].
    pub fn release_waiter(&self) {
        if self.waiter().take().is_some() {
            debug!("Released pending ack waiter");
        }
    }

    /// Release waiters and shut the write half of the socket.
    ///
    /// Registered continuations are dropped with it, so chains being tracked
    /// by [`send_tracked`](Self::send_tracked) resolve as closed.
    pub async fn shutdown(&self) {
        self.release_waiter();
        self.replies.clear();
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!("Socket shutdown: {}", e);
        }
    }
}

async fn write_frame(writer: &mut BoxedWriter, packet: &Packet) -> Result<()> {
    let mut line = packet.serialize();
    line.push_str(EOT);
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
