// MIT License - Copyright (c) 2026 Peter Wright
// Multi-step command flows

use std::fmt;
use std::sync::Arc;

use crate::error::{EvlError, Result};
use crate::protocol::Packet;

/// Predicate deciding whether a received packet continues a flow.
pub type ReplyPredicate = Arc<dyn Fn(&Packet) -> bool + Send + Sync>;

/// Produces the packet for one step of a flow. Evaluated when the step is sent.
pub type PacketStep = Arc<dyn Fn() -> Result<Packet> + Send + Sync>;

/// One logical operation spanning one or more round trips.
///
/// A flow sends its head packet and, if it has a continuation, waits for a
/// received packet matching the continuation's predicate before sending the
/// next flow in the chain. Flows are immutable; [`CommandFlow::append`]
/// returns a new chain and leaves the receiver untouched.
///
/// ```
/// use evl_bridge::{CommandFlow, Packet};
///
/// let enter = CommandFlow::single(Packet::new(72, "1").unwrap());
/// let code = CommandFlow::single(Packet::new(200, "1234").unwrap());
/// let flow = enter.append(|p: &Packet| p.code() == 900, code);
/// assert_eq!(flow.depth(), 2);
/// ```
#[derive(Clone)]
pub struct CommandFlow {
    step: PacketStep,
    reply: Option<(ReplyPredicate, Box<CommandFlow>)>,
}

impl CommandFlow {
    /// A fire-and-forget flow.
    pub fn single(packet: Packet) -> Self {
        Self {
            step: Arc::new(move || Ok(packet.clone())),
            reply: None,
        }
    }

    /// A flow whose packet is built lazily. A step that fails is never sent.
    pub fn deferred<F>(step: F) -> Self
    where
        F: Fn() -> Result<Packet> + Send + Sync + 'static,
    {
        Self {
            step: Arc::new(step),
            reply: None,
        }
    }

    /// Send `packet`, then `next` once a received packet satisfies `predicate`.
    pub fn chained<P>(packet: Packet, predicate: P, next: CommandFlow) -> Self
    where
        P: Fn(&Packet) -> bool + Send + Sync + 'static,
    {
        Self::single(packet).with_reply(Arc::new(predicate), next)
    }

    fn with_reply(self, predicate: ReplyPredicate, next: CommandFlow) -> Self {
        Self {
            step: self.step,
            reply: Some((predicate, Box::new(next))),
        }
    }

    /// Attach `next` after the last continuation of this chain.
    pub fn append<P>(&self, predicate: P, next: CommandFlow) -> Self
    where
        P: Fn(&Packet) -> bool + Send + Sync + 'static,
    {
        self.append_shared(Arc::new(predicate), next)
    }

    fn append_shared(&self, predicate: ReplyPredicate, next: CommandFlow) -> Self {
        match &self.reply {
            None => self.clone().with_reply(predicate, next),
            Some((existing, tail)) => Self {
                step: self.step.clone(),
                reply: Some((existing.clone(), Box::new(tail.append_shared(predicate, next)))),
            },
        }
    }

    /// Materialize the head packet of this flow.
    pub fn packet(&self) -> Result<Packet> {
        (self.step)()
    }

    /// The predicate and the flow it triggers, if any.
    pub fn continuation(&self) -> Option<(&ReplyPredicate, &CommandFlow)> {
        self.reply.as_ref().map(|(pred, next)| (pred, next.as_ref()))
    }

    pub(crate) fn into_parts(self) -> (PacketStep, Option<(ReplyPredicate, CommandFlow)>) {
        (self.step, self.reply.map(|(pred, next)| (pred, *next)))
    }

    /// Number of packets the complete chain sends.
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut current = self;
        while let Some((_, next)) = current.continuation() {
            depth += 1;
            current = next;
        }
        depth
    }
}

impl From<Packet> for CommandFlow {
    fn from(packet: Packet) -> Self {
        CommandFlow::single(packet)
    }
}

impl fmt::Debug for CommandFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = match self.packet() {
            Ok(p) => p.to_string(),
            Err(e) => format!("<{}>", e),
        };
        f.debug_struct("CommandFlow")
            .field("head", &head)
            .field("depth", &self.depth())
            .finish()
    }
}

/// Validate a user/master access code: 4 to 6 ASCII digits.
pub fn validate_code(code: &str) -> Result<&str> {
    let len_ok = (4..=6).contains(&code.len());
    if len_ok && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(code)
    } else {
        Err(EvlError::validation(
            "Code does not match requirement of 4-6 digits",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(code: u16, data: &str) -> Packet {
        Packet::new(code, data).unwrap()
    }

    #[test]
    fn test_single_has_no_continuation() {
        let flow = CommandFlow::single(packet(1, ""));
        assert!(flow.continuation().is_none());
        assert_eq!(flow.depth(), 1);
        assert_eq!(flow.packet().unwrap(), packet(1, ""));
    }

    #[test]
    fn test_chained_predicate() {
        let flow = CommandFlow::chained(
            packet(30, "1"),
            |p: &Packet| p.code() == 900,
            CommandFlow::single(packet(200, "1234")),
        );
        let (pred, next) = flow.continuation().unwrap();
        assert!(pred(&packet(900, "")));
        assert!(!pred(&packet(500, "030")));
        assert_eq!(next.packet().unwrap(), packet(200, "1234"));
    }

    #[test]
    fn test_append_walks_to_tail() {
        let base = CommandFlow::chained(
            packet(72, "1"),
            |p: &Packet| p.code() == 900,
            CommandFlow::single(packet(200, "1234")),
        );
        let extended = base.append(
            |p: &Packet| p.code() == 680,
            CommandFlow::single(packet(71, "105")),
        );
        assert_eq!(base.depth(), 2);
        assert_eq!(extended.depth(), 3);

        let (_, second) = extended.continuation().unwrap();
        let (pred, third) = second.continuation().unwrap();
        assert!(pred(&packet(680, "1")));
        assert_eq!(third.packet().unwrap(), packet(71, "105"));
        assert_eq!(extended.packet().unwrap(), packet(72, "1"));
    }

    #[test]
    fn test_append_to_single() {
        let flow = CommandFlow::single(packet(1, ""))
            .append(|_: &Packet| true, CommandFlow::single(packet(0, "")));
        assert_eq!(flow.depth(), 2);
    }

    #[test]
    fn test_deferred_step_validation() {
        let flow = CommandFlow::deferred(|| {
            let code = validate_code("12a4")?;
            Packet::new(200, code)
        });
        assert!(matches!(flow.packet(), Err(EvlError::Validation(_))));
    }

    #[test]
    fn test_validate_code() {
        assert!(validate_code("1234").is_ok());
        assert!(validate_code("123456").is_ok());
        assert!(validate_code("123").is_err());
        assert!(validate_code("1234567").is_err());
        assert!(validate_code("12a4").is_err());
        assert!(validate_code("").is_err());
    }
}
