use crate::codec::{Codec, CodecRef};
use crate::context::PacketContext;
use crate::error::TranslateResult;
use crate::user::UserConnection;
use crate::value::{Value, WireValue};

/// Opaque rule logic with full access to the packet and the connection.
pub type Handler =
    Box<dyn Fn(&mut PacketContext, &mut UserConnection) -> TranslateResult<()> + Send + Sync>;

enum Step {
    /// Read with a codec and write the value back unchanged.
    Map(CodecRef),
    /// Read with one codec and write with another, converting on the way.
    MapTo { from: CodecRef, to: CodecRef },
    /// Write a fixed value that has no counterpart in the input.
    Create { codec: CodecRef, value: Value },
    Handler(Handler),
}

/// An ordered list of steps rewriting one packet.
///
/// Steps run in registration order. Once a step cancels the packet, the
/// remaining steps are skipped; whatever earlier steps changed stays changed.
#[derive(Default)]
pub struct PacketRemapper {
    steps: Vec<Step>,
}

impl PacketRemapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map<T: WireValue>(mut self, codec: &'static Codec<T>) -> Self {
        self.steps.push(Step::Map(codec.into()));
        self
    }

    pub fn map_to<A: WireValue, B: WireValue>(
        mut self,
        from: &'static Codec<A>,
        to: &'static Codec<B>,
    ) -> Self {
        self.steps.push(Step::MapTo {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Read as `from`, transform the value, write the result as `to`.
    pub fn map_with<A, B, F>(self, from: &'static Codec<A>, to: &'static Codec<B>, f: F) -> Self
    where
        A: WireValue,
        B: WireValue,
        F: Fn(A, &mut PacketContext, &mut UserConnection) -> TranslateResult<B>
            + Send
            + Sync
            + 'static,
    {
        self.handler(move |ctx, conn| {
            let value = ctx.read(from)?;
            let mapped = f(value, ctx, conn)?;
            ctx.write(to, mapped);
            Ok(())
        })
    }

    pub fn create<T: WireValue>(mut self, codec: &'static Codec<T>, value: T) -> Self {
        self.steps.push(Step::Create {
            codec: codec.into(),
            value: value.into_value(),
        });
        self
    }

    pub fn handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut PacketContext, &mut UserConnection) -> TranslateResult<()>
            + Send
            + Sync
            + 'static,
    {
        self.steps.push(Step::Handler(Box::new(f)));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step against `ctx`.
    pub fn apply(&self, ctx: &mut PacketContext, conn: &mut UserConnection) -> TranslateResult<()> {
        for step in &self.steps {
            if ctx.is_cancelled() {
                break;
            }
            match step {
                Step::Map(codec) => {
                    let value = ctx.read_value(*codec)?;
                    ctx.write_value(*codec, value);
                }
                Step::MapTo { from, to } => {
                    let value = ctx.read_value(*from)?;
                    ctx.write_value(*to, value);
                }
                Step::Create { codec, value } => ctx.write_value(*codec, value.clone()),
                Step::Handler(handler) => handler(ctx, conn)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TranslateError;
    use crate::types::{BYTE, INT, STRING, VAR_INT};
    use crate::user::{ConnectionId, ConnectionInfo};
    use bytes::BytesMut;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn conn() -> UserConnection {
        UserConnection::new(ConnectionInfo::new(ConnectionId(1))).0
    }

    fn ctx(bytes: &[u8]) -> PacketContext {
        PacketContext::new(Some(0x15), Some(BytesMut::from(bytes)), ConnectionId(1))
    }

    fn wire(ctx: &PacketContext) -> Vec<u8> {
        let mut out = BytesMut::new();
        ctx.serialize(&mut out).unwrap();
        out.to_vec()
    }

    #[test]
    fn test_map_to_converts() {
        // chat mode VarInt -> Byte
        let program = PacketRemapper::new().map_to(&VAR_INT, &BYTE);
        let mut ctx = ctx(&[0x02]);
        let mut conn = conn();
        program.apply(&mut ctx, &mut conn).unwrap();
        assert_eq!(ctx.get(&BYTE, 0).unwrap(), 2);
        assert_eq!(ctx.shape_mismatches(), 0);
    }

    #[test]
    fn test_copy_then_create_wire_order() {
        let program = PacketRemapper::new().map(&VAR_INT).create(&INT, 0);
        let mut ctx = ctx(&[42]);
        let mut conn = conn();
        program.apply(&mut ctx, &mut conn).unwrap();
        assert_eq!(ctx.get(&VAR_INT, 0).unwrap(), 42);
        assert_eq!(ctx.get(&INT, 0).unwrap(), 0);
        assert_eq!(wire(&ctx), vec![0x15, 42, 0, 0, 0, 0]);
    }

    #[test]
    fn test_steps_run_in_order_and_see_earlier_writes() {
        let program = PacketRemapper::new()
            .map(&VAR_INT)
            .create(&STRING, "x".to_string())
            .handler(|ctx, _| {
                let id = ctx.get(&VAR_INT, 0)?;
                ctx.set(&STRING, 0, format!("entity {}", id))
            });
        let mut ctx = ctx(&[0x05]);
        let mut conn = conn();
        program.apply(&mut ctx, &mut conn).unwrap();
        assert_eq!(ctx.get(&STRING, 0).unwrap(), "entity 5");
        assert_eq!(program.len(), 3);
    }

    #[test]
    fn test_map_with() {
        let program =
            PacketRemapper::new().map_with(&VAR_INT, &STRING, |id, _, _| Ok(id.to_string()));
        let mut ctx = ctx(&[0x07]);
        let mut conn = conn();
        program.apply(&mut ctx, &mut conn).unwrap();
        assert_eq!(&wire(&ctx)[..], &[0x15, 0x01, b'7']);
    }

    #[test]
    fn test_cancel_skips_remaining_steps() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let program = PacketRemapper::new()
            .map(&VAR_INT)
            .handler(|ctx, _| {
                ctx.cancel();
                Ok(())
            })
            .handler(move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        let mut ctx = ctx(&[0x01]);
        let mut conn = conn();
        program.apply(&mut ctx, &mut conn).unwrap();
        assert!(ctx.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(wire(&ctx).is_empty());
    }

    #[test]
    fn test_handler_error_propagates() {
        let program = PacketRemapper::new().handler(|ctx, _| Err(TranslateError::rule(ctx.id(), "nope")));
        let mut ctx = ctx(&[]);
        let mut conn = conn();
        let err = program.apply(&mut ctx, &mut conn).unwrap_err();
        assert_eq!(err.packet_id(), Some(0x15));
    }
}
