use crate::context::PacketContext;
use crate::error::TranslateResult;
use crate::registry::{ProtocolRegistry, RegistryBuilder};
use crate::state::Direction;
use crate::user::UserConnection;
use bytes::BytesMut;
use std::sync::Arc;

/// One rule set translating between two adjacent protocol versions.
pub trait Protocol: Send + Sync {
    fn name(&self) -> &'static str;

    /// Version spoken by the client side of this rule set.
    fn client_version(&self) -> i32;

    /// Version spoken by the server side of this rule set.
    fn server_version(&self) -> i32;

    /// Declare every packet rule. Called once while the pipeline is built.
    fn register(&self, registry: &mut RegistryBuilder);

    /// Prepare per-connection state when a connection joins the pipeline.
    fn init(&self, _conn: &mut UserConnection) {}
}

/// Outcome of running one packet through the pipeline.
#[derive(Debug)]
pub enum Translation {
    /// No rule matched; forward the original id and payload.
    Unchanged { id: i32, payload: BytesMut },
    /// Forward this packet instead (id-prefixed, unframed).
    Rewritten(BytesMut),
    /// Forward nothing.
    Suppressed,
}

struct Stage {
    protocol: Arc<dyn Protocol>,
    registry: ProtocolRegistry,
}

/// The chain of rule sets between a client and a server.
///
/// Stages are ordered from the server's version up to the client's. Server
/// packets run through them in that order, client packets in reverse.
pub struct ProtocolPipeline {
    stages: Vec<Stage>,
}

impl ProtocolPipeline {
    pub fn new(protocols: Vec<Arc<dyn Protocol>>) -> Self {
        let stages = protocols
            .into_iter()
            .map(|protocol| {
                let mut builder = RegistryBuilder::new(protocol.name());
                protocol.register(&mut builder);
                Stage {
                    registry: builder.build(),
                    protocol,
                }
            })
            .collect();
        Self { stages }
    }

    pub fn client_version(&self) -> Option<i32> {
        self.stages.last().map(|stage| stage.protocol.client_version())
    }

    pub fn server_version(&self) -> Option<i32> {
        self.stages.first().map(|stage| stage.protocol.server_version())
    }

    pub fn registries(&self) -> impl Iterator<Item = &ProtocolRegistry> {
        self.stages.iter().map(|stage| &stage.registry)
    }

    pub fn init(&self, conn: &mut UserConnection) {
        for stage in &self.stages {
            stage.protocol.init(conn);
        }
    }

    /// Translate one packet travelling in `direction`.
    ///
    /// Synthetic packets emitted by rules land in the connection's outbox and
    /// must be written right after the returned packet.
    pub fn translate(
        &self,
        direction: Direction,
        conn: &mut UserConnection,
        id: i32,
        payload: BytesMut,
    ) -> TranslateResult<Translation> {
        let mut ctx = PacketContext::new(Some(id), Some(payload), conn.id());
        let mut touched = false;
        let order: Box<dyn Iterator<Item = &Stage>> = match direction {
            Direction::Outbound => Box::new(self.stages.iter()),
            Direction::Inbound => Box::new(self.stages.iter().rev()),
        };
        for stage in order {
            if touched {
                ctx.reset_reader();
            }
            touched |= stage.registry.transform(direction, &mut ctx, conn)?;
            if ctx.is_cancelled() {
                return Ok(Translation::Suppressed);
            }
        }

        if !touched {
            let payload = ctx.into_input().unwrap_or_default();
            return Ok(Translation::Unchanged { id, payload });
        }
        let mut out = BytesMut::new();
        ctx.serialize(&mut out)?;
        Ok(Translation::Rewritten(out))
    }
}
