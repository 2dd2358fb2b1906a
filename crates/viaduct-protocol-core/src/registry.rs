use crate::context::PacketContext;
use crate::error::TranslateResult;
use crate::program::PacketRemapper;
use crate::state::{ConnectionState, Direction};
use crate::user::UserConnection;
use std::collections::HashMap;
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PacketKey {
    direction: Direction,
    state: ConnectionState,
    id: i32,
}

/// What to do with one packet id: the id it becomes and the program rewriting it.
pub struct PacketMapping {
    new_id: Option<i32>,
    remapper: Option<PacketRemapper>,
}

impl PacketMapping {
    pub fn new_id(&self) -> Option<i32> {
        self.new_id
    }

    pub fn remapper(&self) -> Option<&PacketRemapper> {
        self.remapper.as_ref()
    }
}

/// Collects registrations for one rule set. Consumed by [`build`](Self::build).
pub struct RegistryBuilder {
    name: &'static str,
    mappings: HashMap<PacketKey, PacketMapping>,
}

impl RegistryBuilder {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            mappings: HashMap::new(),
        }
    }

    /// Register a rule for packets sent by the client.
    pub fn register_inbound(
        &mut self,
        state: ConnectionState,
        old_id: i32,
        new_id: impl Into<Option<i32>>,
        remapper: impl Into<Option<PacketRemapper>>,
    ) -> &mut Self {
        self.register(Direction::Inbound, state, old_id, new_id.into(), remapper.into())
    }

    /// Register a rule for packets sent by the server.
    pub fn register_outbound(
        &mut self,
        state: ConnectionState,
        old_id: i32,
        new_id: impl Into<Option<i32>>,
        remapper: impl Into<Option<PacketRemapper>>,
    ) -> &mut Self {
        self.register(Direction::Outbound, state, old_id, new_id.into(), remapper.into())
    }

    /// Drop a client packet entirely.
    pub fn cancel_inbound(&mut self, state: ConnectionState, old_id: i32) -> &mut Self {
        self.register_inbound(state, old_id, None, cancelling())
    }

    /// Drop a server packet entirely.
    pub fn cancel_outbound(&mut self, state: ConnectionState, old_id: i32) -> &mut Self {
        self.register_outbound(state, old_id, None, cancelling())
    }

    fn register(
        &mut self,
        direction: Direction,
        state: ConnectionState,
        id: i32,
        new_id: Option<i32>,
        remapper: Option<PacketRemapper>,
    ) -> &mut Self {
        let key = PacketKey {
            direction,
            state,
            id,
        };
        if self
            .mappings
            .insert(key, PacketMapping { new_id, remapper })
            .is_some()
        {
            warn!(
                "{}: {:?} {:?} packet 0x{:02X} registered twice, keeping the last rule",
                self.name, direction, state, id
            );
        }
        self
    }

    pub fn build(self) -> ProtocolRegistry {
        ProtocolRegistry {
            name: self.name,
            mappings: self.mappings,
        }
    }
}

fn cancelling() -> PacketRemapper {
    PacketRemapper::new().handler(|ctx, _| {
        ctx.cancel();
        Ok(())
    })
}

/// Immutable (direction, state, old id) -> mapping table for one rule set.
pub struct ProtocolRegistry {
    name: &'static str,
    mappings: HashMap<PacketKey, PacketMapping>,
}

impl ProtocolRegistry {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn lookup(
        &self,
        direction: Direction,
        state: ConnectionState,
        id: i32,
    ) -> Option<&PacketMapping> {
        self.mappings.get(&PacketKey {
            direction,
            state,
            id,
        })
    }

    /// Rewrite `ctx` in place if its id is registered. Returns whether a rule ran.
    pub fn transform(
        &self,
        direction: Direction,
        ctx: &mut PacketContext,
        conn: &mut UserConnection,
    ) -> TranslateResult<bool> {
        let Some(id) = ctx.id() else {
            return Ok(false);
        };
        let Some(mapping) = self.lookup(direction, conn.state(), id) else {
            return Ok(false);
        };
        if let Some(remapper) = &mapping.remapper {
            remapper.apply(ctx, conn)?;
        }
        // A handler may redirect the packet to another id; keep its choice.
        if !ctx.is_cancelled() && ctx.id() == Some(id) {
            trace!(
                "{}: {:?} 0x{:02X} -> {:?}",
                self.name,
                direction,
                id,
                mapping.new_id
            );
            ctx.set_id(mapping.new_id);
        }
        Ok(true)
    }
}
