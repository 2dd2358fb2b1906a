//! Packet translation engine: codecs, packet contexts, rewrite programs,
//! protocol registries and per-connection state.

pub mod cache;
pub mod codec;
pub mod connection;
pub mod context;
pub mod error;
pub mod program;
pub mod protocol;
pub mod registry;
pub mod state;
pub mod storage;
pub mod types;
pub mod user;
pub mod value;

pub use cache::TtlCache;
pub use codec::*;
pub use connection::{Connection, ConnectionReader, ConnectionWriter, DEFAULT_MAX_PACKET_SIZE};
pub use context::PacketContext;
pub use error::{TranslateError, TranslateResult};
pub use program::{Handler, PacketRemapper};
pub use protocol::{Protocol, ProtocolPipeline, Translation};
pub use registry::{PacketMapping, ProtocolRegistry, RegistryBuilder};
pub use state::*;
pub use storage::{ConnectionStore, StoredObject};
pub use user::*;
pub use value::{Shape, Value, WireValue};
