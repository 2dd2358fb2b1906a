use crate::config::ProxyConfig;
use anyhow::{anyhow, bail, Context, Result};
use bytes::{Buf, BufMut, BytesMut};
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};
use viaduct_protocol_core::{
    ensure_remaining, read_string, read_varint, write_string, write_varint, Connection,
    ConnectionId, ConnectionInfo, ConnectionState, ConnectionWriter, Direction, ProtocolPipeline,
    Translation, UserConnection,
};

const HANDSHAKE: i32 = 0x00;
const MAX_ADDRESS_LEN: usize = 255;

// Login clientbound, same ids on 1.8 and 1.9
const LOGIN_SUCCESS: i32 = 0x02;
const SET_COMPRESSION: i32 = 0x03;

struct Handshake {
    protocol: i32,
    address: String,
    port: u16,
    next_state: i32,
}

impl Handshake {
    fn decode(data: &mut BytesMut) -> Result<Self> {
        let protocol = read_varint(data)?;
        let address = read_string(data, MAX_ADDRESS_LEN)?;
        ensure_remaining(data, 2)?;
        let port = data.get_u16();
        let next_state = read_varint(data)?;
        Ok(Self {
            protocol,
            address,
            port,
            next_state,
        })
    }

    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        write_varint(&mut buf, self.protocol);
        write_string(&mut buf, &self.address);
        buf.put_u16(self.port);
        write_varint(&mut buf, self.next_state);
        buf
    }
}

/// Writing side of one proxied player: both legs plus the translation state.
struct Session {
    user: UserConnection,
    client: ConnectionWriter,
    server: ConnectionWriter,
    /// `None` when the client speaks a version we don't translate.
    pipeline: Option<Arc<ProtocolPipeline>>,
}

impl Session {
    /// Translate and forward one packet, then everything the rules emitted.
    ///
    /// Returns the threshold when the packet was a Set Compression; the
    /// caller owns the read halves and must switch them too.
    async fn relay(
        &mut self,
        direction: Direction,
        id: i32,
        payload: BytesMut,
    ) -> Result<Option<i32>> {
        let state = self.user.state();
        let login_clientbound = direction == Direction::Outbound && state == ConnectionState::Login;
        let threshold = if login_clientbound && id == SET_COMPRESSION {
            Some(read_varint(&mut payload.clone())?)
        } else {
            None
        };

        let translation = match &self.pipeline {
            Some(pipeline) => match pipeline.translate(direction, &mut self.user, id, payload) {
                Ok(translation) => translation,
                Err(e) => {
                    warn!(
                        "Dropping {:?} packet 0x{:02X} on {}: {:#}",
                        direction,
                        id,
                        self.user.id(),
                        anyhow::Error::from(e)
                    );
                    Translation::Suppressed
                }
            },
            None => Translation::Unchanged { id, payload },
        };

        let writer = match direction {
            Direction::Outbound => &mut self.client,
            Direction::Inbound => &mut self.server,
        };
        match translation {
            Translation::Unchanged { id, payload } => writer.write_packet(id, &payload).await?,
            Translation::Rewritten(data) => {
                trace!("{:?} 0x{:02X} rewritten ({} bytes)", direction, id, data.len());
                writer.write_raw(&data).await?
            }
            Translation::Suppressed => trace!("{:?} 0x{:02X} suppressed", direction, id),
        }
        self.flush().await?;

        if login_clientbound && id == LOGIN_SUCCESS {
            self.user.set_state(ConnectionState::Play);
            info!(
                "{} entered play as {}",
                self.user.id(),
                self.user.info().username.as_deref().unwrap_or("?")
            );
        }
        if let Some(threshold) = threshold {
            self.client.set_compression(compression(threshold));
            self.server.set_compression(compression(threshold));
            debug!("{} compression threshold {}", self.user.id(), threshold);
        }
        Ok(threshold)
    }

    /// Write synthetic packets in the order they were emitted.
    async fn flush(&mut self) -> Result<()> {
        for packet in self.user.take_outbox() {
            match packet.direction {
                Direction::Outbound => self.client.write_raw(&packet.data).await?,
                Direction::Inbound => self.server.write_raw(&packet.data).await?,
            }
        }
        Ok(())
    }
}

/// A negative Set Compression threshold turns compression off.
fn compression(threshold: i32) -> Option<i32> {
    (threshold >= 0).then_some(threshold)
}

/// Proxy one client to the backend until either side hangs up.
pub async fn handle_connection(
    stream: TcpStream,
    config: Arc<ProxyConfig>,
    pipeline: Arc<ProtocolPipeline>,
) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".into());
    if let Err(e) = proxy(stream, &config, pipeline).await {
        debug!("Connection {} ended: {:#}", peer, e);
    }
}

async fn proxy(
    stream: TcpStream,
    config: &ProxyConfig,
    pipeline: Arc<ProtocolPipeline>,
) -> Result<()> {
    let (mut client_rx, client_tx) = Connection::new(stream)
        .with_max_packet_size(config.max_packet_size)
        .into_split();

    // === Handshake ===
    let (id, mut data) = client_rx.read_packet().await?;
    if id != HANDSHAKE {
        bail!("Expected handshake, got packet 0x{:02X}", id);
    }
    let mut handshake = Handshake::decode(&mut data)?;
    let next_state = ConnectionState::from_handshake_next(handshake.next_state)
        .ok_or_else(|| anyhow!("Invalid next state: {}", handshake.next_state))?;

    let backend = TcpStream::connect(&config.backend)
        .await
        .with_context(|| format!("connecting to backend {}", config.backend))?;
    let (mut server_rx, server_tx) = Connection::new(backend)
        .with_max_packet_size(config.max_packet_size)
        .into_split();

    let (mut user, mut tasks) = UserConnection::new(ConnectionInfo::new(ConnectionId::next()));
    user.info_mut().client_protocol = handshake.protocol;
    user.set_state(next_state);

    let translate = pipeline.client_version() == Some(handshake.protocol);
    if translate {
        pipeline.init(&mut user);
        if let Some(server_version) = pipeline.server_version() {
            handshake.protocol = server_version;
        }
    } else {
        debug!(
            "{} speaks protocol {}, proxying verbatim",
            user.id(),
            handshake.protocol
        );
    }
    debug!(
        "{} handshake: protocol={} next_state={:?}",
        user.id(),
        handshake.protocol,
        next_state
    );

    let mut session = Session {
        user,
        client: client_tx,
        server: server_tx,
        pipeline: translate.then_some(pipeline),
    };
    session
        .server
        .write_packet(HANDSHAKE, &handshake.encode())
        .await?;

    let result = loop {
        let relayed = tokio::select! {
            packet = client_rx.read_packet() => match packet {
                Ok((id, payload)) => session.relay(Direction::Inbound, id, payload).await,
                Err(e) => break Err(e.context("client read")),
            },
            packet = server_rx.read_packet() => match packet {
                Ok((id, payload)) => session.relay(Direction::Outbound, id, payload).await,
                Err(e) => break Err(e.context("server read")),
            },
            Some(task) = tasks.recv() => {
                task(&mut session.user);
                session.flush().await.map(|_| None)
            }
        };
        match relayed {
            Ok(Some(threshold)) => {
                client_rx.set_compression(compression(threshold));
                server_rx.set_compression(compression(threshold));
            }
            Ok(None) => {}
            Err(e) => break Err(e),
        }
        tasks.run_pending(&mut session.user);
    };

    // Give stored objects the chance to clean up the client's screen.
    session.user.close();
    if let Err(e) = session.flush().await {
        debug!("Could not flush on close of {}: {:#}", session.user.id(), e);
    }
    if let Err(e) = session.server.shutdown().await {
        debug!("Could not shut down backend leg of {}: {:#}", session.user.id(), e);
    }
    if let Err(e) = session.client.shutdown().await {
        debug!("Could not shut down client leg of {}: {:#}", session.user.id(), e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_roundtrip() {
        let handshake = Handshake {
            protocol: 107,
            address: "play.example.net".into(),
            port: 25565,
            next_state: 2,
        };
        let decoded = Handshake::decode(&mut handshake.encode()).unwrap();
        assert_eq!(decoded.protocol, 107);
        assert_eq!(decoded.address, "play.example.net");
        assert_eq!(decoded.port, 25565);
        assert_eq!(decoded.next_state, 2);
    }

    #[test]
    fn test_truncated_handshake_is_an_error() {
        let mut data = BytesMut::new();
        write_varint(&mut data, 107);
        write_string(&mut data, "localhost");
        data.put_u8(0x63);
        assert!(Handshake::decode(&mut data).is_err());
    }
}
