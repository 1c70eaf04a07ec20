//! High-level RANET server API.
//!
//! [`RanetServer`] owns the UDP socket and runs the receive/tick loop on a
//! spawned task. All protocol work happens in the synchronous
//! [`ServerDriver`], which routes datagrams to the offline handler or the
//! per-peer connections and forwards lifecycle events to the owner's
//! [`ConnectionHandler`].

use std::collections::HashMap;
use std::net::SocketAddr;

use log::{info, trace, warn};

use crate::core::constants::{PROTOCOL_VERSION, TICK_INTERVAL};
use crate::core::{ConnectionHandler, PeerInfo, ServerError};
use crate::transport::{Connection, ConnectionEvent, RanetSocket, ServerContext};

use super::offline::{OfflineAction, OfflineConfig, OfflineHandler};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Server GUID; generated randomly when absent.
    pub guid: Option<u64>,
    /// Message of the day returned to discovery pings.
    pub motd: String,
    /// Maximum number of concurrent connections.
    pub max_connections: usize,
    /// Protocol version accepted during the offline handshake.
    pub protocol_version: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:19132"
                .parse()
                .expect("default bind address is valid"),
            guid: None,
            motd: String::from("RANET server"),
            max_connections: 100,
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

/// Builder for creating a [`RanetServer`].
#[derive(Debug, Default)]
pub struct RanetServerBuilder {
    config: ServerConfig,
}

impl RanetServerBuilder {
    /// Create a builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Set a fixed server GUID.
    pub fn guid(mut self, guid: u64) -> Self {
        self.config.guid = Some(guid);
        self
    }

    /// Set the message of the day.
    pub fn motd(mut self, motd: impl Into<String>) -> Self {
        self.config.motd = motd.into();
        self
    }

    /// Set the maximum number of concurrent connections.
    pub fn max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    /// Build the server configuration.
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

/// Synchronous core of the server: datagrams in, datagrams out.
///
/// Owns the offline handler and the connection table; knows nothing about
/// sockets or timers, which makes the full server path testable without
/// I/O.
pub struct ServerDriver<H: ConnectionHandler> {
    offline: OfflineHandler,
    connections: HashMap<SocketAddr, Connection>,
    handler: H,
    max_connections: usize,
}

impl<H: ConnectionHandler> ServerDriver<H> {
    /// Create a driver with the given identity and handler.
    pub fn new(offline: OfflineConfig, max_connections: usize, handler: H) -> Self {
        Self {
            offline: OfflineHandler::new(offline),
            connections: HashMap::new(),
            handler,
            max_connections,
        }
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// The owner's handler, for inspection.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Route one inbound datagram, appending any replies to `out`.
    pub fn incoming(&mut self, data: &[u8], addr: SocketAddr, out: &mut Vec<(SocketAddr, Vec<u8>)>) {
        let ctx = ServerContext {
            connection_count: self.connections.len(),
            max_connections: self.max_connections,
        };
        if let Some(conn) = self.connections.get_mut(&addr) {
            conn.incoming(data, ctx);
            Self::pump(conn, &mut self.handler, out);
            if conn.is_disconnected() {
                self.connections.remove(&addr);
            }
            return;
        }
        match self.offline.handle(data, addr) {
            Some(OfflineAction::Reply(reply)) => out.push((addr, reply)),
            Some(OfflineAction::Accept { reply, guid, mtu }) => {
                if self.connections.len() >= self.max_connections {
                    warn!("{addr}: connection limit reached, rejecting handshake");
                    return;
                }
                info!("{addr}: connection established (guid {guid:#x}, mtu {mtu})");
                self.connections.insert(addr, Connection::new(addr, guid, mtu));
                out.push((addr, reply));
            }
            None => trace!("{addr}: dropped unconnected datagram"),
        }
    }

    /// Advance every connection's timers and reap finished connections.
    pub fn tick(&mut self, out: &mut Vec<(SocketAddr, Vec<u8>)>) {
        let mut finished = Vec::new();
        for (addr, conn) in &mut self.connections {
            conn.tick();
            Self::pump(conn, &mut self.handler, out);
            if conn.is_disconnected() {
                finished.push(*addr);
            }
        }
        for addr in finished {
            self.connections.remove(&addr);
        }
    }

    /// Disconnect every peer, flushing the notices into `out`.
    pub fn shutdown(&mut self, out: &mut Vec<(SocketAddr, Vec<u8>)>) {
        for conn in self.connections.values_mut() {
            conn.disconnect();
            Self::pump(conn, &mut self.handler, out);
        }
        self.connections.clear();
    }

    /// Drain one connection's datagrams and events.
    fn pump(conn: &mut Connection, handler: &mut H, out: &mut Vec<(SocketAddr, Vec<u8>)>) {
        let peer = PeerInfo {
            addr: conn.addr(),
            guid: conn.guid(),
        };
        while let Some(event) = conn.poll_event() {
            match event {
                ConnectionEvent::Connected => handler.on_connect(&peer),
                ConnectionEvent::Disconnected => handler.on_disconnect(&peer),
                ConnectionEvent::Message(payload) => handler.on_message(&peer, &payload),
            }
        }
        while let Some(datagram) = conn.poll_outbound() {
            out.push((peer.addr, datagram));
        }
    }
}

/// A running RANET server.
///
/// # Example
///
/// ```ignore
/// use ranet_protocol::server::{RanetServer, RanetServerBuilder};
/// use ranet_protocol::core::NullHandler;
///
/// let config = RanetServerBuilder::new()
///     .bind_addr("0.0.0.0:19132".parse()?)
///     .motd("my server")
///     .build();
/// let server = RanetServer::bind(config, NullHandler).await?;
/// // ...
/// server.stop().await?;
/// ```
pub struct RanetServer {
    local_addr: SocketAddr,
    guid: u64,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl RanetServer {
    /// Bind the UDP socket and start the receive/tick loop.
    pub async fn bind<H>(config: ServerConfig, handler: H) -> Result<Self, ServerError>
    where
        H: ConnectionHandler + 'static,
    {
        let socket = RanetSocket::bind(config.bind_addr)
            .await
            .map_err(|e| ServerError::BindFailed(e.to_string()))?;
        let local_addr = socket.local_addr()?;
        let guid = config.guid.unwrap_or_else(rand::random);
        info!("listening on {local_addr} (guid {guid:#x})");

        let driver = ServerDriver::new(
            OfflineConfig {
                guid,
                motd: config.motd.clone(),
                protocol_version: config.protocol_version,
            },
            config.max_connections,
            handler,
        );

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let task = tokio::spawn(run_loop(socket, driver, shutdown_rx));
        Ok(Self {
            local_addr,
            guid,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The server's GUID.
    pub fn guid(&self) -> u64 {
        self.guid
    }

    /// Gracefully stop: disconnect every peer, flush the notices and join
    /// the loop task.
    pub async fn stop(mut self) -> Result<(), ServerError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.await.map_err(|_| ServerError::Shutdown)?;
        }
        Ok(())
    }
}

impl Drop for RanetServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn run_loop<H: ConnectionHandler + 'static>(
    mut socket: RanetSocket,
    mut driver: ServerDriver<H>,
    mut shutdown: tokio::sync::oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    let mut out: Vec<(SocketAddr, Vec<u8>)> = Vec::new();
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => driver.tick(&mut out),
            result = socket.recv_from() => match result {
                Ok((data, addr)) => driver.incoming(data, addr, &mut out),
                Err(err) => warn!("socket receive failed: {err}"),
            },
        }
        flush(&socket, &mut out).await;
    }
    driver.shutdown(&mut out);
    flush(&socket, &mut out).await;
    info!("server loop stopped");
}

async fn flush(socket: &RanetSocket, out: &mut Vec<(SocketAddr, Vec<u8>)>) {
    for (addr, datagram) in out.drain(..) {
        if let Err(err) = socket.send_to(&datagram, addr).await {
            warn!("{addr}: send failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NullHandler;
    use crate::core::constants::GAME_PACKET_ID;
    use crate::protocol::offline::{OpenConnectionRequest1, OpenConnectionRequest2};
    use crate::protocol::online::{ConnectionRequest, Disconnect, NewIncomingConnection};
    use crate::protocol::{Frame, FrameSet, Reliability};

    #[derive(Debug, Default)]
    struct Recorder {
        connects: Vec<u64>,
        disconnects: Vec<u64>,
        messages: Vec<Vec<u8>>,
    }

    impl ConnectionHandler for Recorder {
        fn on_connect(&mut self, peer: &PeerInfo) {
            self.connects.push(peer.guid);
        }

        fn on_disconnect(&mut self, peer: &PeerInfo) {
            self.disconnects.push(peer.guid);
        }

        fn on_message(&mut self, _peer: &PeerInfo, payload: &[u8]) {
            self.messages.push(payload.to_vec());
        }
    }

    const CLIENT_GUID: u64 = 0x42;

    fn driver(max_connections: usize) -> ServerDriver<Recorder> {
        ServerDriver::new(
            OfflineConfig {
                guid: 1,
                motd: "test".to_string(),
                protocol_version: PROTOCOL_VERSION,
            },
            max_connections,
            Recorder::default(),
        )
    }

    fn ordered_frameset(sequence: u32, index: u32, body: Vec<u8>) -> Vec<u8> {
        let mut frame = Frame::new(Reliability::ReliableOrdered, body);
        frame.reliable_index = index;
        frame.order_index = index;
        FrameSet {
            sequence,
            frames: vec![frame],
        }
        .encode()
    }

    /// Run the full offline and connected handshake for one client address.
    fn connect_client(driver: &mut ServerDriver<Recorder>, addr: SocketAddr) {
        let mut out = Vec::new();
        let request1 = OpenConnectionRequest1 {
            protocol: PROTOCOL_VERSION,
            mtu: 1400,
        };
        driver.incoming(&request1.encode(), addr, &mut out);
        assert_eq!(out.len(), 1, "reply 1 expected");

        let request2 = OpenConnectionRequest2 {
            server_address: "127.0.0.1:19132".parse().unwrap(),
            mtu: 1400,
            client_guid: CLIENT_GUID,
        };
        driver.incoming(&request2.encode(), addr, &mut out);
        assert_eq!(driver.connection_count(), 1);

        let request = ConnectionRequest {
            client_guid: CLIENT_GUID,
            timestamp: 1,
        };
        driver.incoming(&ordered_frameset(0, 0, request.encode()), addr, &mut out);
        let incoming = NewIncomingConnection {
            server_address: "127.0.0.1:19132".parse().unwrap(),
            internal_address: addr,
        };
        driver.incoming(&ordered_frameset(1, 1, incoming.encode()), addr, &mut out);
    }

    #[test]
    fn test_full_connection_lifecycle() {
        let mut driver = driver(10);
        let addr: SocketAddr = "127.0.0.1:50001".parse().unwrap();
        connect_client(&mut driver, addr);
        assert_eq!(driver.handler().connects, vec![CLIENT_GUID]);

        let mut out = Vec::new();
        driver.incoming(
            &ordered_frameset(2, 2, vec![GAME_PACKET_ID, 0x01]),
            addr,
            &mut out,
        );
        assert_eq!(driver.handler().messages, vec![vec![GAME_PACKET_ID, 0x01]]);

        let frame = Frame::new(Reliability::Unreliable, Disconnect.encode());
        let data = FrameSet {
            sequence: 3,
            frames: vec![frame],
        }
        .encode();
        driver.incoming(&data, addr, &mut out);
        assert_eq!(driver.handler().disconnects, vec![CLIENT_GUID]);
        assert_eq!(driver.connection_count(), 0);
    }

    #[test]
    fn test_connection_limit() {
        let mut driver = driver(1);
        connect_client(&mut driver, "127.0.0.1:50001".parse().unwrap());

        let mut out = Vec::new();
        let request2 = OpenConnectionRequest2 {
            server_address: "127.0.0.1:19132".parse().unwrap(),
            mtu: 1400,
            client_guid: 7,
        };
        driver.incoming(
            &request2.encode(),
            "127.0.0.1:50002".parse().unwrap(),
            &mut out,
        );
        assert_eq!(driver.connection_count(), 1);
        assert!(out.is_empty(), "rejected handshake gets no reply");
    }

    #[test]
    fn test_tick_flushes_pending_acks() {
        let mut driver = driver(10);
        let addr: SocketAddr = "127.0.0.1:50001".parse().unwrap();
        connect_client(&mut driver, addr);

        let mut out = Vec::new();
        driver.tick(&mut out);
        // The handshake framesets are acknowledged on the first tick.
        assert!(out.iter().any(|(to, data)| *to == addr && data[0] == 0xc0));
    }

    #[test]
    fn test_shutdown_notifies_peers() {
        let mut driver = driver(10);
        let addr: SocketAddr = "127.0.0.1:50001".parse().unwrap();
        connect_client(&mut driver, addr);

        let mut out = Vec::new();
        driver.shutdown(&mut out);
        assert_eq!(driver.connection_count(), 0);
        assert_eq!(driver.handler().disconnects, vec![CLIENT_GUID]);
        assert!(out.iter().any(|(to, data)| *to == addr && data[0] == 0x80));
    }

    #[tokio::test]
    async fn test_bind_and_stop() {
        let config = RanetServerBuilder::new()
            .bind_addr("127.0.0.1:0".parse().unwrap())
            .guid(99)
            .build();
        let server = RanetServer::bind(config, NullHandler).await.unwrap();
        assert!(server.local_addr().port() != 0);
        assert_eq!(server.guid(), 99);
        server.stop().await.unwrap();
    }
}
