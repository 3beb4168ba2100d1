//! Packet faces: the endpoints probes and replies travel over.
//!
//! Each configured neighbor is reachable through one face. Faces speak whole
//! packets; the wire codec lives in `namelink-core`. Two implementations are
//! provided: a paired in-memory face for tests and demos, and a unicast UDP
//! face for real deployments. The node dispatches over `AnyFace` so faces of
//! both kinds can coexist.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::{Mutex, mpsc};

use namelink_core::{Packet, RouterName};

/// Errors surfaced by face operations.
#[derive(Debug, thiserror::Error)]
pub enum FaceError {
    #[error("face is closed")]
    Closed,
    #[error("prefix registration rejected: {0}")]
    RegistrationRejected(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A face of any supported kind.
pub enum AnyFace {
    Memory(MemoryFace),
    Udp(UdpFace),
}

impl AnyFace {
    pub fn name(&self) -> &str {
        match self {
            AnyFace::Memory(face) => face.name(),
            AnyFace::Udp(face) => face.name(),
        }
    }

    /// Register interest in a name prefix on this face.
    ///
    /// Failure here is fatal to daemon startup.
    pub async fn register_prefix(&self, prefix: &RouterName) -> Result<(), FaceError> {
        match self {
            AnyFace::Memory(face) => face.register_prefix(prefix),
            AnyFace::Udp(face) => face.register_prefix(prefix),
        }
    }

    pub async fn transmit(&self, packet: &Packet) -> Result<(), FaceError> {
        match self {
            AnyFace::Memory(face) => face.transmit(packet).await,
            AnyFace::Udp(face) => face.transmit(packet).await,
        }
    }

    pub async fn receive(&self) -> Result<Packet, FaceError> {
        match self {
            AnyFace::Memory(face) => face.receive().await,
            AnyFace::Udp(face) => face.receive().await,
        }
    }
}

/// One end of an in-memory face pair.
///
/// Packets transmitted on one end arrive on the other in order.
pub struct MemoryFace {
    name: String,
    to_peer: mpsc::Sender<Packet>,
    from_peer: Mutex<mpsc::Receiver<Packet>>,
}

impl MemoryFace {
    /// Create a connected pair of faces.
    pub fn pair(name_a: &str, name_b: &str) -> (MemoryFace, MemoryFace) {
        let (tx_ab, rx_ab) = mpsc::channel(64);
        let (tx_ba, rx_ba) = mpsc::channel(64);
        (
            MemoryFace {
                name: name_a.to_string(),
                to_peer: tx_ab,
                from_peer: Mutex::new(rx_ba),
            },
            MemoryFace {
                name: name_b.to_string(),
                to_peer: tx_ba,
                from_peer: Mutex::new(rx_ab),
            },
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn register_prefix(&self, prefix: &RouterName) -> Result<(), FaceError> {
        if self.to_peer.is_closed() {
            return Err(FaceError::RegistrationRejected(format!(
                "{prefix}: peer side is gone"
            )));
        }
        Ok(())
    }

    pub async fn transmit(&self, packet: &Packet) -> Result<(), FaceError> {
        self.to_peer
            .send(packet.clone())
            .await
            .map_err(|_| FaceError::Closed)
    }

    pub async fn receive(&self) -> Result<Packet, FaceError> {
        self.from_peer
            .lock()
            .await
            .recv()
            .await
            .ok_or(FaceError::Closed)
    }
}

/// A unicast UDP face toward one neighbor.
pub struct UdpFace {
    name: String,
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpFace {
    /// Bind `bind` and point the face at `target`.
    pub async fn bind(name: &str, bind: SocketAddr, target: SocketAddr) -> Result<Self, FaceError> {
        let socket = UdpSocket::bind(bind).await?;
        Ok(Self {
            name: name.to_string(),
            socket,
            target,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_addr(&self) -> Result<SocketAddr, FaceError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn register_prefix(&self, _prefix: &RouterName) -> Result<(), FaceError> {
        // Point-to-point: the peer sees everything, nothing to register.
        Ok(())
    }

    pub async fn transmit(&self, packet: &Packet) -> Result<(), FaceError> {
        let raw = packet.serialize();
        self.socket.send_to(&raw, self.target).await?;
        Ok(())
    }

    /// Receive the next parseable packet, skipping malformed datagrams.
    pub async fn receive(&self) -> Result<Packet, FaceError> {
        let mut buf = [0u8; 65_536];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            match Packet::parse(&buf[..len]) {
                Ok(packet) => return Ok(packet),
                Err(e) => {
                    tracing::debug!(face = %self.name, %from, "dropping malformed datagram: {e}");
                }
            }
        }
    }
}
