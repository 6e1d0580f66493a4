use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::constants::{RESYNC_MESSAGE, TIMEOUT_MESSAGE};
use crate::error::{ReceiverError, Result};

/// Creates the UDP socket the framed stream arrives on.
/// Handles both unicast and multicast addresses.
pub fn create_udp_socket(addr: SocketAddr) -> Result<Socket> {
    let ip = match addr.ip() {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(_) => {
            return Err(ReceiverError::InvalidConfig(
                "only IPv4 is supported".into(),
            ));
        }
    };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;

    if ip.is_multicast() {
        socket.join_multicast_v4(&ip, &Ipv4Addr::UNSPECIFIED)?;
    }

    socket.set_nonblocking(true)?;
    Ok(socket)
}

/// Binds the socket and hands it to the tokio reactor
pub fn bind_receiver(addr: SocketAddr) -> Result<UdpSocket> {
    let socket = create_udp_socket(addr)?;
    Ok(UdpSocket::from_std(socket.into())?)
}

/// Best-effort messages to the sender's control endpoint
pub struct ControlNotifier {
    socket: UdpSocket,
    target: SocketAddr,
}

impl ControlNotifier {
    pub async fn connect(target: SocketAddr) -> Result<Self> {
        let local: SocketAddr = match target {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Asks the sender for a fresh random-access point
    pub async fn request_resync(&self) {
        self.send(RESYNC_MESSAGE).await;
    }

    pub async fn report_timeout(&self) {
        self.send(TIMEOUT_MESSAGE).await;
    }

    async fn send(&self, msg: &[u8]) {
        match self.socket.send_to(msg, self.target).await {
            Ok(_) => debug!(
                dest = %self.target,
                msg = %String::from_utf8_lossy(msg),
                "control message sent"
            ),
            Err(e) => warn!(dest = %self.target, error = %e, "control message failed"),
        }
    }
}
