use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::UdpSocket;
use tracing::info;

use crate::core::{Error, Result};
use super::MulticastChannel;

/// UDP socket joined to an IPv4 multicast group
///
/// Loopback stays enabled: a station hears its own beacons, which is how it
/// learns that a transmission went through without a collision.
#[derive(Debug)]
pub struct MulticastSocket {
    /// Underlying socket
    socket: UdpSocket,
    /// Group and port every datagram goes to
    group: SocketAddrV4,
}

impl MulticastSocket {
    /// Binds `0.0.0.0:port` and joins `group`
    ///
    /// Must be called from within a tokio runtime.
    pub async fn join(group: Ipv4Addr, port: u16) -> Result<Self> {
        if !group.is_multicast() {
            return Err(Error::config(format!("{} is not a multicast group", group)));
        }

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(Error::transport)?;
        socket.set_reuse_address(true).map_err(Error::transport)?;
        #[cfg(unix)]
        socket.set_reuse_port(true).map_err(Error::transport)?;
        socket.set_nonblocking(true).map_err(Error::transport)?;

        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        socket
            .bind(&SockAddr::from(bind_addr))
            .map_err(Error::transport)?;
        socket
            .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
            .map_err(Error::transport)?;
        socket.set_multicast_loop_v4(true).map_err(Error::transport)?;

        let socket = UdpSocket::from_std(socket.into()).map_err(Error::transport)?;
        info!(%group, port, "joined multicast group");

        Ok(MulticastSocket {
            socket,
            group: SocketAddrV4::new(group, port),
        })
    }

    /// Leaves the group; the socket closes when dropped
    pub fn leave(&self) -> Result<()> {
        self.socket
            .leave_multicast_v4(*self.group.ip(), Ipv4Addr::UNSPECIFIED)
            .map_err(Error::transport)?;
        info!(group = %self.group, "left multicast group");
        Ok(())
    }
}

impl MulticastChannel for MulticastSocket {
    fn send<'a>(&'a self, bytes: &'a [u8]) -> impl Future<Output = io::Result<usize>> + Send + 'a {
        self.socket.send_to(bytes, self.group)
    }

    fn recv_timeout<'a>(
        &'a self,
        buf: &'a mut [u8],
        timeout: Duration,
    ) -> impl Future<Output = io::Result<Option<usize>>> + Send + 'a {
        async move {
            match tokio::time::timeout(timeout, self.socket.recv_from(buf)).await {
                Ok(Ok((len, _from))) => Ok(Some(len)),
                Ok(Err(e)) => Err(e),
                Err(_elapsed) => Ok(None),
            }
        }
    }
}
