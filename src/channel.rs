use crate::{LibertyError, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

/// Longest accepted channel identifier, in bytes.
pub const CHANNEL_NAME_MAX: usize = 64;

/// Receive buffer size for one datagram.
pub const FRAME_SIZE: usize = 1024;

/// Check a channel identifier before any resource is acquired.
pub fn validate_channel_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(LibertyError::MissingChannel);
    }
    if name.len() > CHANNEL_NAME_MAX {
        return Err(LibertyError::ChannelNameTooLong(name.len()));
    }
    Ok(())
}

/// A message channel carrying opaque envelopes.
pub trait Channel {
    fn name(&self) -> &str;

    /// Wait up to `timeout` for the next message and copy it into `buf`
    /// (replacing its contents). Returns the message length.
    ///
    /// Fails with [`LibertyError::Timeout`] when nothing arrives in time.
    fn recv_timeout(&mut self, buf: &mut Vec<u8>, timeout: Duration) -> Result<usize>;

    fn publish(&mut self, payload: &[u8]) -> Result<()>;

    /// Release transport resources. Further calls fail with
    /// [`LibertyError::ChannelClosed`].
    fn close(&mut self) {}
}

/// In-process channel backed by a bounded crossbeam queue.
///
/// Behaves like a ring buffer: publishing into a full channel drops the
/// oldest frame instead of failing. Clones share the same queue.
#[derive(Clone)]
pub struct MemoryChannel {
    name: String,
    sender: Option<Sender<Vec<u8>>>,
    receiver: Option<Receiver<Vec<u8>>>,
}

impl MemoryChannel {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
        Self {
            name: name.into(),
            sender: Some(sender),
            receiver: Some(receiver),
        }
    }

    /// Number of frames waiting to be read.
    pub fn pending(&self) -> usize {
        self.receiver.as_ref().map_or(0, |r| r.len())
    }
}

impl Channel for MemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn recv_timeout(&mut self, buf: &mut Vec<u8>, timeout: Duration) -> Result<usize> {
        let receiver = self.receiver.as_ref().ok_or(LibertyError::ChannelClosed)?;
        let frame = receiver.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => LibertyError::Timeout,
            RecvTimeoutError::Disconnected => LibertyError::ChannelClosed,
        })?;
        buf.clear();
        buf.extend_from_slice(&frame);
        Ok(frame.len())
    }

    fn publish(&mut self, payload: &[u8]) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(LibertyError::ChannelClosed)?;
        let mut frame = payload.to_vec();
        loop {
            match sender.try_send(frame) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(rejected)) => {
                    frame = rejected;
                    if let Some(receiver) = self.receiver.as_ref() {
                        match receiver.try_recv() {
                            Ok(_) => log::trace!("channel {} full, overwrote oldest frame", self.name),
                            Err(TryRecvError::Empty) => {}
                            Err(TryRecvError::Disconnected) => return Err(LibertyError::ChannelClosed),
                        }
                    } else {
                        return Err(LibertyError::ChannelFull);
                    }
                }
                Err(TrySendError::Disconnected(_)) => return Err(LibertyError::ChannelClosed),
            }
        }
    }

    fn close(&mut self) {
        self.sender = None;
        self.receiver = None;
    }
}

/// Channel over a UDP socket; the identifier is the socket address.
///
/// The reading side binds the address, the publishing side sends to it.
pub struct UdpChannel {
    name: String,
    socket: Option<UdpSocket>,
    peer: Option<SocketAddr>,
}

impl UdpChannel {
    /// Bind `addr` for reading.
    pub fn bind(addr: &str) -> Result<Self> {
        validate_channel_name(addr)?;
        let socket = UdpSocket::bind(addr)?;
        log::info!("Listening on {}", socket.local_addr()?);
        Ok(Self {
            name: addr.to_string(),
            socket: Some(socket),
            peer: None,
        })
    }

    /// Open an ephemeral socket that publishes to `addr`.
    pub fn connect(addr: &str) -> Result<Self> {
        validate_channel_name(addr)?;
        let peer = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| LibertyError::InvalidConfig(format!("cannot resolve {}", addr)))?;
        let local = if peer.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local)?;
        log::info!("Publishing to {} from {}", peer, socket.local_addr()?);
        Ok(Self {
            name: addr.to_string(),
            socket: Some(socket),
            peer: Some(peer),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        let socket = self.socket.as_ref().ok_or(LibertyError::ChannelClosed)?;
        Ok(socket.local_addr()?)
    }
}

impl Channel for UdpChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn recv_timeout(&mut self, buf: &mut Vec<u8>, timeout: Duration) -> Result<usize> {
        let socket = self.socket.as_ref().ok_or(LibertyError::ChannelClosed)?;
        // A zero read timeout means "block forever" to the socket.
        socket.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;

        buf.clear();
        buf.resize(FRAME_SIZE, 0);
        match socket.recv(buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(n)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                buf.clear();
                Err(LibertyError::Timeout)
            }
            Err(e) => {
                buf.clear();
                Err(e.into())
            }
        }
    }

    fn publish(&mut self, payload: &[u8]) -> Result<()> {
        let socket = self.socket.as_ref().ok_or(LibertyError::ChannelClosed)?;
        let peer = self.peer.ok_or_else(|| {
            LibertyError::InvalidConfig(format!("channel {} is bound for reading", self.name))
        })?;
        socket.send_to(payload, peer)?;
        Ok(())
    }

    fn close(&mut self) {
        self.socket = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_channel_name() {
        assert!(validate_channel_name("127.0.0.1:7400").is_ok());
        assert!(matches!(validate_channel_name(""), Err(LibertyError::MissingChannel)));
        assert!(matches!(validate_channel_name("   "), Err(LibertyError::MissingChannel)));
        let long = "x".repeat(CHANNEL_NAME_MAX + 1);
        assert!(matches!(
            validate_channel_name(&long),
            Err(LibertyError::ChannelNameTooLong(65))
        ));
    }

    #[test]
    fn test_memory_channel_roundtrip() {
        let mut chan = MemoryChannel::new("test", 4);
        chan.publish(b"abc").unwrap();
        let mut buf = Vec::new();
        assert_eq!(chan.recv_timeout(&mut buf, Duration::from_millis(10)).unwrap(), 3);
        assert_eq!(buf, b"abc");
    }

    #[test]
    fn test_memory_channel_timeout() {
        let mut chan = MemoryChannel::new("test", 4);
        let mut buf = vec![1, 2, 3];
        assert!(matches!(
            chan.recv_timeout(&mut buf, Duration::from_millis(5)),
            Err(LibertyError::Timeout)
        ));
    }

    #[test]
    fn test_memory_channel_overwrites_oldest() {
        let mut chan = MemoryChannel::new("test", 2);
        chan.publish(&[1]).unwrap();
        chan.publish(&[2]).unwrap();
        chan.publish(&[3]).unwrap();
        assert_eq!(chan.pending(), 2);

        let mut buf = Vec::new();
        chan.recv_timeout(&mut buf, Duration::from_millis(5)).unwrap();
        assert_eq!(buf, vec![2]);
        chan.recv_timeout(&mut buf, Duration::from_millis(5)).unwrap();
        assert_eq!(buf, vec![3]);
    }

    #[test]
    fn test_memory_channel_closed() {
        let mut chan = MemoryChannel::new("test", 2);
        chan.close();
        let mut buf = Vec::new();
        assert!(matches!(chan.publish(&[1]), Err(LibertyError::ChannelClosed)));
        assert!(matches!(
            chan.recv_timeout(&mut buf, Duration::from_millis(1)),
            Err(LibertyError::ChannelClosed)
        ));
    }

    #[test]
    fn test_udp_channel_roundtrip() {
        let mut reader = UdpChannel::bind("127.0.0.1:0").unwrap();
        let addr = reader.local_addr().unwrap().to_string();
        let mut writer = UdpChannel::connect(&addr).unwrap();

        writer.publish(b"liberty").unwrap();
        let mut buf = Vec::new();
        let n = reader.recv_timeout(&mut buf, Duration::from_secs(1)).unwrap();
        assert_eq!(n, 7);
        assert_eq!(buf, b"liberty");

        assert!(matches!(
            reader.recv_timeout(&mut buf, Duration::from_millis(20)),
            Err(LibertyError::Timeout)
        ));
        assert!(buf.is_empty());
    }
}
