//! Frame transport collaborators.
//!
//! The bridge core only sees numbered interfaces through three narrow
//! traits: a blocking [`FrameSource`], a fire-and-forget [`FrameSink`] and
//! [`LinkInfo`] for names. Two transports are provided:
//!
//! - [`udp`]: each interface is a UDP "virtual wire" between a local bind
//!   address and a fixed peer, one Ethernet frame per datagram.
//! - [`memory`]: in-process channels, for tests and simulations.

use async_trait::async_trait;
use l2bridge_types::MacAddress;

use crate::port_table::PortId;

/// A frame received on, or destined for, one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    pub port: PortId,
    pub frame: Vec<u8>,
}

/// Receive side of the interfaces.
#[async_trait]
pub trait FrameSource: Send {
    /// Waits for the next frame on any interface.
    ///
    /// Returns `None` once every interface is closed.
    async fn receive_any(&mut self) -> Option<ReceivedFrame>;
}

/// Transmit side of the interfaces.
///
/// Sends are best effort: failures are logged by the transport and never
/// reported back to the bridge.
pub trait FrameSink: Send + Sync {
    fn transmit(&self, port: PortId, frame: &[u8]);
}

/// Static description of the interfaces.
pub trait LinkInfo {
    /// Number of interfaces, indexed `0..interface_count()`.
    fn interface_count(&self) -> usize;

    /// Human readable name of an interface.
    fn interface_name(&self, port: PortId) -> Option<&str>;

    /// Hardware address of the bridge on these interfaces.
    fn hardware_address(&self) -> MacAddress;
}

pub mod memory {
    //! Channel-backed interfaces.

    use super::*;
    use tokio::sync::mpsc;
    use tracing::debug;

    /// Receive half of the in-memory interfaces.
    #[derive(Debug)]
    pub struct MemorySource {
        rx: mpsc::UnboundedReceiver<ReceivedFrame>,
    }

    /// Transmit half of the in-memory interfaces.
    #[derive(Debug)]
    pub struct MemorySink {
        names: Vec<String>,
        mac: MacAddress,
        tx: mpsc::UnboundedSender<ReceivedFrame>,
    }

    /// Test side of the in-memory interfaces: inject received frames and
    /// observe transmitted ones.
    #[derive(Debug)]
    pub struct MemoryWire {
        pub inject: mpsc::UnboundedSender<ReceivedFrame>,
        pub transmitted: mpsc::UnboundedReceiver<ReceivedFrame>,
    }

    impl MemoryWire {
        /// Delivers `frame` to the bridge as if received on `port`.
        pub fn deliver(&self, port: PortId, frame: Vec<u8>) -> bool {
            self.inject.send(ReceivedFrame { port, frame }).is_ok()
        }

        /// Drains everything the bridge has transmitted so far.
        pub fn drain(&mut self) -> Vec<ReceivedFrame> {
            let mut frames = Vec::new();
            while let Ok(frame) = self.transmitted.try_recv() {
                frames.push(frame);
            }
            frames
        }
    }

    /// Creates in-memory interfaces named `names`.
    pub fn links(names: Vec<String>, mac: MacAddress) -> (MemorySource, MemorySink, MemoryWire) {
        let (inject, rx) = mpsc::unbounded_channel();
        let (tx, transmitted) = mpsc::unbounded_channel();
        (
            MemorySource { rx },
            MemorySink { names, mac, tx },
            MemoryWire {
                inject,
                transmitted,
            },
        )
    }

    #[async_trait]
    impl FrameSource for MemorySource {
        async fn receive_any(&mut self) -> Option<ReceivedFrame> {
            self.rx.recv().await
        }
    }

    impl FrameSink for MemorySink {
        fn transmit(&self, port: PortId, frame: &[u8]) {
            let sent = self.tx.send(ReceivedFrame {
                port,
                frame: frame.to_vec(),
            });
            if sent.is_err() {
                debug!(port, "Transmit on closed in-memory link");
            }
        }
    }

    impl LinkInfo for MemorySink {
        fn interface_count(&self) -> usize {
            self.names.len()
        }

        fn interface_name(&self, port: PortId) -> Option<&str> {
            self.names.get(port).map(String::as_str)
        }

        fn hardware_address(&self) -> MacAddress {
            self.mac
        }
    }
}

pub mod udp {
    //! UDP virtual wires.
    //!
    //! Each interface owns one socket. A reader task feeds received
    //! datagrams into the merged receive queue; a writer task drains the
    //! interface's transmit queue with `send_to`, so [`FrameSink::transmit`]
    //! never blocks and never loses frames to a socket that is not yet
    //! writable.

    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tokio::sync::mpsc;
    use tokio::sync::mpsc::error::TrySendError;
    use tracing::{debug, info, warn};

    use crate::error::Result;

    /// Largest frame accepted: an untagged 1518-byte frame plus two tags.
    pub const MAX_FRAME_LEN: usize = 1526;

    /// Receive buffer, large enough for any UDP payload so oversized
    /// datagrams are seen whole and can be rejected.
    const RECEIVE_BUFFER_LEN: usize = 65536;

    /// Depth of the merged receive queue.
    const RECEIVE_QUEUE_DEPTH: usize = 1024;

    /// Depth of each interface's transmit queue.
    const TRANSMIT_QUEUE_DEPTH: usize = 256;

    /// Pause after the first failed receive; doubles up to [`MAX_RECEIVE_BACKOFF`].
    const RECEIVE_BACKOFF: Duration = Duration::from_millis(10);

    /// Longest pause between receive retries.
    const MAX_RECEIVE_BACKOFF: Duration = Duration::from_secs(1);

    /// One interface's UDP endpoints.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct UdpEndpoint {
        pub name: String,
        pub bind: SocketAddr,
        pub peer: SocketAddr,
    }

    /// Receive half: datagrams from every socket merged into one queue.
    #[derive(Debug)]
    pub struct UdpSource {
        rx: mpsc::Receiver<ReceivedFrame>,
    }

    /// Transmit half: one queue per interface.
    #[derive(Debug)]
    pub struct UdpSink {
        names: Vec<String>,
        mac: MacAddress,
        queues: Vec<mpsc::Sender<Vec<u8>>>,
    }

    /// Binds one socket per endpoint and starts its reader and writer tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn bind(endpoints: &[UdpEndpoint], mac: MacAddress) -> Result<(UdpSource, UdpSink)> {
        let (tx, rx) = mpsc::channel(RECEIVE_QUEUE_DEPTH);
        let mut queues = Vec::with_capacity(endpoints.len());

        for (port, endpoint) in endpoints.iter().enumerate() {
            let socket = Arc::new(UdpSocket::bind(endpoint.bind).await?);
            info!(
                port,
                name = %endpoint.name,
                bind = %endpoint.bind,
                peer = %endpoint.peer,
                "Interface bound"
            );
            let (queue, pending) = mpsc::channel(TRANSMIT_QUEUE_DEPTH);
            tokio::spawn(read_loop(port, endpoint.peer, socket.clone(), tx.clone()));
            tokio::spawn(write_loop(port, endpoint.peer, socket, pending));
            queues.push(queue);
        }

        let names = endpoints.iter().map(|e| e.name.clone()).collect();
        Ok((UdpSource { rx }, UdpSink { names, mac, queues }))
    }

    /// Delay before the next receive after `failures` consecutive errors.
    pub(crate) fn receive_backoff(failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(16);
        RECEIVE_BACKOFF
            .saturating_mul(1u32 << shift)
            .min(MAX_RECEIVE_BACKOFF)
    }

    async fn read_loop(
        port: PortId,
        peer: SocketAddr,
        socket: Arc<UdpSocket>,
        tx: mpsc::Sender<ReceivedFrame>,
    ) {
        let mut buf = vec![0u8; RECEIVE_BUFFER_LEN];
        let mut failures = 0u32;
        loop {
            let (len, from) = match socket.recv_from(&mut buf).await {
                Ok(received) => {
                    failures = 0;
                    received
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let backoff = receive_backoff(failures);
                    warn!(port, error = %e, failures, ?backoff, "Receive failed");
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            };
            if from != peer {
                debug!(port, %from, "Ignoring datagram from unexpected peer");
                continue;
            }
            if len > MAX_FRAME_LEN {
                debug!(port, len, max = MAX_FRAME_LEN, "Discarding oversized datagram");
                continue;
            }
            let frame = ReceivedFrame {
                port,
                frame: buf[..len].to_vec(),
            };
            if tx.send(frame).await.is_err() {
                debug!(port, "Receive queue closed, stopping reader");
                return;
            }
        }
    }

    async fn write_loop(
        port: PortId,
        peer: SocketAddr,
        socket: Arc<UdpSocket>,
        mut pending: mpsc::Receiver<Vec<u8>>,
    ) {
        while let Some(frame) = pending.recv().await {
            if let Err(e) = socket.send_to(&frame, peer).await {
                warn!(port, %peer, error = %e, "Transmit failed");
            }
        }
        debug!(port, "Transmit queue closed, stopping writer");
    }

    #[async_trait]
    impl FrameSource for UdpSource {
        async fn receive_any(&mut self) -> Option<ReceivedFrame> {
            self.rx.recv().await
        }
    }

    impl FrameSink for UdpSink {
        fn transmit(&self, port: PortId, frame: &[u8]) {
            let Some(queue) = self.queues.get(port) else {
                warn!(port, "Transmit on unknown interface");
                return;
            };
            match queue.try_send(frame.to_vec()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => warn!(port, "Transmit queue full, dropping frame"),
                Err(TrySendError::Closed(_)) => warn!(port, "Transmit on closed interface"),
            }
        }
    }

    impl LinkInfo for UdpSink {
        fn interface_count(&self) -> usize {
            self.names.len()
        }

        fn interface_name(&self, port: PortId) -> Option<&str> {
            self.names.get(port).map(String::as_str)
        }

        fn hardware_address(&self) -> MacAddress {
            self.mac
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_memory_links_roundtrip() {
        let mac = MacAddress::from_bridge_id(1);
        let (mut source, sink, mut wire) =
            memory::links(vec!["r-0".to_string(), "r-1".to_string()], mac);

        assert!(wire.deliver(1, vec![1, 2, 3]));
        let received = source.receive_any().await.unwrap();
        assert_eq!(received, ReceivedFrame { port: 1, frame: vec![1, 2, 3] });

        sink.transmit(0, &[9, 9]);
        assert_eq!(wire.drain(), vec![ReceivedFrame { port: 0, frame: vec![9, 9] }]);

        assert_eq!(sink.interface_count(), 2);
        assert_eq!(sink.interface_name(1), Some("r-1"));
        assert_eq!(sink.interface_name(2), None);
        assert_eq!(sink.hardware_address(), mac);
    }

    /// Reserves `n` distinct loopback addresses.
    fn loopback_addrs(n: usize) -> Vec<std::net::SocketAddr> {
        let sockets: Vec<_> = (0..n)
            .map(|_| std::net::UdpSocket::bind("127.0.0.1:0").unwrap())
            .collect();
        sockets.iter().map(|s| s.local_addr().unwrap()).collect()
    }

    async fn within<T>(fut: impl std::future::Future<Output = T>) -> T {
        tokio::time::timeout(std::time::Duration::from_secs(5), fut)
            .await
            .expect("timed out")
    }

    #[tokio::test]
    async fn test_first_transmit_after_bind_is_delivered() {
        // Two interfaces wired back to back on loopback.
        let addrs = loopback_addrs(2);
        let endpoints = vec![
            udp::UdpEndpoint {
                name: "a".to_string(),
                bind: addrs[0],
                peer: addrs[1],
            },
            udp::UdpEndpoint {
                name: "b".to_string(),
                bind: addrs[1],
                peer: addrs[0],
            },
        ];
        let (mut source, sink) = udp::bind(&endpoints, MacAddress::from_bridge_id(2))
            .await
            .unwrap();

        sink.transmit(0, &[0xaa; 20]);
        sink.transmit(1, &[0xbb; 30]);

        let mut received = vec![
            within(source.receive_any()).await.unwrap(),
            within(source.receive_any()).await.unwrap(),
        ];
        received.sort_by_key(|r| r.port);
        assert_eq!(received[0], ReceivedFrame { port: 0, frame: vec![0xbb; 30] });
        assert_eq!(received[1], ReceivedFrame { port: 1, frame: vec![0xaa; 20] });
        assert_eq!(sink.interface_name(0), Some("a"));
    }

    #[tokio::test]
    async fn test_oversized_datagram_is_discarded() {
        let addrs = loopback_addrs(2);
        let endpoints = vec![udp::UdpEndpoint {
            name: "a".to_string(),
            bind: addrs[0],
            peer: addrs[1],
        }];
        let (mut source, _sink) = udp::bind(&endpoints, MacAddress::from_bridge_id(3))
            .await
            .unwrap();

        let peer = tokio::net::UdpSocket::bind(addrs[1]).await.unwrap();
        peer.send_to(&[0x55; 2000], addrs[0]).await.unwrap();
        peer.send_to(&[0x66; udp::MAX_FRAME_LEN], addrs[0]).await.unwrap();

        let received = within(source.receive_any()).await.unwrap();
        assert_eq!(received.port, 0);
        assert_eq!(received.frame, vec![0x66; udp::MAX_FRAME_LEN]);
    }

    #[test]
    fn test_receive_backoff_grows_and_caps() {
        use std::time::Duration;

        assert_eq!(udp::receive_backoff(1), Duration::from_millis(10));
        assert_eq!(udp::receive_backoff(2), Duration::from_millis(20));
        assert_eq!(udp::receive_backoff(4), Duration::from_millis(80));
        assert_eq!(udp::receive_backoff(8), Duration::from_secs(1));
        assert_eq!(udp::receive_backoff(u32::MAX), Duration::from_secs(1));
    }
}
