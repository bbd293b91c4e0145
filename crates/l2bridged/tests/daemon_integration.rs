//! End-to-end daemon tests over the in-memory transport

use l2bridge_types::{MacAddress, VlanId};
use l2bridged::link::memory::{self, MemoryWire};
use l2bridged::{daemon, frame, Bpdu, Bridge, PortRole, ReceivedFrame, SharedBridge};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn vlan(id: u16) -> VlanId {
    VlanId::new(id).unwrap()
}

fn data_frame(dst: MacAddress, src: MacAddress) -> Vec<u8> {
    let mut raw = Vec::new();
    raw.extend_from_slice(dst.as_bytes());
    raw.extend_from_slice(src.as_bytes());
    raw.extend_from_slice(&[0x08, 0x00]);
    raw.extend_from_slice(b"ping");
    raw
}

struct Harness {
    bridge: SharedBridge,
    wire: MemoryWire,
    stop: oneshot::Sender<()>,
    daemon: JoinHandle<daemon::DaemonStats>,
}

/// Bridge 30 with a trunk on port 0 and VLAN 10 access ports 1 and 2.
fn start() -> Harness {
    let mac = MacAddress::from_bridge_id(30);
    let bridge = Bridge::new(
        30,
        mac,
        vec![
            PortRole::TrunkForwarding,
            PortRole::Access(vlan(10)),
            PortRole::Access(vlan(10)),
        ],
    )
    .into_shared();
    let names = vec!["r-0".to_string(), "r-1".to_string(), "r-2".to_string()];
    let (source, sink, wire) = memory::links(names, mac);
    daemon::log_startup(&bridge, &sink);

    let (stop, stop_rx) = oneshot::channel();
    let daemon = tokio::spawn(daemon::run(
        bridge.clone(),
        source,
        Arc::new(sink),
        Duration::from_secs(3600),
        async move {
            let _ = stop_rx.await;
        },
    ));
    Harness {
        bridge,
        wire,
        stop,
        daemon,
    }
}

/// Next transmitted frame that is not a spanning tree BPDU.
async fn next_data(wire: &mut MemoryWire) -> ReceivedFrame {
    loop {
        let sent = timeout(WAIT, wire.transmitted.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("sink closed");
        if !frame::addresses(&sent.frame).unwrap().0.is_bridge_group() {
            return sent;
        }
    }
}

#[tokio::test]
async fn test_daemon_forwards_and_learns() {
    let mut h = start();
    let h1 = MacAddress::new([0, 0, 0, 0, 0, 1]);
    let h2 = MacAddress::new([0, 0, 0, 0, 0, 2]);

    let raw = data_frame(MacAddress::BROADCAST, h1);
    assert!(h.wire.deliver(1, raw.clone()));

    let mut copies = vec![next_data(&mut h.wire).await, next_data(&mut h.wire).await];
    copies.sort_by_key(|c| c.port);
    assert_eq!(copies[0].port, 0);
    assert_eq!(frame::parse(&copies[0].frame).unwrap().vlan_id, Some(vlan(10)));
    assert_eq!(copies[1], ReceivedFrame { port: 2, frame: raw });

    // h1 is now known: the reply goes to port 1 only.
    let reply = data_frame(h1, h2);
    assert!(h.wire.deliver(2, reply.clone()));
    assert_eq!(next_data(&mut h.wire).await, ReceivedFrame { port: 1, frame: reply });

    let _ = h.stop.send(());
    let stats = timeout(WAIT, h.daemon).await.unwrap().unwrap();
    assert_eq!(stats.received, 2);
    assert_eq!(stats.discarded, 0);
    assert_eq!(h.bridge.lock().mac_table().len(), 2);
}

#[tokio::test]
async fn test_daemon_follows_better_root() {
    let mut h = start();

    let root = Bpdu {
        root_id: 10,
        root_path_cost: 0,
        bridge_id: 10,
        port_id: 3,
    };
    assert!(h.wire.deliver(0, root.encode(MacAddress::from_bridge_id(10))));

    // The relay is the first BPDU carrying the new root.
    let relay = loop {
        let sent = timeout(WAIT, h.wire.transmitted.recv()).await.unwrap().unwrap();
        let bpdu = Bpdu::decode(&sent.frame).unwrap();
        if bpdu.root_id == 10 {
            break (sent.port, bpdu);
        }
    };
    assert_eq!(relay.0, 0);
    assert_eq!(relay.1.root_path_cost, 10);
    assert_eq!(relay.1.bridge_id, 30);

    // Malformed frames are discarded without stopping the daemon.
    assert!(h.wire.deliver(0, vec![0x01, 0x80]));

    // Closing the source ends the daemon.
    let MemoryWire { inject, .. } = h.wire;
    drop(inject);
    let stats = timeout(WAIT, h.daemon).await.unwrap().unwrap();
    assert_eq!(stats.received, 2);
    assert_eq!(stats.discarded, 1);

    let snapshot = h.bridge.lock().snapshot();
    assert_eq!(snapshot.stp.root_id, 10);
    assert_eq!(snapshot.stp.root_port, Some(0));
    drop(h.stop);
}
