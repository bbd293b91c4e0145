//! Receive and hello tasks.
//!
//! The receive task blocks on the frame source and runs each frame through
//! the bridge; the hello task wakes once per interval and sends BPDUs while
//! the bridge is root. Both take the bridge lock for one step only and
//! transmit after releasing it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::bridge::SharedBridge;
use crate::forwarding::Egress;
use crate::link::{FrameSink, FrameSource, LinkInfo, ReceivedFrame};

/// Counters from the receive task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaemonStats {
    /// Frames taken from the source.
    pub received: u64,
    /// Frames discarded as malformed.
    pub discarded: u64,
    /// Frames handed to the sink, BPDU relays included.
    pub transmitted: u64,
}

/// Logs the bridge identity and every interface with its role.
pub fn log_startup(bridge: &SharedBridge, links: &dyn LinkInfo) {
    let snapshot = bridge.lock().snapshot();
    info!(
        bridge_id = snapshot.stp.own_id,
        mac = %links.hardware_address(),
        interfaces = links.interface_count(),
        "Bridge starting"
    );
    for (port, role) in &snapshot.roles {
        info!(
            port,
            name = links.interface_name(*port).unwrap_or("?"),
            %role,
            "Interface"
        );
    }
}

/// Runs both tasks until the source closes or `shutdown` completes.
pub async fn run<R, S, F>(
    bridge: SharedBridge,
    mut source: R,
    sink: Arc<S>,
    hello_interval: Duration,
    shutdown: F,
) -> DaemonStats
where
    R: FrameSource,
    S: FrameSink + 'static,
    F: Future<Output = ()>,
{
    let hello = tokio::spawn(hello_loop(bridge.clone(), sink.clone(), hello_interval));

    let mut stats = DaemonStats::default();
    tokio::select! {
        _ = receive_loop(&bridge, &mut source, sink.as_ref(), &mut stats) => {
            info!("Frame source closed");
        }
        _ = shutdown => {
            info!("Shutdown requested");
        }
    }

    hello.abort();
    let snapshot = bridge.lock().snapshot();
    info!(
        received = stats.received,
        discarded = stats.discarded,
        transmitted = stats.transmitted,
        root_id = snapshot.stp.root_id,
        learned = snapshot.learned_addresses,
        "Bridge stopped"
    );
    stats
}

async fn receive_loop<R, S>(bridge: &SharedBridge, source: &mut R, sink: &S, stats: &mut DaemonStats)
where
    R: FrameSource,
    S: FrameSink + ?Sized,
{
    while let Some(ReceivedFrame { port, frame }) = source.receive_any().await {
        stats.received += 1;
        let result = bridge.lock().handle_frame(port, &frame);
        match result {
            Ok(egress) => stats.transmitted += transmit(sink, egress),
            Err(e) => {
                stats.discarded += 1;
                debug!(port, len = frame.len(), error = %e, "Discarding frame");
            }
        }
    }
}

async fn hello_loop<S>(bridge: SharedBridge, sink: Arc<S>, period: Duration)
where
    S: FrameSink + ?Sized,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let hello = bridge.lock().hello();
        transmit(sink.as_ref(), hello);
    }
}

fn transmit<S: FrameSink + ?Sized>(sink: &S, egress: Vec<Egress>) -> u64 {
    let mut sent = 0;
    for Egress { port, frame } in egress {
        sink.transmit(port, &frame);
        sent += 1;
    }
    sent
}
