use crate::registry::SharedRegistry;
use bytes::Bytes;
use log::trace;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedReceiver as UReceiver;

/// Fans segmented capture buffers out to every registered datagram peer.
/// A single task consumes the producer channel, so segments of one buffer
/// are never interleaved with the next buffer's on any peer.
pub async fn run_broadcast_task(
    mut broadcast_recv: UReceiver<Vec<Bytes>>,
    udp_server: Arc<UdpSocket>,
    registry: SharedRegistry,
) {
    trace!("broadcast task started");

    while let Some(segments) = broadcast_recv.recv().await {
        // snapshot the targets once per buffer; peers that have not
        // registered a datagram endpoint yet are skipped
        let targets = registry.lock().expect("registry lock poisoned").udp_targets();
        if targets.is_empty() {
            continue;
        }

        for segment in &segments {
            for target in &targets {
                // best-effort transport, send failures are dropped
                let _ = udp_server.send_to(segment, target).await;
            }
        }
    }

    trace!("broadcast task stopped")
}
