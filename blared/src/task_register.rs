use crate::registry::SharedRegistry;
use log::{info, trace, warn};
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Binds session ids to datagram addresses. A player registers by sending a
/// single datagram holding its 4-byte session id; the address we answer
/// broadcasts to is wherever that datagram came from.
pub async fn run_register_task(udp_server: Arc<UdpSocket>, registry: SharedRegistry) {
    trace!("udp register task started");

    let mut buf = [0u8; 4];
    loop {
        let (len, udp_peer) = match udp_server.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(err) => {
                // a receive failure means the socket is going away with the
                // rest of the server
                info!("udp register task: {}", err);
                break;
            }
        };

        if len != 4 {
            warn!("malformed registration datagram ({} bytes) from udp://{}", len, udp_peer);
            continue;
        }

        let id = u32::from_le_bytes(buf);
        if !registry.lock().expect("registry lock poisoned").fill_udp_peer(id, udp_peer) {
            warn!("no playing peer id:{} udp://{}", id, udp_peer);
        }
    }

    trace!("udp register task stopped")
}
