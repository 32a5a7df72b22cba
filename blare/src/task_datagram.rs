use crate::AudioPlayer;
use anyhow::{Context, Result};
use log::{debug, error, trace};
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Largest datagram payload we accept in one receive.
const MAX_DATAGRAM_LEN: usize = 4096;

/// Consecutive receive failures tolerated before the task gives up.
const MAX_RECV_FAILURES: u32 = 10;

/// Registers this session with the server's datagram socket, then relays
/// every received payload to the playback collaborator.
pub async fn run_datagram_task(host: String, port: u16, id: u32, audio: Arc<dyn AudioPlayer>) {
    trace!("datagram task started for session {}", id);

    if let Err(err) = relay_datagrams(&host, port, id, audio.as_ref()).await {
        error!("datagram task for session {}: {}", id, err);
    }

    trace!("datagram task stopped for session {}", id);
}

async fn relay_datagrams(host: &str, port: u16, id: u32, audio: &dyn AudioPlayer) -> Result<()> {
    // an ephemeral local port; the server learns it from our registration
    let udp_socket = UdpSocket::bind("0.0.0.0:0").await?;
    udp_socket.connect((host, port)).await?;

    // register: the 4-byte session id, nothing else
    udp_socket.send(&id.to_le_bytes()).await.context("datagram registration failed")?;

    let mut buf = [0u8; MAX_DATAGRAM_LEN];
    let mut failures = 0u32;
    loop {
        match udp_socket.recv(&mut buf).await {
            Ok(len) => {
                failures = 0;
                audio.play(&buf[..len]);
            }
            Err(err) => {
                // transient receive errors are tolerated, up to a point
                failures += 1;
                if failures >= MAX_RECV_FAILURES {
                    return Err(err).context("giving up after repeated receive failures");
                }
                debug!("datagram receive error ({}/{}): {}", failures, MAX_RECV_FAILURES, err);
            }
        }
    }
}
