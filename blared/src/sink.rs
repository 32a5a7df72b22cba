use blare_proto::split_segments;
use bytes::Bytes;
use log::warn;
use tokio::sync::mpsc::UnboundedSender as USender;

/// Thread-safe producer handle handed to the audio collaborator. Capture
/// threads never touch a socket, they only post segmented buffers here; the
/// datagram sends happen on the server's executor.
#[derive(Clone, Debug)]
pub struct BroadcastSink {
    broadcast_send: USender<Vec<Bytes>>,
}

impl BroadcastSink {
    pub(crate) fn new(broadcast_send: USender<Vec<Bytes>>) -> Self {
        Self { broadcast_send }
    }

    /// Publish one capture buffer to every playing peer. `block_align` is the
    /// byte size of one indivisible sample group; buffers it does not divide
    /// are dropped with a warning rather than split mid-sample.
    pub fn broadcast_audio_data(&self, data: &[u8], block_align: usize) {
        if data.is_empty() {
            return;
        }

        match split_segments(data, block_align) {
            Ok(segments) => {
                // the broadcast task only goes away when the server stops,
                // at which point the buffer is nobody's loss
                let _ = self.broadcast_send.send(segments);
            }
            Err(err) => warn!("dropping capture buffer: {}", err),
        }
    }
}
