use anyhow::Result;
use blared::{AudioSource, BroadcastSink, CaptureConfig, Server, ServerConfig};
use bytes::Bytes;
use std::sync::Arc;

/// A capture stand-in serving a fixed format descriptor and producing no
/// audio of its own; tests drive broadcasts by hand.
pub struct StaticSource {
    format: Bytes,
}

impl StaticSource {
    pub fn new(format: &'static [u8]) -> Arc<Self> {
        Arc::new(Self { format: Bytes::from_static(format) })
    }
}

impl AudioSource for StaticSource {
    fn start_loopback_recording(&self, _sink: BroadcastSink, _capture: CaptureConfig) -> Result<()> {
        Ok(())
    }

    fn stop(&self) {}

    fn get_format_binary(&self) -> Bytes {
        self.format.clone()
    }
}

/// A server on an ephemeral loopback port, serving the format blob `b"ABC"`.
pub fn start_test_server(server_cfg: ServerConfig) -> Server {
    let mut server = Server::new(StaticSource::new(b"ABC"), server_cfg);
    server
        .start("127.0.0.1", 0, CaptureConfig::default())
        .expect("test server failed to start");
    server
}
