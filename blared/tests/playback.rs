//! End-to-end run of the real client against the real server.

use anyhow::Result;
use blare::{AudioPlayer, Client, ClientConfig};
use blared::ServerConfig;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

mod common;
use common::start_test_server;

/// A playback stand-in that collects everything it is handed.
#[derive(Default)]
struct CollectingPlayer {
    received: Mutex<Vec<u8>>,
}

impl AudioPlayer for CollectingPlayer {
    fn init(&self, format: &[u8]) -> Result<()> {
        assert_eq!(format, b"ABC");
        Ok(())
    }

    fn start(&self) -> Result<()> {
        Ok(())
    }

    fn play(&self, data: &[u8]) {
        self.received.lock().unwrap().extend_from_slice(data);
    }
}

#[test]
fn end_to_end_playback() {
    let mut server = start_test_server(ServerConfig::default());
    let addr = server.local_addr().unwrap();

    let player = Arc::new(CollectingPlayer::default());
    let mut client = Client::new(player.clone(), ClientConfig::default());
    client.start("127.0.0.1", addr.port()).unwrap();
    assert!(client.is_running());

    // the client's datagram registration races the broadcast below
    std::thread::sleep(Duration::from_millis(300));

    let payload: Vec<u8> = (0..8192u32).map(|i| (i % 249) as u8).collect();
    server.broadcast_audio_data(&payload, 4);

    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if player.received.lock().unwrap().len() >= payload.len() {
            break;
        }
        assert!(Instant::now() < deadline, "payload never fully arrived");
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(*player.received.lock().unwrap(), payload);

    client.stop();
    assert!(!client.is_running());
    server.stop();
}
