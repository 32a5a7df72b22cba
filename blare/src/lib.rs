//! Player half of blare: connects to a server's control channel, pulls the
//! audio format, registers for the datagram stream, and relays every received
//! payload to the playback collaborator.

use anyhow::{bail, ensure, Result};
use blare_proto::wire::{ClientCodec, Request, Response};
use log::info;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio_util::codec::Framed;

/// The playback side collaborator: consumes the raw audio this client pulls.
pub trait AudioPlayer: Send + Sync {
    /// Bring up the decoder from the server's opaque format descriptor.
    fn init(&self, format: &[u8]) -> Result<()>;

    /// Start rendering; called once the session is established.
    fn start(&self) -> Result<()>;

    /// Hand one datagram payload to the renderer.
    fn play(&self, data: &[u8]);
}

/// Tunables of one client instance.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// cadence of the liveness heartbeats written to the server
    pub heartbeat_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { heartbeat_interval: Duration::from_secs(3) }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        use std::env::var;
        let interval = var("BLARE_HEARTBEAT_INTERVAL_SECS").unwrap_or("3".to_owned());
        Ok(Self { heartbeat_interval: Duration::from_secs(interval.parse::<u64>()?) })
    }
}

struct Running {
    stop: Arc<Notify>,
    net_thread: Option<thread::JoinHandle<()>>,
}

pub struct Client {
    client_cfg: ClientConfig,
    audio: Arc<dyn AudioPlayer>,
    running: Option<Running>,
}

impl Client {
    pub fn new(audio: Arc<dyn AudioPlayer>, client_cfg: ClientConfig) -> Self {
        Self { client_cfg, audio, running: None }
    }

    /// Connect to the server, run the whole handshake, and kick off the
    /// executor thread. Connection and protocol failures surface here.
    pub fn start(&mut self, host: &str, port: u16) -> Result<()> {
        ensure!(self.running.is_none(), "client already started");

        use tokio::runtime;
        let rt = runtime::Builder::new_current_thread().enable_all().build()?;

        // the handshake runs to completion before any task exists so a bad
        // address or a protocol mismatch reaches the caller
        let (server_stream, id) = rt.block_on(handshake(host, port, self.audio.as_ref()))?;
        info!("session {} established with {}:{}", id, host, port);
        self.audio.start()?;

        rt.spawn(task_connection::run_connection_task(self.client_cfg.clone(), server_stream));
        rt.spawn(task_datagram::run_datagram_task(
            host.to_owned(),
            port,
            id,
            self.audio.clone(),
        ));

        // the executor thread drives both tasks until somebody calls stop
        let stop = Arc::new(Notify::new());
        let parked = stop.clone();
        let net_thread = thread::spawn(move || {
            rt.block_on(parked.notified());
        });

        self.running = Some(Running { stop, net_thread: Some(net_thread) });
        Ok(())
    }

    /// Stop the executor and join its thread. Safe to call when the client
    /// never started.
    pub fn stop(&mut self) {
        let mut running = match self.running.take() {
            Some(running) => running,
            None => return,
        };

        running.stop.notify_one();
        if let Some(net_thread) = running.net_thread.take() {
            let _ = net_thread.join();
        }
        info!("client stopped");
    }

    /// Block until the executor thread exits.
    pub fn wait(&mut self) {
        if let Some(running) = self.running.as_mut() {
            if let Some(net_thread) = running.net_thread.take() {
                let _ = net_thread.join();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handshake(
    host: &str,
    port: u16,
    audio: &dyn AudioPlayer,
) -> Result<(Framed<TcpStream, ClientCodec>, u32)> {
    let stream = TcpStream::connect((host, port)).await?;
    let mut server_stream = Framed::new(stream, ClientCodec::new());

    use futures::sink::SinkExt;
    use futures::stream::StreamExt;

    // fetch the format descriptor and bring up the decoder
    server_stream.send(Request::GetFormat).await?;
    match server_stream.next().await {
        Some(Ok(Response::Format(format))) => {
            ensure!(!format.is_empty(), "server sent an empty format descriptor");
            audio.init(&format)?;
        }
        Some(Ok(response)) => bail!("expected format response, received: {:?}", response),
        Some(Err(err)) => return Err(err.into()),
        None => bail!("connection closed by server"),
    }

    // declare ourselves a player and learn our session id
    server_stream.send(Request::StartPlay).await?;
    let id = match server_stream.next().await {
        Some(Ok(Response::StartPlay(id))) => id,
        Some(Ok(response)) => bail!("expected start play response, received: {:?}", response),
        Some(Err(err)) => return Err(err.into()),
        None => bail!("connection closed by server"),
    };
    ensure!(id > 0, "server handed out session id 0");

    Ok((server_stream, id))
}

mod task_connection;
mod task_datagram;
