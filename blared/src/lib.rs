//! Server half of blare: accepts player connections on a reliable control
//! channel, hands out the capture format and session ids, and fans captured
//! audio out to every registered player over best-effort datagrams.
//!
//! One server owns one single-threaded executor on a dedicated thread. All
//! socket work happens there; the capture side (see [`AudioSource`]) runs on
//! its own threads and only ever posts buffers through a [`BroadcastSink`].

use anyhow::{ensure, Context, Result};
use bytes::Bytes;
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket, UdpSocket};
use tokio::sync::Notify;

pub use addr::{get_address_list, select_default_address};
pub use sink::BroadcastSink;

/// Tunables of one server instance.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// cadence of the liveness probes written to every playing peer
    pub heartbeat_interval: Duration,
    /// silence span after which a playing peer is evicted
    pub heartbeat_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(3),
            heartbeat_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        use std::env::var;
        let interval = var("BLARED_HEARTBEAT_INTERVAL_SECS").unwrap_or("3".to_owned());
        let timeout = var("BLARED_HEARTBEAT_TIMEOUT_SECS").unwrap_or("10".to_owned());
        Ok(Self {
            heartbeat_interval: Duration::from_secs(interval.parse::<u64>()?),
            heartbeat_timeout: Duration::from_secs(timeout.parse::<u64>()?),
        })
    }
}

/// Opaque capture selector handed through to the audio collaborator.
#[derive(Clone, Debug, Default)]
pub struct CaptureConfig {
    /// capture device endpoint, collaborator-defined; `None` picks its default
    pub endpoint_id: Option<String>,
}

/// The capture side collaborator: produces the raw audio this server ships.
pub trait AudioSource: Send + Sync {
    /// Begin loopback capture. Frames are published by calling
    /// `sink.broadcast_audio_data` from whatever thread the capture engine
    /// runs on.
    fn start_loopback_recording(&self, sink: BroadcastSink, capture: CaptureConfig) -> Result<()>;

    /// Cease capturing. Idempotent.
    fn stop(&self);

    /// The serialized audio format descriptor shipped to clients.
    fn get_format_binary(&self) -> Bytes;
}

struct Running {
    stop: Arc<Notify>,
    net_thread: Option<thread::JoinHandle<()>>,
    sink: BroadcastSink,
    local_addr: SocketAddr,
}

pub struct Server {
    server_cfg: ServerConfig,
    audio: Arc<dyn AudioSource>,
    running: Option<Running>,
}

impl Server {
    pub fn new(audio: Arc<dyn AudioSource>, server_cfg: ServerConfig) -> Self {
        Self { server_cfg, audio, running: None }
    }

    /// Bind the control and datagram sockets, start loopback capture, and
    /// kick off the executor thread. Bind or capture failures surface here
    /// and leave nothing half-started.
    pub fn start(&mut self, host: &str, port: u16, capture: CaptureConfig) -> Result<()> {
        ensure!(self.running.is_none(), "server already started");

        let bind_addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("bad bind address {}:{}", host, port))?;
        ensure!(bind_addr.is_ipv4(), "the datagram path only speaks ipv4");

        use tokio::runtime;
        let rt = runtime::Builder::new_current_thread().enable_all().build()?;

        // bind both sockets up front so failures surface to the caller
        // instead of dying on the executor thread
        let (listener, udp_server) = rt.block_on(bind_sockets(bind_addr))?;
        let local_addr = listener.local_addr()?;
        info!("tcp listen success on {}", local_addr);
        info!("udp listen success on {}", udp_server.local_addr()?);

        use crate::registry::Registry;
        let registry = Registry::shared();

        use tokio::sync::mpsc::unbounded_channel;
        let (broadcast_send, broadcast_recv) = unbounded_channel();
        let sink = BroadcastSink::new(broadcast_send);

        // loopback capture feeds the sink from the collaborator's threads
        self.audio.start_loopback_recording(sink.clone(), capture)?;

        rt.spawn(task_accept::run_accept_task(
            self.server_cfg.clone(),
            listener,
            registry.clone(),
            self.audio.clone(),
        ));
        rt.spawn(task_register::run_register_task(udp_server.clone(), registry.clone()));
        rt.spawn(task_broadcast::run_broadcast_task(broadcast_recv, udp_server, registry));

        // the executor thread drives every task until somebody calls stop;
        // dropping the runtime afterwards cancels whatever is still in flight
        let stop = Arc::new(Notify::new());
        let parked = stop.clone();
        let net_thread = thread::spawn(move || {
            rt.block_on(parked.notified());
        });

        self.running = Some(Running { stop, net_thread: Some(net_thread), sink, local_addr });
        Ok(())
    }

    /// Stop the executor, join its thread and stop the capture side. Safe to
    /// call when the server never started.
    pub fn stop(&mut self) {
        let mut running = match self.running.take() {
            Some(running) => running,
            None => return,
        };

        running.stop.notify_one();
        if let Some(net_thread) = running.net_thread.take() {
            let _ = net_thread.join();
        }
        self.audio.stop();
        info!("server stopped");
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

    /// The address the control and datagram sockets actually bound, useful
    /// when started with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.local_addr)
    }

    /// Thread-safe producer entry for the capture side. A no-op when the
    /// server is stopped.
    pub fn broadcast_audio_data(&self, data: &[u8], block_align: usize) {
        if let Some(running) = self.running.as_ref() {
            running.sink.broadcast_audio_data(data, block_align);
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn bind_sockets(bind_addr: SocketAddr) -> Result<(TcpListener, Arc<UdpSocket>)> {
    // reuse the address so a stop/start cycle can rebind right away
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(bind_addr)?;
    let listener = socket.listen(64)?;

    // the datagram socket shares its port with the control listener
    let udp_addr = SocketAddr::new(bind_addr.ip(), listener.local_addr()?.port());
    let udp_server = Arc::new(UdpSocket::bind(udp_addr).await?);

    Ok((listener, udp_server))
}

mod addr;
mod registry;
mod sink;
mod task_accept;
mod task_broadcast;
mod task_heartbeat;
mod task_register;
mod task_session;
