use crate::registry::SharedRegistry;
use crate::{AudioSource, ServerConfig};
use blare_proto::wire::{Request, Response, ServerCodec, WireError};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use log::{info, trace, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

/// Mail other tasks drop into a session task's letterbox.
#[derive(Debug)]
pub enum SessionMessage {
    /// probe the peer: write one heartbeat command on the control channel
    Heartbeat,
    /// the session was evicted from the registry, close the connection
    Terminate,
}

/// One task per accepted control connection. Serves format requests, enrolls
/// the peer on start-play, and keeps the connection until the peer breaks
/// protocol, the transport fails, or the heartbeat supervisor evicts it.
pub async fn run_session_task(
    server_cfg: ServerConfig,
    stream: TcpStream,
    ctl_peer: SocketAddr,
    registry: SharedRegistry,
    audio: Arc<dyn AudioSource>,
) {
    trace!("session task started for tcp://{}", ctl_peer);

    let mut client_stream = Framed::new(stream, ServerCodec::new());

    // letterbox for the heartbeat supervisor. we keep a sender of our own so
    // the receiver stays open before the peer starts playing
    use tokio::sync::mpsc::unbounded_channel;
    let (session_send, mut session_recv) = unbounded_channel();

    // set once the peer issues a start-play; only then does a heartbeat
    // supervisor exist and a registry entry need cleaning up
    let mut playing_id = None;
    let mut evicted = false;

    loop {
        use tokio::select;
        select! {
            request = client_stream.next() => match request {
                // the connection with the peer got closed
                None => {
                    info!("close tcp://{}", ctl_peer);
                    break
                },

                Some(Err(err)) => {
                    // a bad command word is the peer's fault and worth a
                    // warning, a broken transport is routine
                    match err {
                        WireError::UnknownCommand(_) => warn!("session tcp://{}: {}", ctl_peer, err),
                        err => info!("session tcp://{}: {}", ctl_peer, err),
                    }
                    break
                },

                Some(Ok(Request::GetFormat)) => {
                    // cmd word, blob length and blob go out as one write
                    let format = audio.get_format_binary();
                    if let Err(err) = client_stream.send(Response::Format(format)).await {
                        warn!("session tcp://{}: {}", ctl_peer, err);
                        break
                    }
                },

                Some(Ok(Request::StartPlay)) => {
                    let added = registry
                        .lock()
                        .expect("registry lock poisoned")
                        .add(ctl_peer, session_send.clone());
                    let id = match added {
                        Some(id) => id,
                        None => {
                            warn!("session tcp://{}: rejected repeat start play", ctl_peer);
                            break
                        }
                    };
                    playing_id = Some(id);

                    if let Err(err) = client_stream.send(Response::StartPlay(id)).await {
                        warn!("session tcp://{}: {}", ctl_peer, err);
                        break
                    }

                    // from here on the peer must keep heartbeating or be evicted
                    use crate::task_heartbeat::run_heartbeat_task;
                    tokio::spawn(run_heartbeat_task(
                        server_cfg.clone(),
                        ctl_peer,
                        id,
                        registry.clone(),
                        session_send.clone(),
                    ));
                    info!("session {} playing for tcp://{}", id, ctl_peer);
                },

                Some(Ok(Request::Heartbeat)) => {
                    // a heartbeat before start-play refreshes nothing
                    if !registry.lock().expect("registry lock poisoned").touch(ctl_peer) {
                        trace!("heartbeat from non-playing tcp://{}", ctl_peer);
                    }
                },
            },

            message = session_recv.recv() => match message {
                // we hold a sender ourselves, the channel cannot drain
                None => break,

                Some(SessionMessage::Heartbeat) => {
                    if let Err(err) = client_stream.send(Response::Heartbeat).await {
                        warn!("session tcp://{}: {}", ctl_peer, err);
                        break
                    }
                },

                // the supervisor already pulled us out of the registry,
                // all that is left is closing the connection
                Some(SessionMessage::Terminate) => {
                    evicted = true;
                    break
                },
            },
        }
    }

    // eviction and close are idempotent, the supervisor may race us here
    if playing_id.is_some() && !evicted {
        registry.lock().expect("registry lock poisoned").remove(ctl_peer);
    }
    let mut stream = client_stream.into_inner();
    let _ = stream.shutdown().await;

    trace!("session task stopped for tcp://{}", ctl_peer);
}
