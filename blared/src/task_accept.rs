use crate::registry::SharedRegistry;
use crate::{AudioSource, ServerConfig};
use log::{error, info};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Accepts control connections forever and hands each one to its own session
/// task. Runs until the listener dies with the executor.
pub async fn run_accept_task(
    server_cfg: ServerConfig,
    listener: TcpListener,
    registry: SharedRegistry,
    audio: Arc<dyn AudioSource>,
) {
    loop {
        let (stream, ctl_peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                // accept failures are terminal, the listener is going away
                error!("accept: {}", err);
                break;
            }
        };

        info!("accept tcp://{}", ctl_peer);

        // command words and heartbeats must not sit in nagle buffers
        if let Err(err) = stream.set_nodelay(true) {
            info!("set_nodelay tcp://{}: {}", ctl_peer, err);
        }

        use crate::task_session::run_session_task;
        tokio::spawn(run_session_task(
            server_cfg.clone(),
            stream,
            ctl_peer,
            registry.clone(),
            audio.clone(),
        ));
    }
}
