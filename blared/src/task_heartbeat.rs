use crate::registry::SharedRegistry;
use crate::task_session::SessionMessage;
use crate::ServerConfig;
use log::{info, trace};
use std::net::SocketAddr;
use tokio::sync::mpsc::UnboundedSender as USender;

/// One supervisor per playing session, spawned at the start-play
/// acknowledgment. Probes the peer at a fixed cadence and evicts it once it
/// stays silent past the timeout.
pub async fn run_heartbeat_task(
    server_cfg: ServerConfig,
    ctl_peer: SocketAddr,
    id: u32,
    registry: SharedRegistry,
    session_send: USender<SessionMessage>,
) {
    trace!("heartbeat supervisor started for session {}", id);

    loop {
        use tokio::time::sleep;
        sleep(server_cfg.heartbeat_interval).await;

        // the session task dropped its letterbox, nothing left to supervise
        if session_send.is_closed() {
            break;
        }

        let last_heartbeat = registry
            .lock()
            .expect("registry lock poisoned")
            .last_heartbeat(ctl_peer);

        match last_heartbeat {
            // somebody already evicted this session, make sure the
            // connection goes down with it
            None => {
                let _ = session_send.send(SessionMessage::Terminate);
                break;
            }

            Some(last) if last.elapsed() > server_cfg.heartbeat_timeout => {
                info!("session {} timed out ({:?} since heartbeat)", id, last.elapsed());
                registry.lock().expect("registry lock poisoned").remove(ctl_peer);
                let _ = session_send.send(SessionMessage::Terminate);
                break;
            }

            Some(_) => {
                // probe the peer. the session task owns the socket and
                // reports a write failure by dropping the letterbox
                if session_send.send(SessionMessage::Heartbeat).is_err() {
                    break;
                }
            }
        }
    }

    trace!("heartbeat supervisor stopped for session {}", id);
}
