use crate::ClientConfig;
use blare_proto::wire::{ClientCodec, Request, Response};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use log::{info, trace, warn};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

/// Keeps the control channel alive after the handshake: emits our heartbeats
/// at a fixed cadence and drains whatever the server writes back.
pub async fn run_connection_task(
    client_cfg: ClientConfig,
    mut server_stream: Framed<TcpStream, ClientCodec>,
) {
    trace!("connection task started");

    use tokio::time::interval;
    let mut keepalive = interval(client_cfg.heartbeat_interval);
    // the first tick fires immediately and the server heard from us during
    // the handshake a moment ago, skip it
    keepalive.tick().await;

    loop {
        use tokio::select;
        select! {
            _ = keepalive.tick() => {
                if let Err(err) = server_stream.send(Request::Heartbeat).await {
                    warn!("heartbeat write failed: {}", err);
                    break
                }
            },

            response = server_stream.next() => match response {
                None => {
                    info!("connection closed by server");
                    break
                },

                Some(Err(err)) => {
                    warn!("connection error: {}", err);
                    break
                },

                // the server probing us; our own cadence is the answer
                Some(Ok(Response::Heartbeat)) => trace!("server heartbeat received"),

                Some(Ok(response)) => {
                    warn!("unexpected response: {:?}", response);
                    break
                },
            },
        }
    }

    trace!("connection task stopped")
}
