use anyhow::Result;
use blare::{AudioPlayer, Client, ClientConfig};
use log::{error, info, trace};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn main() {
    if let Err(err) = setup_logging() {
        eprintln!("failed to setup logging: {}", err);
    } else if let Err(err) = run_blare() {
        error!("error while running blare: {}", err);
    }
}

// synchronous on purpose: the client owns its executor thread, and start()
// must not be called from inside a runtime
fn run_blare() -> Result<()> {
    use std::env::var;
    let client_cfg = ClientConfig::from_env()?;
    let host = var("BLARE_SERVER_HOST").unwrap_or("127.0.0.1".to_owned());
    let port = var("BLARE_SERVER_PORT").unwrap_or("65530".to_owned()).parse::<u16>()?;

    // the log player stands in for a real playback engine
    let mut client = Client::new(Arc::new(LogPlayer::default()), client_cfg);
    client.start(&host, port)?;

    wait_for_ctrl_c()?;
    info!("received ctrl-c signal, initiating graceful shutdown...");
    client.stop();

    Ok(())
}

fn wait_for_ctrl_c() -> Result<()> {
    // this runtime exists only to park the main thread on the signal
    use tokio::runtime;
    let rt = runtime::Builder::new_current_thread().enable_all().build()?;
    rt.block_on(tokio::signal::ctrl_c())?;
    Ok(())
}

fn setup_logging() -> Result<()> {
    use fern::Dispatch;
    use log::LevelFilter;
    use std::io::stderr;
    Dispatch::new().level(LevelFilter::Debug).chain(stderr()).apply()?;
    Ok(())
}

/// A stand-in playback engine that just accounts for what it receives.
#[derive(Default)]
struct LogPlayer {
    received: AtomicU64,
}

impl AudioPlayer for LogPlayer {
    fn init(&self, format: &[u8]) -> Result<()> {
        info!("decoder initialized from a {} byte format descriptor", format.len());
        Ok(())
    }

    fn start(&self) -> Result<()> {
        info!("playback started");
        Ok(())
    }

    fn play(&self, data: &[u8]) {
        let total = self.received.fetch_add(data.len() as u64, Ordering::Relaxed) + data.len() as u64;
        trace!("played {} bytes ({} total)", data.len(), total);
    }
}
