use anyhow::Result;
use blared::{AudioSource, BroadcastSink, CaptureConfig, Server, ServerConfig};
use bytes::{BufMut, Bytes, BytesMut};
use log::{error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn main() {
    if let Err(err) = setup_logging() {
        eprintln!("failed to setup logging: {}", err);
    } else if let Err(err) = run_blared() {
        error!("error while running blared: {}", err);
    }
}

// synchronous on purpose: the server owns its executor thread, and start()
// must not be called from inside a runtime
fn run_blared() -> Result<()> {
    use std::env::var;
    let server_cfg = ServerConfig::from_env()?;
    let host = var("BLARED_BIND_HOST").unwrap_or("0.0.0.0".to_owned());
    let port = var("BLARED_BIND_PORT").unwrap_or("65530".to_owned()).parse::<u16>()?;

    // the tone source stands in for a real loopback capture engine
    let mut server = Server::new(Arc::new(ToneSource::default()), server_cfg);
    server.start(&host, port, CaptureConfig::default())?;

    // tell the operator where players should point their clients
    use blared::{get_address_list, select_default_address};
    let address_list = get_address_list();
    if !address_list.is_empty() {
        info!("players can reach this host at {}:{}", select_default_address(&address_list), port);
    }

    wait_for_ctrl_c()?;
    info!("received ctrl-c signal, initiating graceful shutdown...");
    server.stop();

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

const SAMPLE_RATE: u32 = 48_000;
const CHANNELS: u16 = 2;
const BITS_PER_SAMPLE: u16 = 16;
// bytes of one stereo 16-bit sample group
const BLOCK_ALIGN: usize = (CHANNELS as usize * BITS_PER_SAMPLE as usize) / 8;

/// A stand-in capture source: 10ms buffers of a 440hz sine, stereo 16-bit.
#[derive(Default)]
struct ToneSource {
    worker: Mutex<Option<ToneWorker>>,
}

struct ToneWorker {
    running: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

impl AudioSource for ToneSource {
    fn start_loopback_recording(&self, sink: BroadcastSink, _capture: CaptureConfig) -> Result<()> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let handle = thread::spawn(move || {
            let frames_per_buffer = SAMPLE_RATE as usize / 100;
            let step = 440.0 * 2.0 * std::f32::consts::PI / SAMPLE_RATE as f32;
            let mut phase = 0f32;
            let mut buffer = Vec::with_capacity(frames_per_buffer * BLOCK_ALIGN);

            while flag.load(Ordering::Relaxed) {
                buffer.clear();
                for _ in 0..frames_per_buffer {
                    let sample = (phase.sin() * i16::MAX as f32 * 0.2) as i16;
                    phase = (phase + step) % (2.0 * std::f32::consts::PI);
                    buffer.extend_from_slice(&sample.to_le_bytes());
                    buffer.extend_from_slice(&sample.to_le_bytes());
                }
                sink.broadcast_audio_data(&buffer, BLOCK_ALIGN);
                thread::sleep(Duration::from_millis(10));
            }
        });

        *self.worker.lock().expect("worker lock poisoned") = Some(ToneWorker { running, handle });
        info!("tone capture started ({}hz {}ch {}bit)", SAMPLE_RATE, CHANNELS, BITS_PER_SAMPLE);
        Ok(())
    }

    fn stop(&self) {
        if let Some(worker) = self.worker.lock().expect("worker lock poisoned").take() {
            worker.running.store(false, Ordering::Relaxed);
            let _ = worker.handle.join();
            info!("tone capture stopped");
        }
    }

    fn get_format_binary(&self) -> Bytes {
        let mut format = BytesMut::with_capacity(8);
        format.put_u32_le(SAMPLE_RATE);
        format.put_u16_le(CHANNELS);
        format.put_u16_le(BITS_PER_SAMPLE);
        format.freeze()
    }
}
