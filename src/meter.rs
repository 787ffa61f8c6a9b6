use std::io::{self, IsTerminal, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel as channel;
use tracing::{debug, info, warn};

use crate::aggregator::{aggregate, RunState, Summary};
use crate::cli::Cli;
use crate::reader::read_stream;
use crate::shutdown::Shutdown;
use crate::source::{open, resolve};

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub struct MeterConfig {
    pub chunk_size: usize,
    pub interval: Duration,
}

impl MeterConfig {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            chunk_size: cli.chunk_size(),
            interval: TICK_INTERVAL,
        }
    }
}

pub fn run(cli: Cli) -> Result<Summary> {
    let spec = resolve(&cli, io::stdin().is_terminal())?;
    let config = MeterConfig::from_cli(&cli);
    info!(source = %spec, chunk_size = config.chunk_size, "Starting bw");

    // Opening a port blocks in accept; the default interrupt behaviour
    // applies until the handler below replaces it.
    let source = open(&spec)?;

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.trigger()).context("Installing interrupt handler")?;
    }

    run_meter(source, &config, &shutdown, io::stdout())
}

/// Run the reader and the aggregator on their own threads until `shutdown`
/// fires, then return once the aggregator has written its final summary.
///
/// The reader triggers `shutdown` itself when the stream ends or fails. A
/// reader still blocked inside a read at that point is left behind.
pub fn run_meter<R, W>(source: R, config: &MeterConfig, shutdown: &Shutdown, mut out: W) -> Result<Summary>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let (counts_tx, counts_rx) = channel::bounded::<u64>(0);

    let aggregator_shutdown = shutdown.clone();
    let interval = config.interval;
    let aggregator = thread::Builder::new()
        .name("bw-aggregator".into())
        .spawn(move || {
            let state = RunState::new(Instant::now());
            let ticks = channel::tick(interval);
            aggregate(state, counts_rx, ticks, &aggregator_shutdown, &mut out)
        })
        .context("Spawning aggregator thread")?;

    let reader_shutdown = shutdown.clone();
    let chunk_size = config.chunk_size;
    let reader = thread::Builder::new()
        .name("bw-reader".into())
        .spawn(move || {
            let result = read_stream(source, chunk_size, &counts_tx, &reader_shutdown);
            reader_shutdown.trigger();
            result
        });
    let reader = match reader {
        Ok(handle) => handle,
        Err(e) => {
            // let the aggregator finish so its thread does not leak
            shutdown.trigger();
            let _ = aggregator.join();
            return Err(e).context("Spawning reader thread");
        }
    };

    shutdown.wait();
    let summary = aggregator
        .join()
        .map_err(|_| anyhow!("aggregator thread panicked"))?;

    if reader.is_finished() {
        match reader.join() {
            Ok(Ok(stopped)) => debug!(?stopped, "Reader joined"),
            Ok(Err(e)) => warn!(error = ?e, "Reader stopped on error"),
            Err(_) => warn!("Reader thread panicked"),
        }
    } else {
        debug!("Reader still blocked in read; not waiting for it");
    }

    Ok(summary)
}
