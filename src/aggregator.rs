use std::io::Write;
use std::time::{Duration, Instant};

use crossbeam_channel as channel;
use tracing::{info, warn};

use crate::shutdown::Shutdown;
use crate::units::scale;

/// Counters owned by the aggregator thread. Nothing else touches them.
#[derive(Debug)]
pub struct RunState {
    total: u64,
    window: u64,
    start: Instant,
}

impl RunState {
    pub fn new(start: Instant) -> Self {
        Self { total: 0, window: 0, start }
    }

    pub fn record(&mut self, bytes: u64) {
        self.total = self.total.saturating_add(bytes);
        self.window = self.window.saturating_add(bytes);
    }

    #[cfg(test)]
    pub fn total(&self) -> u64 {
        self.total
    }

    #[cfg(test)]
    pub fn window(&self) -> u64 {
        self.window
    }

    /// Render the rate line for a tick observed at `now` and start a new window.
    pub fn tick(&mut self, now: Instant) -> String {
        let elapsed = now.saturating_duration_since(self.start);
        let line = render_rates(self.window, self.total, elapsed);
        self.window = 0;
        line
    }

    pub fn summary(&self, now: Instant) -> Summary {
        Summary {
            total: self.total,
            elapsed: now.saturating_duration_since(self.start),
        }
    }
}

/// Final figures handed back to the coordinator once the last line is out.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Summary {
    pub total: u64,
    pub elapsed: Duration,
}

impl Summary {
    pub fn render(&self) -> String {
        let total = scale(self.total);
        format!(
            "total bytes read in {:.2} seconds: {:.0} {}",
            self.elapsed.as_secs_f64(),
            total.value,
            total.unit
        )
    }
}

/// `current` is the window in its own unit per second; `average` divides the
/// scaled lifetime total by the elapsed seconds and keeps the total's unit.
pub fn render_rates(window: u64, total: u64, elapsed: Duration) -> String {
    let current = scale(window);
    let total = scale(total);
    let average = total.value / elapsed.as_secs_f64();
    format!(
        "current: {:.0} {}/s\taverage: {:.4} {}/s",
        current.value, current.unit, average, total.unit
    )
}

fn emit<W: Write>(out: &mut W, text: &str) {
    if let Err(e) = out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
        warn!(?e, "Failed to write report");
    }
}

/// Event loop of the aggregator.
///
/// Byte counts, ticks and cancellation are multiplexed through one `select!`
/// so `state` is only ever touched by one event at a time. Returns after the
/// summary line has been written and flushed.
pub fn aggregate<W: Write>(
    mut state: RunState,
    counts: channel::Receiver<u64>,
    ticks: channel::Receiver<Instant>,
    shutdown: &Shutdown,
    out: &mut W,
) -> Summary {
    let (idle_counts, idle_ticks) = (channel::never(), channel::never());
    let mut counts_open = true;
    let mut ticks_open = true;

    loop {
        channel::select! {
            recv(if counts_open { &counts } else { &idle_counts }) -> msg => match msg {
                Ok(n) => state.record(n),
                // reader is gone; keep reporting until shutdown fires
                Err(_) => counts_open = false,
            },
            recv(if ticks_open { &ticks } else { &idle_ticks }) -> msg => match msg {
                Ok(at) => {
                    let line = state.tick(at);
                    emit(out, &format!("\r{line}"));
                }
                Err(_) => ticks_open = false,
            },
            recv(shutdown.notified()) -> _ => break,
        }
    }

    let summary = state.summary(Instant::now());
    emit(out, &format!("\n{}\n", summary.render()));
    info!(
        total_bytes = summary.total,
        elapsed_secs = summary.elapsed.as_secs_f64(),
        "Finished"
    );
    summary
}
