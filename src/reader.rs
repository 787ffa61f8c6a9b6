use std::io::{ErrorKind, Read};

use crossbeam_channel as channel;
use thiserror::Error;
use tracing::{debug, warn};

use crate::shutdown::Shutdown;

/// Why the reader loop ended without an error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stopped {
    Cancelled,
    EndOfStream,
    /// The aggregator dropped its receiver.
    ConsumerClosed,
}

#[derive(Debug, Error)]
#[error("reading from source failed after {bytes_read} bytes")]
pub struct StreamReadError {
    pub bytes_read: u64,
    #[source]
    pub source: std::io::Error,
}

/// Pull chunks of at most `chunk_size` bytes from `src`, discard them and
/// send the number of bytes consumed per read to `counts`.
///
/// The send blocks until the aggregator takes the count. Cancellation is
/// checked between reads only; an in-flight read always completes.
pub fn read_stream<R: Read>(
    mut src: R,
    chunk_size: usize,
    counts: &channel::Sender<u64>,
    shutdown: &Shutdown,
) -> Result<Stopped, StreamReadError> {
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut bytes_read: u64 = 0;

    let stopped = loop {
        if shutdown.is_triggered() {
            break Stopped::Cancelled;
        }
        let n = match src.read(&mut buffer) {
            Ok(0) => break Stopped::EndOfStream,
            Ok(n) => n as u64,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(?e, bytes_read, "Error reading from source");
                return Err(StreamReadError { bytes_read, source: e });
            }
        };
        bytes_read += n;
        if counts.send(n).is_err() {
            break Stopped::ConsumerClosed;
        }
    };

    debug!(?stopped, bytes_read, "Reader stopped");
    Ok(stopped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{self, Cursor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    /// Replays a fixed sequence of read results.
    struct Scripted {
        steps: VecDeque<io::Result<usize>>,
        reads: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn new(steps: Vec<io::Result<usize>>) -> (Self, Arc<AtomicUsize>) {
            let reads = Arc::new(AtomicUsize::new(0));
            (Self { steps: steps.into(), reads: reads.clone() }, reads)
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            match self.steps.pop_front() {
                Some(Ok(n)) => Ok(n.min(buf.len())),
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    fn collect(rx: channel::Receiver<u64>) -> thread::JoinHandle<Vec<u64>> {
        thread::spawn(move || rx.iter().collect())
    }

    #[test]
    fn partial_reads_are_reported_with_true_size() {
        let (src, _) = Scripted::new(vec![Ok(1000), Ok(2000), Ok(500)]);
        let (tx, rx) = channel::bounded(0);
        let sink = collect(rx);
        let stopped = read_stream(src, 409_600, &tx, &Shutdown::new()).unwrap();
        drop(tx);
        assert_eq!(stopped, Stopped::EndOfStream);
        assert_eq!(sink.join().unwrap(), vec![1000, 2000, 500]);
    }

    #[test]
    fn chunk_size_bounds_each_read() {
        let src = Cursor::new(vec![7u8; 10_000]);
        let (tx, rx) = channel::bounded(0);
        let sink = collect(rx);
        read_stream(src, 4096, &tx, &Shutdown::new()).unwrap();
        drop(tx);
        assert_eq!(sink.join().unwrap(), vec![4096, 4096, 1808]);
    }

    #[test]
    fn io_error_is_surfaced() {
        let (src, _) = Scripted::new(vec![
            Ok(10),
            Err(io::Error::new(ErrorKind::ConnectionReset, "reset")),
        ]);
        let (tx, rx) = channel::bounded(0);
        let sink = collect(rx);
        let err = read_stream(src, 64, &tx, &Shutdown::new()).unwrap_err();
        drop(tx);
        assert_eq!(err.bytes_read, 10);
        assert_eq!(err.source.kind(), ErrorKind::ConnectionReset);
        assert_eq!(sink.join().unwrap(), vec![10]);
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let (src, reads) = Scripted::new(vec![
            Err(io::Error::from(ErrorKind::Interrupted)),
            Ok(3),
        ]);
        let (tx, rx) = channel::bounded(0);
        let sink = collect(rx);
        let stopped = read_stream(src, 64, &tx, &Shutdown::new()).unwrap();
        drop(tx);
        assert_eq!(stopped, Stopped::EndOfStream);
        assert_eq!(sink.join().unwrap(), vec![3]);
        assert_eq!(reads.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn cancelled_before_first_read_issues_no_read() {
        let (src, reads) = Scripted::new(vec![Ok(10)]);
        let (tx, _rx) = channel::bounded(0);
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let stopped = read_stream(src, 64, &tx, &shutdown).unwrap();
        assert_eq!(stopped, Stopped::Cancelled);
        assert_eq!(reads.load(Ordering::SeqCst), 0);
    }

    /// Fires the shutdown signal while a read is in flight.
    struct CancelMidRead {
        shutdown: Shutdown,
        reads: usize,
    }

    impl Read for CancelMidRead {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads += 1;
            self.shutdown.trigger();
            Ok(buf.len().min(8))
        }
    }

    #[test]
    fn in_flight_read_completes_before_cancellation_is_seen() {
        let shutdown = Shutdown::new();
        let mut src = CancelMidRead { shutdown: shutdown.clone(), reads: 0 };
        let (tx, rx) = channel::bounded(0);
        let sink = collect(rx);
        let stopped = read_stream(&mut src, 64, &tx, &shutdown).unwrap();
        drop(tx);
        assert_eq!(stopped, Stopped::Cancelled);
        assert_eq!(src.reads, 1);
        assert_eq!(sink.join().unwrap(), vec![8]);
    }

    #[test]
    fn dropped_consumer_stops_reader() {
        let (src, _) = Scripted::new(vec![Ok(5), Ok(5)]);
        let (tx, rx) = channel::bounded(0);
        drop(rx);
        let stopped = read_stream(src, 64, &tx, &Shutdown::new()).unwrap();
        assert_eq!(stopped, Stopped::ConsumerClosed);
    }
}
