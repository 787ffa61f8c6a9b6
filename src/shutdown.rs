use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel as channel;

/// Write-once cancellation signal shared by the reader, the aggregator and
/// the coordinator.
///
/// The flag gives the reader a cheap check between reads. Triggering also
/// drops the only sender of an internal channel, so every clone of the
/// receiver observes a disconnect, which makes the signal usable inside
/// `crossbeam_channel::select!`.
#[derive(Clone)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    trigger: Arc<Mutex<Option<channel::Sender<()>>>>,
    notify: channel::Receiver<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded::<()>(0);
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            trigger: Arc::new(Mutex::new(Some(tx))),
            notify: rx,
        }
    }

    /// Fire the signal. Only the first call has any effect.
    pub fn trigger(&self) {
        if self.flag.swap(true, Ordering::SeqCst) {
            return;
        }
        // a poisoned lock still lets us drop the sender
        let mut guard = match self.trigger.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.take();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Receiver that becomes disconnected once the signal fires.
    pub fn notified(&self) -> &channel::Receiver<()> {
        &self.notify
    }

    /// Block the calling thread until the signal fires.
    pub fn wait(&self) {
        // nothing is ever sent, so this only returns on disconnect
        let _ = self.notify.recv();
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn starts_untriggered() {
        let s = Shutdown::new();
        assert!(!s.is_triggered());
        assert_eq!(s.notified().try_recv(), Err(channel::TryRecvError::Empty));
    }

    #[test]
    fn trigger_is_visible_to_clones() {
        let s = Shutdown::new();
        let other = s.clone();
        s.trigger();
        assert!(other.is_triggered());
        assert_eq!(other.notified().try_recv(), Err(channel::TryRecvError::Disconnected));
    }

    #[test]
    fn second_trigger_is_a_no_op() {
        let s = Shutdown::new();
        s.trigger();
        s.trigger();
        assert!(s.is_triggered());
    }

    #[test]
    fn wait_returns_after_trigger_from_another_thread() {
        let s = Shutdown::new();
        let remote = s.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.trigger();
        });
        s.wait();
        assert!(s.is_triggered());
        handle.join().unwrap();
    }

    #[test]
    fn selectable_alongside_other_channels() {
        let s = Shutdown::new();
        let (_tx, rx) = channel::bounded::<u64>(0);
        s.trigger();
        let fired = channel::select! {
            recv(rx) -> _ => false,
            recv(s.notified()) -> _ => true,
        };
        assert!(fired);
    }
}
