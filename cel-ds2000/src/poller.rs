//! Transceiver presence change detection.
//!
//! [`PresencePoller`] owns the last observed presence of every slot. Each call
//! to [`PresencePoller::poll`] sweeps all slots, reports the slots whose
//! presence flipped since the previous observation and records the new state
//! in the same step, so a transition is reported exactly once.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::sfp::PresenceReader;
use crate::{Error, Slot};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    Present,
    Absent,
}

impl From<bool> for PresenceState {
    fn from(present: bool) -> Self {
        if present {
            PresenceState::Present
        } else {
            PresenceState::Absent
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Inserted,
    Removed,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Inserted => write!(f, "inserted"),
            Transition::Removed => write!(f, "removed"),
        }
    }
}

pub type Changes = BTreeMap<Slot, Transition>;

pub struct PresencePoller<R> {
    reader: R,
    states: Vec<PresenceState>,
    interval: Duration,
}

impl<R: PresenceReader> PresencePoller<R> {
    /// Creates a poller for slots `1..=num_slots` and records their current
    /// presence with a full scan.
    pub fn new(reader: R, num_slots: usize) -> Result<Self, Error> {
        let mut states = Vec::with_capacity(num_slots);
        for slot in 1..=num_slots {
            states.push(PresenceState::from(reader.read_presence(slot)?));
        }
        log::debug!(
            "presence poller: initial scan of {} slots, {} present",
            num_slots,
            states
                .iter()
                .filter(|&&s| s == PresenceState::Present)
                .count()
        );
        Ok(Self {
            reader,
            states,
            interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Changes the pause between two sweeps.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn num_slots(&self) -> usize {
        self.states.len()
    }

    /// Last observed state of `slot`, `None` if the slot does not exist.
    pub fn state(&self, slot: Slot) -> Option<PresenceState> {
        slot.checked_sub(1).and_then(|i| self.states.get(i).copied())
    }

    /// Polls until at least one slot changes presence or `timeout_ms` elapses.
    /// A timeout of 0 polls without a time limit.
    ///
    /// Returns `(true, changes)`; `changes` is empty on timeout.
    pub fn poll(&mut self, timeout_ms: i64) -> Result<(bool, Changes), Error> {
        self.poll_inner(timeout_ms, None)
    }

    /// Like [`PresencePoller::poll`], but also stops with [`Error::Cancelled`]
    /// as soon as a message arrives on `cancel`.
    pub fn poll_with_cancel(
        &mut self,
        timeout_ms: i64,
        cancel: &Receiver<()>,
    ) -> Result<(bool, Changes), Error> {
        self.poll_inner(timeout_ms, Some(cancel))
    }

    fn poll_inner(
        &mut self,
        timeout_ms: i64,
        cancel: Option<&Receiver<()>>,
    ) -> Result<(bool, Changes), Error> {
        if timeout_ms < 0 {
            return Err(Error::InvalidArgument(format!(
                "timeout must not be negative, got {} ms",
                timeout_ms
            )));
        }
        if cancel.is_some_and(cancel_pending) {
            return Err(Error::Cancelled);
        }

        let timeout = Duration::from_millis(timeout_ms as u64);
        let start = Instant::now();
        loop {
            let changes = self.sweep()?;
            if !changes.is_empty() {
                for (slot, t) in changes.iter() {
                    log::info!("SFP {}: {}", slot, t);
                }
                return Ok((true, changes));
            }

            let pause = if timeout_ms == 0 {
                self.interval
            } else {
                let elapsed = start.elapsed();
                if elapsed >= timeout {
                    log::debug!("presence poller: no change within {} ms", timeout_ms);
                    return Ok((true, Changes::new()));
                }
                self.interval.min(timeout - elapsed)
            };
            wait(pause, cancel)?;
        }
    }

    /// Reads every slot, then commits the new states. If any read fails
    /// nothing is committed.
    fn sweep(&mut self) -> Result<Changes, Error> {
        let mut current = Vec::with_capacity(self.states.len());
        for slot in 1..=self.states.len() {
            current.push(PresenceState::from(self.reader.read_presence(slot)?));
        }

        let mut changes = Changes::new();
        for (i, (old, new)) in self.states.iter_mut().zip(current).enumerate() {
            let t = match (*old, new) {
                (PresenceState::Absent, PresenceState::Present) => Transition::Inserted,
                (PresenceState::Present, PresenceState::Absent) => Transition::Removed,
                _ => continue,
            };
            *old = new;
            changes.insert(i + 1, t);
        }
        Ok(changes)
    }
}

fn wait(pause: Duration, cancel: Option<&Receiver<()>>) -> Result<(), Error> {
    let rx = match cancel {
        Some(rx) => rx,
        None => {
            thread::sleep(pause);
            return Ok(());
        }
    };
    match rx.recv_timeout(pause) {
        Ok(()) => Err(Error::Cancelled),
        Err(RecvTimeoutError::Timeout) => Ok(()),
        // nobody is left to cancel us, keep the pacing
        Err(RecvTimeoutError::Disconnected) => {
            thread::sleep(pause);
            Ok(())
        }
    }
}

fn cancel_pending(cancel: &Receiver<()>) -> bool {
    cancel.try_recv().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::channel;
    use std::sync::{Arc, Mutex};

    const FAST: Duration = Duration::from_millis(5);

    /// Presence backed by shared memory so tests can flip it while a poll runs.
    #[derive(Clone)]
    struct FakePresence {
        present: Arc<Mutex<Vec<bool>>>,
        failing: Arc<Mutex<Option<Slot>>>,
        reads: Arc<AtomicUsize>,
    }

    impl FakePresence {
        fn new(present: Vec<bool>) -> Self {
            Self {
                present: Arc::new(Mutex::new(present)),
                failing: Arc::new(Mutex::new(None)),
                reads: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn set(&self, slot: Slot, present: bool) {
            self.present.lock().unwrap()[slot - 1] = present;
        }

        fn fail(&self, slot: Option<Slot>) {
            *self.failing.lock().unwrap() = slot;
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    impl PresenceReader for FakePresence {
        fn read_presence(&self, slot: Slot) -> Result<bool, Error> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if *self.failing.lock().unwrap() == Some(slot) {
                return Err(Error::HardwareRead {
                    path: PathBuf::from(format!("PORT{}/xcvr_present", slot)),
                    reason: "i2c timeout".to_string(),
                });
            }
            Ok(self.present.lock().unwrap()[slot - 1])
        }
    }

    fn poller(fake: &FakePresence, n: usize) -> PresencePoller<FakePresence> {
        PresencePoller::new(fake.clone(), n)
            .unwrap()
            .with_interval(FAST)
    }

    #[test]
    fn test_initial_scan() {
        let fake = FakePresence::new(vec![true, false, true]);
        let p = poller(&fake, 3);
        assert_eq!(fake.reads(), 3);
        assert_eq!(p.num_slots(), 3);
        assert_eq!(p.state(1), Some(PresenceState::Present));
        assert_eq!(p.state(2), Some(PresenceState::Absent));
        assert_eq!(p.state(0), None);
        assert_eq!(p.state(4), None);
    }

    #[test]
    fn test_initial_scan_read_error() {
        let fake = FakePresence::new(vec![true, false]);
        fake.fail(Some(2));
        assert!(matches!(
            PresencePoller::new(fake, 2),
            Err(Error::HardwareRead { .. })
        ));
    }

    #[test]
    fn test_timeout_without_changes() {
        let fake = FakePresence::new(vec![false; 8]);
        let mut p = poller(&fake, 8);
        let start = Instant::now();
        let (ok, changes) = p.poll(60).unwrap();
        let elapsed = start.elapsed();
        assert!(ok);
        assert!(changes.is_empty());
        assert!(elapsed >= Duration::from_millis(60));
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_insertion_returns_promptly() {
        let fake = FakePresence::new(vec![false; 8]);
        let mut p = poller(&fake, 8);

        let flipper = fake.clone();
        let h = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            flipper.set(5, true);
        });

        let start = Instant::now();
        let (ok, changes) = p.poll(30_000).unwrap();
        h.join().unwrap();
        assert!(ok);
        assert_eq!(changes, Changes::from([(5, Transition::Inserted)]));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(p.state(5), Some(PresenceState::Present));
    }

    #[test]
    fn test_multiple_changes_in_one_sweep() {
        let fake = FakePresence::new(vec![true, false, true, false]);
        let mut p = poller(&fake, 4);
        fake.set(1, false);
        fake.set(4, true);
        let (ok, changes) = p.poll(1000).unwrap();
        assert!(ok);
        assert_eq!(
            changes,
            Changes::from([(1, Transition::Removed), (4, Transition::Inserted)])
        );
    }

    #[test]
    fn test_transition_reported_once() {
        let fake = FakePresence::new(vec![false, false]);
        let mut p = poller(&fake, 2);
        fake.set(2, true);
        let (_, changes) = p.poll(100).unwrap();
        assert_eq!(changes, Changes::from([(2, Transition::Inserted)]));

        let (ok, changes) = p.poll(20).unwrap();
        assert!(ok);
        assert!(changes.is_empty());
        let (_, changes) = p.poll(20).unwrap();
        assert!(changes.is_empty());

        fake.set(2, false);
        let (_, changes) = p.poll(100).unwrap();
        assert_eq!(changes, Changes::from([(2, Transition::Removed)]));
    }

    #[test]
    fn test_unbounded_poll_waits_for_change() {
        let fake = FakePresence::new(vec![true, true, true]);
        let mut p = poller(&fake, 3);

        let flipper = fake.clone();
        let h = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            flipper.set(3, false);
        });

        let start = Instant::now();
        let (ok, changes) = p.poll(0).unwrap();
        h.join().unwrap();
        assert!(ok);
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(changes, Changes::from([(3, Transition::Removed)]));
    }

    #[test]
    fn test_negative_timeout_reads_nothing() {
        let fake = FakePresence::new(vec![true, false]);
        let mut p = poller(&fake, 2);
        let before = fake.reads();
        assert!(matches!(p.poll(-1), Err(Error::InvalidArgument(_))));
        assert_eq!(fake.reads(), before);
    }

    #[test]
    fn test_read_error_is_not_removal() {
        let fake = FakePresence::new(vec![true, true, true]);
        let mut p = poller(&fake, 3);

        // slot 1 changed, but slot 3 fails in the same sweep
        fake.set(1, false);
        fake.fail(Some(3));
        assert!(matches!(p.poll(50), Err(Error::HardwareRead { .. })));
        assert_eq!(p.state(1), Some(PresenceState::Present));
        assert_eq!(p.state(3), Some(PresenceState::Present));

        // once the read recovers the pending change is still reported
        fake.fail(None);
        let (_, changes) = p.poll(50).unwrap();
        assert_eq!(changes, Changes::from([(1, Transition::Removed)]));
    }

    #[test]
    fn test_cancel_unbounded_poll() {
        let fake = FakePresence::new(vec![false; 4]);
        let mut p = poller(&fake, 4);
        let (tx, rx) = channel();
        let h = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            tx.send(()).unwrap();
        });
        assert!(matches!(p.poll_with_cancel(0, &rx), Err(Error::Cancelled)));
        h.join().unwrap();
    }

    #[test]
    fn test_cancel_already_pending() {
        let fake = FakePresence::new(vec![false; 4]);
        let mut p = poller(&fake, 4);
        let before = fake.reads();
        let (tx, rx) = channel();
        tx.send(()).unwrap();
        assert!(matches!(p.poll_with_cancel(0, &rx), Err(Error::Cancelled)));
        assert_eq!(fake.reads(), before);
    }

    #[test]
    fn test_disconnected_cancel_channel_still_times_out() {
        let fake = FakePresence::new(vec![false; 2]);
        let mut p = poller(&fake, 2);
        let (tx, rx) = channel::<()>();
        drop(tx);
        let (ok, changes) = p.poll_with_cancel(30, &rx).unwrap();
        assert!(ok);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_transition_serialization() {
        let changes = Changes::from([(5, Transition::Inserted), (12, Transition::Removed)]);
        assert_eq!(
            serde_json::to_string(&changes).unwrap(),
            r#"{"5":"inserted","12":"removed"}"#
        );
        assert_eq!(Transition::Removed.to_string(), "removed");
    }
}
