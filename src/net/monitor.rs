//! Background reachability watch for an open session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use super::probe::{Prober, Reachability};

/// Monitor lifecycle. A monitor runs at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Running,
    Stopped,
}

/// Notification sent by a monitor to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// The host stopped answering probes; the monitor has exited
    SessionLost { address: String },
}

/// Re-probes one address on a fixed interval until stopped or the host
/// disappears.
pub struct ConnectionMonitor {
    address: String,
    prober: Arc<dyn Prober>,
    interval: Duration,
    state: Arc<Mutex<MonitorState>>,
    lost: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ConnectionMonitor {
    pub fn new(address: impl Into<String>, prober: Arc<dyn Prober>, interval: Duration) -> Self {
        Self {
            address: address.into(),
            prober,
            interval,
            state: Arc::new(Mutex::new(MonitorState::Idle)),
            lost: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            handle: None,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> MonitorState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Flag set at the moment the host is found gone, before the
    /// `SessionLost` event is sent.
    pub fn lost_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.lost)
    }

    /// Start polling in the background. Returns `false` without doing
    /// anything if the monitor has already been started.
    pub fn start(&mut self, events: Sender<MonitorEvent>) -> bool {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != MonitorState::Idle {
                return false;
            }
            *state = MonitorState::Running;
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let address = self.address.clone();
        let prober = Arc::clone(&self.prober);
        let interval = self.interval;
        let state = Arc::clone(&self.state);
        let lost = Arc::clone(&self.lost);

        let handle = thread::spawn(move || {
            debug!(address = %address, ?interval, "monitor started");
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    // Stop requested, or the owner went away
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }

                if prober.probe(&address) == Reachability::Unreachable {
                    lost.store(true, Ordering::SeqCst);
                    *state.lock().unwrap_or_else(|e| e.into_inner()) = MonitorState::Stopped;
                    warn!(address = %address, "connection lost");
                    let _ = events.send(MonitorEvent::SessionLost {
                        address: address.clone(),
                    });
                    return;
                }
            }
            *state.lock().unwrap_or_else(|e| e.into_inner()) = MonitorState::Stopped;
            debug!(address = %address, "monitor stopped");
        });

        self.stop_tx = Some(stop_tx);
        self.handle = Some(handle);
        true
    }

    /// Stop polling and wait for the background thread to exit.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == MonitorState::Idle {
            *state = MonitorState::Stopped;
        }
    }
}

impl Drop for ConnectionMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::probe::testing::FakeProber;
    use std::time::Instant;

    #[test]
    fn test_signals_loss_exactly_once() {
        let prober = Arc::new(FakeProber::with_online(&["10.0.0.7"]));
        let mut monitor =
            ConnectionMonitor::new("10.0.0.7", prober.clone(), Duration::from_millis(20));
        let (tx, rx) = mpsc::channel();

        assert!(monitor.start(tx));
        assert_eq!(monitor.state(), MonitorState::Running);

        thread::sleep(Duration::from_millis(60));
        prober.set_online("10.0.0.7", false);

        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(
            event,
            MonitorEvent::SessionLost {
                address: "10.0.0.7".to_string()
            }
        );
        assert!(monitor.lost_flag().load(Ordering::SeqCst));

        // The thread exits after reporting, dropping the only sender
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(1)),
            Err(RecvTimeoutError::Disconnected)
        ));
        monitor.stop();
        assert_eq!(monitor.state(), MonitorState::Stopped);
    }

    #[test]
    fn test_second_start_is_noop() {
        let prober = Arc::new(FakeProber::with_online(&["h"]));
        let mut monitor = ConnectionMonitor::new("h", prober, Duration::from_millis(50));
        let (tx, _rx) = mpsc::channel();

        assert!(monitor.start(tx.clone()));
        assert!(!monitor.start(tx));
        monitor.stop();
        assert_eq!(monitor.state(), MonitorState::Stopped);
    }

    #[test]
    fn test_stop_returns_within_interval() {
        let prober = Arc::new(FakeProber::with_online(&["h"]));
        let mut monitor = ConnectionMonitor::new("h", prober.clone(), Duration::from_millis(500));
        let (tx, rx) = mpsc::channel();
        monitor.start(tx);

        let start = Instant::now();
        monitor.stop();
        assert!(start.elapsed() < Duration::from_millis(500));
        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert!(rx.try_recv().is_err());
        assert_eq!(prober.calls(), 0);
        assert!(!monitor.lost_flag().load(Ordering::SeqCst));
    }

    #[test]
    fn test_stop_without_start() {
        let prober = Arc::new(FakeProber::default());
        let mut monitor = ConnectionMonitor::new("h", prober, Duration::from_millis(10));
        monitor.stop();
        assert_eq!(monitor.state(), MonitorState::Stopped);
        let (tx, _rx) = mpsc::channel();
        assert!(!monitor.start(tx));
    }
}
