//! Single-shot reachability checks.

use std::process::Command;
use std::time::Duration;

use tracing::debug;

use super::command::run_with_timeout;

/// Extra time granted to the `ping` process beyond its own reply timeout.
const PROCESS_GRACE: Duration = Duration::from_secs(2);

/// Outcome of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Reachable,
    Unreachable,
}

impl Reachability {
    pub fn is_reachable(self) -> bool {
        matches!(self, Reachability::Reachable)
    }
}

/// Something that can tell whether a host answers right now.
///
/// Implementations must not retry internally and must fold resolution
/// failures into `Unreachable`.
pub trait Prober: Send + Sync {
    fn probe(&self, address: &str) -> Reachability;
}

/// Prober backed by the system `ping` binary (one echo request).
#[derive(Debug, Clone)]
pub struct PingProber {
    timeout: Duration,
}

impl PingProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn ping_args(&self, address: &str) -> Vec<String> {
        if cfg!(windows) {
            vec![
                "-n".to_string(),
                "1".to_string(),
                "-w".to_string(),
                self.timeout.as_millis().max(1).to_string(),
                address.to_string(),
            ]
        } else {
            // -W takes whole seconds on Linux
            let secs = self.timeout.as_secs_f64().ceil().max(1.0) as u64;
            vec![
                "-c".to_string(),
                "1".to_string(),
                "-W".to_string(),
                secs.to_string(),
                address.to_string(),
            ]
        }
    }
}

impl Prober for PingProber {
    fn probe(&self, address: &str) -> Reachability {
        let address = address.trim();
        if address.is_empty() {
            return Reachability::Unreachable;
        }

        let mut cmd = Command::new("ping");
        cmd.args(self.ping_args(address));

        let reachability = match run_with_timeout(&mut cmd, self.timeout + PROCESS_GRACE) {
            Ok(output) if output.success() => Reachability::Reachable,
            Ok(_) => Reachability::Unreachable,
            Err(e) => {
                debug!(address, error = %e, "ping did not complete");
                Reachability::Unreachable
            }
        };

        debug!(address, ?reachability, "probe");
        reachability
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::{Prober, Reachability};

    /// Prober whose set of online hosts can be changed while in use.
    #[derive(Default)]
    pub struct FakeProber {
        online: Mutex<HashSet<String>>,
        calls: AtomicUsize,
    }

    impl FakeProber {
        pub fn with_online(addresses: &[&str]) -> Self {
            let prober = Self::default();
            for address in addresses {
                prober.set_online(address, true);
            }
            prober
        }

        pub fn set_online(&self, address: &str, online: bool) {
            let mut set = self.online.lock().unwrap();
            if online {
                set.insert(address.to_string());
            } else {
                set.remove(address);
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Prober for FakeProber {
        fn probe(&self, address: &str) -> Reachability {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.online.lock().unwrap().contains(address) {
                Reachability::Reachable
            } else {
                Reachability::Unreachable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_address_is_unreachable() {
        let prober = PingProber::new(Duration::from_millis(200));
        assert_eq!(prober.probe("   "), Reachability::Unreachable);
    }

    #[test]
    fn test_ping_args_include_address() {
        let prober = PingProber::new(Duration::from_millis(800));
        let args = prober.ping_args("10.0.0.5");
        assert_eq!(args.last().map(String::as_str), Some("10.0.0.5"));
        assert!(args.contains(&"1".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_linux_timeout_rounds_up_to_seconds() {
        let prober = PingProber::new(Duration::from_millis(1500));
        let args = prober.ping_args("host");
        assert_eq!(args, vec!["-c", "1", "-W", "2", "host"]);
    }

    #[test]
    fn test_is_reachable() {
        assert!(Reachability::Reachable.is_reachable());
        assert!(!Reachability::Unreachable.is_reachable());
    }
}
