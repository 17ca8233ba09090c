use std::{sync::Arc, sync::Mutex, time::Duration};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Source of the current process resident set size.
pub trait MemoryProbe: Send + Sync {
    fn rss_bytes(&self) -> Option<u64>;
}

/// Probe backed by `sysinfo`, refreshing only the current process.
pub struct SystemProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SystemProbe {
    pub fn new() -> Self {
        SystemProbe {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemProbe {
    fn rss_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).map(sysinfo::Process::memory)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Cancelled,
}

/// Holds workers back while the process is above its memory ceiling.
#[derive(Clone)]
pub struct MemoryGuard {
    probe: Arc<dyn MemoryProbe>,
    ceiling_bytes: u64,
    poll_interval: Duration,
}

impl MemoryGuard {
    /// A ceiling of 0 disables the guard.
    pub fn new(probe: Arc<dyn MemoryProbe>, ceiling_bytes: u64, poll_interval: Duration) -> Self {
        MemoryGuard {
            probe,
            ceiling_bytes,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn system(ceiling_bytes: u64, poll_interval: Duration) -> Self {
        Self::new(Arc::new(SystemProbe::new()), ceiling_bytes, poll_interval)
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(SystemProbe::new()), 0, Duration::from_millis(500))
    }

    pub fn is_enabled(&self) -> bool {
        self.ceiling_bytes > 0
    }

    pub fn ceiling_bytes(&self) -> u64 {
        self.ceiling_bytes
    }

    pub fn sample(&self) -> Option<u64> {
        self.probe.rss_bytes()
    }

    /// Logs the current usage at debug level.
    pub fn log_usage(&self, chunk: u64) {
        if let Some(rss) = self.sample() {
            debug!(
                chunk,
                rss_mb = rss / (1024 * 1024),
                ceiling_mb = self.ceiling_bytes / (1024 * 1024),
                "Memory usage"
            );
        }
    }

    /// Waits until usage is at or below the ceiling. An unreadable probe
    /// admits immediately.
    pub async fn admit(&self, cancel: &CancellationToken) -> Admission {
        if !self.is_enabled() {
            return Admission::Admitted;
        }

        let mut waited = false;
        loop {
            if cancel.is_cancelled() {
                return Admission::Cancelled;
            }

            let Some(rss) = self.probe.rss_bytes() else {
                return Admission::Admitted;
            };

            if rss <= self.ceiling_bytes {
                if waited {
                    info!(rss_bytes = rss, "Memory back under ceiling, resuming");
                }
                return Admission::Admitted;
            }

            if !waited {
                warn!(
                    rss_bytes = rss,
                    ceiling_bytes = self.ceiling_bytes,
                    "Memory above ceiling, holding chunk admission"
                );
                waited = true;
            }

            tokio::select! {
                _ = cancel.cancelled() => return Admission::Cancelled,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
