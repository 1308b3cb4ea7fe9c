//! # Memory Probes
//!
//! The governor never reads process memory directly; it goes through the
//! [`MemoryProbe`] capability, one operation wide. The production
//! implementation asks `sysinfo` for the current process RSS. Tests
//! script the readings instead, which makes the adaptive behaviour
//! deterministic.

use eyre::{eyre, Result};
use parking_lot::Mutex;
use sysinfo::{get_current_pid, Pid, ProcessesToUpdate, System};

/// Capability for observing resident set size.
pub trait MemoryProbe: Send {
    /// Current resident set size in bytes.
    fn rss(&self) -> u64;
}

/// Production probe backed by `sysinfo`.
pub struct SysinfoProbe {
    pid: Pid,
    system: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Result<Self> {
        let pid = get_current_pid().map_err(|e| eyre!("cannot resolve current pid: {}", e))?;
        Ok(Self {
            pid,
            system: Mutex::new(System::new()),
        })
    }
}

impl MemoryProbe for SysinfoProbe {
    fn rss(&self) -> u64 {
        let mut system = self.system.lock();
        system.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        system.process(self.pid).map(|p| p.memory()).unwrap_or(0)
    }
}

/// Deterministic probe that replays a fixed sequence of readings, then
/// repeats the last one.
pub struct ScriptedProbe {
    readings: Mutex<(Vec<u64>, usize)>,
}

impl ScriptedProbe {
    pub fn new(readings: Vec<u64>) -> Self {
        Self {
            readings: Mutex::new((readings, 0)),
        }
    }

    /// A probe that always reports the same reading.
    pub fn constant(rss: u64) -> Self {
        Self::new(vec![rss])
    }
}

impl MemoryProbe for ScriptedProbe {
    fn rss(&self) -> u64 {
        let mut state = self.readings.lock();
        let (readings, cursor) = &mut *state;
        if readings.is_empty() {
            return 0;
        }
        let value = readings[(*cursor).min(readings.len() - 1)];
        *cursor += 1;
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_probe_replays_then_repeats() {
        let probe = ScriptedProbe::new(vec![10, 20, 30]);

        assert_eq!(probe.rss(), 10);
        assert_eq!(probe.rss(), 20);
        assert_eq!(probe.rss(), 30);
        assert_eq!(probe.rss(), 30);
        assert_eq!(probe.rss(), 30);
    }

    #[test]
    fn constant_probe_never_moves() {
        let probe = ScriptedProbe::constant(512);

        assert_eq!(probe.rss(), 512);
        assert_eq!(probe.rss(), 512);
    }

    #[test]
    fn empty_script_reads_zero() {
        let probe = ScriptedProbe::new(Vec::new());
        assert_eq!(probe.rss(), 0);
    }

    #[test]
    fn sysinfo_probe_reports_nonzero_rss() {
        let probe = SysinfoProbe::new().unwrap();
        assert!(probe.rss() > 0);
    }
}
