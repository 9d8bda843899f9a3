use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::Address;

/// Wait used in place of the heartbeat timeout when the timeout is disabled.
const FALLBACK_WAIT: Duration = Duration::from_secs(120);

/// Settings shared by the arbiter and, after fork, by every worker.
///
/// Built once at startup and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    addresses: Vec<Address>,
    /// Seconds a worker may go without a heartbeat, `0` disables the check
    timeout: u64,
    backlog: i32,
    /// Seconds a graceful stop waits for workers before killing them
    graceful_timeout: u64,
    worker_tmp_dir: Option<PathBuf>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self { addresses: Vec::new(), timeout: 30, backlog: 2048, graceful_timeout: 30, worker_tmp_dir: None }
    }
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_addresses(mut self, addresses: Vec<Address>) -> Self {
        self.addresses = addresses;
        self
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.addresses.push(address);
        self
    }

    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn with_graceful_timeout(mut self, graceful_timeout: u64) -> Self {
        self.graceful_timeout = graceful_timeout;
        self
    }

    pub fn with_worker_tmp_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.worker_tmp_dir = Some(dir.into());
        self
    }

    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    pub fn backlog(&self) -> i32 {
        self.backlog
    }

    /// The heartbeat timeout, `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }

    pub fn graceful_timeout(&self) -> Duration {
        Duration::from_secs(self.graceful_timeout)
    }

    /// Directory holding the heartbeat files, the system temp dir unless configured.
    pub fn worker_tmp_dir(&self) -> PathBuf {
        self.worker_tmp_dir.clone().unwrap_or_else(env::temp_dir)
    }

    /// How long the arbiter sleeps between heartbeat sweeps.
    pub fn arbiter_wait(&self) -> Duration {
        self.timeout().unwrap_or(FALLBACK_WAIT)
    }

    /// How long a worker blocks waiting for connections.
    ///
    /// Half the heartbeat timeout, so an idle worker still beats well before the
    /// arbiter considers it hung.
    pub fn worker_wait(&self) -> Duration {
        self.timeout().map_or(FALLBACK_WAIT, |timeout| timeout / 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let configuration = Configuration::default();

        assert!(configuration.addresses().is_empty());
        assert_eq!(configuration.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(configuration.backlog(), 2048);
        assert_eq!(configuration.graceful_timeout(), Duration::from_secs(30));
        assert_eq!(configuration.worker_tmp_dir(), env::temp_dir());
    }

    #[test]
    fn worker_waits_half_the_timeout() {
        let configuration = Configuration::new().with_timeout(10);

        assert_eq!(configuration.arbiter_wait(), Duration::from_secs(10));
        assert_eq!(configuration.worker_wait(), Duration::from_secs(5));
    }

    #[test]
    fn zero_timeout_disables_heartbeat_check() {
        let configuration = Configuration::new().with_timeout(0);

        assert_eq!(configuration.timeout(), None);
        assert_eq!(configuration.arbiter_wait(), FALLBACK_WAIT);
        assert_eq!(configuration.worker_wait(), FALLBACK_WAIT);
    }

    #[test]
    fn builders() {
        let configuration = Configuration::new()
            .with_address(Address::ip("127.0.0.1", 8000))
            .with_address(Address::unix("/tmp/app.sock"))
            .with_backlog(64)
            .with_worker_tmp_dir("/dev/shm");

        assert_eq!(configuration.addresses().len(), 2);
        assert_eq!(configuration.backlog(), 64);
        assert_eq!(configuration.worker_tmp_dir(), PathBuf::from("/dev/shm"));
    }
}
