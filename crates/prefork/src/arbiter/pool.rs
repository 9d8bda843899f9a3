use std::collections::VecDeque;
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::time::{Duration, SystemTime};

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use tracing::{debug, error, info, warn};

use crate::error::ArbiterError;
use crate::heartbeat::Heartbeat;

/// Process control used by the [`Pool`].
pub trait Processes {
    /// Starts a worker, returning its pid and the heartbeat it will update.
    ///
    /// `siblings` are the heartbeat descriptors of every other worker; the new
    /// worker must not keep them open.
    fn spawn(&mut self, siblings: &[RawFd]) -> Result<(Pid, Heartbeat), ArbiterError>;

    fn kill(&mut self, pid: Pid, signal: Signal) -> nix::Result<()>;

    /// Collects one exited child without blocking, `None` when there is none.
    fn reap(&mut self) -> Option<WaitStatus>;
}

/// The arbiter's view of one worker process.
#[derive(Debug)]
pub struct WorkerHandle {
    pid: Pid,
    /// Set once SIGABRT was sent for a missed heartbeat
    aborted: bool,
    heartbeat: Heartbeat,
}

impl WorkerHandle {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }
}

/// The set of running workers and the number of workers wanted.
///
/// Workers evicted when the pool shrinks are told to stop and tracked as
/// retiring until they are reaped; they no longer count towards the pool size.
#[derive(Debug)]
pub struct Pool<P> {
    processes: P,
    desired: usize,
    /// Live workers, oldest first
    workers: VecDeque<WorkerHandle>,
    retiring: Vec<WorkerHandle>,
    timeout: Option<Duration>,
}

impl<P: Processes> Pool<P> {
    pub fn new(processes: P, desired: usize, timeout: Option<Duration>) -> Self {
        Self { processes, desired: desired.max(1), workers: VecDeque::new(), retiring: Vec::new(), timeout }
    }

    pub fn desired(&self) -> usize {
        self.desired
    }

    /// Number of live workers, retiring ones excluded.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether no worker process is left at all, retiring ones included.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty() && self.retiring.is_empty()
    }

    pub fn workers(&self) -> impl Iterator<Item = &WorkerHandle> {
        self.workers.iter()
    }

    pub fn processes_mut(&mut self) -> &mut P {
        &mut self.processes
    }

    /// Spawns missing workers, then evicts excess ones, oldest first.
    pub fn reconcile(&mut self) {
        while self.workers.len() < self.desired {
            let siblings: Vec<RawFd> =
                self.workers.iter().chain(&self.retiring).map(|handle| handle.heartbeat.as_fd().as_raw_fd()).collect();
            match self.processes.spawn(&siblings) {
                Ok((pid, heartbeat)) => {
                    info!(pid = %pid, "booted worker");
                    self.workers.push_back(WorkerHandle { pid, aborted: false, heartbeat });
                }
                Err(e) => {
                    error!(cause = %e, "can't spawn worker");
                    break;
                }
            }
        }

        while self.workers.len() > self.desired {
            let Some(handle) = self.workers.pop_front() else {
                break;
            };
            info!(pid = %handle.pid, "retiring worker");
            match self.processes.kill(handle.pid, Signal::SIGTERM) {
                Err(Errno::ESRCH) => {}
                Err(e) => {
                    warn!(pid = %handle.pid, cause = %e, "can't signal worker");
                    self.retiring.push(handle);
                }
                Ok(()) => self.retiring.push(handle),
            }
        }
    }

    pub fn increment(&mut self) {
        self.desired += 1;
        info!(workers = self.desired, "growing worker pool");
        self.reconcile();
    }

    /// Shrinks the pool by one, never below a single worker.
    pub fn decrement(&mut self) {
        if self.desired <= 1 {
            debug!("worker pool already at its minimum");
            return;
        }
        self.desired -= 1;
        info!(workers = self.desired, "shrinking worker pool");
        self.reconcile();
    }

    /// Escalates against every worker whose heartbeat is older than the timeout.
    ///
    /// The first stale check sends SIGABRT, the next one SIGKILL. A worker that no
    /// longer exists is dropped right away.
    pub fn sweep(&mut self, now: SystemTime) {
        let Some(timeout) = self.timeout else {
            return;
        };

        let processes = &mut self.processes;
        self.workers.retain_mut(|handle| check_heartbeat(processes, handle, timeout, now));
        self.retiring.retain_mut(|handle| check_heartbeat(processes, handle, timeout, now));
    }

    /// Collects every exited worker and forgets about it.
    ///
    /// Returns the number of children reaped.
    pub fn reap(&mut self) -> usize {
        let mut reaped = 0;
        while let Some(status) = self.processes.reap() {
            let Some(pid) = status.pid() else {
                continue;
            };
            reaped += 1;

            match status {
                WaitStatus::Exited(_, 0) => info!(pid = %pid, "worker exited"),
                WaitStatus::Exited(_, code) => warn!(pid = %pid, code, "worker exited with error"),
                WaitStatus::Signaled(_, signal, _) => warn!(pid = %pid, signal = %signal, "worker killed by signal"),
                status => debug!(pid = %pid, ?status, "child changed state"),
            }

            self.workers.retain(|handle| handle.pid != pid);
            self.retiring.retain(|handle| handle.pid != pid);
        }
        reaped
    }

    /// Sends `signal` to every worker, retiring ones included.
    pub fn kill_all(&mut self, signal: Signal) {
        let processes = &mut self.processes;
        self.workers.retain(|handle| !matches!(processes.kill(handle.pid, signal), Err(Errno::ESRCH)));
        self.retiring.retain(|handle| !matches!(processes.kill(handle.pid, signal), Err(Errno::ESRCH)));
    }

    /// Stops keeping workers alive: no worker is wanted any more and every live
    /// worker is sent `signal` and moved to the retiring set.
    pub fn retire_all(&mut self, signal: Signal) {
        self.desired = 0;
        while let Some(handle) = self.workers.pop_front() {
            match self.processes.kill(handle.pid, signal) {
                Err(Errno::ESRCH) => {}
                _ => self.retiring.push(handle),
            }
        }
    }
}

/// Returns whether the handle is kept.
fn check_heartbeat<P: Processes>(processes: &mut P, handle: &mut WorkerHandle, timeout: Duration, now: SystemTime) -> bool {
    let last_update = match handle.heartbeat.last_update() {
        Ok(last_update) => last_update,
        Err(e) => {
            warn!(pid = %handle.pid, cause = %e, "can't read heartbeat");
            return true;
        }
    };

    let elapsed = now.duration_since(last_update).unwrap_or_default();
    if elapsed < timeout {
        return true;
    }

    let signal = if handle.aborted {
        Signal::SIGKILL
    } else {
        handle.aborted = true;
        error!(pid = %handle.pid, elapsed = ?elapsed, "worker timeout");
        Signal::SIGABRT
    };

    match processes.kill(handle.pid, signal) {
        Err(Errno::ESRCH) => false,
        Err(e) => {
            warn!(pid = %handle.pid, signal = %signal, cause = %e, "can't signal worker");
            true
        }
        Ok(()) => true,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Records every call and turns signals into exits on request.
    #[derive(Debug, Default)]
    pub(crate) struct FakeProcesses {
        next_pid: i32,
        pub(crate) spawned: Vec<Pid>,
        /// Number of sibling heartbeats handed to each spawn
        pub(crate) siblings: Vec<usize>,
        pub(crate) kills: Vec<(Pid, Signal)>,
        pub(crate) gone: HashSet<Pid>,
        pub(crate) exited: VecDeque<Pid>,
        /// Signals that make a worker exit as soon as they are sent
        pub(crate) fatal: Vec<Signal>,
    }

    impl FakeProcesses {
        pub(crate) fn new() -> Self {
            Self { next_pid: 100, ..Default::default() }
        }

        pub(crate) fn exiting_on(mut self, signals: &[Signal]) -> Self {
            self.fatal = signals.to_vec();
            self
        }
    }

    impl Processes for FakeProcesses {
        fn spawn(&mut self, siblings: &[RawFd]) -> Result<(Pid, Heartbeat), ArbiterError> {
            self.siblings.push(siblings.len());
            self.next_pid += 1;
            let pid = Pid::from_raw(self.next_pid);
            self.spawned.push(pid);
            Ok((pid, Heartbeat::new(std::env::temp_dir()).map_err(ArbiterError::heartbeat)?))
        }

        fn kill(&mut self, pid: Pid, signal: Signal) -> nix::Result<()> {
            if self.gone.contains(&pid) {
                return Err(Errno::ESRCH);
            }
            self.kills.push((pid, signal));
            if self.fatal.contains(&signal) {
                self.gone.insert(pid);
                self.exited.push_back(pid);
            }
            Ok(())
        }

        fn reap(&mut self) -> Option<WaitStatus> {
            self.exited.pop_front().map(|pid| WaitStatus::Exited(pid, 0))
        }
    }

    fn pool(desired: usize) -> Pool<FakeProcesses> {
        let mut pool = Pool::new(FakeProcesses::new(), desired, Some(Duration::from_secs(30)));
        pool.reconcile();
        pool
    }

    fn pids(pool: &Pool<FakeProcesses>) -> Vec<i32> {
        pool.workers().map(|handle| handle.pid().as_raw()).collect()
    }

    #[test]
    fn reconcile_spawns_desired_workers() {
        let pool = pool(3);

        assert_eq!(pool.len(), 3);
        assert_eq!(pids(&pool), [101, 102, 103]);
    }

    #[test]
    fn ttin_spawns_exactly_one() {
        let mut pool = pool(2);

        pool.increment();

        assert_eq!(pool.desired(), 3);
        assert_eq!(pool.processes.spawned.len(), 3);
        assert!(pool.processes.kills.is_empty());
    }

    #[test]
    fn spawn_sees_every_sibling_heartbeat() {
        let mut pool = pool(2);
        pool.increment();
        pool.decrement();
        pool.processes.exited.push_back(Pid::from_raw(102));

        pool.reap();
        pool.reconcile();

        // 101 is retiring but still holds its heartbeat
        assert_eq!(pool.processes.siblings, [0, 1, 2, 2]);
        assert_eq!(pids(&pool), [103, 104]);
    }

    #[test]
    fn ttou_retires_oldest_worker() {
        let mut pool = pool(3);

        pool.decrement();

        assert_eq!(pool.desired(), 2);
        assert_eq!(pool.processes.kills, [(Pid::from_raw(101), Signal::SIGTERM)]);
        assert_eq!(pids(&pool), [102, 103]);
        assert!(!pool.is_empty());
    }

    #[test]
    fn ttou_never_goes_below_one() {
        let mut pool = pool(1);

        pool.decrement();

        assert_eq!(pool.desired(), 1);
        assert_eq!(pool.len(), 1);
        assert!(pool.processes.kills.is_empty());
    }

    #[test]
    fn reaped_worker_is_replaced() {
        let mut pool = pool(2);
        pool.processes.exited.push_back(Pid::from_raw(101));

        assert_eq!(pool.reap(), 1);
        assert_eq!(pids(&pool), [102]);

        pool.reconcile();
        assert_eq!(pids(&pool), [102, 103]);
    }

    #[test]
    fn retiring_worker_is_forgotten_once_reaped() {
        let mut pool = pool(2);
        pool.decrement();
        pool.processes.exited.push_back(Pid::from_raw(101));

        pool.reap();
        pool.reconcile();

        assert_eq!(pids(&pool), [102]);
        assert!(pool.retiring.is_empty());
    }

    #[test]
    fn stale_worker_is_aborted_then_killed() {
        let mut pool = pool(1);
        let later = SystemTime::now() + Duration::from_secs(60);

        pool.sweep(later);
        assert_eq!(pool.processes.kills, [(Pid::from_raw(101), Signal::SIGABRT)]);
        assert!(pool.workers().all(WorkerHandle::is_aborted));

        pool.sweep(later);
        assert_eq!(pool.processes.kills, [(Pid::from_raw(101), Signal::SIGABRT), (Pid::from_raw(101), Signal::SIGKILL)]);

        pool.processes.exited.push_back(Pid::from_raw(101));
        pool.reap();
        pool.reconcile();
        assert_eq!(pids(&pool), [102]);
    }

    #[test]
    fn fresh_worker_is_left_alone() {
        let mut pool = pool(2);

        pool.sweep(SystemTime::now());

        assert!(pool.processes.kills.is_empty());
    }

    #[test]
    fn vanished_worker_is_dropped_by_sweep() {
        let mut pool = pool(2);
        pool.processes.gone.insert(Pid::from_raw(101));

        pool.sweep(SystemTime::now() + Duration::from_secs(60));

        assert_eq!(pids(&pool), [102]);
    }

    #[test]
    fn disabled_timeout_skips_sweep() {
        let mut pool = Pool::new(FakeProcesses::new(), 1, None);
        pool.reconcile();

        pool.sweep(SystemTime::now() + Duration::from_secs(3600));

        assert!(pool.processes.kills.is_empty());
    }

    #[test]
    fn retire_all_stops_respawning() {
        let mut pool = Pool::new(FakeProcesses::new().exiting_on(&[Signal::SIGTERM]), 2, None);
        pool.reconcile();

        pool.retire_all(Signal::SIGTERM);
        assert_eq!(pool.len(), 0);
        assert!(!pool.is_empty());

        assert_eq!(pool.reap(), 2);
        pool.reconcile();
        assert!(pool.is_empty());
        assert_eq!(pool.processes.spawned.len(), 2);
    }

    #[test]
    fn kill_all_reaches_retiring_workers() {
        let mut pool = pool(2);
        pool.decrement();

        pool.kill_all(Signal::SIGQUIT);

        let quits: Vec<i32> =
            pool.processes.kills.iter().filter(|(_, signal)| *signal == Signal::SIGQUIT).map(|(pid, _)| pid.as_raw()).collect();
        assert_eq!(quits, [102, 101]);
    }
}
