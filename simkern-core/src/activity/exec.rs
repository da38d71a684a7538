use std::sync::Arc;

use super::{Activity, ActivityCell, ActivityError, ActivityKind, ActivityState, Request};

/// A computation on one host, or a parallel task spanning several hosts.
#[derive(Debug, Clone)]
pub struct Exec {
    cell: Arc<ActivityCell>,
}

impl Exec {
    /// Computation of `flops` on the host of the actor that starts it.
    pub fn init(flops: f64) -> Self {
        Self::with_request(
            flops,
            Request::Exec {
                host: None,
                flops,
                priority: 1.0,
                bound: None,
            },
        )
    }

    /// Computation of `flops` on `host`.
    pub fn on_host(host: impl Into<String>, flops: f64) -> Self {
        Self::with_request(
            flops,
            Request::Exec {
                host: Some(host.into()),
                flops,
                priority: 1.0,
                bound: None,
            },
        )
    }

    /// Parallel task: `flops[i]` on `hosts[i]` and `bytes[i * n + j]` sent
    /// from `hosts[i]` to `hosts[j]`, all progressing at the same pace.
    ///
    /// Its remaining work is the fraction of the task left, from 1 to 0.
    /// Only host models sharing CPUs and links in one system run parallel tasks.
    pub fn parallel(hosts: &[&str], flops: Vec<f64>, bytes: Vec<f64>) -> Self {
        Self::with_request(
            1.0,
            Request::ParallelExec {
                hosts: hosts.iter().map(|host| host.to_string()).collect(),
                flops,
                bytes,
                rate: None,
            },
        )
    }

    fn with_request(total: f64, request: Request) -> Self {
        Self {
            cell: ActivityCell::new(ActivityKind::Exec, total, request),
        }
    }

    fn configure(&self, update: impl FnOnce(&mut Request)) -> Result<&Self, ActivityError> {
        let mut inner = self.cell.lock();
        if inner.state != ActivityState::Inited {
            return Err(ActivityError::NotInited { state: inner.state });
        }
        update(&mut inner.request);
        Ok(self)
    }

    /// Share of the host relative to concurrent executions (default 1).
    ///
    /// # Errors
    ///
    /// - `ActivityError::NotInited` - Already started
    pub fn set_priority(&self, priority: f64) -> Result<&Self, ActivityError> {
        self.configure(|request| {
            if let Request::Exec { priority: current, .. } = request {
                *current = priority;
            }
        })
    }

    /// Caps the execution rate (flop/s), or the pace of a parallel task.
    ///
    /// # Errors
    ///
    /// - `ActivityError::NotInited` - Already started
    pub fn set_bound(&self, bound: f64) -> Result<&Self, ActivityError> {
        self.configure(|request| match request {
            Request::Exec { bound: current, .. } => *current = Some(bound),
            Request::ParallelExec { rate, .. } => *rate = Some(bound),
            _ => {}
        })
    }

    /// Moves a not yet started execution to `host`.
    ///
    /// # Errors
    ///
    /// - `ActivityError::NotInited` - Already started
    pub fn set_host(&self, host: impl Into<String>) -> Result<&Self, ActivityError> {
        let host = host.into();
        self.configure(move |request| {
            if let Request::Exec { host: current, .. } = request {
                *current = Some(host);
            }
        })
    }

    /// Host the execution runs on, once known.
    pub fn host(&self) -> Option<String> {
        let inner = self.cell.lock();
        match &inner.request {
            Request::Exec { host, .. } => host.clone().or_else(|| inner.host.clone()),
            _ => None,
        }
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self.cell.lock().request, Request::ParallelExec { .. })
    }
}

impl Activity for Exec {
    fn cell(&self) -> &Arc<ActivityCell> {
        &self.cell
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_before_start() {
        let exec = Exec::on_host("alice", 100.0);
        exec.set_priority(2.0).unwrap().set_bound(10.0).unwrap();
        assert_eq!(exec.host().as_deref(), Some("alice"));
        assert_eq!(exec.get_remaining(), 100.0);
        assert!(!exec.is_parallel());
    }

    #[test]
    fn test_configuration_after_cancel_is_rejected() {
        let exec = Exec::init(100.0);
        exec.cancel().unwrap();
        assert_eq!(
            exec.set_priority(2.0).unwrap_err(),
            ActivityError::NotInited {
                state: ActivityState::Canceled
            }
        );
    }

    #[test]
    fn test_parallel_task_counts_fractions() {
        let exec = Exec::parallel(&["a", "b"], vec![1.0, 1.0], vec![0.0; 4]);
        assert!(exec.is_parallel());
        assert_eq!(exec.get_remaining(), 1.0);
        assert_eq!(exec.host(), None);
    }
}
