//! Running tool calls on the right thread, with a deadline.
//!
//! Some tools touch state owned by the host application's UI thread and must run
//! there; others can run anywhere. Either way the connection that asked for the
//! call waits on a channel, so a slow tool stalls only its own connection, and
//! only until the tool timeout expires.
//!
//! The host decides what "the privileged context" is by implementing
//! [`PrivilegedContext`]. Applications without a UI thread of their own can use
//! [`DedicatedThread`], which runs every privileged job on one named thread.
//!
//! # Examples
//!
//! ```
//! use termcp::mcp::executor::{DedicatedThread, ExecutionContext, Executor};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let privileged = Arc::new(DedicatedThread::spawn("ui").unwrap());
//! let executor = Executor::new(privileged, Duration::from_secs(1));
//! let name = executor
//!     .run(ExecutionContext::Privileged, || {
//!         Ok(std::thread::current().name().unwrap_or_default().to_string())
//!     })
//!     .unwrap();
//! assert_eq!(name, "ui");
//! ```

use super::tools::{ToolCallError, ToolError};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

/// A unit of work handed to an execution context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Where a tool must run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionContext {
    /// Any thread will do.
    #[default]
    Any,
    /// The single context designated by the host, usually its UI thread.
    Privileged,
}

/// The host's designated execution context.
///
/// `submit` must eventually run the job, or drop it; it must not run it inline
/// on the calling thread if that would block the caller indefinitely.
pub trait PrivilegedContext: Send + Sync {
    fn submit(&self, job: Job);
}

/// A [`PrivilegedContext`] backed by one long-lived thread.
///
/// Jobs run in submission order. The thread exits once the `DedicatedThread`
/// is dropped and the queue drains.
pub struct DedicatedThread {
    sender: mpsc::Sender<Job>,
}

impl DedicatedThread {
    /// Spawns the worker thread with the given name.
    pub fn spawn(name: &str) -> std::io::Result<DedicatedThread> {
        let (sender, receiver) = mpsc::channel::<Job>();
        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for job in receiver {
                    job();
                }
            })?;
        Ok(DedicatedThread { sender })
    }
}

impl PrivilegedContext for DedicatedThread {
    fn submit(&self, job: Job) {
        if self.sender.send(job).is_err() {
            logwise::error_sync!("DedicatedThread: worker is gone, dropping job");
        }
    }
}

/// Runs closures in a requested [`ExecutionContext`] and waits for them with a timeout.
#[derive(Clone)]
pub struct Executor {
    privileged: Arc<dyn PrivilegedContext>,
    timeout: Duration,
}

impl Executor {
    pub fn new(privileged: Arc<dyn PrivilegedContext>, timeout: Duration) -> Executor {
        Executor {
            privileged,
            timeout,
        }
    }

    /// Runs `f` in `context` and waits for its result.
    ///
    /// Errors returned by `f`, panics inside `f`, and expiry of the timeout all
    /// come back as [`ToolError::ExecutionFailed`]. On timeout the job is
    /// abandoned: it may still run later, but its result is discarded.
    pub fn run<F>(&self, context: ExecutionContext, f: F) -> Result<String, ToolError>
    where
        F: FnOnce() -> Result<String, ToolCallError> + Send + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel(1);
        let job: Job = Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(f));
            // the receiver is gone if the caller already timed out
            let _ = sender.send(outcome);
        });
        match context {
            ExecutionContext::Any => {
                std::thread::Builder::new()
                    .name("termcp::tool".to_string())
                    .spawn(job)
                    .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
            }
            ExecutionContext::Privileged => self.privileged.submit(job),
        }
        match receiver.recv_timeout(self.timeout) {
            Ok(Ok(Ok(text))) => Ok(text),
            Ok(Ok(Err(e))) => Err(ToolError::ExecutionFailed(e.message)),
            Ok(Err(panic)) => Err(ToolError::ExecutionFailed(panic_message(panic))),
            Err(RecvTimeoutError::Timeout) => Err(ToolError::ExecutionFailed("timeout".to_string())),
            Err(RecvTimeoutError::Disconnected) => Err(ToolError::ExecutionFailed(
                "execution context dropped the call".to_string(),
            )),
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("tool panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("tool panicked: {s}")
    } else {
        "tool panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drops every job without running it.
    struct BlackHole;

    impl PrivilegedContext for BlackHole {
        fn submit(&self, _job: Job) {}
    }

    fn executor(timeout: Duration) -> Executor {
        Executor::new(
            Arc::new(DedicatedThread::spawn("termcp-test-privileged").unwrap()),
            timeout,
        )
    }

    #[test]
    fn privileged_jobs_run_on_the_dedicated_thread() {
        let executor = executor(Duration::from_secs(5));
        for _ in 0..3 {
            let name = executor
                .run(ExecutionContext::Privileged, || {
                    Ok(std::thread::current().name().unwrap_or_default().to_string())
                })
                .unwrap();
            assert_eq!(name, "termcp-test-privileged");
        }
    }

    #[test]
    fn any_jobs_run_off_the_caller_thread() {
        let executor = executor(Duration::from_secs(5));
        let caller = std::thread::current().id();
        let ran_elsewhere = executor
            .run(ExecutionContext::Any, move || {
                Ok((std::thread::current().id() != caller).to_string())
            })
            .unwrap();
        assert_eq!(ran_elsewhere, "true");
    }

    #[test]
    fn tool_errors_become_execution_failures() {
        let executor = executor(Duration::from_secs(5));
        let err = executor
            .run(ExecutionContext::Any, || Err(ToolCallError::new("no such terminal")))
            .unwrap_err();
        assert_eq!(err, ToolError::ExecutionFailed("no such terminal".to_string()));
    }

    #[test]
    fn panics_are_caught_and_the_context_survives() {
        let executor = executor(Duration::from_secs(5));
        let err = executor
            .run(ExecutionContext::Privileged, || panic!("boom"))
            .unwrap_err();
        assert_eq!(err, ToolError::ExecutionFailed("tool panicked: boom".to_string()));
        let ok = executor
            .run(ExecutionContext::Privileged, || Ok("still alive".to_string()))
            .unwrap();
        assert_eq!(ok, "still alive");
    }

    #[test]
    fn slow_jobs_time_out() {
        let executor = executor(Duration::from_millis(50));
        let err = executor
            .run(ExecutionContext::Any, || {
                std::thread::sleep(Duration::from_millis(500));
                Ok("late".to_string())
            })
            .unwrap_err();
        assert_eq!(err, ToolError::ExecutionFailed("timeout".to_string()));
    }

    #[test]
    fn dropped_jobs_are_reported() {
        let executor = Executor::new(Arc::new(BlackHole), Duration::from_secs(5));
        let err = executor
            .run(ExecutionContext::Privileged, || Ok("never".to_string()))
            .unwrap_err();
        assert_eq!(
            err,
            ToolError::ExecutionFailed("execution context dropped the call".to_string())
        );
    }
}
