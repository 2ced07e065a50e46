//! Background task with bounded teardown
//!
//! A `BackgroundTask` runs one body on a dedicated OS thread:
//!
//! 1. `start()` spawns the thread
//! 2. `stop()` cancels the task's token; the body polls it and returns
//! 3. `join_timeout()` waits up to a grace period for the body to call its
//!    exit hook, then joins. If the deadline passes the thread is detached
//!    and teardown moves on without it.
//!
//! The body must call `TaskContext::exit()` before returning. A guard calls
//! it as well when the body unwinds, so a panicking body still counts as
//! exited.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use sockpool_core::cancel::CancellationToken;
use sockpool_core::error::{SockError, SockResult};
use sockpool_core::{log_debug, log_warn};

type TaskBody = Box<dyn FnOnce(TaskContext) + Send + 'static>;

/// Grace period used when a still-running task is dropped.
pub const DEFAULT_JOIN_GRACE: Duration = Duration::from_secs(2);

struct TaskShared {
    active: AtomicBool,
    exited: Mutex<bool>,
    exited_cv: Condvar,
}

/// Handle passed to the running body.
pub struct TaskContext {
    token: CancellationToken,
    shared: Arc<TaskShared>,
}

impl TaskContext {
    /// Whether `stop()` has been requested.
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Self-termination hook. Idempotent.
    pub fn exit(&self) {
        self.shared.active.store(false, Ordering::Release);
        let mut exited = self.shared.exited.lock().unwrap_or_else(PoisonError::into_inner);
        *exited = true;
        self.shared.exited_cv.notify_all();
    }
}

struct ExitGuard(TaskContext);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.exit();
    }
}

/// Cancellable unit of background execution.
pub struct BackgroundTask {
    name: String,
    body: Mutex<Option<TaskBody>>,
    token: CancellationToken,
    shared: Arc<TaskShared>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundTask {
    /// Prepare a task; nothing runs until `start()`.
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(TaskContext) + Send + 'static,
    {
        Self {
            name: name.into(),
            body: Mutex::new(Some(Box::new(body))),
            token: CancellationToken::new(),
            shared: Arc::new(TaskShared {
                active: AtomicBool::new(false),
                exited: Mutex::new(false),
                exited_cv: Condvar::new(),
            }),
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn the thread. A task can only be started once.
    pub fn start(&mut self) -> SockResult<()> {
        let body = self
            .body
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(SockError::AlreadyStarted)?;
        let ctx = self.context();

        self.shared.active.store(true, Ordering::Release);
        let spawned = thread::Builder::new().name(self.name.clone()).spawn(move || {
            let guard = ExitGuard(TaskContext {
                token: ctx.token.clone(),
                shared: Arc::clone(&ctx.shared),
            });
            body(ctx);
            drop(guard);
        });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(_) => {
                self.shared.active.store(false, Ordering::Release);
                Err(SockError::SpawnFailed)
            }
        }
    }

    fn context(&self) -> TaskContext {
        TaskContext {
            token: self.token.clone(),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Request cancellation. Does not wait.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Whether the body is still running.
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Wait up to `grace` for the body to exit.
    ///
    /// Returns `true` if the thread exited and was joined (or never ran),
    /// `false` if it was abandoned.
    pub fn join_timeout(&mut self, grace: Duration) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };

        let deadline = Instant::now() + grace;
        let mut exited = self.shared.exited.lock().unwrap_or_else(PoisonError::into_inner);
        while !*exited {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            exited = match self.shared.exited_cv.wait_timeout(exited, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        let finished = *exited;
        drop(exited);

        if finished {
            if handle.join().is_err() {
                log_warn!("task {} panicked", self.name);
            }
            log_debug!("task {} joined", self.name);
            true
        } else {
            log_warn!("task {} did not exit within {:?}, abandoning it", self.name, grace);
            false
        }
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
            self.join_timeout(DEFAULT_JOIN_GRACE);
        }
    }
}
