//! Readiness-notification reactor
//!
//! The façade callers interact with: register a read callback for a
//! connected socket and a single background worker invokes it whenever the
//! socket has data, without the caller running its own polling loop.
//!
//! The worker starts lazily on the first registration. What happens when
//! the last registration is removed is policy, not fixed behavior: with
//! [`ReactorConfig::auto_shutdown`] the worker is torn down and respawned
//! on the next registration; without it the worker idles.
//!
//! See the crate docs for the callback contract.

mod registry;
mod worker;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sockmux_core::smx_debug;

use crate::socket::Socket;
use registry::CallbackRegistry;
use worker::{spawn_worker, WorkerHandle};

pub use registry::ReadCallback;
pub use worker::ReactorStats;

/// Reactor configuration with builder methods and environment overrides.
#[derive(Debug, Clone)]
pub struct ReactorConfig {
    /// Max sockets watched per poll call. A registry larger than this is
    /// covered round-robin across successive passes.
    pub batch_size: usize,
    /// Poll timeout; bounds both delivery latency for sockets registered
    /// mid-pass and shutdown responsiveness.
    pub poll_timeout: Duration,
    /// Capacity of the worker's reusable read buffer.
    pub read_buffer_size: usize,
    /// Tear the worker down when the registry becomes empty.
    pub auto_shutdown: bool,
    /// Worker thread name.
    pub thread_name: String,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ReactorConfig {
    /// Compile-time defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `SMX_BATCH_SIZE` - Max sockets per poll call
    /// - `SMX_POLL_TIMEOUT_MS` - Poll timeout in milliseconds
    /// - `SMX_READ_BUFFER_SIZE` - Read buffer capacity in bytes
    /// - `SMX_AUTO_SHUTDOWN` - Stop the worker on empty registry (0/1)
    /// - `SMX_THREAD_NAME` - Worker thread name
    pub fn from_env() -> Self {
        Self {
            batch_size: env_get("SMX_BATCH_SIZE", 1024),
            poll_timeout: Duration::from_millis(env_get("SMX_POLL_TIMEOUT_MS", 25u64).max(1)),
            read_buffer_size: env_get("SMX_READ_BUFFER_SIZE", 16 * 1024),
            auto_shutdown: env_get("SMX_AUTO_SHUTDOWN", 0usize) != 0,
            thread_name: std::env::var("SMX_THREAD_NAME")
                .unwrap_or_else(|_| "smx-reactor".to_string()),
        }
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = n.max(1);
        self
    }

    /// Floored at 1 ms; a zero timeout would turn the worker into a
    /// non-blocking spin loop.
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    pub fn read_buffer_size(mut self, bytes: usize) -> Self {
        self.read_buffer_size = bytes.max(1);
        self
    }

    pub fn auto_shutdown(mut self, enabled: bool) -> Self {
        self.auto_shutdown = enabled;
        self
    }

    pub fn thread_name<S: Into<String>>(mut self, name: S) -> Self {
        self.thread_name = name.into();
        self
    }
}

fn env_get<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// The reactor: callback registry + lazily-started worker thread.
///
/// Explicitly constructed and owned by the caller (share it behind an
/// `Arc` if several threads register sockets); there is no process-global
/// reactor state.
pub struct Reactor {
    config: ReactorConfig,
    registry: Arc<CallbackRegistry>,
    worker: Mutex<Option<WorkerHandle>>,
    // Accumulated stats from workers that already stopped.
    stats: Mutex<ReactorStats>,
}

impl Reactor {
    pub fn new(config: ReactorConfig) -> Self {
        Self {
            config,
            registry: Arc::new(CallbackRegistry::new()),
            worker: Mutex::new(None),
            stats: Mutex::new(ReactorStats::default()),
        }
    }

    /// Register `callback` to run on the worker thread whenever `socket`
    /// has data available. Multiple registrations for one socket append;
    /// they fire in registration order.
    ///
    /// Starts the worker if it is not running. Fire-and-forget: a socket
    /// registered mid-pass is observed no later than the next pass.
    ///
    /// # Panics
    ///
    /// If `socket` is not connected.
    pub fn register_read_callback<F>(&self, socket: &Socket, callback: F)
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        assert!(
            socket.is_connected(),
            "cannot register a callback for an unconnected socket"
        );
        // Insert before ensuring the worker so a concurrent auto-shutdown
        // empty-check either sees this entry or is followed by our respawn.
        self.registry.add(socket.fd(), Box::new(callback));
        smx_debug!("registered callback for fd {}", socket.fd());

        let mut worker = self.lock_worker();
        if worker.is_none() {
            *worker = Some(spawn_worker(self.registry.clone(), &self.config));
        }
        // A concurrent unregister of this same socket can empty the
        // registry between the insert above and the spawn; it only tears
        // down a worker it can see under this lock, so finish the job if
        // the registration is already gone.
        if self.config.auto_shutdown && self.registry.is_empty() {
            self.stop_worker_locked(&mut worker);
        }
    }

    /// Remove every callback registered for `socket`. No-op for a socket
    /// with no registrations.
    ///
    /// When this returns, no callback for the socket is in flight and none
    /// will run again. Must not be called from inside a callback.
    pub fn unregister(&self, socket: &Socket) {
        let removed = self.registry.remove_all(socket.fd());
        if removed {
            smx_debug!("unregistered fd {}", socket.fd());
        }
        if removed && self.config.auto_shutdown {
            let mut worker = self.lock_worker();
            if self.registry.is_empty() {
                self.stop_worker_locked(&mut worker);
            }
        }
    }

    /// Unregister, then close: the registration is gone before the
    /// descriptor is invalidated, so the worker never dispatches against a
    /// closed descriptor.
    pub fn close(&self, socket: &mut Socket) {
        self.unregister(socket);
        socket.close();
    }

    /// Number of sockets currently registered.
    pub fn registered_count(&self) -> usize {
        self.registry.count()
    }

    /// Is the worker thread currently running?
    pub fn is_running(&self) -> bool {
        self.lock_worker().is_some()
    }

    /// Stop the worker (if running), clear the registry, and report the
    /// cumulative statistics of every worker run this reactor owned.
    pub fn shutdown(&self) -> ReactorStats {
        {
            let mut worker = self.lock_worker();
            self.stop_worker_locked(&mut worker);
        }
        // Registered callbacks die with their entries.
        self.registry.clear();
        self.lock_stats().clone()
    }

    // Caller holds the worker mutex; joins the worker and folds its stats
    // into the running total.
    fn stop_worker_locked(&self, worker: &mut Option<WorkerHandle>) {
        if let Some(handle) = worker.take() {
            let stats = handle.shutdown();
            self.lock_stats().absorb(&stats);
        }
    }

    fn lock_worker(&self) -> std::sync::MutexGuard<'_, Option<WorkerHandle>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, ReactorStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
