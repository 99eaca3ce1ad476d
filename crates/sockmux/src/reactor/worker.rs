//! Reactor worker thread
//!
//! Single thread that multiplexes readiness over the registered sockets:
//!
//! 1. Snapshot up to `batch_size` descriptors from the registry (lock held
//!    only while building the set)
//! 2. Block on `poll(2)` with a short timeout so concurrent registry
//!    mutation is picked up on the next pass
//! 3. For each ready descriptor: re-validate membership under the registry
//!    lock, perform one bounded non-blocking read into the worker-owned
//!    buffer, and invoke the callbacks in registration order

use std::os::fd::BorrowedFd;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use sockmux_core::{smx_debug, smx_info, smx_trace, smx_warn};

use super::registry::{CallbackRegistry, ReadOutcome};
use super::ReactorConfig;

/// Statistics from one worker run, returned on shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactorStats {
    /// Poll calls made
    pub polls: u64,
    /// Callback dispatch passes (per socket, including zero-length ones)
    pub dispatches: u64,
    /// Total payload bytes delivered
    pub bytes_read: u64,
    /// Largest number of sockets ready in a single pass
    pub max_ready_batch: usize,
}

impl ReactorStats {
    pub(crate) fn absorb(&mut self, other: &ReactorStats) {
        self.polls += other.polls;
        self.dispatches += other.dispatches;
        self.bytes_read += other.bytes_read;
        self.max_ready_batch = self.max_ready_batch.max(other.max_ready_batch);
    }
}

/// Handle to a running worker thread.
pub(crate) struct WorkerHandle {
    handle: Option<JoinHandle<ReactorStats>>,
    stop: Arc<AtomicBool>,
}

impl WorkerHandle {
    /// Request stop and join. The worker observes the flag within one poll
    /// timeout.
    pub(crate) fn shutdown(mut self) -> ReactorStats {
        self.stop.store(true, Ordering::Release);
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(stats) => stats,
                Err(_) => {
                    smx_warn!("reactor worker panicked (callback?)");
                    ReactorStats::default()
                }
            },
            None => ReactorStats::default(),
        }
    }
}

/// Spawn the worker thread.
pub(crate) fn spawn_worker(
    registry: Arc<CallbackRegistry>,
    config: &ReactorConfig,
) -> WorkerHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = stop.clone();
    let config = config.clone();

    let handle = thread::Builder::new()
        .name(config.thread_name.clone())
        .spawn(move || worker_loop(registry, stop_clone, config))
        .expect("failed to spawn reactor worker thread");

    WorkerHandle {
        handle: Some(handle),
        stop,
    }
}

fn worker_loop(
    registry: Arc<CallbackRegistry>,
    stop: Arc<AtomicBool>,
    config: ReactorConfig,
) -> ReactorStats {
    let mut stats = ReactorStats::default();
    let mut buf = vec![0u8; config.read_buffer_size];
    let timeout = poll_timeout(config.poll_timeout);

    smx_info!(
        "reactor worker started (batch={}, timeout={:?}, buffer={})",
        config.batch_size,
        config.poll_timeout,
        config.read_buffer_size
    );

    while !stop.load(Ordering::Relaxed) {
        let fds = registry.snapshot(config.batch_size);
        if fds.is_empty() {
            // Nothing registered; idle until the façade either adds a
            // socket or (with auto_shutdown) tears us down.
            thread::sleep(config.poll_timeout);
            continue;
        }

        // A descriptor closed behind our back reports POLLNVAL and gets
        // its registration evicted below; membership is re-validated
        // before any read.
        let mut pollfds: Vec<PollFd> = fds
            .iter()
            .map(|&fd| PollFd::new(unsafe { BorrowedFd::borrow_raw(fd) }, PollFlags::POLLIN))
            .collect();

        let ready_flags = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
        let n = match poll(&mut pollfds, timeout) {
            Ok(n) => n,
            Err(Errno::EINTR) => continue,
            Err(errno) => {
                smx_warn!("poll failed: {}", errno);
                thread::sleep(config.poll_timeout);
                continue;
            }
        };
        stats.polls += 1;
        if n == 0 {
            continue;
        }

        let mut ready: Vec<RawFd> = Vec::new();
        let mut stale: Vec<RawFd> = Vec::new();
        for (i, p) in pollfds.iter().enumerate() {
            let Some(revents) = p.revents() else { continue };
            if revents.contains(PollFlags::POLLNVAL) {
                stale.push(fds[i]);
            } else if revents.intersects(ready_flags) {
                ready.push(fds[i]);
            }
        }
        drop(pollfds);
        stats.max_ready_batch = stats.max_ready_batch.max(ready.len());
        smx_trace!("{} of {} polled sockets ready", ready.len(), fds.len());

        // A registration whose descriptor was closed without unregistering
        // would report POLLNVAL on every pass and poll would never block
        // again. Terminal, like EOF: deliver the one empty payload and
        // drop the registration.
        for fd in stale {
            if registry.dispatch(fd, || ReadOutcome::Eof).is_some() {
                stats.dispatches += 1;
                smx_warn!("fd {} closed while registered; registration dropped", fd);
            }
        }

        for fd in ready {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            if let Some(bytes) = registry.dispatch(fd, || bounded_read(fd, &mut buf)) {
                stats.dispatches += 1;
                stats.bytes_read += bytes as u64;
                smx_debug!("dispatched {} bytes for fd {}", bytes, fd);
            }
        }
    }

    smx_info!(
        "reactor worker stopped ({} polls, {} dispatches, {} bytes)",
        stats.polls,
        stats.dispatches,
        stats.bytes_read
    );
    stats
}

/// One non-blocking read, bounded by the buffer capacity. Data beyond the
/// buffer stays queued in the kernel and shows up as readiness again on the
/// next pass.
fn bounded_read(fd: RawFd, buf: &mut [u8]) -> ReadOutcome<'_> {
    let n = unsafe {
        libc::recv(
            fd,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
            libc::MSG_DONTWAIT,
        )
    };
    if n > 0 {
        return ReadOutcome::Data(&buf[..n as usize]);
    }
    if n == 0 {
        return ReadOutcome::Eof;
    }
    match std::io::Error::last_os_error().raw_os_error() {
        Some(code) if code == libc::EAGAIN || code == libc::EWOULDBLOCK || code == libc::EINTR => {
            ReadOutcome::WouldBlock
        }
        // Connection reset and friends collapse into a zero-length delivery.
        _ => ReadOutcome::Eof,
    }
}

fn poll_timeout(duration: Duration) -> PollTimeout {
    PollTimeout::from(duration.as_millis().min(u16::MAX as u128) as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_absorb() {
        let mut a = ReactorStats {
            polls: 10,
            dispatches: 3,
            bytes_read: 100,
            max_ready_batch: 2,
        };
        let b = ReactorStats {
            polls: 5,
            dispatches: 4,
            bytes_read: 7,
            max_ready_batch: 5,
        };
        a.absorb(&b);
        assert_eq!(a.polls, 15);
        assert_eq!(a.dispatches, 7);
        assert_eq!(a.bytes_read, 107);
        assert_eq!(a.max_ready_batch, 5);
    }

    #[test]
    fn test_bounded_read_on_socketpair() {
        let mut fds = [0 as RawFd; 2];
        let rc = unsafe {
            libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr())
        };
        assert_eq!(rc, 0);
        let (rd, wr) = (fds[0], fds[1]);

        let mut buf = [0u8; 8];
        // Nothing written yet: would-block.
        assert!(matches!(bounded_read(rd, &mut buf), ReadOutcome::WouldBlock));

        let msg = b"0123456789"; // longer than the buffer
        let sent = unsafe {
            libc::send(wr, msg.as_ptr() as *const libc::c_void, msg.len(), 0)
        };
        assert_eq!(sent, 10);

        // Bounded: first read fills the buffer, the rest stays queued.
        match bounded_read(rd, &mut buf) {
            ReadOutcome::Data(d) => assert_eq!(d, b"01234567"),
            _ => panic!("expected data"),
        }
        match bounded_read(rd, &mut buf) {
            ReadOutcome::Data(d) => assert_eq!(d, b"89"),
            _ => panic!("expected data"),
        }

        unsafe { libc::close(wr) };
        assert!(matches!(bounded_read(rd, &mut buf), ReadOutcome::Eof));
        unsafe { libc::close(rd) };
    }

    #[test]
    fn test_worker_stops_within_timeout() {
        let registry = Arc::new(CallbackRegistry::new());
        let config = ReactorConfig::default().poll_timeout(Duration::from_millis(5));
        let handle = spawn_worker(registry, &config);
        thread::sleep(Duration::from_millis(20));
        let stats = handle.shutdown();
        // Empty registry: the worker idles without polling.
        assert_eq!(stats.polls, 0);
    }
}
