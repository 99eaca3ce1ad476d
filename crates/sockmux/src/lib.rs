//! # sockmux — sockets + readiness reactor
//!
//! A small sockets facility: connection establishment, synchronous
//! read/write, and a readiness-notification reactor that invokes
//! per-socket callbacks from a single background worker whenever data
//! becomes available.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │          Caller threads                                  │
//! │   reactor.register_read_callback(&sock, |data| ...)      │
//! │   reactor.unregister(&sock)                              │
//! └──────────────────┬───────────────────────────────────────┘
//!                    │ mutates CallbackRegistry (mutex)
//!                    ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │          Reactor worker (dedicated OS thread)            │
//! │   snapshot registry → poll(2) bounded batch              │
//! │   per ready fd: re-validate, bounded read, run callbacks │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use sockmux::{Reactor, ReactorConfig, Socket, Family};
//!
//! let reactor = Reactor::new(ReactorConfig::default());
//!
//! let listener = Socket::listen(7777, Family::Ipv4)?;
//! let conn = listener.accept()?;
//! reactor.register_read_callback(&conn, |data| {
//!     if data.is_empty() {
//!         // peer closed (or the read failed) — registration is dropped
//!     } else {
//!         println!("got {} bytes", data.len());
//!     }
//! });
//!
//! // ... later
//! reactor.unregister(&conn);
//! let stats = reactor.shutdown();
//! ```
//!
//! ## Callback contract
//!
//! - Callbacks run synchronously on the worker thread, in registration
//!   order for a given socket. Keep them short.
//! - The payload slice is only valid for the duration of the call; copy
//!   out anything you keep.
//! - A zero-length payload means the socket is finished: graceful peer
//!   shutdown, a failed read, and a descriptor closed while still
//!   registered are deliberately indistinguishable. The registration is
//!   removed after a zero-length delivery.
//! - Callbacks must not call back into the reactor (register/unregister/
//!   shutdown); the registry lock is held during dispatch.

pub mod reactor;
pub mod socket;

pub use reactor::{Reactor, ReactorConfig, ReactorStats};
pub use socket::{Family, Socket, SocketKind};

pub use sockmux_core::{SockError, SockResult};
