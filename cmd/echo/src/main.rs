//! Loopback echo demo
//!
//! A listener, an in-process client and the reactor: the server side never
//! polls or blocks on reads — the registered callback echoes whatever the
//! worker thread delivers.
//!
//! # Environment Variables
//!
//! - `SMX_LOG_LEVEL=debug` - Watch the worker dispatch (off, error, warn,
//!   info, debug, trace)
//! - `SMX_POLL_TIMEOUT_MS` - Reactor poll timeout

use std::sync::Arc;

use sockmux::{Family, Reactor, ReactorConfig, Socket};
use sockmux_core::{logging, smx_info};

fn main() {
    println!("=== sockmux echo demo ===\n");
    logging::init();

    let reactor = Reactor::new(ReactorConfig::default());

    let listener = Socket::listen(0, Family::Ipv4).expect("listen failed");
    let port = listener.local_port().expect("getsockname failed");
    println!("listening on 127.0.0.1:{}", port);

    // Client on its own thread: send a line, block for the echo.
    let client_thread = std::thread::spawn(move || {
        let client = Socket::connect("127.0.0.1", port, Family::Any).expect("connect failed");
        client
            .write_all(b"hello through the reactor")
            .expect("write failed");
        let mut buf = [0u8; 256];
        let n = client.read(&mut buf).expect("read failed");
        println!("client received echo: {}", String::from_utf8_lossy(&buf[..n]));
    });

    let conn = Arc::new(listener.accept().expect("accept failed"));
    println!("accepted connection from {:?}", conn.remote_addr());

    let echo_conn = conn.clone();
    reactor.register_read_callback(&conn, move |data| {
        if data.is_empty() {
            smx_info!("peer closed");
            return;
        }
        smx_info!("echoing {} bytes", data.len());
        let _ = echo_conn.write_all(data);
    });

    client_thread.join().expect("client thread panicked");

    reactor.unregister(&conn);
    let stats = reactor.shutdown();
    println!(
        "\nreactor stats: {} polls, {} dispatches, {} bytes",
        stats.polls, stats.dispatches, stats.bytes_read
    );
}
