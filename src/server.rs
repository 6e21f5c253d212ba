//! Listener / dispatcher: owns the well-known-port socket,
//! receives the first datagram of each conversation, and spawns one
//! session per request bound to a fresh ephemeral endpoint connected to
//! the client's address.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::{run_receiver, run_sender};
use crate::error::SessionError;
use crate::io::PacketIo;
use crate::opener;
use crate::packet::Packet;

/// Run the dispatcher's receive loop until `shutdown` fires. Never awaits
/// a spawned session; each request gets its own task.
pub async fn run(cfg: Config, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let listen_addr = SocketAddr::new(cfg.address, cfg.port);
    let listener = UdpSocket::bind(listen_addr).await?;
    info!(addr = %listen_addr, "listening");

    let cfg = Arc::new(cfg);
    let mut buf = vec![0u8; cfg.blocksize.max(512)];

    loop {
        tokio::select! {
            result = listener.recv_from(&mut buf) => {
                let (n, peer) = result?;
                handle_datagram(&buf[..n], peer, Arc::clone(&cfg));
            }
            _ = shutdown.changed() => {
                info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Parse one datagram received on the listener socket. Parse failures and
/// non-request packets are silently dropped; a valid
/// `Request` spawns a session task.
fn handle_datagram(datagram: &[u8], peer: SocketAddr, cfg: Arc<Config>) {
    let packet = match Packet::parse(datagram) {
        Ok(p) => p,
        Err(e) => {
            debug!(%peer, error = %e, "dropping malformed datagram");
            return;
        }
    };

    match packet {
        Packet::Request {
            filename,
            is_write,
            opts,
            ..
        } => {
            let _ = opts; // option pairs preserved on the wire, ignored by the engine
            tokio::spawn(run_session(peer, filename, is_write, cfg));
        }
        other => {
            debug!(%peer, packet = %other, "dropping non-request packet on listener");
        }
    }
}

/// Bootstrap and run one session.
async fn run_session(peer: SocketAddr, filename: String, is_write: bool, cfg: Arc<Config>) {
    let bind_addr: SocketAddr = if peer.is_ipv6() {
        "[::]:0".parse().unwrap()
    } else {
        "0.0.0.0:0".parse().unwrap()
    };

    let socket = match UdpSocket::bind(bind_addr).await {
        Ok(s) => s,
        Err(e) => {
            warn!(%peer, error = %e, "failed to bind session socket");
            return;
        }
    };
    if let Err(e) = socket.connect(peer).await {
        warn!(%peer, error = %e, "failed to connect session socket");
        return;
    }
    let socket = Arc::new(socket);
    let io = PacketIo::new(Arc::clone(&socket), 4 + cfg.blocksize, cfg.trace);

    let outcome = if is_write {
        match opener::create_write(&cfg.dir, &filename).await {
            Ok(file) => {
                info!(%peer, %filename, "WRQ");
                run_receiver(io.clone(), file, &cfg).await
            }
            Err(err_packet) => {
                let _ = io.send(&err_packet).await;
                return;
            }
        }
    } else {
        match opener::open_read(&cfg.dir, &filename).await {
            Ok((file, _len)) => {
                info!(%peer, %filename, "RRQ");
                run_sender(io.clone(), file, &cfg).await
            }
            Err(err_packet) => {
                let _ = io.send(&err_packet).await;
                return;
            }
        }
    };

    report_outcome(&io, peer, &filename, outcome).await;
}

/// Translate an engine outcome into an outbound `ERROR` packet where
/// appropriate, and log it either way.
async fn report_outcome(
    io: &PacketIo,
    peer: SocketAddr,
    filename: &str,
    outcome: Result<(), SessionError>,
) {
    match outcome {
        Ok(()) => {
            info!(%peer, %filename, "transfer complete");
        }
        Err(err) => {
            warn!(%peer, %filename, error = %err, "session ended with error");
            if err.should_reply() {
                let packet = Packet::error(crate::packet::ErrorCode::Undefined, "internal error");
                if let Err(send_err) = io.send(&packet).await {
                    warn!(%peer, error = %send_err, "failed to send error packet");
                }
            }
        }
    }
}
