//! Sender state machine: server → client, driven by an RRQ.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::SessionError;
use crate::io::PacketIo;
use crate::packet::Packet;

/// Reader task: owns the session socket's receive side, forwards ACKs for
/// the block currently being sent, drops stale/duplicate ACKs and any
/// non-ACK, non-ERROR packet.
async fn reader_task(
    io: PacketIo,
    block: Arc<AtomicU32>,
    expected_tx: mpsc::Sender<()>,
    error_tx: mpsc::Sender<SessionError>,
) {
    loop {
        match io.recv().await {
            Ok(Ok(Packet::Ack { block: acked })) => {
                if acked == block.load(Ordering::Acquire) as u16 {
                    let _ = expected_tx.try_send(());
                }
                // Older (duplicate) ACKs are silently dropped; newer ACKs
                // are impossible by contract (lock-step transfer).
            }
            Ok(Ok(Packet::Error { code, message })) => {
                let _ = error_tx.try_send(SessionError::Remote { code, message });
                return;
            }
            Ok(Ok(_other)) => {
                // Any other packet kind (OACK, spurious RRQ/WRQ): dropped.
            }
            Ok(Err(parse_err)) => {
                let _ = error_tx.try_send(SessionError::Parse(parse_err));
                return;
            }
            Err(io_err) => {
                let _ = error_tx.try_send(SessionError::LocalIo(io_err));
                return;
            }
        }
    }
}

/// Read up to `buf.len()` bytes, looping until the buffer is full or the
/// source is at EOF. Returns the number of bytes actually read, which is
/// `< buf.len()` exactly when the file is exhausted.
async fn read_block(
    file: &mut tokio::fs::File,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..]).await?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

/// Drive a read transfer to completion: lock-step DATA/ACK, retransmit on
/// timeout, terminate by sending a DATA shorter than blocksize. `io` is a
/// `PacketIo` over a session socket already connected to the client.
pub async fn run_sender(
    io: PacketIo,
    mut file: tokio::fs::File,
    cfg: &Config,
) -> Result<(), SessionError> {
    let block = Arc::new(AtomicU32::new(1));
    let (expected_tx, mut expected_rx) = mpsc::channel::<()>(1);
    let (error_tx, mut error_rx) = mpsc::channel::<SessionError>(1);

    let reader = tokio::spawn(reader_task(
        io.clone(),
        Arc::clone(&block),
        expected_tx,
        error_tx,
    ));

    let mut buf = vec![0u8; cfg.blocksize];
    let mut at_eof = false;

    let result: Result<(), SessionError> = async {
        while !at_eof {
            let n = read_block(&mut file, &mut buf).await?;
            if n < cfg.blocksize {
                at_eof = true;
            }

            let current_block = block.load(Ordering::Acquire) as u16;
            let packet = Packet::Data {
                block: current_block,
                payload: buf[..n].to_vec(),
            };

            let mut tries = 0u32;
            loop {
                io.send(&packet).await?;

                let wait = async {
                    tokio::select! {
                        v = expected_rx.recv() => Ok(v),
                        v = error_rx.recv() => Err(v),
                    }
                };

                match tokio::time::timeout(cfg.timeout, wait).await {
                    Ok(Ok(Some(()))) => break,
                    Ok(Ok(None)) => {
                        return Err(SessionError::LocalIo(std::io::Error::new(
                            std::io::ErrorKind::BrokenPipe,
                            "reader task ended unexpectedly",
                        )));
                    }
                    Ok(Err(Some(err))) => return Err(err),
                    Ok(Err(None)) => {
                        return Err(SessionError::LocalIo(std::io::Error::new(
                            std::io::ErrorKind::BrokenPipe,
                            "reader task ended unexpectedly",
                        )));
                    }
                    Err(_elapsed) => {
                        tries += 1;
                        if tries >= cfg.max_retries {
                            return Err(SessionError::ClientTimeout(cfg.max_retries));
                        }
                    }
                }
            }

            block.fetch_add(1, Ordering::Release);
        }
        Ok(())
    }
    .await;

    reader.abort();
    result
}
