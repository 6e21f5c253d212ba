//! Receiver state machine: server ← client, driven by a WRQ.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::SessionError;
use crate::io::PacketIo;
use crate::packet::Packet;

/// Reader task: forwards only the DATA for `block + 1`; duplicates of the
/// previous block and anything out of order are dropped upstream so the
/// sender retries on its own timer.
async fn reader_task(
    io: PacketIo,
    block: Arc<AtomicU32>,
    expected_tx: mpsc::Sender<Vec<u8>>,
    error_tx: mpsc::Sender<SessionError>,
) {
    loop {
        match io.recv().await {
            Ok(Ok(Packet::Data {
                block: got,
                payload,
            })) => {
                let current = block.load(Ordering::Acquire) as u16;
                if got == current.wrapping_add(1) {
                    let _ = expected_tx.try_send(payload);
                }
            }
            Ok(Ok(Packet::Error { code, message })) => {
                let _ = error_tx.try_send(SessionError::Remote { code, message });
                return;
            }
            Ok(Ok(_other)) => {}
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

/// Drive a write transfer to completion: ACK the WRQ (block 0), then
/// lock-step ACK/DATA until a payload shorter than blocksize arrives.
/// Writes are buffered and flushed once on clean exit.
pub async fn run_receiver(
    io: PacketIo,
    file: tokio::fs::File,
    cfg: &Config,
) -> Result<(), SessionError> {
    let block = Arc::new(AtomicU32::new(0));
    let (expected_tx, mut expected_rx) = mpsc::channel::<Vec<u8>>(1);
    let (error_tx, mut error_rx) = mpsc::channel::<SessionError>(1);

    let reader = tokio::spawn(reader_task(
        io.clone(),
        Arc::clone(&block),
        expected_tx,
        error_tx,
    ));

    let mut writer = tokio::io::BufWriter::new(file);

    let result: Result<(), SessionError> = async {
        let mut at_eof = false;
        loop {
            let current = block.load(Ordering::Acquire) as u16;
            let mut tries = 0u32;
            let payload;

            loop {
                io.send(&Packet::Ack { block: current }).await?;

                if at_eof {
                    return Ok(());
                }

                let wait = async {
                    tokio::select! {
                        v = expected_rx.recv() => Ok(v),
                        v = error_rx.recv() => Err(v),
                    }
                };

                match tokio::time::timeout(cfg.timeout, wait).await {
                    Ok(Ok(Some(data))) => {
                        payload = data;
                        break;
                    }
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

            writer.write_all(&payload).await?;

            if payload.len() < cfg.blocksize {
                at_eof = true;
            }
            block.fetch_add(1, Ordering::Release);
        }
    }
    .await;

    reader.abort();

    if result.is_ok() {
        writer.flush().await?;
    }
    result
}
