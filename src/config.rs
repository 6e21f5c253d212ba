//! Process-wide configuration surface.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default DATA payload size and end-of-transfer threshold.
pub const BLOCK_SIZE: usize = 512;
/// Default per-retransmit deadline.
pub const TIMEOUT: Duration = Duration::from_secs(3);
/// Default retransmission budget per block.
pub const MAX_RETRIES: u32 = 5;

/// Runtime configuration for the dispatcher and every session it spawns.
#[derive(Debug, Clone)]
pub struct Config {
    pub address: IpAddr,
    pub port: u16,
    pub dir: PathBuf,
    pub blocksize: usize,
    pub timeout: Duration,
    pub max_retries: u32,
    /// Mirrors `--trace`: log every datagram sent/received.
    pub trace: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: IpAddr::from([0, 0, 0, 0]),
            port: 6969,
            dir: PathBuf::from("."),
            blocksize: BLOCK_SIZE,
            timeout: TIMEOUT,
            max_retries: MAX_RETRIES,
            trace: false,
        }
    }
}
