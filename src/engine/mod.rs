//! The transfer engine: the sender and receiver state
//! machines, each built from a reader task that filters incoming packets
//! and a main task that drives the retransmit loop.

pub mod receiver;
pub mod sender;

pub use receiver::run_receiver;
pub use sender::run_sender;
