//! Decision-loop orchestration for optrade: the per-cycle pipeline,
//! crash recovery from the persisted snapshot, and the interval service
//! with graceful shutdown.

pub mod cycle;
pub mod service;

pub use cycle::Engine;
pub use service::{run, ShutdownHandle};
