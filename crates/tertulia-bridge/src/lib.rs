//! Tertulia Bridge - an N-to-N audio conference bridge.
//!
//! The bridge routes and mixes PCM16 audio between numbered slots. Endpoints
//! ("ports") attach to slots; unidirectional connections between slots carry
//! an optional per-edge gain. Once per tick the engine pulls one frame from
//! every transmitting port, mixes everything destined for each receiving
//! port (receive, connection, and transmit gains composed in a wide
//! accumulator, mean-normalized across simultaneous speakers, saturated to
//! 16-bit), and pushes the mixed result. Resampling and frame-size adaptation
//! bridge ports whose clock rate or frame duration differ from the bridge's.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tertulia_bridge::{Bridge, BridgeParams, MemoryPort};
//!
//! let bridge = Bridge::create(BridgeParams::default())?;
//! let slot = bridge.add_port(Box::new(port), Some("caller"))?;
//! bridge.connect(slot, tertulia_bridge::SlotId::MASTER, 0)?;
//!
//! // The caller owns the clock: one tick per frame period.
//! bridge.tick();
//! ```
//!
//! # Threading
//!
//! Mutating calls (`add_port`, `remove_port`, `connect`, `disconnect`) are
//! asynchronous: they validate synchronously, enqueue an operation, and
//! return. Operations apply FIFO at the start of the next [`Bridge::tick`],
//! and each completion is reported through the callback registered with
//! [`Bridge::set_op_cb`]. Level adjustments and enable flags take effect
//! immediately. With `worker_threads > 0` the tick fans per-sink mixing
//! across a worker pool and barriers before returning; `worker_threads = 0`
//! mixes on the caller thread with identical output.

pub mod bridge;
mod mix;
pub mod ops;
mod parallel;
pub mod port;
mod registry;

pub use bridge::{Bridge, BridgeOptions, BridgeParams};
pub use ops::{OpInfo, OpKind, OpParam, OpStatus};
pub use port::{AudioFormat, MediaKind, MemoryPort, Port, PortInfo, PortOp, SilencePort, VideoInfo};
pub use registry::{PortSnapshot, SlotId};

/// Error types for bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An argument is out of range or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The slot or connection does not exist.
    #[error("not found")]
    NotFound,

    /// No free slot is available.
    #[error("no free slot available")]
    CapacityExceeded,

    /// The port's configuration is incompatible with the bridge.
    #[error("invalid port configuration: {0}")]
    InvalidConfig(String),

    /// The media type cannot be handled.
    #[error("invalid media type")]
    InvalidMediaType,

    /// The operation is not supported by this port or bridge.
    #[error("not supported: {0}")]
    NotSupported(&'static str),

    /// An input reader reached the end of its data.
    #[error("end of file")]
    EndOfFile,

    /// An unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience result type for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;
