//! Content-defined chunking: a FastCDC boundary search driven by a gear
//! table, plus an adaptive sizer that retunes the target chunk size to
//! measured network throughput.

mod adaptive;
mod fastcdc;
mod gear;

pub use adaptive::{AdaptiveSizer, ProbeError, SpeedProbe};
pub use fastcdc::{chunk_bytes, Chunk, ChunkerConfig, ChunkerError, FastCdcChunker};
