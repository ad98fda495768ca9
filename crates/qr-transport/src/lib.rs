//! qr-transport: Moving payloads through animated QR codes
//!
//! Encodes payloads into EIP-19 framed chunks and collects scanned chunks
//! back into the original payload.

pub mod chunk;
pub mod collector;
pub mod resolution;

pub use chunk::{chunk_capacity, decode, encode, ChunkTag, QrChunk, MAX_PAGE_COUNT};
pub use collector::{PageCollector, ReassembleError};
pub use resolution::{ChunkPresets, QrResolution};
