//! Reliability bookkeeping layered on top of an unreliable transport
//! (`spec.md` §4.11).

mod chunk_list;

pub use chunk_list::{SendingChunk, SendingChunkList};
