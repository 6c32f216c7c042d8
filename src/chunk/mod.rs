//! Columnar chunks, selection vectors and chunk buffers

mod collection;
mod data_chunk;
mod selection;

pub use collection::ChunkCollection;
pub use data_chunk::DataChunk;
pub use selection::SelectionVector;
