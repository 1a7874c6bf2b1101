//! Persistent index: key-space layout, metadata records, and the writer.

mod meta;
mod store;
mod writer;

pub use meta::{DocKeysRecord, ViewMeta, RECORD_FORMAT_VERSION};
pub use store::{IndexRow, IndexStore, RangeEndpoint, RowCursor};
pub use writer::IndexWriter;
