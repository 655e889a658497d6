//! Streaming split of large ONIX messages into size-bounded parts.
//!
//! The [`SplitEngine`] walks the source once with a pull parser. The header
//! is buffered and replayed into every part; products are streamed straight
//! into the open [`PartWriter`], which publishes each finished part with an
//! atomic rename.

mod engine;
mod part;
mod types;

pub use engine::SplitEngine;
pub use part::{CountingWriter, PartProlog, PartWriter, PublishedPart};
pub use types::SplitReport;
