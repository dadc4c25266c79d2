//! Shared small utilities (C12): a chunked reader over seekable sources and
//! a self-cleaning scratch-directory handle. The source's `expected<T,E>`
//! is not reproduced here — the target language's `Result` already fills
//! that role (see `DESIGN.md`).

mod incremental_reader;
mod tmpdir;

pub use incremental_reader::{IncrementalReader, DEFAULT_CHUNK_SIZE};
pub use tmpdir::TmpDir;
