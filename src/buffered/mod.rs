//! Value-level adapters over raw endpoints.
//!
//! [BufferedSource] and [BufferedDestination] front an endpoint with typed,
//! big-endian operations. A multi-byte value that does not fit the space at
//! hand is split into halves recursively (a `u64` into two `u32`s, down to
//! single bytes), high half first, so values cross buffer and flush
//! boundaries without ever needing more contiguous room than one byte. The
//! wire byte sequence is identical either way.

mod destination;
mod source;

pub use destination::BufferedDestination;
pub use source::BufferedSource;
