//! Pooled byte buffers with zero-copy splitting and buffered asynchronous
//! byte streams.
//!
//! This crate provides the plumbing for byte I/O without committing to any
//! particular transport: fixed-capacity [Buffer]s with explicit read/write
//! cursors, a [CompositeBuffer] that chains segments behind one logical
//! address space, an [ObjectPool] for recycling expensive instances (and a
//! [BufferPool] built on top of it), and [Source]/[Destination] traits for
//! asynchronous endpoints with buffered adapters that batch small typed
//! operations across flush boundaries.
//!
//! # Terminology
//!
//! A `Buffer` is a view over a shared backing store. Views created by
//! [Buffer::take_head] and [Buffer::steal] cover disjoint windows of the
//! same store; the store is returned to its pool (or freed) when the last
//! view is dropped. A `Source` produces buffers, a `Destination` consumes
//! them, and the `Buffered*` adapters sit in front of either to serve typed
//! reads and writes that may straddle buffer boundaries.
//!
//! # Concurrency
//!
//! Pools are safe to share across threads. Everything else is single-owner:
//! buffers and endpoints may be sent between tasks but must not be mutated
//! concurrently.
//!
//! # Testing
//!
//! The [mocks] module provides an in-memory [Source]/[Destination] pair
//! linked by a bounded channel, useful for exercising endpoint code without
//! a transport.

use std::{io::Error as IoError, sync::Arc};
use thiserror::Error;

mod buffer;
mod buffered;
mod counter;
mod destination;
pub mod mocks;
mod pool;
mod source;

pub use buffer::{Buffer, BufferPool, BufferPoolConfig, CompositeBuffer};
pub use buffered::{BufferedDestination, BufferedSource};
pub use counter::ReferenceCounter;
pub use destination::Destination;
pub use pool::{Lifecycle, ObjectPool, WeakPool};
pub use source::Source;

/// Default capacity in bytes of a pooled [Buffer].
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

/// Default bound on a pool's idle list.
pub const DEFAULT_POOL_CAPACITY: usize = 2000;

/// Errors that can occur when interacting with streams.
///
/// The enum is `Clone` so a cause captured by [Source::cancel] or
/// [Destination::close] can be re-raised by every subsequent operation.
/// Contract violations (cursor misuse, invalid split indices, pool misuse)
/// are programming errors and panic instead.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("cancelled")]
    Cancelled,
    #[error("closed")]
    Closed,
    #[error("unexpected end of stream")]
    UnexpectedEof,
    #[error("io error: {0}")]
    Io(Arc<IoError>),
}

impl From<IoError> for Error {
    fn from(err: IoError) -> Self {
        Self::Io(Arc::new(err))
    }
}
