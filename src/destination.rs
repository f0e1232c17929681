//! Push side of the streaming pipeline.

use crate::{Buffer, Error};
use std::future::Future;

/// Interface any driver must implement to accept outgoing bytes from a
/// producer.
///
/// A destination is owned by exactly one task. It is either open or closed,
/// and closing is one-way: the first [Destination::close] records its cause
/// and every later operation fails with a clone of that cause.
/// [Destination::await_free_space] and [Destination::flush] are the only
/// suspension points.
pub trait Destination: Send {
    /// Returns the recorded close cause, if any.
    fn close_cause(&self) -> Option<&Error>;

    /// Consumes as many readable bytes from `buf` as currently fit,
    /// advancing its read cursor, and returns the count.
    ///
    /// Zero is a legal result and means the destination is full right now;
    /// the caller loops with [Destination::await_free_space].
    fn write(&mut self, buf: &mut Buffer) -> Result<usize, Error>;

    /// Suspends until at least one byte can be written.
    ///
    /// Capacity must be re-checked after resuming: a wakeup may deliver
    /// less space than the caller wants.
    fn await_free_space(&mut self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Drives internally held bytes downstream, completely or not at all.
    fn flush(&mut self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Closes the destination.
    ///
    /// `None` records [Error::Closed]. Only the first call takes effect;
    /// later causes are dropped.
    fn close(&mut self, cause: Option<Error>);
}
