//! Pull side of the streaming pipeline.

use crate::{Buffer, Error};
use std::future::Future;

/// Interface any driver must implement to hand buffers of incoming bytes
/// to a consumer.
///
/// A source is owned by exactly one task. It is either open or cancelled,
/// and cancellation is one-way: the first [Source::cancel] records its
/// cause and every later operation fails with a clone of that cause.
/// [Source::await_content] is the only suspension point.
pub trait Source: Send {
    /// Returns the recorded cancellation cause, if any.
    fn cancel_cause(&self) -> Option<&Error>;

    /// Returns the buffer currently holding readable bytes.
    ///
    /// While the current buffer has unread content it is returned again and
    /// drained in place. Once exhausted it is released and the next buffer
    /// is handed out if one is already available, else `Ok(None)` tells the
    /// caller to [Source::await_content]. A returned buffer always has at
    /// least one readable byte.
    fn read(&mut self) -> Result<Option<&mut Buffer>, Error>;

    /// Suspends until more content is available.
    ///
    /// Resolves `true` when [Source::read] will yield a buffer and `false`
    /// when the stream is exhausted for good.
    fn await_content(&mut self) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Cancels the source, releasing any held buffer.
    ///
    /// `None` records [Error::Cancelled]. Only the first call takes effect;
    /// later causes are dropped.
    fn cancel(&mut self, cause: Option<Error>);
}
