//! The cursor contract shared by every operator.

use cubeq_core::cell::Cell;
use cubeq_core::error::Result;
use cubeq_core::path::Path;

/// Stateful cursor over `(Path, value)` pairs in strictly increasing path order.
///
/// Invariants:
/// - `key()` is the empty path until the first successful `next()` and
///   after exhaustion.
/// - once `next()` returns false it keeps returning false until `reset()`.
/// - `reset()` rewinds to the initial state; a re-drain yields the same
///   sequence.
/// - an error from an evaluating operator (aggregation) is final: later
///   calls return it again, `reset()` included.
pub trait CellStream: Send {
    fn next(&mut self) -> Result<bool>;

    fn key(&self) -> &Path;

    /// Value at the current position; `Error::Internal` when unpositioned.
    fn value(&self) -> Result<f64>;

    fn reset(&mut self);

    /// Move forward to the first path `>= target`.
    ///
    /// A stream already positioned at or past `target` stays where it is.
    fn seek(&mut self, target: &Path) -> Result<bool> {
        if !self.key().is_empty() && self.key() >= target {
            return Ok(true);
        }
        while self.next()? {
            if self.key() >= target {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl<S: CellStream + ?Sized> CellStream for Box<S> {
    fn next(&mut self) -> Result<bool> {
        (**self).next()
    }

    fn key(&self) -> &Path {
        (**self).key()
    }

    fn value(&self) -> Result<f64> {
        (**self).value()
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn seek(&mut self, target: &Path) -> Result<bool> {
        (**self).seek(target)
    }
}

/// Pull every remaining cell out of a stream.
pub fn drain(stream: &mut dyn CellStream) -> Result<Vec<Cell>> {
    let mut out = Vec::new();
    while stream.next()? {
        out.push(Cell::new(stream.key().clone(), stream.value()?));
    }
    Ok(out)
}
