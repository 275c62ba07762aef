//! Phase timing for scan diagnostics.

use std::time::Instant;

/// RAII timer that logs elapsed time on drop.
///
/// # Example
/// ```ignore
/// let _t = Timed::debug("grid build");
/// // ... do work ...
/// // logs "grid build: 1.234ms" when _t is dropped
/// ```
pub(crate) struct Timed {
    name: &'static str,
    start: Instant,
}

impl Timed {
    /// Create a new timer that logs at DEBUG level.
    pub(crate) fn debug(name: &'static str) -> Self {
        log::trace!("{}...", name);
        Self {
            name,
            start: Instant::now(),
        }
    }
}

impl Drop for Timed {
    fn drop(&mut self) {
        log::debug!("{}: {:.3?}", self.name, self.start.elapsed());
    }
}
