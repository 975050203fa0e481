use std::future::Future;

use tracing::debug;

use crate::domain::repository::InvalidationPort;

// ── InvalidateOnWrite ────────────────────────────────────────────────────────

/// Wraps a write to legacy users or normalized rows so the unified view is
/// invalidated once the write has committed. Failed writes leave the view
/// untouched.
pub struct InvalidateOnWriteUseCase<P: InvalidationPort> {
    pub port: P,
}

impl<P: InvalidationPort> InvalidateOnWriteUseCase<P> {
    pub async fn execute<T, E, F>(&self, write: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let result = write.await;
        if result.is_ok() {
            self.port.invalidate();
        } else {
            debug!("write failed, unified view left as is");
        }
        result
    }
}
