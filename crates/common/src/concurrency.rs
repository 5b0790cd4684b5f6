//! Sizing for the bounded concurrency limiter shared by enumeration and capture.

use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Number of permits for native-call fan-out.
///
/// An explicit `max_concurrency` wins; otherwise the machine's available
/// parallelism is used, falling back to 4 when it cannot be queried.
pub fn limiter_permits(max_concurrency: Option<usize>) -> usize {
    match max_concurrency {
        Some(n) => n.max(1),
        None => std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(4),
    }
}

/// Build the shared limiter.
pub fn concurrency_limiter(max_concurrency: Option<usize>) -> Arc<Semaphore> {
    Arc::new(Semaphore::new(limiter_permits(max_concurrency)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_limit_is_clamped_to_one() {
        assert_eq!(limiter_permits(Some(0)), 1);
        assert_eq!(limiter_permits(Some(3)), 3);
        assert!(limiter_permits(None) >= 1);
    }
}
