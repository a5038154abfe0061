use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Resource limits for the echo server
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Maximum size of a request line plus headers
    pub max_header_size: usize,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
    /// Maximum concurrent connections
    pub max_concurrent_connections: usize,
    /// Time allowed to receive one complete request, also the keep-alive idle timeout
    pub request_timeout: Duration,
    /// Maximum duplex message size in bytes
    pub max_message_size: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_header_size: 64 * 1024,
            max_body_size: 10 * 1024 * 1024, // 10MB
            max_concurrent_connections: 1024,
            request_timeout: Duration::from_secs(30),
            max_message_size: 64 * 1024 * 1024,
        }
    }
}

/// Connection tracking and management
#[derive(Debug)]
pub struct ConnectionTracker {
    active_connections: AtomicUsize,
    total_connections: AtomicU64,
    connection_semaphore: Arc<Semaphore>,
    max_connections: usize,
}

impl ConnectionTracker {
    pub fn new(max_connections: usize) -> Self {
        Self {
            active_connections: AtomicUsize::new(0),
            total_connections: AtomicU64::new(0),
            connection_semaphore: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        }
    }

    /// Claims a connection slot without waiting
    pub fn try_acquire(self: &Arc<Self>) -> Result<ConnectionGuard, ConnectionError> {
        let permit = Arc::clone(&self.connection_semaphore)
            .try_acquire_owned()
            .map_err(|e| match e {
                tokio::sync::TryAcquireError::NoPermits => ConnectionError::LimitReached {
                    limit: self.max_connections,
                },
                tokio::sync::TryAcquireError::Closed => ConnectionError::Closed,
            })?;

        let active = self.active_connections.fetch_add(1, Ordering::SeqCst) + 1;
        let total = self.total_connections.fetch_add(1, Ordering::SeqCst) + 1;

        tracing::debug!(
            active_connections = active,
            total_connections = total,
            "Connection acquired"
        );

        Ok(ConnectionGuard {
            _permit: permit,
            tracker: Arc::clone(self),
            start_time: Instant::now(),
        })
    }

    /// Get current metrics
    pub fn metrics(&self) -> ConnectionMetrics {
        ConnectionMetrics {
            active_connections: self.active_connections.load(Ordering::SeqCst),
            total_connections: self.total_connections.load(Ordering::SeqCst),
            available_slots: self.connection_semaphore.available_permits(),
            max_connections: self.max_connections,
        }
    }
}

/// RAII guard for connection tracking
#[derive(Debug)]
pub struct ConnectionGuard {
    _permit: OwnedSemaphorePermit,
    tracker: Arc<ConnectionTracker>,
    start_time: Instant,
}

impl ConnectionGuard {
    pub fn active_connections(&self) -> usize {
        self.tracker.active_connections.load(Ordering::SeqCst)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let active = self
            .tracker
            .active_connections
            .fetch_sub(1, Ordering::SeqCst)
            - 1;
        let duration = self.start_time.elapsed();

        tracing::debug!(
            active_connections = active,
            connection_duration_ms = duration.as_millis(),
            "Connection released"
        );
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection limit of {limit} reached")]
    LimitReached { limit: usize },
    #[error("Connection tracker closed")]
    Closed,
}

/// Connection metrics for monitoring
#[derive(Debug, Clone)]
pub struct ConnectionMetrics {
    pub active_connections: usize,
    pub total_connections: u64,
    pub available_slots: usize,
    pub max_connections: usize,
}

/// Size validator for request bodies
#[derive(Debug)]
pub struct SizeValidator {
    max_size: usize,
}

impl SizeValidator {
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }

    pub fn validate_size(&self, size: usize) -> Result<(), SizeError> {
        if size > self.max_size {
            Err(SizeError::TooLarge {
                actual: size,
                max: self.max_size,
            })
        } else {
            Ok(())
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SizeError {
    #[error("Request too large: {actual} bytes, maximum allowed: {max} bytes")]
    TooLarge { actual: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_tracker() {
        let tracker = Arc::new(ConnectionTracker::new(2));

        // Acquire two connections
        let guard1 = tracker.try_acquire().unwrap();
        let _guard2 = tracker.try_acquire().unwrap();
        assert_eq!(guard1.active_connections(), 2);

        // Third connection is rejected immediately
        assert!(matches!(
            tracker.try_acquire(),
            Err(ConnectionError::LimitReached { limit: 2 })
        ));

        // Drop one guard and try again
        drop(guard1);
        let _guard3 = tracker.try_acquire().unwrap();

        let metrics = tracker.metrics();
        assert_eq!(metrics.active_connections, 2);
        assert_eq!(metrics.total_connections, 3);
        assert_eq!(metrics.available_slots, 0);
        assert_eq!(metrics.max_connections, 2);
    }

    #[test]
    fn test_size_validator() {
        let validator = SizeValidator::new(100);

        assert!(validator.validate_size(50).is_ok());
        assert!(validator.validate_size(100).is_ok());
        assert!(validator.validate_size(101).is_err());
        assert_eq!(validator.max_size(), 100);
    }
}
