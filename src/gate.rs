use tokio::sync::{Semaphore, SemaphorePermit};

use crate::error::FetchError;

/// Counting limiter for requests in flight.
///
/// A request holds its [`SemaphorePermit`] for as long as it runs; the slot
/// is returned when the permit drops, whether the request succeeded, failed
/// or was cancelled by the batch deadline.
#[derive(Debug)]
pub struct AdmissionGate {
    slots: Semaphore,
    capacity: usize,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Semaphore::new(capacity),
            capacity,
        }
    }

    /// Waits for a free slot.
    pub async fn enter(&self) -> Result<SemaphorePermit<'_>, FetchError> {
        self.slots
            .acquire()
            .await
            .map_err(|_| FetchError::Other("admission gate closed".to_owned()))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }
}
