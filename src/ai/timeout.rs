//! Timeout helpers
//!
//! Backend calls may take arbitrarily long; wrapping them here turns an
//! expired deadline into [`PetPalError::Timeout`] instead of a hang.
//!
//! ```ignore
//! let response = with_timeout(
//!     Duration::from_secs(120),
//!     provider.generate(&request),
//!     "model invocation",
//! ).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use crate::types::{PetPalError, Result};

/// Execute a fallible async operation with a deadline
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(PetPalError::timeout(operation_name, timeout)),
    }
}
