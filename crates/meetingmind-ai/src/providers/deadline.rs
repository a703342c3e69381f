use std::time::Duration;

use tokio::time::{Instant, timeout_at};

use crate::provider::{Provider, ProviderFuture, ProviderRef};
use crate::stream::{DeltaStream, bound_by, timeout_error};
use crate::types::{GenerateRequest, ProviderKind};

/// Bounds each upstream call, connection and body included, by one timeout.
///
/// Deltas delivered before the deadline still reach the caller; the stream
/// then ends with a `ProviderTimeout` error.
pub struct DeadlineProvider {
    inner: ProviderRef,
    timeout: Duration,
}

impl DeadlineProvider {
    pub fn wrap(inner: ProviderRef, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl Provider for DeadlineProvider {
    fn kind(&self) -> ProviderKind {
        self.inner.kind()
    }

    fn is_configured(&self) -> bool {
        self.inner.is_configured()
    }

    fn generate(&self, request: GenerateRequest) -> ProviderFuture<'_, DeltaStream> {
        Box::pin(async move {
            let deadline = Instant::now() + self.timeout;
            let stream = match timeout_at(deadline, self.inner.generate(request)).await {
                Ok(result) => result?,
                Err(_) => return Err(timeout_error(self.timeout)),
            };
            Ok(bound_by(stream, deadline, self.timeout))
        })
    }
}
