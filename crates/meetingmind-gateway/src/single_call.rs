use futures_util::StreamExt;
use meetingmind_ai::{GenerateRequest, ProviderRef};
use tracing::error;

use crate::error::RelayError;
use crate::events::{EventStream, InternalEvent};

/// Streams one adapter call as `Thinking` / `Text` events.
///
/// A failure before or during the call becomes one terminal `Error` event;
/// events already emitted stand.
pub fn run_single_call(provider: ProviderRef, request: GenerateRequest) -> EventStream {
    Box::pin(async_stream::stream! {
        let model_id = request.model_id.clone();
        let mut deltas = match provider.generate(request).await {
            Ok(deltas) => deltas,
            Err(failure) => {
                error!(model = %model_id, code = ?failure.code, "upstream call failed: {}", failure.message);
                yield InternalEvent::error(RelayError::from(failure).to_string());
                return;
            }
        };

        while let Some(delta) = deltas.next().await {
            match delta {
                Ok(delta) => yield InternalEvent::from_delta(delta),
                Err(failure) => {
                    error!(model = %model_id, code = ?failure.code, "upstream stream failed: {}", failure.message);
                    yield InternalEvent::error(RelayError::from(failure).to_string());
                    break;
                }
            }
        }
    })
}
