use std::pin::Pin;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::time::{Instant, timeout_at};

use crate::error::{AiError, AiErrorCode};
use crate::types::{DeltaKind, RawDelta};

/// Finite, read-once sequence of deltas for one upstream call.
///
/// An `Err` item is terminal: producers stop after yielding it.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<RawDelta, AiError>> + Send>>;

pub fn delta_stream_from(items: Vec<Result<RawDelta, AiError>>) -> DeltaStream {
    Box::pin(futures_util::stream::iter(items))
}

/// Drains `stream` and returns the concatenated `Text` deltas.
pub async fn collect_text(mut stream: DeltaStream) -> Result<String, AiError> {
    let mut text = String::new();
    while let Some(delta) = stream.next().await {
        let delta = delta?;
        if delta.kind == DeltaKind::Text {
            text.push_str(&delta.text);
        }
    }
    Ok(text)
}

/// Ends `stream` with a `ProviderTimeout` error once `deadline` passes.
///
/// `timeout` is only used in the error message.
pub(crate) fn bound_by(mut stream: DeltaStream, deadline: Instant, timeout: Duration) -> DeltaStream {
    Box::pin(async_stream::stream! {
        loop {
            match timeout_at(deadline, stream.next()).await {
                Ok(Some(Ok(delta))) => yield Ok(delta),
                Ok(Some(Err(error))) => {
                    yield Err(error);
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    yield Err(timeout_error(timeout));
                    break;
                }
            }
        }
    })
}

pub(crate) fn timeout_error(timeout: Duration) -> AiError {
    AiError::new(
        AiErrorCode::ProviderTimeout,
        format!("upstream call exceeded {} ms", timeout.as_millis()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collect_text_skips_thinking() {
        let stream = delta_stream_from(vec![
            Ok(RawDelta::thinking("hmm")),
            Ok(RawDelta::text("Hel")),
            Ok(RawDelta::text("lo")),
        ]);
        assert_eq!(collect_text(stream).await.expect("collect"), "Hello");
    }

    #[tokio::test]
    async fn collect_text_propagates_first_error() {
        let stream = delta_stream_from(vec![
            Ok(RawDelta::text("partial")),
            Err(AiError::new(AiErrorCode::ProviderTransport, "reset")),
        ]);
        let error = collect_text(stream).await.expect_err("error should surface");
        assert_eq!(error.code, AiErrorCode::ProviderTransport);
    }

    #[tokio::test]
    async fn deadline_keeps_early_deltas_then_times_out() {
        let slow: DeltaStream = Box::pin(async_stream::stream! {
            yield Ok(RawDelta::text("early"));
            tokio::time::sleep(Duration::from_secs(5)).await;
            yield Ok(RawDelta::text("late"));
        });

        let timeout = Duration::from_millis(50);
        let items: Vec<_> = bound_by(slow, Instant::now() + timeout, timeout)
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok(RawDelta::text("early")));
        let error = items[1].clone().expect_err("second item should be the timeout");
        assert_eq!(error.code, AiErrorCode::ProviderTimeout);
    }

    #[tokio::test]
    async fn deadline_stops_after_inner_error() {
        let failing = delta_stream_from(vec![
            Err(AiError::new(AiErrorCode::ProviderHttp, "500")),
            Ok(RawDelta::text("never")),
        ]);
        let timeout = Duration::from_secs(1);
        let items: Vec<_> = bound_by(failing, Instant::now() + timeout, timeout)
            .collect()
            .await;
        assert_eq!(items.len(), 1);
    }
}
