//! Provider-agnostic streaming of model output as ordered text/thinking deltas.

mod error;
mod provider;
mod providers;
mod stream;
mod types;

pub use error::{AiError, AiErrorCode};
pub use provider::{ClosureProvider, GenerateFn, Provider, ProviderFuture, ProviderRef};
pub use providers::{DeadlineProvider, ProviderRegistry};
pub use stream::{DeltaStream, collect_text, delta_stream_from};
pub use types::{DeltaKind, GenerateRequest, ProviderConfig, ProviderKind, RawDelta};
