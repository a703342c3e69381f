use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::AiError;
use crate::stream::{DeltaStream, collect_text};
use crate::types::{GenerateRequest, ProviderKind};

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AiError>> + Send + 'a>>;

/// One upstream generation API behind the uniform delta contract.
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Whether credentials are present. Checked before any network call.
    fn is_configured(&self) -> bool;

    /// Starts a streaming call.
    ///
    /// Fails with `ProviderAuthMissing` before touching the network when
    /// credentials are absent, and with `ProviderHttp` / `ProviderTransport`
    /// when the call itself is rejected.
    fn generate(&self, request: GenerateRequest) -> ProviderFuture<'_, DeltaStream>;

    /// Non-streaming call: the concatenated text of `generate`.
    fn complete(&self, request: GenerateRequest) -> ProviderFuture<'_, String> {
        Box::pin(async move { collect_text(self.generate(request).await?).await })
    }
}

pub type ProviderRef = Arc<dyn Provider>;

pub type GenerateFn = Arc<dyn Fn(GenerateRequest) -> Result<DeltaStream, AiError> + Send + Sync>;

/// Provider backed by a closure. Used for local fakes and tests.
#[derive(Clone)]
pub struct ClosureProvider {
    pub kind: ProviderKind,
    pub configured: bool,
    pub generate: GenerateFn,
}

impl ClosureProvider {
    pub fn new<F>(kind: ProviderKind, generate: F) -> Self
    where
        F: Fn(GenerateRequest) -> Result<DeltaStream, AiError> + Send + Sync + 'static,
    {
        Self {
            kind,
            configured: true,
            generate: Arc::new(generate),
        }
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }
}

impl Provider for ClosureProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn generate(&self, request: GenerateRequest) -> ProviderFuture<'_, DeltaStream> {
        let generate = self.generate.clone();
        Box::pin(async move { generate(request) })
    }
}
