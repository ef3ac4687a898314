//! HTTP clients for the case-management API and the generative-text providers.

pub mod case_api;
pub mod llm;

pub use case_api::CaseApiClient;
pub use llm::{ChatCompletionsClient, LlmGenerator, ProviderKind, UnknownProvider};
