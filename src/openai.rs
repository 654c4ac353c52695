//! Shared OpenAI client construction.

use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Default request timeout. Whisper uploads of hour-long audio regularly run
/// for minutes, so this is deliberately far above reqwest's default.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Create an OpenAI client for transcription and embedding calls.
pub fn create_client() -> Client<OpenAIConfig> {
    create_client_with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
}

/// Create an OpenAI client with an explicit request timeout.
pub fn create_client_with_timeout(timeout: Duration) -> Client<OpenAIConfig> {
    let http_client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .expect("reqwest client construction cannot fail with these options");

    Client::with_config(OpenAIConfig::default()).with_http_client(http_client)
}
