//! inference-transport: the transport core of an LLM client.
//!
//! Sends requests to chat-completion style HTTP APIs with timeouts,
//! retries and cancellation, decodes their server-sent event streams
//! (delta-JSON and typed-event conventions) into one provider-agnostic
//! event sequence, and classifies every failure into a fixed taxonomy
//! with user-facing explanations.
//!
//! # Quick Start
//!
//! ```no_run
//! use futures::StreamExt;
//! use inference_transport::prelude::*;
//!
//! # async fn example() -> inference_transport::error::Result<()> {
//! let creds = Credentials::from_env("OPENAI_API_KEY", "OPENAI_BASE_URL", "https://api.openai.com/v1")?;
//! let body = serde_json::json!({
//!     "model": "gpt-4o-mini",
//!     "stream": true,
//!     "messages": [{"role": "user", "content": "Hello!"}],
//! });
//!
//! let client = TransportClient::new();
//! let mut events = client.stream_request(
//!     &creds.endpoint("chat/completions"),
//!     &creds.api_key,
//!     &body,
//!     RequestConfig::delta_json(),
//! );
//! while let Some(event) = events.next().await {
//!     match event {
//!         ProviderStreamEvent::TextDelta { text } => print!("{text}"),
//!         ProviderStreamEvent::Error(e) => eprintln!("{}", render_with_help(&e)),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod prelude;
pub mod provider;
pub mod sse;
pub mod stream;
pub mod types;
pub mod util;
