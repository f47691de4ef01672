//! Network-backed text and speech providers.
//!
//! Both providers share one HTTP transport abstraction and a bounded retry
//! policy: rate limits and server errors back off and retry, credential and
//! other client errors fail at once.

pub mod http;
pub mod speech;
pub mod text;

pub use http::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, RetryPolicy};
pub use speech::OpenAiSpeechProvider;
pub use text::{format_fire_time, OpenAiTextProvider};
