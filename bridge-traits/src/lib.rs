//! # Host Bridge Traits
//!
//! Capability traits the mkv2cast client core needs from its host.
//!
//! The orchestration crates (`core-upload`, `core-jobs`, `core-telemetry`)
//! never open sockets or files themselves. They receive these traits through
//! `CoreConfig`, which lets desktop builds plug in `bridge-desktop` while
//! tests plug in scripted fakes.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - request/response calls plus streamed uploads
//! - [`PushChannel`](push::PushChannel) - per-topic server push (WebSocket on desktop)
//! - [`FileSource`](file::FileSource) - a user-selected file: name, size, head bytes, chunk stream
//! - [`Clock`](time::Clock) - wall-clock source
//! - [`LoggerSink`](time::LoggerSink) - forward structured logs to the host
//!
//! ## Errors
//!
//! Every trait reports failures as [`BridgeError`](error::BridgeError).
//! `Network` means the transport failed before a response existed; an HTTP
//! response with a 4xx/5xx status is *not* an error at this layer, callers
//! inspect `HttpResponse::status` themselves.
//!
//! ## Thread Safety
//!
//! All traits are `Send + Sync`; implementations are shared as `Arc<dyn _>`
//! across tasks.

pub mod error;
pub mod file;
pub mod http;
pub mod push;
pub mod time;

pub use error::BridgeError;

pub use file::{ByteStream, FileSource, InMemoryFile};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy, UploadRequest};
pub use push::{PushChannel, PushFrame, PushSubscription};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, SystemClock};
