//! # Desktop Bridge Implementations
//!
//! Native implementations of the bridge traits for macOS, Windows and Linux:
//! - `HttpClient` using `reqwest`, including streamed `PUT` uploads
//! - `PushChannel` using `tokio-tungstenite` WebSockets
//! - `FileSource` backed by `tokio::fs`
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{LocalFileSource, ReqwestHttpClient, WebSocketPushChannel};
//!
//! #[core_async::main]
//! async fn main() -> anyhow::Result<()> {
//!     let http = ReqwestHttpClient::new()?;
//!     let push = WebSocketPushChannel::new("wss://mkv2cast.example/ws/");
//!     let file = LocalFileSource::open("/videos/movie.mkv").await?;
//!     // hand these to CoreConfig::builder()
//!     Ok(())
//! }
//! ```

mod file;
mod http;
mod push;

pub use file::LocalFileSource;
pub use http::ReqwestHttpClient;
pub use push::WebSocketPushChannel;
