//! # sluice
//!
//! A live media ingest and fan-out server speaking RTMP over TCP. A
//! publisher pushes audio/video under `rtmp://host:port/<app>/<key>`;
//! any number of players pull the same path back and receive the live
//! stream plus a priming burst (metadata, decoder configs, and the
//! current GOP) so playback starts on a keyframe.
//!
//! Layering, bottom up:
//!
//! - [`amf`]: AMF0 value model and codec for the command surface
//! - [`protocol`]: handshake and the chunk-stream reader/writer
//! - [`media`]: FLV tag classification and the GOP priming buffer
//! - [`session`]: one reader task and one writer task per connection
//! - [`registry`]: path-keyed stream records, caches, and fan-out
//! - [`server`]: accept loop plus the event loop owning all shared state
//!
//! ```no_run
//! use sluice::{Config, RtmpServer};
//!
//! #[tokio::main]
//! async fn main() -> sluice::Result<()> {
//!     let server = RtmpServer::new(Config::default());
//!     server.run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```

pub mod amf;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod media;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;

pub use config::Config;
pub use error::{Error, Result};
pub use server::RtmpServer;
