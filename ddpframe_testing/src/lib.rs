//! Utilities for driving a [`DdpApp`](ddpframe::app::DdpApp) over the
//! in-memory transport during tests.
//!
//! [`TestClient`] spawns a connection actor for the app and exposes the
//! client side of the connection as decoded [`Message`](ddpframe::Message)
//! values.
//!
//! ```rust
//! use ddpframe::{app::DdpApp, context::MethodContext};
//! use ddpframe_testing::TestClient;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let app = DdpApp::new().method("two", |_ctx: MethodContext| async { Ok(json!(2)) });
//! let mut client = TestClient::start(app);
//! client.handshake().await;
//! let reply = client.call("1", "two", vec![]).await;
//! assert_eq!(reply.result, Some(json!(2)));
//! # }
//! ```

pub mod client;
pub mod logging;
pub mod metrics;

pub use client::{RECV_TIMEOUT, TestClient};
pub use logging::{LoggerHandle, logger};
pub use self::metrics::{Recorded, with_recorder};
