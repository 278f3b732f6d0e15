#![doc(html_root_url = "https://docs.rs/ddpframe/latest")]
//! Real-time publish/subscribe RPC server speaking a DDP-style protocol.
//!
//! Clients hold one long-lived websocket connection, call named methods and
//! subscribe to named publications. Each connection runs a
//! [`ConnectionActor`] that merges every subscription's documents into one
//! consistent view and pushes only the deltas.
//!
//! ```no_run
//! use ddpframe::{app::DdpApp, context::MethodContext, server::DdpServer};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), ddpframe::server::ServerError> {
//! let app = DdpApp::new().method("hello", |_ctx: MethodContext| async { Ok(json!("world")) });
//! DdpServer::new(app)
//!     .bind("127.0.0.1:3000".parse().expect("valid address"))?
//!     .run()
//!     .await
//! # }
//! ```

pub mod app;
pub mod codec;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod events;
pub mod ids;
pub mod merge;
pub mod message;
pub mod metrics;
pub mod panic;
pub mod push;
pub mod server;
pub mod session;
pub mod transport;

pub use app::DdpApp;
pub use connection::{ConnectionActor, SessionError};
pub use context::{MethodContext, SubscriptionContext, SubscriptionError};
pub use error::DdpError;
pub use message::{Fields, Message, MessageKind};
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_PROCESSED, SUBSCRIPTIONS_ACTIVE};
pub use server::DdpServer;
pub use session::{ConnectionId, RegistryHandle, SessionRegistry};
