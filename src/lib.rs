//! Asterisk Manager Interface (AMI) client for Rust
//!
//! This crate provides an async Rust client for the Asterisk Manager
//! Interface, the line-oriented protocol used to control and observe an
//! Asterisk server over TCP (port 5038 by default).
//!
//! # Architecture
//!
//! One connection carries both responses to the actions you send and events
//! the server pushes at any time. The client runs a single request cycle at a
//! time: it writes an action, then reads packets until the matching
//! `Response` arrives. Every event read in the meantime is dispatched to the
//! [`EventRouter`] before the call returns, so none are queued or lost.
//!
//! # Examples
//!
//! ## Connect and send an action
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use asterisk_ami_tokio::{AmiClient, AmiConfig, AmiError, EventRouter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AmiError> {
//!     let config = AmiConfig::new().with_server("pbx.example.com:5038");
//!     let client = AmiClient::new(config, Arc::new(EventRouter::new()));
//!
//!     client.connect(None, Some("admin"), Some("secret")).await?;
//!
//!     let response = client.send_request("Ping", [("ActionID", "1")]).await?;
//!     println!("Ping: {}", response.get("Ping").unwrap_or("?"));
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Event handlers
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use asterisk_ami_tokio::{AmiClient, AmiConfig, EventRouter};
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = Arc::new(EventRouter::new());
//!     router.register("Hangup", |ctx| {
//!         println!("{} hung up on {}", ctx.packet.get("Channel").unwrap_or("?"), ctx.server);
//!         Value::Null
//!     });
//!     router.register("*", |ctx| {
//!         println!("event {}", ctx.event);
//!         Value::Null
//!     });
//!
//!     let config = AmiConfig::new().with_read_timeout(Some(Duration::from_secs(1)));
//!     let client = AmiClient::new(config, router);
//!     client.connect(None, None, None).await?;
//!     client.events("call").await?;
//!
//!     // Idle pump: dispatch events, return on each quiet second.
//!     loop {
//!         client.wait_response(true).await?;
//!     }
//! }
//! ```

pub mod actions;
pub mod command;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod packet;
pub mod protocol;
pub mod router;

pub use actions::Originate;
pub use command::Action;
pub use config::AmiConfig;
pub use connection::{AmiClient, ConnectionState};
pub use constants::DEFAULT_AMI_PORT;
pub use error::{AmiError, AmiResult};
pub use packet::{Packet, PacketKind, ParseResponseStatusError, ResponseStatus};
pub use protocol::PacketReader;
pub use router::{EventContext, EventHandler, EventRouter};
