//! Byte-stream transport and session supervision for meter links.
//!
//! The crate is split in two layers:
//!
//! - [`StreamFramer`]: a sans-IO state machine owning the receive buffer,
//!   the watchdog and reopen timers and the session lifecycle. It is fed
//!   events (link opened, chunk received, timer due) and answers with
//!   [`Directive`]s for the link.
//! - [`MeterSession`]: the async driver that owns a [`Link`], performs
//!   the reads, sleeps until the next timer deadline and applies the
//!   framer's directives.
//!
//! ```text
//!                 +-----------+   chunk    +--------------+  buffer  +----------+
//!  serial port -->|   Link    |----------->| StreamFramer |--------->| Protocol |--> sink
//!                 +-----------+            +--------------+          +----------+
//!                       ^    open / close         |
//!                       +-------------------------+
//!                             (via MeterSession)
//! ```
//!
//! # Example
//!
//! ```
//! use meterlink_core::{FramerSettings, Measurements};
//! use meterlink_protocol::JsonEfrProtocol;
//! use meterlink_transport::{MeterSession, mock::MockLink};
//!
//! #[tokio::main]
//! async fn main() -> meterlink_core::Result<()> {
//!     let (link, handle) = MockLink::new();
//!     let protocol = JsonEfrProtocol::new(|set: &Measurements| println!("{} records", set.len()));
//!     let mut session = MeterSession::new(link, protocol, FramerSettings::default());
//!     let stop = session.cancellation_token();
//!
//!     handle.send(br#"{"billingData:": {}}"#.to_vec()).await?;
//!     stop.cancel();
//!     session.run().await
//! }
//! ```

#![allow(async_fn_in_trait)]

pub mod devices;
pub mod framer;
pub mod link;
pub mod mock;
pub mod serial;
pub mod session;
pub mod timer;

pub use devices::AnyLink;
pub use framer::{Directive, FramerState, StreamFramer};
pub use link::Link;
pub use serial::SerialLink;
pub use session::MeterSession;
pub use timer::Timer;
