//! HTTP distribution layer
//!
//! Encoded output is published through path-addressed file endpoints,
//! multiplexed over shared port listeners:
//!
//! ```text
//!                    PortRegistry (process-wide)
//!                    ┌──────────────────────────┐
//!                    │ port → PortListener      │
//!                    └───────────┬──────────────┘
//!                                │ accept loop per port
//!                    ┌───────────┴──────────────┐
//!                    │ path → FileEndpoint      │
//!                    └───────────┬──────────────┘
//!            write() ◄───────────┤
//!       (muxer flush)            ▼
//!                      one snapshot per client request
//! ```
//!
//! Clients receive the buffer current at request time as a complete,
//! non-keep-alive response; unknown paths get a listing of every
//! registered path on the port. There is no authentication.

pub mod address;
pub mod endpoint;
pub mod listener;
pub mod registry;

pub use address::parse_address;
pub use endpoint::FileEndpoint;
pub use listener::PortListener;
pub use registry::{HttpFileWriter, PortRegistry};
