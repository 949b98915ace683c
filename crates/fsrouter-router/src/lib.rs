//! # fsrouter router core
//!
//! The control plane that sits between file-requesting clients and a pool of
//! storage nodes: a connection-classifying dispatcher, a pluggable
//! load-scheduling engine over a priority structure, and the feedback loop
//! that folds asynchronously arriving health reports back into scheduling
//! decisions.
//!
//! Storage nodes dial in and announce themselves; clients dial in and get
//! matched to the currently-best node; nodes report response-time averages
//! that re-rank them. File bytes never pass through this crate — the node
//! opens a data-transfer listener and the router only relays its address.

pub mod dispatcher;
pub mod error;
pub mod node;
pub mod pending;
pub mod scheduler;
pub mod telemetry;

pub use dispatcher::{Router, RouterContext};
pub use error::{Result, RouterError};
pub use node::NodeHandle;
pub use pending::PendingClients;
pub use scheduler::{Policy, Scheduler};
pub use telemetry::{Telemetry, TelemetryEvent};
