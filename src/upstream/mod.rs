//! Upstream broker connectivity: authenticated WebSocket connections, their
//! JSON wire format, and the reconnect state machine that keeps them alive.

pub mod connector;
pub mod feed;
pub mod supervisor;

pub use connector::{ConnectorState, EventSink, UpstreamConnector};
pub use feed::{Feed, parse_frame};
pub use supervisor::{ConnectorHealth, HealthSummary, StreamSupervisor, StreamSupervisorConfig};
