//! Client lifecycle management: exclusive ownership of the automation-client
//! handle, the lifecycle state machine, and the transport seam.

mod controller;
mod process;
mod transport;
mod types;


pub use controller::{ClientController, ControllerConfig};
pub use process::{ProcessTransport, ProcessTransportFactory};
pub use transport::{Transport, TransportError, TransportEvent, TransportFactory};
pub use types::{ClientError, ClientState, QrArtifact, QrSnapshot};
