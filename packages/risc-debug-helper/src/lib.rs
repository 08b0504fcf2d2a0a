// Crate root: declare modules and control visibility
pub mod config;
pub mod context;
pub mod debug;
pub mod error;
pub mod firmware;
pub mod location;
pub mod risc;
pub mod utils;

// Re-export commonly used API from the library for binaries/tests
pub use config::SessionConfig;
pub use context::{load_context, ExecutionContext};
pub use error::{CapabilityError, DebugError, LoadError, SymbolError, TransportError};
pub use firmware::Firmware;
pub use location::CoreLocation;
pub use risc::{RegisterTransport, RiscDebug, RiscLoader, RiscTarget};
