pub mod binary_ic;
pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;

// Re-export key types for easier use by dependent crates
pub use binary_ic::{BinaryInfo, ClusterParams, Placement};
pub use catalog::{IcEntry, IcLog, SimulationEntry, SimulationLog, INFO_MARKER};
pub use config::{config, init_config, ClusterConfig, GravityModel};
pub use error::ClusterError;
pub use logging::{init_logging, LogOutput};
