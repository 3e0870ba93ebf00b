pub mod tracing;

pub use tracing::install_logging;
