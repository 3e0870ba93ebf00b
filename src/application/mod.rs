/// Process wiring (§3.10, §4.10): `Configuration`, the composition root
/// `Application`, and logging install.
pub mod application;
pub mod config;
pub mod logging;

pub use application::Application;
pub use config::Configuration;
