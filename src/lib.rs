// Module declarations
pub mod assistant;
pub mod browser;
pub mod error;
pub mod logging;
pub mod server;
pub mod settings;
