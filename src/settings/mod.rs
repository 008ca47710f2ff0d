pub mod manager;


pub use manager::{PanelSettings, Settings, SettingsManager};
