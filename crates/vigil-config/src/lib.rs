pub mod device;
pub mod error;
pub mod global;
pub mod loader;

pub use device::{DeviceConfig, StreamFormat};
pub use error::{ConfigError, Result};
pub use global::{RecordingConfig, SubscriptionConfig, SupervisorConfig, VigilConfig};
pub use loader::ConfigLoader;
