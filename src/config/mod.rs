mod settings;

pub use settings::{DetectorConfig, HubConfig, ServerConfig, Settings, UploadConfig};
