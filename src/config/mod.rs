mod environment;
mod settings;

pub use environment::Environment;
pub use settings::{
    ConversionSettings, RetrySettings, Settings, SplitSettings, StorageSettings, TrackerBackend,
    TrackerSettings,
};
