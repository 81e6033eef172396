//! Configuration: path resolution and operator settings

pub mod paths;
pub mod settings;

pub use paths::PayguardPaths;
pub use settings::Settings;
