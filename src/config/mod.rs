//! Configuration module for Pkgscope.

mod settings;

pub use settings::{ChannelSettings, Settings, SettingsError, WorkerSettings};
