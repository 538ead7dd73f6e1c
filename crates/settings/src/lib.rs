pub mod config;

pub use config::{
    DecodePolicy, ResolutionPolicy, ScanConfig, SessionConfig, ShellConfig, ShellConfigError,
    ShellConfigStore,
};
