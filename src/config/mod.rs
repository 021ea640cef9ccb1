//! Configuration module for grainline.
//!
//! Handles planner settings loaded from TOML.

mod settings;

pub use settings::{EnvironmentSettings, NamingSettings, PlannerSettings, SettingsError};
