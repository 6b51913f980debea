//! Headless project controller.
//!
//! [`Project`] owns the engine context, the track list and the clip pool,
//! and routes every edit and transport command through one place so that
//! queued voices stay in step with the timeline. Listeners receive typed
//! [`ProjectEvent`](oc_ir::ProjectEvent)s.

pub mod config;
mod listeners;
mod project;

pub use config::{default_config_path, load_config, load_default_config, parse_config, save_config, ConfigError};
pub use listeners::{Callback, ListenerId, Listeners};
pub use project::{Project, ProjectError};
