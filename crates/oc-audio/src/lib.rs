//! Audio device hosts for octavo.

mod cpal_backend;
mod host;

pub use host::CpalHost;
