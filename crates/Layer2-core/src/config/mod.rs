//! # Plugin Config
//!
//! Schema-driven configuration scoped per plugin id.
//!
//! - `service.rs` - ConfigService (defaults, validation, load/save against the SettingsStore)
//! - `form.rs` - settings form descriptors derived from a ConfigSchema
//!
//! ## Usage
//!
//! ```ignore
//! use plughost_core::config::ConfigService;
//!
//! let service = ConfigService::new(store);
//! service.register_schema("acme.retry", manifest.config_schema.clone());
//!
//! // Rejected as a whole if any value fails validation
//! service.save("acme.retry", &values)?;
//! let current = service.load("acme.retry")?;
//! ```

mod form;
mod service;

pub use form::{describe_schema, FieldDescriptor, Widget};
pub use service::ConfigService;
