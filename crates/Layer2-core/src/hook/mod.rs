//! # Hook System
//!
//! Named extension points the host calls and plugins contribute to.
//!
//! ## Extension points
//!
//! - `render.user-message-footer`, `render.assistant-message-footer`,
//!   `render.message-content`: content attached to messages
//! - `toolbar.button`, `input.actions`, `sidebar.panel`, `settings.section`:
//!   UI injection
//! - `message.before-send`, `message.after-receive`: message observers
//!
//! ## Results
//!
//! Handlers return primitives, structural elements (`text`, `badge`,
//! `button`, `link`, `icon`, `container`, `custom`) or lists of those.
//!
//! ```ignore
//! let dispatcher = HookDispatcher::new(&config.hooks);
//! dispatcher.register(HookName::ToolbarButton, "acme.export", handler, 10);
//!
//! for result in flatten_results(dispatcher.execute(HookName::ToolbarButton, &ctx).await) {
//!     // draw it
//! }
//! ```

mod dispatcher;
mod types;

pub use dispatcher::{handler_fn, HookDispatcher, HookHandler, HookRegistration, PendingHandler};
pub(crate) use types::panic_message;
pub use types::{
    consume_results, flatten_results, HookContext, HookContribution, HookElement, HookName,
    HookResult, Primitive,
};
