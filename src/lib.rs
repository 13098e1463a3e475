pub mod bot;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod funnel;
pub mod markup;
pub mod payload;
pub mod poller;
pub mod transport;
pub mod types;
pub mod webhook;

pub use bot::{Bot, EditOptions};
pub use context::Context;
pub use dispatch::{ActionMatcher, Handler, UpdateCategory};
pub use error::{BotError, Result};
pub use markup::{KeyboardOptions, SendOptions};
pub use payload::{MediaKind, MessageData};
pub use poller::PollingHandle;
