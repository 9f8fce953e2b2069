//! Long-lived bidirectional change notifications: a server-side
//! [`Broadcaster`] with per-subscriber isolation and replay history, and a
//! client-side [`RealtimeClient`] that reconnects with exponential backoff
//! and applies pushed changes through the same path a bulk pull uses.

mod broadcaster;
mod error;
mod subscriber;
mod types;

pub use broadcaster::{Broadcaster, SubscriberReceiver};
pub use error::{RealtimeError, Result};
pub use subscriber::{ConnectionState, RealtimeClient, RealtimeConfig};
pub use types::{ChangeEvent, ClientMessage, ServerMessage};
