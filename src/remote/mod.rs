//! Music backend: HTTP client, session cookie handling, track models and the
//! per-track resolver used by the player.

pub mod api;
pub mod auth;
pub mod models;
pub mod resolve;

pub use api::{RemoteClient, secure_url};
pub use auth::Session;
pub use models::Track;
pub use resolve::{CachedResolver, TrackResolver};
