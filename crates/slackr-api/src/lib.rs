//! # slackr-api
//!
//! Slackr's domain operations and their HTTP handlers. Every operation is a
//! method on [`AppStateInner`] taking the caller's token; the handler modules
//! only decode requests and encode responses.

pub mod admin;
pub mod auth;
pub mod channels;
pub mod error;
pub mod mail;
pub mod messages;
pub mod photo;
pub mod reactions;
pub mod routes;
pub mod scheduler;
pub mod search;
pub mod standup;
pub mod users;

pub use auth::{AppConfig, AppState, AppStateInner, IdentityResolver, Sessions};
pub use error::{ApiError, ApiResult};
pub use routes::router;
