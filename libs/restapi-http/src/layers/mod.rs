//! Tower layers wrapped around the raw transport.
//!
//! - [`UserAgentLayer`] - Adds a default User-Agent header to every request

mod user_agent;

pub use user_agent::{UserAgentLayer, UserAgentService};
