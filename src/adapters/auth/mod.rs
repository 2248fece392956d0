//! Session resolution adapters.
//!
//! - `TrustedHeaderSessionResolver` - identity forwarded by the auth gateway

mod trusted_header;

pub use trusted_header::{TrustedHeaderSessionResolver, USER_ID_HEADER, WORKSPACE_ID_HEADER};
