//! Access token, refresh token, and secret wrappers.

pub mod access;
pub mod refresh;
pub mod secret;
