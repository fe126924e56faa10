//! Completion model: request types, the backend seam and the retrying client.

pub mod client;
pub mod types;
