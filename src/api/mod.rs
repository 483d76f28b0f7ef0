pub mod backend;
#[cfg(test)]
pub mod scripted;
pub mod source;

pub use backend::{BackendClient, RetryPolicy};
pub use source::FeedSource;
