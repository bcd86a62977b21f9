mod client;
mod source;
mod types;

pub use client::ClientOptions;
pub use source::GitHubSource;
