pub mod client;
pub mod normalize;
pub mod stream;

pub use client::PulseClient;
pub use normalize::normalize_trends;
pub use stream::{AnomalyStream, AnomalyStreamConfig, AnomalyStreamHandle, StreamError};
