mod retry;

pub use retry::{retry_async, ExponentialBackoff, RetryPolicy};
