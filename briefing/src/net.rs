//! HTTP client construction shared by the remote service clients.

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

/// Client retrying transient failures with exponential backoff.
/// Used where the retry policy is not fixed by the service contract
pub fn retrying_client(max_retries: u32) -> ClientWithMiddleware {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
    ClientBuilder::new(reqwest::Client::new())
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build()
}

/// Client without retry middleware, for services whose retry behavior
/// is implemented explicitly (embedding 413 recovery, LLM attempts)
pub fn plain_client() -> ClientWithMiddleware {
    ClientBuilder::new(reqwest::Client::new()).build()
}
