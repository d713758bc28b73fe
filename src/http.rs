use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::LoaderError;
use crate::retry::RetryPolicy;

pub fn user_agent() -> String {
    format!("mgx-loader/{}", env!("CARGO_PKG_VERSION"))
}

pub fn build_client(timeout: Duration) -> Result<Client, LoaderError> {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&user_agent()) {
        headers.insert(USER_AGENT, value);
    }
    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|err| LoaderError::HttpClient(err.to_string()))
}

/// Sends the request built by `make_req`, retrying transport failures and
/// throttling or gateway statuses. The final response is returned whatever
/// its status.
pub fn send_with_retries<F>(policy: &RetryPolicy, mut make_req: F) -> reqwest::Result<Response>
where
    F: FnMut() -> RequestBuilder,
{
    policy.run(
        |_| make_req().send(),
        |result| match result {
            Ok(resp) => is_retryable_status(resp.status().as_u16()),
            Err(err) => is_retryable_error(err),
        },
    )
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

pub fn response_text(response: Response, fallback: &str) -> String {
    response.text().unwrap_or_else(|_| fallback.to_string())
}
