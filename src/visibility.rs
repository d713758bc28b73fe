use reqwest::blocking::Client;
use tracing::{info, warn};

use crate::domain::{DatasetRecord, UrlTemplate};
use crate::error::LoaderError;
use crate::http;
use crate::retry::RetryPolicy;

/// Probes a source resource for a dataset's visibility.
pub trait VisibilityClient {
    /// HTTP status returned by a GET on `url`.
    fn status(&self, url: &str) -> Result<u16, LoaderError>;
}

impl<T: VisibilityClient + ?Sized> VisibilityClient for &T {
    fn status(&self, url: &str) -> Result<u16, LoaderError> {
        (**self).status(url)
    }
}

#[derive(Clone)]
pub struct VisibilityHttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl VisibilityHttpClient {
    pub fn new(client: Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

impl VisibilityClient for VisibilityHttpClient {
    fn status(&self, url: &str) -> Result<u16, LoaderError> {
        http::send_with_retries(&self.retry, || self.client.get(url))
            .map(|response| response.status().as_u16())
            .map_err(|err| LoaderError::VisibilityHttp(err.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    NotPublic,
}

#[derive(Debug, Clone, Default)]
pub struct PublicCheck {
    template: Option<UrlTemplate>,
}

impl PublicCheck {
    pub fn new(template: Option<UrlTemplate>) -> Self {
        Self { template }
    }

    pub fn is_enabled(&self) -> bool {
        self.template.is_some()
    }

    /// Without a template every record counts as public and nothing is sent.
    pub fn check<V: VisibilityClient>(&self, client: &V, record: &DatasetRecord) -> Visibility {
        let Some(template) = &self.template else {
            return Visibility::Public;
        };
        let url = template.fill(&record.source_id);
        match client.status(&url) {
            Ok(200) => Visibility::Public,
            Ok(status) => {
                info!(source_id = %record.source_id, status, "dataset is not public within source resource");
                Visibility::NotPublic
            }
            Err(err) => {
                warn!(source_id = %record.source_id, error = %err, "public check failed");
                Visibility::NotPublic
            }
        }
    }
}
