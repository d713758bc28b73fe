use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;

use crate::domain::{DatasetRecord, ExistingDataset, RegistryDatasets};
use crate::error::LoaderError;
use crate::http;
use crate::retry::RetryPolicy;

/// Read and write access to the Metagenome Exchange registry.
pub trait RegistryClient {
    fn existing_datasets(&self, sequence_id: &str) -> Result<Vec<ExistingDataset>, LoaderError>;
    fn submit(&self, record: &DatasetRecord) -> Result<(), LoaderError>;
}

impl<T: RegistryClient + ?Sized> RegistryClient for &T {
    fn existing_datasets(&self, sequence_id: &str) -> Result<Vec<ExistingDataset>, LoaderError> {
        (**self).existing_datasets(sequence_id)
    }

    fn submit(&self, record: &DatasetRecord) -> Result<(), LoaderError> {
        (**self).submit(record)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Membership {
    Eligible,
    Duplicate(ExistingDataset),
}

/// A candidate is a duplicate when the registry already links its sequence
/// to the same source accession. Comparison is exact and case-sensitive.
pub fn check_membership(existing: &[ExistingDataset], candidate: &DatasetRecord) -> Membership {
    existing
        .iter()
        .find(|entry| entry.source_id == candidate.source_id)
        .map(|entry| Membership::Duplicate(entry.clone()))
        .unwrap_or(Membership::Eligible)
}

#[derive(Clone)]
pub struct RegistryHttpClient {
    client: Client,
    base_url: String,
    authorisation: String,
    retry: RetryPolicy,
}

impl RegistryHttpClient {
    pub fn new(client: Client, base_url: &str, token: &str, retry: RetryPolicy) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            authorisation: format!("mgx {token}"),
            retry,
        }
    }

    pub fn datasets_url(&self, sequence_id: &str) -> String {
        format!("{}/sequences/{}/datasets", self.base_url, sequence_id)
    }

    pub fn submit_url(&self) -> String {
        format!("{}/admin/datasets", self.base_url)
    }
}

impl RegistryClient for RegistryHttpClient {
    fn existing_datasets(&self, sequence_id: &str) -> Result<Vec<ExistingDataset>, LoaderError> {
        let url = self.datasets_url(sequence_id);
        let response = http::send_with_retries(&self.retry, || self.client.get(&url))
            .map_err(|err| LoaderError::RegistryHttp(err.to_string()))?;
        let status = response.status().as_u16();
        let body = http::response_text(response, "");
        if status != 200 {
            return Err(LoaderError::RegistryStatus {
                status,
                message: body,
            });
        }
        let decoded: RegistryDatasets = serde_json::from_str(&body)
            .map_err(|err| LoaderError::RegistryDecode(format!("{err}: {body}")))?;
        Ok(decoded.datasets)
    }

    fn submit(&self, record: &DatasetRecord) -> Result<(), LoaderError> {
        let url = self.submit_url();
        let response = http::send_with_retries(&self.retry, || {
            self.client
                .post(&url)
                .header(AUTHORIZATION, &self.authorisation)
                .json(record)
        })
        .map_err(|err| LoaderError::SubmitHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = http::response_text(response, "dataset submission failed");
            return Err(LoaderError::SubmitStatus { status, message });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::PUBLIC_STATUS;

    fn record(source_id: &str) -> DatasetRecord {
        DatasetRecord {
            broker_id: "broker".to_string(),
            source_id: source_id.to_string(),
            end_point: format!("https://example.org/{source_id}"),
            status: PUBLIC_STATUS.to_string(),
            sequence_id: "SRR1234567".to_string(),
            method: vec!["other_metadata".to_string()],
            confidence: "full".to_string(),
        }
    }

    fn existing(json: &str) -> Vec<ExistingDataset> {
        serde_json::from_str::<RegistryDatasets>(json).unwrap().datasets
    }

    #[test]
    fn empty_registry_is_eligible() {
        assert_eq!(
            check_membership(&existing(r#"{"datasets": []}"#), &record("SRC001")),
            Membership::Eligible
        );
    }

    #[test]
    fn matching_source_is_duplicate_regardless_of_other_fields() {
        let entries = existing(
            r#"{"datasets": [
                {"sourceID": "SRC999", "brokerID": "other"},
                {"sourceID": "SRC001", "brokerID": "someone-else", "confidence": "low"}
            ]}"#,
        );
        match check_membership(&entries, &record("SRC001")) {
            Membership::Duplicate(entry) => {
                assert_eq!(entry.source_id, "SRC001");
                assert_eq!(entry.extra["brokerID"], "someone-else");
            }
            other => panic!("expected duplicate, got {other:?}"),
        }
    }

    #[test]
    fn source_comparison_is_case_sensitive() {
        let entries = existing(r#"{"datasets": [{"sourceID": "src001"}]}"#);
        assert_eq!(
            check_membership(&entries, &record("SRC001")),
            Membership::Eligible
        );
    }

    #[test]
    fn registry_urls() {
        let client = RegistryHttpClient::new(
            http::build_client(Duration::from_secs(5)).unwrap(),
            "https://registry.example.org/api/",
            "secret",
            RetryPolicy::default(),
        );
        assert_eq!(
            client.datasets_url("SRR1234567"),
            "https://registry.example.org/api/sequences/SRR1234567/datasets"
        );
        assert_eq!(
            client.submit_url(),
            "https://registry.example.org/api/admin/datasets"
        );
        assert_eq!(client.authorisation, "mgx secret");
    }
}
