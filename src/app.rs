use std::thread;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use crate::config::Settings;
use crate::domain::{DatasetRecord, MappingRow};
use crate::error::LoaderError;
use crate::http;
use crate::mappings::{MappingHttpClient, MappingReader, MappingSource};
use crate::normalize;
use crate::registry::{Membership, RegistryClient, RegistryHttpClient, check_membership};
use crate::transform::RowTransformer;
use crate::visibility::{PublicCheck, Visibility, VisibilityClient, VisibilityHttpClient};

/// Run-level stages; a failure in any of them aborts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Download,
    Normalize,
    OpenFile,
    Rows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    Submitted,
    Rejected,
    AlreadyRegistered,
    LookupFailed,
    NotPublic,
    SubmitFailed,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub started_at: String,
    pub finished_at: String,
    pub rows: usize,
    pub submitted: usize,
    pub rejected: usize,
    pub already_registered: usize,
    pub lookup_failed: usize,
    pub not_public: usize,
    pub submit_failed: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: RowOutcome) {
        self.rows += 1;
        let counter = match outcome {
            RowOutcome::Submitted => &mut self.submitted,
            RowOutcome::Rejected => &mut self.rejected,
            RowOutcome::AlreadyRegistered => &mut self.already_registered,
            RowOutcome::LookupFailed => &mut self.lookup_failed,
            RowOutcome::NotPublic => &mut self.not_public,
            RowOutcome::SubmitFailed => &mut self.submit_failed,
        };
        *counter += 1;
    }
}

pub type HttpApp = App<MappingHttpClient, RegistryHttpClient, VisibilityHttpClient>;

pub struct App<M: MappingSource, R: RegistryClient, V: VisibilityClient> {
    settings: Settings,
    transformer: RowTransformer,
    public_check: PublicCheck,
    source: M,
    registry: R,
    visibility: V,
}

impl HttpApp {
    /// Wires the loader to the real mappings host, registry and source resource.
    pub fn connect(settings: Settings) -> Result<Self, LoaderError> {
        let client = http::build_client(settings.http.timeout)?;
        let retry = settings.http.retry;
        let source = MappingHttpClient::new(client.clone(), retry);
        let registry = RegistryHttpClient::new(
            client.clone(),
            &settings.http.registry_url,
            &settings.broker.authorisation_token,
            retry,
        );
        let visibility = VisibilityHttpClient::new(client, retry);
        Ok(App::new(settings, source, registry, visibility))
    }
}

impl<M: MappingSource, R: RegistryClient, V: VisibilityClient> App<M, R, V> {
    pub fn new(settings: Settings, source: M, registry: R, visibility: V) -> Self {
        let transformer = RowTransformer::new(settings.broker.clone(), &settings.mappings);
        let public_check = PublicCheck::new(settings.broker.public_check.clone());
        Self {
            settings,
            transformer,
            public_check,
            source,
            registry,
            visibility,
        }
    }

    /// Downloads, normalizes and loads the whole mappings file.
    pub fn run(&self) -> Result<RunSummary, LoaderError> {
        let started_at = Utc::now().to_rfc3339();
        let mappings = &self.settings.mappings;
        let path = mappings.local_path.as_std_path();
        info!(
            broker_id = %self.settings.broker.broker_id,
            "loading datasets into MGX registry"
        );

        info!(url = %mappings.download_url, "getting mappings file");
        let bytes = self
            .source
            .download(&mappings.download_url, path)
            .inspect_err(|err| aborted(Stage::Download, err))?;
        info!(bytes, path = %mappings.local_path, "downloaded mappings file");

        normalize::convert_to_tsv(path, mappings.format)
            .inspect_err(|err| aborted(Stage::Normalize, err))?;

        let reader = MappingReader::open(path, mappings.has_header)
            .inspect_err(|err| aborted(Stage::OpenFile, err))?;
        info!(path = %mappings.local_path, "reading mappings file");

        let mut summary = self
            .process_rows(reader)
            .inspect_err(|err| aborted(Stage::Rows, err))?;
        summary.started_at = started_at;
        summary.finished_at = Utc::now().to_rfc3339();
        info!(
            rows = summary.rows,
            submitted = summary.submitted,
            rejected = summary.rejected,
            already_registered = summary.already_registered,
            lookup_failed = summary.lookup_failed,
            not_public = summary.not_public,
            submit_failed = summary.submit_failed,
            "completed loading"
        );
        Ok(summary)
    }

    /// Runs every row through the pipeline. Only a failure to read the next
    /// row ends the loop early.
    pub fn process_rows<I>(&self, rows: I) -> Result<RunSummary, LoaderError>
    where
        I: IntoIterator<Item = Result<MappingRow, LoaderError>>,
    {
        let mut summary = RunSummary::default();
        for row in rows {
            let outcome = self.process_row(&row?);
            summary.record(outcome);
        }
        Ok(summary)
    }

    pub fn process_row(&self, row: &MappingRow) -> RowOutcome {
        let record = match self.transformer.convert(row) {
            Ok(record) => record,
            Err(err) => {
                let (sequence_id, source_id) = self.transformer.accessions(row);
                error!(
                    line = row.line,
                    sequence_id = sequence_id.unwrap_or_default(),
                    source_id = source_id.unwrap_or_default(),
                    error = %err,
                    "INSDC accession or source accession in invalid format"
                );
                return RowOutcome::Rejected;
            }
        };

        if let Some(outcome) = self.check_registry(&record) {
            return outcome;
        }

        if self.public_check.check(&self.visibility, &record) == Visibility::NotPublic {
            info!(
                sequence_id = %record.sequence_id,
                source_id = %record.source_id,
                "dataset not posted to registry"
            );
            return RowOutcome::NotPublic;
        }

        self.submit(&record)
    }

    fn check_registry(&self, record: &DatasetRecord) -> Option<RowOutcome> {
        let existing = match self.registry.existing_datasets(&record.sequence_id) {
            Ok(existing) => existing,
            Err(err) => {
                error!(
                    sequence_id = %record.sequence_id,
                    error = %err,
                    "could not retrieve existing datasets for INSDC sequence"
                );
                return Some(RowOutcome::LookupFailed);
            }
        };
        match check_membership(&existing, record) {
            Membership::Eligible => None,
            Membership::Duplicate(entry) => {
                info!(
                    sequence_id = %record.sequence_id,
                    source_id = %record.source_id,
                    existing = %serde_json::to_string(&entry).unwrap_or_default(),
                    "dataset already exists in the registry"
                );
                Some(RowOutcome::AlreadyRegistered)
            }
        }
    }

    fn submit(&self, record: &DatasetRecord) -> RowOutcome {
        info!(sequence_id = %record.sequence_id, "posting dataset to registry");
        let outcome = match self.registry.submit(record) {
            Ok(()) => {
                info!(
                    sequence_id = %record.sequence_id,
                    source_id = %record.source_id,
                    "dataset posted to registry"
                );
                RowOutcome::Submitted
            }
            Err(err) => {
                error!(
                    sequence_id = %record.sequence_id,
                    source_id = %record.source_id,
                    error = %err,
                    "dataset not posted to registry"
                );
                RowOutcome::SubmitFailed
            }
        };
        // the registry rate-limits writes
        let delay = self.settings.http.submit_delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        outcome
    }
}

fn aborted(stage: Stage, err: &LoaderError) {
    error!(stage = ?stage, error = %err, "run aborted");
}
