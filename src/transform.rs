use crate::config::{BrokerSettings, MappingSettings};
use crate::domain::{DatasetRecord, MappingRow, PUBLIC_STATUS, RunAccession};
use crate::error::LoaderError;

/// Turns mapping rows into registry dataset records for one broker.
#[derive(Debug, Clone)]
pub struct RowTransformer {
    broker: BrokerSettings,
    insdc_column: usize,
    source_column: usize,
}

impl RowTransformer {
    pub fn new(broker: BrokerSettings, mappings: &MappingSettings) -> Self {
        Self {
            broker,
            insdc_column: mappings.insdc_column,
            source_column: mappings.source_column,
        }
    }

    /// Raw `(sequence, source)` fields of a row, as far as they exist.
    pub fn accessions<'a>(&self, row: &'a MappingRow) -> (Option<&'a str>, Option<&'a str>) {
        (
            row.field(self.insdc_column).ok(),
            row.field(self.source_column).ok(),
        )
    }

    pub fn convert(&self, row: &MappingRow) -> Result<DatasetRecord, LoaderError> {
        let sequence_id: RunAccession = row.field(self.insdc_column)?.parse()?;
        let source_id = row.field(self.source_column)?;
        if !self.broker.source_pattern.matches(source_id) {
            return Err(LoaderError::InvalidSourceAccession(source_id.to_string()));
        }

        Ok(DatasetRecord {
            broker_id: self.broker.broker_id.clone(),
            source_id: source_id.to_string(),
            end_point: self.broker.source_endpoint.fill(source_id),
            status: PUBLIC_STATUS.to_string(),
            sequence_id: sequence_id.as_str().to_string(),
            method: self.broker.methods.clone(),
            confidence: self.broker.confidence.clone(),
        })
    }
}
