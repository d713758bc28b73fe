use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::LoaderError;

/// INSDC sequencing run accession: ENA (E), DDBJ (D) or SRA (S) prefix.
pub const RUN_ACCESSION_PATTERN: &str = r"^[EDS]RR[0-9]{6,7}$";

/// The only status the loader ever submits.
pub const PUBLIC_STATUS: &str = "public";

static RUN_ACCESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(RUN_ACCESSION_PATTERN).expect("run accession pattern compiles"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingFormat {
    Tsv,
    Csv,
    Xlsx,
}

impl fmt::Display for MappingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingFormat::Tsv => write!(f, "tsv"),
            MappingFormat::Csv => write!(f, "csv"),
            MappingFormat::Xlsx => write!(f, "xlsx"),
        }
    }
}

impl FromStr for MappingFormat {
    type Err = LoaderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tsv" => Ok(MappingFormat::Tsv),
            "csv" => Ok(MappingFormat::Csv),
            "xlsx" => Ok(MappingFormat::Xlsx),
            _ => Err(LoaderError::UnsupportedFormat(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunAccession(String);

impl RunAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunAccession {
    type Err = LoaderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if !RUN_ACCESSION.is_match(value) {
            return Err(LoaderError::InvalidRunAccession(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }
}

/// Deployment-supplied pattern for source accessions.
///
/// Matching follows prefix semantics: a value is accepted when the pattern
/// matches starting at its first character. Fully anchored patterns
/// (`^...$`) behave as whole-string matches.
#[derive(Debug, Clone)]
pub struct SourcePattern(Regex);

impl SourcePattern {
    pub fn new(pattern: &str) -> Result<Self, LoaderError> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|err| LoaderError::InvalidSetting {
                key: "SOURCE_PATTERN".to_string(),
                message: err.to_string(),
            })
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn matches(&self, value: &str) -> bool {
        self.0.find(value).is_some_and(|found| found.start() == 0)
    }
}

/// URL with `{}` placeholders for a source accession.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate(String);

impl UrlTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn fill(&self, value: &str) -> String {
        self.0.replace("{}", value)
    }
}

/// One row of the normalized mappings file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRow {
    pub line: u64,
    pub fields: Vec<String>,
}

impl MappingRow {
    pub fn new(line: u64, fields: Vec<String>) -> Self {
        Self { line, fields }
    }

    pub fn field(&self, index: usize) -> Result<&str, LoaderError> {
        self.fields
            .get(index)
            .map(String::as_str)
            .ok_or(LoaderError::MissingColumn {
                index,
                len: self.fields.len(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    #[serde(rename = "brokerID")]
    pub broker_id: String,
    #[serde(rename = "sourceID")]
    pub source_id: String,
    #[serde(rename = "endPoint")]
    pub end_point: String,
    pub status: String,
    #[serde(rename = "sequenceID")]
    pub sequence_id: String,
    pub method: Vec<String>,
    pub confidence: String,
}

/// A dataset already held by the registry. Only `sourceID` is required;
/// everything else is kept verbatim for log output.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExistingDataset {
    #[serde(rename = "sourceID")]
    pub source_id: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryDatasets {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub datasets: Vec<ExistingDataset>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ExistingDataset>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<ExistingDataset>>::deserialize(deserializer)?.unwrap_or_default())
}
