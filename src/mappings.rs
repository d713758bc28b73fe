use std::fs::File;
use std::io::Read;
use std::path::Path;

use reqwest::blocking::Client;

use crate::domain::MappingRow;
use crate::error::LoaderError;
use crate::fs_util;
use crate::http;
use crate::retry::RetryPolicy;

/// Where the mappings file comes from.
pub trait MappingSource {
    /// Stores the file found at `url` under `destination` and returns its size.
    fn download(&self, url: &str, destination: &Path) -> Result<u64, LoaderError>;
}

impl<T: MappingSource + ?Sized> MappingSource for &T {
    fn download(&self, url: &str, destination: &Path) -> Result<u64, LoaderError> {
        (**self).download(url, destination)
    }
}

#[derive(Clone)]
pub struct MappingHttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl MappingHttpClient {
    pub fn new(client: Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

impl MappingSource for MappingHttpClient {
    fn download(&self, url: &str, destination: &Path) -> Result<u64, LoaderError> {
        let mut response = http::send_with_retries(&self.retry, || self.client.get(url))
            .map_err(|err| LoaderError::DownloadHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = http::response_text(response, "mappings download failed");
            return Err(LoaderError::DownloadStatus { status, message });
        }

        fs_util::ensure_parent_dir(destination)?;
        let mut file = File::create(destination).map_err(|err| {
            LoaderError::Filesystem(format!("create {}: {err}", destination.display()))
        })?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| LoaderError::DownloadHttp(err.to_string()))
    }
}

/// Row iterator over a normalized (tab-separated) mappings file.
pub struct MappingReader<R: Read> {
    records: csv::StringRecordsIntoIter<R>,
    skip_header: bool,
}

impl MappingReader<File> {
    pub fn open(path: &Path, has_header: bool) -> Result<Self, LoaderError> {
        let file = File::open(path)
            .map_err(|err| LoaderError::MappingRead(format!("open {}: {err}", path.display())))?;
        Ok(Self::from_reader(file, has_header))
    }
}

impl<R: Read> MappingReader<R> {
    pub fn from_reader(reader: R, has_header: bool) -> Self {
        let records = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .quote(b'"')
            .has_headers(false)
            .flexible(true)
            .from_reader(reader)
            .into_records();
        Self {
            records,
            skip_header: has_header,
        }
    }
}

impl<R: Read> Iterator for MappingReader<R> {
    type Item = Result<MappingRow, LoaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        if std::mem::take(&mut self.skip_header) {
            if let Err(err) = self.records.next()? {
                return Some(Err(LoaderError::MappingRead(err.to_string())));
            }
        }
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(err) => return Some(Err(LoaderError::MappingRead(err.to_string()))),
        };
        let line = record.position().map(|pos| pos.line()).unwrap_or_default();
        let fields = record.iter().map(str::to_string).collect();
        Some(Ok(MappingRow::new(line, fields)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_rows_and_skips_header() {
        let data = "run\tsource\nSRR1234567\tSRC001\nERR123456\tSRC002\textra\n";
        let rows = MappingReader::from_reader(data.as_bytes(), true)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].fields, vec!["SRR1234567", "SRC001"]);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[1].fields, vec!["ERR123456", "SRC002", "extra"]);
    }

    #[test]
    fn keeps_first_row_without_header() {
        let data = "SRR1234567\tSRC001\n";
        let rows = MappingReader::from_reader(data.as_bytes(), false)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].line, 1);
    }

    #[test]
    fn header_only_file_has_no_rows() {
        let rows = MappingReader::from_reader("run\tsource\n".as_bytes(), true).count();
        assert_eq!(rows, 0);
    }
}
