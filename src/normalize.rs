use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::domain::MappingFormat;
use crate::error::LoaderError;
use crate::fs_util;
use crate::xlsx;

/// Rewrites the mappings file at `path` as TSV. TSV input is left untouched.
pub fn convert_to_tsv(path: &Path, format: MappingFormat) -> Result<(), LoaderError> {
    match format {
        MappingFormat::Tsv => Ok(()),
        MappingFormat::Csv => {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_path(path)
                .map_err(|err| LoaderError::Conversion(format!("csv {}: {err}", path.display())))?;
            let mut count = 0usize;
            fs_util::replace_file(path, |out| {
                let mut writer = tsv_writer(out);
                for record in reader.byte_records() {
                    let record =
                        record.map_err(|err| LoaderError::Conversion(format!("csv: {err}")))?;
                    writer
                        .write_byte_record(&record)
                        .map_err(|err| LoaderError::Filesystem(err.to_string()))?;
                    count += 1;
                }
                writer
                    .flush()
                    .map_err(|err| LoaderError::Filesystem(err.to_string()))
            })?;
            info!(rows = count, path = %path.display(), "converted csv mappings to tsv");
            Ok(())
        }
        MappingFormat::Xlsx => {
            let rows = xlsx::read_first_sheet(path)?;
            fs_util::replace_file(path, |out| write_rows(out, &rows))?;
            info!(rows = rows.len(), path = %path.display(), "converted xlsx mappings to tsv");
            Ok(())
        }
    }
}

pub fn write_rows(out: &mut dyn Write, rows: &[Vec<String>]) -> Result<(), LoaderError> {
    let mut writer = tsv_writer(out);
    for row in rows {
        writer
            .write_record(row)
            .map_err(|err| LoaderError::Filesystem(err.to_string()))?;
    }
    writer
        .flush()
        .map_err(|err| LoaderError::Filesystem(err.to_string()))
}

fn tsv_writer<W: Write>(out: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_writer(out)
}
