//! Minimal reader for the first worksheet of an Office Open XML workbook.
//!
//! Only cell values are extracted; styles, formulas and dates are ignored
//! and values come back as the text stored in the sheet.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::LoaderError;

const WORKBOOK: &str = "xl/workbook.xml";
const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS: &str = "xl/sharedStrings.xml";

/// Sheet limits of the format: columns `A..=XFD`, rows `1..=1048576`.
pub const MAX_COLUMNS: usize = 16_384;
pub const MAX_ROWS: usize = 1_048_576;

pub fn read_first_sheet(path: &Path) -> Result<Vec<Vec<String>>, LoaderError> {
    let file = File::open(path)
        .map_err(|err| LoaderError::Filesystem(format!("open {}: {err}", path.display())))?;
    let mut archive = ZipArchive::new(file).map_err(xlsx_error)?;

    let shared = match archive.by_name(SHARED_STRINGS) {
        Ok(entry) => read_shared_strings(BufReader::new(entry))?,
        Err(ZipError::FileNotFound) => Vec::new(),
        Err(err) => return Err(xlsx_error(err)),
    };

    let sheet = first_sheet_path(&mut archive)?;
    let entry = archive.by_name(&sheet).map_err(xlsx_error)?;
    read_sheet(BufReader::new(entry), &shared)
}

fn xlsx_error(err: impl std::fmt::Display) -> LoaderError {
    LoaderError::Conversion(format!("xlsx: {err}"))
}

fn first_sheet_path<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<String, LoaderError> {
    if let Some(path) = sheet_from_workbook(archive)? {
        if archive.index_for_name(&path).is_some() {
            return Ok(path);
        }
    }
    let mut sheets = archive
        .file_names()
        .filter(|name| name.starts_with("xl/worksheets/") && name.ends_with(".xml"))
        .map(str::to_string)
        .collect::<Vec<_>>();
    sheets.sort();
    sheets
        .into_iter()
        .next()
        .ok_or_else(|| xlsx_error("workbook contains no worksheets"))
}

/// Follows the first `<sheet>` of the workbook through its relationship id.
fn sheet_from_workbook<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<Option<String>, LoaderError> {
    let rel_id = match archive.by_name(WORKBOOK) {
        Ok(entry) => first_element_attribute(BufReader::new(entry), b"sheet", b"id")?,
        Err(ZipError::FileNotFound) => None,
        Err(err) => return Err(xlsx_error(err)),
    };
    let Some(rel_id) = rel_id else {
        return Ok(None);
    };

    let target = match archive.by_name(WORKBOOK_RELS) {
        Ok(entry) => relationship_target(BufReader::new(entry), &rel_id)?,
        Err(ZipError::FileNotFound) => None,
        Err(err) => return Err(xlsx_error(err)),
    };
    Ok(target.map(|target| match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{target}"),
    }))
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, LoaderError> {
    for attr in element.attributes() {
        let attr = attr.map_err(xlsx_error)?;
        if attr.key.local_name().as_ref() == name {
            let value = attr.unescape_value().map_err(xlsx_error)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn first_element_attribute<B: BufRead>(
    source: B,
    element: &[u8],
    name: &[u8],
) -> Result<Option<String>, LoaderError> {
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xlsx_error)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == element => {
                return attribute(&e, name);
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
        buf.clear();
    }
}

fn relationship_target<B: BufRead>(source: B, id: &str) -> Result<Option<String>, LoaderError> {
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xlsx_error)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if attribute(&e, b"Id")?.as_deref() == Some(id) {
                    return attribute(&e, b"Target");
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
        buf.clear();
    }
}

fn read_shared_strings<B: BufRead>(source: B) -> Result<Vec<String>, LoaderError> {
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    // phonetic runs repeat the reading of the string, not its content
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf).map_err(xlsx_error)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_text = !in_phonetic,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(t) if in_text => current.push_str(&t.unescape().map_err(xlsx_error)?),
            Event::CData(t) if in_text => current.push_str(&String::from_utf8_lossy(&t)),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

#[derive(Default)]
struct PendingCell {
    column: usize,
    kind: Option<String>,
    value: String,
}

fn read_sheet<B: BufRead>(source: B, shared: &[String]) -> Result<Vec<Vec<String>>, LoaderError> {
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell: Option<PendingCell> = None;
    let mut capture = false;

    loop {
        match reader.read_event_into(&mut buf).map_err(xlsx_error)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    pad_rows(&mut rows, attribute(&e, b"r")?.as_deref())?;
                    row.clear();
                }
                b"c" => cell = Some(start_cell(&e, row.len())?),
                b"v" | b"t" => capture = cell.is_some(),
                _ => {}
            },
            // self-closing cells only carry a style and are skipped
            Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                pad_rows(&mut rows, attribute(&e, b"r")?.as_deref())?;
                rows.push(Vec::new());
            }
            Event::Text(t) if capture => {
                if let Some(cell) = cell.as_mut() {
                    cell.value.push_str(&t.unescape().map_err(xlsx_error)?);
                }
            }
            Event::CData(t) if capture => {
                if let Some(cell) = cell.as_mut() {
                    cell.value.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"c" => {
                    if let Some(done) = cell.take() {
                        let value = cell_value(done.kind.as_deref(), done.value, shared)?;
                        if row.len() <= done.column {
                            row.resize(done.column + 1, String::new());
                        }
                        row[done.column] = value;
                    }
                }
                b"row" => rows.push(std::mem::take(&mut row)),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

fn pad_rows(rows: &mut Vec<Vec<String>>, reference: Option<&str>) -> Result<(), LoaderError> {
    let Some(reference) = reference else {
        return Ok(());
    };
    let number = reference
        .parse::<usize>()
        .ok()
        .filter(|number| (1..=MAX_ROWS).contains(number))
        .ok_or_else(|| xlsx_error(format!("invalid row reference {reference:?}")))?;
    while rows.len() + 1 < number {
        rows.push(Vec::new());
    }
    Ok(())
}

fn start_cell(element: &BytesStart<'_>, next_column: usize) -> Result<PendingCell, LoaderError> {
    let column = match attribute(element, b"r")? {
        Some(reference) => column_index(&reference)?,
        None => next_column,
    };
    Ok(PendingCell {
        column,
        kind: attribute(element, b"t")?,
        value: String::new(),
    })
}

/// Zero-based column of an A1-style reference: `A1` is 0, `AB7` is 27.
pub fn column_index(reference: &str) -> Result<usize, LoaderError> {
    let letters = reference
        .chars()
        .take_while(|ch| ch.is_ascii_alphabetic())
        .collect::<String>();
    if letters.is_empty() {
        return Err(xlsx_error(format!("invalid cell reference {reference:?}")));
    }
    let mut number = 0usize;
    for ch in letters.chars() {
        let digit = ch.to_ascii_uppercase() as usize - 'A' as usize + 1;
        number = number
            .checked_mul(26)
            .and_then(|acc| acc.checked_add(digit))
            .filter(|acc| *acc <= MAX_COLUMNS)
            .ok_or_else(|| xlsx_error(format!("cell reference {reference:?} is out of range")))?;
    }
    Ok(number - 1)
}

fn cell_value(kind: Option<&str>, raw: String, shared: &[String]) -> Result<String, LoaderError> {
    match kind {
        Some("s") => {
            let index = raw
                .trim()
                .parse::<usize>()
                .map_err(|_| xlsx_error(format!("invalid shared string index {raw:?}")))?;
            shared
                .get(index)
                .cloned()
                .ok_or_else(|| xlsx_error(format!("shared string {index} out of range")))
        }
        Some("b") => Ok(if raw.trim() == "1" { "TRUE" } else { "FALSE" }.to_string()),
        _ => Ok(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_references() {
        assert_eq!(column_index("A1").unwrap(), 0);
        assert_eq!(column_index("C12").unwrap(), 2);
        assert_eq!(column_index("AB7").unwrap(), 27);
        assert_eq!(column_index("XFD1").unwrap(), MAX_COLUMNS - 1);
        assert!(column_index("17").is_err());
    }

    #[test]
    fn references_beyond_sheet_limits_are_rejected() {
        for reference in ["XFE1", "AAAAAAAAAAAAAAA1", "ZZZZZZZZZZZZZZZZZZZZZZZZZZ1"] {
            assert!(matches!(
                column_index(reference),
                Err(LoaderError::Conversion(_))
            ));
        }
    }

    #[test]
    fn oversized_rows_fail_without_materializing() {
        for xml in [
            &br#"<worksheet><sheetData><row r="200000000"><c r="A200000000"><v>1</v></c></row></sheetData></worksheet>"#[..],
            &br#"<worksheet><sheetData><row r="0"/></sheetData></worksheet>"#[..],
            &br#"<worksheet><sheetData><row r="1"><c r="AAAAAAAAAAAAAAA1"><v>1</v></c></row></sheetData></worksheet>"#[..],
        ] {
            assert!(matches!(
                read_sheet(xml, &[]),
                Err(LoaderError::Conversion(_))
            ));
        }
    }

    #[test]
    fn last_row_of_the_sheet_is_accepted() {
        let xml = format!(
            r#"<worksheet><sheetData><row r="{MAX_ROWS}"><c r="B{MAX_ROWS}"><v>x</v></c></row></sheetData></worksheet>"#
        );
        let rows = read_sheet(xml.as_bytes(), &[]).unwrap();
        assert_eq!(rows.len(), MAX_ROWS);
        assert_eq!(rows[MAX_ROWS - 1], vec!["", "x"]);
    }

    #[test]
    fn shared_strings_concatenate_rich_runs() {
        let xml = br#"<sst><si><t>SRR1234567</t></si><si><r><t>SRC</t></r><r><t>001</t></r><rPh><t>x</t></rPh></si><si/></sst>"#;
        let strings = read_shared_strings(&xml[..]).unwrap();
        assert_eq!(strings, vec!["SRR1234567", "SRC001", ""]);
    }

    #[test]
    fn sheet_with_gaps_and_inline_strings() {
        let xml = br#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1" t="inlineStr"><is><t>note</t></is></c></row>
            <row r="3"><c r="A3"><v>42</v></c><c r="B3" t="b"><v>1</v></c></row>
        </sheetData></worksheet>"#;
        let shared = vec!["run".to_string()];
        let rows = read_sheet(&xml[..], &shared).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["run", "", "note"]);
        assert!(rows[1].is_empty());
        assert_eq!(rows[2], vec!["42", "TRUE"]);
    }
}
