use std::fs;
use std::io::Write;
use std::path::Path;

use assert_matches::assert_matches;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use mgx_loader::domain::MappingFormat;
use mgx_loader::error::LoaderError;
use mgx_loader::mappings::MappingReader;
use mgx_loader::normalize::convert_to_tsv;

fn read_rows(path: &Path, has_header: bool) -> Vec<Vec<String>> {
    MappingReader::open(path, has_header)
        .unwrap()
        .map(|row| row.unwrap().fields)
        .collect()
}

#[test]
fn tsv_is_left_untouched() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("mappings.tsv");
    let content = "run\tanalysis\nSRR1234567\tSRC001\n";
    fs::write(&path, content).unwrap();

    convert_to_tsv(&path, MappingFormat::Tsv).unwrap();
    convert_to_tsv(&path, MappingFormat::Tsv).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), content);
}

#[test]
fn csv_is_rewritten_as_tsv() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("mappings.csv");
    fs::write(
        &path,
        "run,analysis,note\nSRR1234567,SRC001,\"soil, site 4\"\nERR7654321,SRC002\n",
    )
    .unwrap();

    convert_to_tsv(&path, MappingFormat::Csv).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("run\tanalysis\tnote\n"));
    let rows = read_rows(&path, true);
    assert_eq!(
        rows,
        vec![
            vec!["SRR1234567", "SRC001", "soil, site 4"],
            vec!["ERR7654321", "SRC002"],
        ]
    );
}

#[test]
fn invalid_utf8_is_reported_by_row_reader() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("mappings.csv");
    let mut bytes = b"run,analysis\nSRR1234567,".to_vec();
    bytes.extend_from_slice(&[0xff, 0xfe]);
    fs::write(&path, &bytes).unwrap();

    convert_to_tsv(&path, MappingFormat::Csv).unwrap();
    // byte records pass invalid UTF-8 through; the row reader reports it
    let err = MappingReader::open(&path, true)
        .unwrap()
        .find_map(Result::err)
        .unwrap();
    assert_matches!(err, LoaderError::MappingRead(_));
}

#[test]
fn missing_file_is_a_conversion_error() {
    let temp = tempfile::tempdir().unwrap();
    let err = convert_to_tsv(&temp.path().join("absent.csv"), MappingFormat::Csv).unwrap_err();
    assert_matches!(err, LoaderError::Conversion(_));
}

fn write_workbook(path: &Path, entries: &[(&str, &str)]) {
    let file = fs::File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    for (name, content) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheets><sheet name="mappings" sheetId="1" r:id="rId1"/><sheet name="notes" sheetId="2" r:id="rId2"/></sheets>
</workbook>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/>
</Relationships>"#;

const SHARED_STRINGS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="4" uniqueCount="4">
  <si><t>run</t></si><si><t>analysis</t></si><si><t>SRR1234567</t></si><si><t>SRC&amp;001</t></si>
</sst>"#;

const MAPPINGS_SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData>
    <row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
    <row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2" t="s"><v>3</v></c></row>
    <row r="3"><c r="A3" t="inlineStr"><is><t>ERR7654321</t></is></c><c r="C3"><v>17</v></c></row>
  </sheetData>
</worksheet>"#;

const NOTES_SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>not the mappings</t></is></c></row></sheetData>
</worksheet>"#;

#[test]
fn xlsx_first_sheet_is_rewritten_as_tsv() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("mappings.xlsx");
    write_workbook(
        &path,
        &[
            ("xl/workbook.xml", WORKBOOK),
            ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
            ("xl/sharedStrings.xml", SHARED_STRINGS),
            ("xl/worksheets/sheet1.xml", NOTES_SHEET),
            ("xl/worksheets/sheet2.xml", MAPPINGS_SHEET),
        ],
    );

    convert_to_tsv(&path, MappingFormat::Xlsx).unwrap();

    let rows = read_rows(&path, true);
    assert_eq!(
        rows,
        vec![
            vec!["SRR1234567", "SRC&001"],
            vec!["ERR7654321", "", "17"],
        ]
    );
}

#[test]
fn xlsx_without_workbook_falls_back_to_first_sheet() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("mappings.xlsx");
    write_workbook(&path, &[("xl/worksheets/sheet1.xml", NOTES_SHEET)]);

    convert_to_tsv(&path, MappingFormat::Xlsx).unwrap();
    assert_eq!(read_rows(&path, false), vec![vec!["not the mappings"]]);
}

#[test]
fn non_zip_xlsx_is_a_conversion_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("mappings.xlsx");
    fs::write(&path, "run\tanalysis\n").unwrap();

    let err = convert_to_tsv(&path, MappingFormat::Xlsx).unwrap_err();
    assert_matches!(err, LoaderError::Conversion(_));
    assert_eq!(fs::read_to_string(&path).unwrap(), "run\tanalysis\n");
}
