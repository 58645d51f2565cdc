//! CSV export of the aggregated keyword table.
//!
//! Output is UTF-8 with a leading byte-order mark (so spreadsheet apps detect the encoding),
//! a header row, and comma separators.

use serde::{Deserialize, Serialize};
use serplens_core::aggregate::KeywordAggregate;
use serplens_core::{Error, Result};
use std::io::{Read, Write};
use std::path::Path;

pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub const COLUMNS: [&str; 7] = [
    "term",
    "total_occurrence",
    "max_occurrence",
    "max_occurrence_url",
    "score",
    "ranking",
    "mean_top_3",
];

/// One CSV row. Field order defines column order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportRow {
    pub term: String,
    pub total_occurrence: u64,
    pub max_occurrence: u64,
    pub max_occurrence_url: Option<String>,
    pub score: f64,
    pub ranking: Option<usize>,
    pub mean_top_3: f64,
}

impl From<&KeywordAggregate> for ExportRow {
    fn from(r: &KeywordAggregate) -> Self {
        Self {
            term: r.term.clone(),
            total_occurrence: r.total_occurrence,
            max_occurrence: r.max_occurrence,
            max_occurrence_url: r.max_occurrence_url.clone(),
            score: r.score,
            ranking: r.ranking,
            mean_top_3: r.mean_top_3(),
        }
    }
}

fn export_err(e: impl std::fmt::Display) -> Error {
    Error::Export(e.to_string())
}

pub fn write_csv<W: Write>(mut w: W, rows: &[KeywordAggregate]) -> Result<()> {
    w.write_all(UTF8_BOM).map_err(export_err)?;
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(w);
    // Written explicitly so an empty table still gets its header row.
    wtr.write_record(COLUMNS).map_err(export_err)?;
    for r in rows {
        wtr.serialize(ExportRow::from(r)).map_err(export_err)?;
    }
    wtr.flush().map_err(export_err)?;
    Ok(())
}

pub fn to_csv_bytes(rows: &[KeywordAggregate]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_csv(&mut out, rows)?;
    Ok(out)
}

pub fn write_csv_file(path: &Path, rows: &[KeywordAggregate]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(export_err)?;
    }
    let f = std::fs::File::create(path)
        .map_err(|e| Error::Export(format!("{}: {e}", path.display())))?;
    let mut w = std::io::BufWriter::new(f);
    write_csv(&mut w, rows)?;
    w.flush().map_err(export_err)?;
    tracing::info!(path = %path.display(), rows = rows.len(), "wrote csv");
    Ok(())
}

/// Parse an exported table back (BOM optional). Rejects unexpected headers.
pub fn read_csv<R: Read>(mut r: R) -> Result<Vec<ExportRow>> {
    let mut buf = Vec::new();
    r.read_to_end(&mut buf).map_err(export_err)?;
    let body = buf.strip_prefix(UTF8_BOM).unwrap_or(&buf);

    let mut rdr = csv::Reader::from_reader(body);
    let headers = rdr.headers().map_err(export_err)?.clone();
    if headers.iter().ne(COLUMNS.iter().copied()) {
        return Err(Error::Export(format!(
            "unexpected header: {}",
            headers.iter().collect::<Vec<_>>().join(",")
        )));
    }
    let mut out = Vec::new();
    for rec in rdr.deserialize() {
        out.push(rec.map_err(export_err)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serplens_core::aggregate::{aggregate, RankedDocument, ScoredDocument};
    use serplens_core::KeywordCandidate;

    fn sample_rows() -> Vec<KeywordAggregate> {
        let a = ScoredDocument::new(
            RankedDocument::competitor(
                "https://a.test/?q=1,2",
                0,
                "Pizza, \"Napoli\" pizza in Paris",
            ),
            vec![
                KeywordCandidate::new("pizza", 0.0123),
                KeywordCandidate::new("\"Napoli\" pizza", 0.5),
            ],
        );
        let u = ScoredDocument::new(
            RankedDocument::user("https://mine.test/", "Crème brûlée crème"),
            vec![KeywordCandidate::new("Crème", 0.25)],
        );
        aggregate(&[a], Some(&u)).unwrap()
    }

    #[test]
    fn starts_with_bom_and_header() {
        let bytes = to_csv_bytes(&sample_rows()).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = std::str::from_utf8(&bytes[UTF8_BOM.len()..]).unwrap();
        let first = text.lines().next().unwrap();
        assert_eq!(
            first,
            "term,total_occurrence,max_occurrence,max_occurrence_url,score,ranking,mean_top_3"
        );
    }

    #[test]
    fn empty_table_still_has_header() {
        let bytes = to_csv_bytes(&[]).unwrap();
        let text = std::str::from_utf8(&bytes[UTF8_BOM.len()..]).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(read_csv(&bytes[..]).unwrap().is_empty());
    }

    #[test]
    fn round_trip_recovers_column_values() {
        let rows = sample_rows();
        let bytes = to_csv_bytes(&rows).unwrap();
        let back = read_csv(&bytes[..]).unwrap();
        assert_eq!(back.len(), rows.len());
        for (orig, got) in rows.iter().zip(&back) {
            let want = ExportRow::from(orig);
            assert_eq!(got.term, want.term);
            assert_eq!(got.total_occurrence, want.total_occurrence);
            assert_eq!(got.max_occurrence, want.max_occurrence);
            assert_eq!(got.max_occurrence_url, want.max_occurrence_url);
            assert_eq!(got.ranking, want.ranking);
            assert!((got.score - want.score).abs() < 1e-12);
            assert!((got.mean_top_3 - want.mean_top_3).abs() < 1e-12);
        }
        // The user-only term has no ranking, which serializes as an empty cell.
        let creme = back.iter().find(|r| r.term == "Crème").unwrap();
        assert_eq!(creme.ranking, None);
        assert_eq!(creme.total_occurrence, 2);
    }

    #[test]
    fn read_rejects_foreign_headers() {
        let err = read_csv(&b"a,b\n1,2\n"[..]).unwrap_err();
        assert_eq!(err.code(), "export_failed");
    }

    #[test]
    fn write_csv_file_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("nested").join("table.csv");
        write_csv_file(&p, &sample_rows()).unwrap();
        let f = std::fs::File::open(&p).unwrap();
        assert_eq!(read_csv(f).unwrap().len(), 3);
    }
}
