//! Column layouts for the three source files and the row parsers built on them.
//!
//! A column is addressed either by header name or by 0-based position. The
//! route and sector files ship without stable header names, so their defaults
//! are positional.

use crate::domain::model::{FileReport, FlowRecord, RouteCoordinate, SectorLabel};
use crate::utils::error::{FlowMapError, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnSelector {
    Index(usize),
    Name(String),
}

impl ColumnSelector {
    pub fn name(name: &str) -> Self {
        ColumnSelector::Name(name.to_string())
    }

    /// 對照表頭，找出實際的欄位位置
    pub fn resolve(&self, headers: &StringRecord, file: &str) -> Result<usize> {
        let found = match self {
            ColumnSelector::Index(idx) => (*idx < headers.len()).then_some(*idx),
            ColumnSelector::Name(name) => headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').trim() == name),
        };

        found.ok_or_else(|| FlowMapError::SchemaError {
            file: file.to_string(),
            column: self.to_string(),
        })
    }
}

impl fmt::Display for ColumnSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnSelector::Index(idx) => write!(f, "#{}", idx),
            ColumnSelector::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSchema {
    pub origin: ColumnSelector,
    pub destination: ColumnSelector,
    pub origin_sector: ColumnSelector,
    pub destination_sector: ColumnSelector,
    pub value: ColumnSelector,
}

impl Default for FlowSchema {
    fn default() -> Self {
        Self {
            origin: ColumnSelector::name("refArea"),
            destination: ColumnSelector::name("counterpartArea"),
            origin_sector: ColumnSelector::name("rowIi"),
            destination_sector: ColumnSelector::name("colIi"),
            value: ColumnSelector::name("obsValue"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteSchema {
    pub code: ColumnSelector,
    pub latitude: ColumnSelector,
    pub longitude: ColumnSelector,
}

impl Default for RouteSchema {
    fn default() -> Self {
        Self {
            code: ColumnSelector::Index(1),
            latitude: ColumnSelector::Index(2),
            longitude: ColumnSelector::Index(3),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectorSchema {
    pub code: ColumnSelector,
    pub name: ColumnSelector,
}

impl Default for SectorSchema {
    fn default() -> Self {
        Self {
            code: ColumnSelector::Index(0),
            name: ColumnSelector::Index(1),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub flows: FlowSchema,
    pub routes: RouteSchema,
    pub sectors: SectorSchema,
}

/// Rows that passed validation plus the read/skip counts for the file.
#[derive(Debug, Clone)]
pub struct Parsed<T> {
    pub rows: Vec<T>,
    pub report: FileReport,
}

fn reader(data: &[u8]) -> csv::Reader<&[u8]> {
    ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(data)
}

fn text(record: &StringRecord, idx: usize) -> Option<&str> {
    record.get(idx).filter(|v| !v.is_empty())
}

fn number(record: &StringRecord, idx: usize) -> Option<f64> {
    text(record, idx)?.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Reads every record of `data`, keeping the rows `parse_row` accepts.
fn parse_rows<T>(
    file: &str,
    data: &[u8],
    columns: &[&ColumnSelector],
    mut parse_row: impl FnMut(&StringRecord, &[usize]) -> Option<T>,
) -> Result<Parsed<T>> {
    let mut rdr = reader(data);
    let headers = rdr.headers()?.clone();
    let indices = columns
        .iter()
        .map(|c| c.resolve(&headers, file))
        .collect::<Result<Vec<_>>>()?;

    let mut report = FileReport {
        file: file.to_string(),
        ..FileReport::default()
    };
    let mut rows = Vec::new();

    for result in rdr.records() {
        report.rows_read += 1;
        let parsed = match result {
            Ok(record) => parse_row(&record, &indices),
            Err(e) => {
                tracing::debug!("{}: unreadable row {}: {}", file, report.rows_read, e);
                None
            }
        };
        match parsed {
            Some(row) => rows.push(row),
            None => report.rows_skipped += 1,
        }
    }

    if report.rows_skipped > 0 {
        tracing::warn!(
            "⚠️ {}: skipped {} of {} rows with missing or invalid fields",
            file,
            report.rows_skipped,
            report.rows_read
        );
    }

    Ok(Parsed { rows, report })
}

pub fn parse_flows(file: &str, data: &[u8], schema: &FlowSchema) -> Result<Parsed<FlowRecord>> {
    let columns = [
        &schema.origin,
        &schema.destination,
        &schema.origin_sector,
        &schema.destination_sector,
        &schema.value,
    ];
    parse_rows(file, data, &columns, |record, idx| {
        let obs_value = number(record, idx[4]).filter(|v| *v >= 0.0)?;
        Some(FlowRecord {
            origin_country: text(record, idx[0])?.to_string(),
            destination_country: text(record, idx[1])?.to_string(),
            origin_sector: text(record, idx[2])?.to_string(),
            destination_sector: text(record, idx[3])?.to_string(),
            obs_value,
        })
    })
}

pub fn parse_routes(
    file: &str,
    data: &[u8],
    schema: &RouteSchema,
) -> Result<Parsed<RouteCoordinate>> {
    let columns = [&schema.code, &schema.latitude, &schema.longitude];
    parse_rows(file, data, &columns, |record, idx| {
        let latitude = number(record, idx[1]).filter(|v| (-90.0..=90.0).contains(v))?;
        let longitude = number(record, idx[2]).filter(|v| (-180.0..=180.0).contains(v))?;
        Some(RouteCoordinate {
            country_code: text(record, idx[0])?.to_string(),
            latitude,
            longitude,
        })
    })
}

pub fn parse_sectors(
    file: &str,
    data: &[u8],
    schema: &SectorSchema,
) -> Result<Parsed<SectorLabel>> {
    let columns = [&schema.code, &schema.name];
    parse_rows(file, data, &columns, |record, idx| {
        Some(SectorLabel {
            sector_code: text(record, idx[0])?.to_string(),
            sector_name: text(record, idx[1])?.to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOWS: &str = "\
refArea,counterpartArea,rowIi,colIi,obsValue
DE,FR,C10,C20,12.5
DE,FR,C10,C21,n/a
IT,,C10,C20,3
ES,PT, C10 ,C20,-4
ES,PT,C10,C20,7
";

    #[test]
    fn test_parse_flows_skips_malformed_rows() {
        let parsed = parse_flows("flows.csv", FLOWS.as_bytes(), &FlowSchema::default()).unwrap();

        assert_eq!(parsed.report.rows_read, 5);
        assert_eq!(parsed.report.rows_skipped, 3);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0].origin_country, "DE");
        assert_eq!(parsed.rows[0].obs_value, 12.5);
        assert_eq!(parsed.rows[1].origin_sector, "C10");
    }

    #[test]
    fn test_parse_flows_fails_fast_on_missing_column() {
        let data = "refArea,counterpartArea,rowIi,colIi\nDE,FR,C10,C20\n";
        let err = parse_flows("flows.csv", data.as_bytes(), &FlowSchema::default()).unwrap_err();

        match err {
            FlowMapError::SchemaError { file, column } => {
                assert_eq!(file, "flows.csv");
                assert_eq!(column, "obsValue");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_routes_by_position() {
        let data = "\
name,code,lat,lon
Germany,DE,51.1,10.4
Nowhere,XX,,10
Spain,ES,40.4,-3.7
Broken,BR,95.0,10
";
        let parsed = parse_routes("routes.csv", data.as_bytes(), &RouteSchema::default()).unwrap();

        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.report.rows_skipped, 2);
        assert_eq!(parsed.rows[1].country_code, "ES");
        assert_eq!(parsed.rows[1].position(), [-3.7, 40.4]);
    }

    #[test]
    fn test_parse_routes_index_out_of_range() {
        let data = "code,lat\nDE,51.1\n";
        let err = parse_routes("routes.csv", data.as_bytes(), &RouteSchema::default()).unwrap_err();
        assert!(matches!(err, FlowMapError::SchemaError { .. }));
    }

    #[test]
    fn test_parse_sectors_trims_codes() {
        let data = "Code,Name,Extra\n C10 ,Manufacture of food,x\nC11,,y\n";
        let parsed = parse_sectors("nace.csv", data.as_bytes(), &SectorSchema::default()).unwrap();

        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].sector_code, "C10");
        assert_eq!(parsed.report.rows_skipped, 1);
    }

    #[test]
    fn test_column_selector_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            code: ColumnSelector,
            name: ColumnSelector,
        }

        let w: Wrapper = toml::from_str("code = 2\nname = \"label\"").unwrap();
        assert_eq!(w.code, ColumnSelector::Index(2));
        assert_eq!(w.name, ColumnSelector::name("label"));
    }
}
