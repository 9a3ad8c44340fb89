use crate::domain::model::{FlowRecord, SectorTable};
use crate::utils::error::{FlowMapError, Result};
use crate::utils::validation::{validate_max_items, validate_range, Validate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const MIN_TOP_N: usize = 1;
pub const MAX_TOP_N: usize = 50;
pub const DEFAULT_TOP_N: usize = 25;
pub const MAX_DESTINATIONS: usize = 20;

/// A single sector choice for one side of the flow, or no restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SectorSelection {
    #[default]
    All,
    Code(String),
}

impl SectorSelection {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("all") {
            SectorSelection::All
        } else {
            SectorSelection::Code(value.to_string())
        }
    }

    pub fn matches(&self, sector_code: &str) -> bool {
        match self {
            SectorSelection::All => true,
            SectorSelection::Code(code) => code == sector_code,
        }
    }

    /// 允許使用者輸入代碼或名稱，統一轉成代碼
    pub fn resolve(&self, sectors: &SectorTable, field: &str) -> Result<SectorSelection> {
        let wanted = match self {
            SectorSelection::All => return Ok(SectorSelection::All),
            SectorSelection::Code(wanted) => wanted,
        };

        if sectors.contains_key(wanted) {
            return Ok(self.clone());
        }

        // 同名的產業可能不只一個，排序後才有固定結果
        let matching: BTreeSet<&str> = sectors
            .values()
            .filter(|label| label.sector_name.eq_ignore_ascii_case(wanted))
            .map(|label| label.sector_code.as_str())
            .collect();

        match matching.len() {
            0 => Err(FlowMapError::InvalidConfigValueError {
                field: field.to_string(),
                value: wanted.clone(),
                reason: "Unknown sector code or name".to_string(),
            }),
            1 => Ok(SectorSelection::Code(
                matching.into_iter().collect::<String>(),
            )),
            _ => Err(FlowMapError::InvalidConfigValueError {
                field: field.to_string(),
                value: wanted.clone(),
                reason: format!(
                    "Ambiguous sector name shared by {}, use a code",
                    matching.into_iter().collect::<Vec<_>>().join(", ")
                ),
            }),
        }
    }
}

impl From<String> for SectorSelection {
    fn from(value: String) -> Self {
        SectorSelection::parse(&value)
    }
}

impl From<SectorSelection> for String {
    fn from(value: SectorSelection) -> Self {
        match value {
            SectorSelection::All => "all".to_string(),
            SectorSelection::Code(code) => code,
        }
    }
}

/// The user-facing controls: which flows to consider and how many to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSelection {
    /// Empty means every origin.
    pub origins: BTreeSet<String>,
    /// Empty means every destination.
    pub destinations: BTreeSet<String>,
    pub origin_sector: SectorSelection,
    pub destination_sector: SectorSelection,
    pub top_n: usize,
}

impl Default for FlowSelection {
    fn default() -> Self {
        Self {
            origins: BTreeSet::new(),
            destinations: BTreeSet::new(),
            origin_sector: SectorSelection::All,
            destination_sector: SectorSelection::All,
            top_n: DEFAULT_TOP_N,
        }
    }
}

impl FlowSelection {
    pub fn matches(&self, flow: &FlowRecord) -> bool {
        !flow.is_domestic()
            && (self.origins.is_empty() || self.origins.contains(&flow.origin_country))
            && (self.destinations.is_empty()
                || self.destinations.contains(&flow.destination_country))
            && self.origin_sector.matches(&flow.origin_sector)
            && self.destination_sector.matches(&flow.destination_sector)
    }

    /// Returns a copy whose sector choices are expressed as codes.
    pub fn resolve_sectors(&self, sectors: &SectorTable) -> Result<FlowSelection> {
        Ok(FlowSelection {
            origin_sector: self
                .origin_sector
                .resolve(sectors, "selection.origin_sector")?,
            destination_sector: self
                .destination_sector
                .resolve(sectors, "selection.destination_sector")?,
            ..self.clone()
        })
    }
}

impl Validate for FlowSelection {
    fn validate(&self) -> Result<()> {
        validate_range("selection.top_n", self.top_n, MIN_TOP_N, MAX_TOP_N)?;
        validate_max_items(
            "selection.destinations",
            self.destinations.len(),
            MAX_DESTINATIONS,
        )?;
        Ok(())
    }
}

/// Keeps the flows matching every facet, in source order. Domestic flows
/// (origin == destination) never pass.
pub fn filter<'a>(flows: &'a [FlowRecord], selection: &FlowSelection) -> Vec<&'a FlowRecord> {
    let filtered: Vec<&FlowRecord> = flows.iter().filter(|f| selection.matches(f)).collect();
    tracing::debug!("Filter kept {} of {} flow records", filtered.len(), flows.len());
    filtered
}

/// Distinct values available for each control, sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FacetOptions {
    pub origins: BTreeSet<String>,
    pub destinations: BTreeSet<String>,
    pub origin_sectors: BTreeSet<String>,
    pub destination_sectors: BTreeSet<String>,
    /// Names for the listed sector codes that appear in the sector table.
    pub sector_names: BTreeMap<String, String>,
}

impl FacetOptions {
    pub fn from_flows(flows: &[FlowRecord], sectors: &SectorTable) -> Self {
        let mut options = FacetOptions::default();
        for flow in flows {
            options.origins.insert(flow.origin_country.clone());
            options.destinations.insert(flow.destination_country.clone());
            options.origin_sectors.insert(flow.origin_sector.clone());
            options
                .destination_sectors
                .insert(flow.destination_sector.clone());
        }

        for code in options.origin_sectors.iter().chain(&options.destination_sectors) {
            if let Some(label) = sectors.get(code) {
                options
                    .sector_names
                    .insert(code.clone(), label.sector_name.clone());
            }
        }
        options
    }

    /// `code (name)` when the code has a label, the bare code otherwise.
    pub fn sector_label(&self, code: &str) -> String {
        match self.sector_names.get(code) {
            Some(name) => format!("{} ({})", code, name),
            None => code.to_string(),
        }
    }
}
