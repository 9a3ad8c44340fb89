use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// One row of the trade-flow flat file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub origin_country: String,
    pub destination_country: String,
    pub origin_sector: String,
    pub destination_sector: String,
    pub obs_value: f64,
}

impl FlowRecord {
    pub fn is_domestic(&self) -> bool {
        self.origin_country == self.destination_country
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteCoordinate {
    pub country_code: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl RouteCoordinate {
    /// deck.gl 的座標順序是 [lon, lat]
    pub fn position(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorLabel {
    pub sector_code: String,
    pub sector_name: String,
}

pub type RouteTable = HashMap<String, RouteCoordinate>;
pub type SectorTable = HashMap<String, SectorLabel>;

/// Flows grouped by (origin, destination), ranked by summed value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedFlow {
    pub origin: String,
    pub destination: String,
    pub total_value: f64,
    /// 1-based position after sorting.
    pub rank: usize,
    pub thickness: f64,
    pub origin_sectors: BTreeSet<String>,
    pub destination_sectors: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DestinationBubble {
    pub destination: String,
    pub total_inbound_value: f64,
    pub display_radius: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileReport {
    pub file: String,
    pub rows_read: usize,
    pub rows_skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub flows: FileReport,
    pub routes: FileReport,
    pub sectors: FileReport,
}

impl LoadReport {
    pub fn total_skipped(&self) -> usize {
        self.flows.rows_skipped + self.routes.rows_skipped + self.sectors.rows_skipped
    }
}

/// The three source tables after schema validation.
#[derive(Debug, Clone, Default)]
pub struct Datasets {
    pub flows: Vec<FlowRecord>,
    pub routes: RouteTable,
    pub sectors: SectorTable,
    pub report: LoadReport,
}
