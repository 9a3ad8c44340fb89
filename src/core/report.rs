use crate::core::aggregate::SelectedFlows;
use crate::core::render::{format_value, sector_names, LayerSpec, NO_FLOWS_MESSAGE};
use crate::domain::model::{AggregatedFlow, FlowRecord, LoadReport, SectorTable};
use crate::utils::error::{FlowMapError, Result};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowSummary {
    pub filtered_records: usize,
    pub filtered_total_value: f64,
    pub od_pairs: usize,
    pub flows_mapped: usize,
    pub mapped_value: f64,
    pub destinations: usize,
    pub dropped_flows: usize,
    pub dropped_bubbles: usize,
    pub skipped_rows: usize,
}

impl FlowSummary {
    pub fn new(
        filtered: &[&FlowRecord],
        selected: &SelectedFlows,
        layers: &LayerSpec,
        load_report: &LoadReport,
    ) -> Self {
        Self {
            filtered_records: filtered.len(),
            filtered_total_value: filtered.iter().map(|f| f.obs_value).sum(),
            od_pairs: selected.od_pairs,
            flows_mapped: layers.arcs().len(),
            mapped_value: layers.arcs().iter().map(|a| a.value).sum(),
            destinations: selected.bubbles.len(),
            dropped_flows: layers.dropped_flows,
            dropped_bubbles: layers.dropped_bubbles,
            skipped_rows: load_report.total_skipped(),
        }
    }

    pub fn share_of_total(&self, value: f64) -> f64 {
        if self.filtered_total_value > 0.0 {
            value / self.filtered_total_value * 100.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Serialize)]
struct FlowRow<'a> {
    rank: usize,
    origin: &'a str,
    destination: &'a str,
    value: f64,
    share_percent: f64,
    origin_sectors: String,
    destination_sectors: String,
}

/// Top flows as CSV, one row per ranked OD pair.
pub fn write_flow_table(
    flows: &[AggregatedFlow],
    summary: &FlowSummary,
    sectors: &SectorTable,
) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for flow in flows {
        writer.serialize(FlowRow {
            rank: flow.rank,
            origin: &flow.origin,
            destination: &flow.destination,
            value: flow.total_value,
            share_percent: summary.share_of_total(flow.total_value),
            origin_sectors: sector_names(&flow.origin_sectors, sectors),
            destination_sectors: sector_names(&flow.destination_sectors, sectors),
        })?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| FlowMapError::ProcessingError {
            message: format!("Failed to finish flow table: {}", e),
        })?;
    String::from_utf8(bytes).map_err(|e| FlowMapError::ProcessingError {
        message: format!("Flow table is not valid UTF-8: {}", e),
    })
}

/// Plain-text listing for the terminal.
pub fn format_flow_table(flows: &[AggregatedFlow], summary: &FlowSummary) -> String {
    if flows.is_empty() {
        return NO_FLOWS_MESSAGE.to_string();
    }

    let mut lines = vec![format!(
        "{:>4}  {:<8} {:<8} {:>16} {:>8}",
        "Rank", "Origin", "Dest", "Value", "Share"
    )];
    for flow in flows {
        lines.push(format!(
            "{:>4}  {:<8} {:<8} {:>16} {:>7.1}%",
            flow.rank,
            flow.origin,
            flow.destination,
            format_value(flow.total_value),
            summary.share_of_total(flow.total_value)
        ));
    }
    lines.push(format!(
        "Total value: {}  |  Flow records: {}  |  OD pairs: {}  |  Mapped: {}",
        format_value(summary.filtered_total_value),
        summary.filtered_records,
        summary.od_pairs,
        summary.flows_mapped
    ));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn ranked(origin: &str, destination: &str, value: f64, rank: usize) -> AggregatedFlow {
        AggregatedFlow {
            origin: origin.to_string(),
            destination: destination.to_string(),
            total_value: value,
            rank,
            thickness: 1.0,
            origin_sectors: ["C10".to_string()].into_iter().collect(),
            destination_sectors: BTreeSet::new(),
        }
    }

    fn summary(total: f64) -> FlowSummary {
        FlowSummary {
            filtered_total_value: total,
            filtered_records: 3,
            od_pairs: 2,
            flows_mapped: 2,
            ..FlowSummary::default()
        }
    }

    #[test]
    fn test_write_flow_table() {
        let flows = vec![ranked("DE", "FR", 75.0, 1), ranked("IT", "FR", 25.0, 2)];
        let csv = write_flow_table(&flows, &summary(100.0), &SectorTable::new()).unwrap();

        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "rank,origin,destination,value,share_percent,origin_sectors,destination_sectors"
        );
        assert_eq!(lines[1], "1,DE,FR,75.0,75.0,C10,");
    }

    #[test]
    fn test_share_of_zero_total() {
        assert_eq!(summary(0.0).share_of_total(10.0), 0.0);
    }

    #[test]
    fn test_format_flow_table() {
        let flows = vec![ranked("DE", "FR", 75.0, 1)];
        let text = format_flow_table(&flows, &summary(100.0));

        assert!(text.contains("DE"));
        assert!(text.contains("75.00"));
        assert!(text.contains("Total value: 100.00"));
        assert_eq!(format_flow_table(&[], &summary(0.0)), NO_FLOWS_MESSAGE);
    }
}
