use crate::domain::model::{AggregatedFlow, DestinationBubble, FlowRecord};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// Display tuning for arc widths and bubble radii.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scaling {
    /// Pixels per unit of `ln(1 + value)`.
    pub arc_width_scale: f64,
    /// Meters per unit of `sqrt(value)`.
    pub bubble_radius_scale: f64,
}

impl Default for Scaling {
    fn default() -> Self {
        Self {
            arc_width_scale: 1.0,
            bubble_radius_scale: 2000.0,
        }
    }
}

impl Scaling {
    pub fn arc_thickness(&self, value: f64) -> f64 {
        value.max(0.0).ln_1p() * self.arc_width_scale
    }

    pub fn bubble_radius(&self, total_inbound_value: f64) -> f64 {
        total_inbound_value.max(0.0).sqrt() * self.bubble_radius_scale
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SelectedFlows {
    /// Top OD pairs, highest value first.
    pub flows: Vec<AggregatedFlow>,
    /// One bubble per destination in the filtered set.
    pub bubbles: Vec<DestinationBubble>,
    /// Distinct OD pairs before truncation.
    pub od_pairs: usize,
}

/// Highest value first; equal values fall back to origin, then destination,
/// in ascending lexical order.
fn rank_order(a: &AggregatedFlow, b: &AggregatedFlow) -> Ordering {
    b.total_value
        .total_cmp(&a.total_value)
        .then_with(|| a.origin.cmp(&b.origin))
        .then_with(|| a.destination.cmp(&b.destination))
}

/// Sums inbound value per destination over the whole filtered set.
pub fn destination_totals(filtered: &[&FlowRecord], scaling: &Scaling) -> Vec<DestinationBubble> {
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for flow in filtered {
        *totals.entry(flow.destination_country.as_str()).or_insert(0.0) += flow.obs_value;
    }

    let mut bubbles: Vec<DestinationBubble> = totals
        .into_iter()
        .map(|(destination, total)| DestinationBubble {
            destination: destination.to_string(),
            total_inbound_value: total,
            display_radius: scaling.bubble_radius(total),
        })
        .collect();

    bubbles.sort_by(|a, b| {
        b.total_inbound_value
            .total_cmp(&a.total_inbound_value)
            .then_with(|| a.destination.cmp(&b.destination))
    });
    bubbles
}

/// Groups the filtered flows by OD pair and ranks every pair.
pub fn aggregate_pairs(filtered: &[&FlowRecord], scaling: &Scaling) -> Vec<AggregatedFlow> {
    let mut pairs: HashMap<(&str, &str), AggregatedFlow> = HashMap::new();

    for flow in filtered {
        let key = (
            flow.origin_country.as_str(),
            flow.destination_country.as_str(),
        );
        let entry = pairs.entry(key).or_insert_with(|| AggregatedFlow {
            origin: flow.origin_country.clone(),
            destination: flow.destination_country.clone(),
            total_value: 0.0,
            rank: 0,
            thickness: 0.0,
            origin_sectors: BTreeSet::new(),
            destination_sectors: BTreeSet::new(),
        });
        entry.total_value += flow.obs_value;
        entry.origin_sectors.insert(flow.origin_sector.clone());
        entry
            .destination_sectors
            .insert(flow.destination_sector.clone());
    }

    let mut ranked: Vec<AggregatedFlow> = pairs.into_values().collect();
    ranked.sort_by(rank_order);
    for (i, flow) in ranked.iter_mut().enumerate() {
        flow.rank = i + 1;
        flow.thickness = scaling.arc_thickness(flow.total_value);
    }
    ranked
}

/// Bubble totals come from the full filtered set; arcs are the `top_n`
/// highest-valued OD pairs. Fewer pairs than `top_n` yields all of them.
pub fn aggregate_and_select(
    filtered: &[&FlowRecord],
    top_n: usize,
    scaling: &Scaling,
) -> SelectedFlows {
    let bubbles = destination_totals(filtered, scaling);
    let mut flows = aggregate_pairs(filtered, scaling);
    let od_pairs = flows.len();
    flows.truncate(top_n);

    tracing::debug!(
        "Selected {} of {} OD pairs, {} destination bubbles",
        flows.len(),
        od_pairs,
        bubbles.len()
    );

    SelectedFlows {
        flows,
        bubbles,
        od_pairs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow(origin: &str, dest: &str, value: f64) -> FlowRecord {
        FlowRecord {
            origin_country: origin.to_string(),
            destination_country: dest.to_string(),
            origin_sector: "C10".to_string(),
            destination_sector: "C20".to_string(),
            obs_value: value,
        }
    }

    fn pairs(selected: &SelectedFlows) -> Vec<(&str, &str, f64)> {
        selected
            .flows
            .iter()
            .map(|f| (f.origin.as_str(), f.destination.as_str(), f.total_value))
            .collect()
    }

    #[test]
    fn test_top_two_of_three_pairs() {
        let flows = vec![flow("A", "B", 100.0), flow("A", "C", 50.0), flow("B", "A", 30.0)];
        let filtered: Vec<&FlowRecord> = flows.iter().collect();

        let selected = aggregate_and_select(&filtered, 2, &Scaling::default());
        assert_eq!(pairs(&selected), vec![("A", "B", 100.0), ("A", "C", 50.0)]);
        assert_eq!(selected.od_pairs, 3);

        let all = aggregate_and_select(&filtered, 3, &Scaling::default());
        assert_eq!(all.flows[2].origin, "B");
        assert_eq!(all.flows[2].destination, "A");
        assert_eq!(all.flows[2].rank, 3);
    }

    #[test]
    fn test_bubble_total_and_radius() {
        let flows = vec![flow("A", "B", 100.0), flow("C", "B", 20.0)];
        let filtered: Vec<&FlowRecord> = flows.iter().collect();
        let scaling = Scaling {
            arc_width_scale: 1.0,
            bubble_radius_scale: 3.0,
        };

        let selected = aggregate_and_select(&filtered, 1, &scaling);
        assert_eq!(selected.bubbles.len(), 1);
        assert_eq!(selected.bubbles[0].destination, "B");
        assert_eq!(selected.bubbles[0].total_inbound_value, 120.0);
        assert_eq!(selected.bubbles[0].display_radius, 120f64.sqrt() * 3.0);
    }

    #[test]
    fn test_sector_rows_are_summed_per_pair() {
        let mut second = flow("A", "B", 5.0);
        second.origin_sector = "C11".to_string();
        let flows = vec![flow("A", "B", 10.0), second];
        let filtered: Vec<&FlowRecord> = flows.iter().collect();

        let selected = aggregate_and_select(&filtered, 10, &Scaling::default());
        assert_eq!(selected.flows.len(), 1);
        assert_eq!(selected.flows[0].total_value, 15.0);
        assert_eq!(selected.flows[0].origin_sectors.len(), 2);
        assert_eq!(selected.flows[0].destination_sectors.len(), 1);
    }

    #[test]
    fn test_bubbles_cover_destinations_beyond_top_n() {
        let flows = vec![flow("A", "B", 100.0), flow("A", "C", 1.0), flow("D", "E", 2.0)];
        let filtered: Vec<&FlowRecord> = flows.iter().collect();

        let selected = aggregate_and_select(&filtered, 1, &Scaling::default());
        assert_eq!(selected.flows.len(), 1);
        let dests: Vec<&str> = selected.bubbles.iter().map(|b| b.destination.as_str()).collect();
        assert_eq!(dests, vec!["B", "E", "C"]);
    }

    #[test]
    fn test_bubble_totals_conserve_filtered_value() {
        let flows = vec![
            flow("A", "B", 3.0),
            flow("C", "B", 4.0),
            flow("A", "D", 8.0),
            flow("D", "A", 16.0),
            flow("B", "D", 32.0),
        ];
        let filtered: Vec<&FlowRecord> = flows.iter().collect();

        let selected = aggregate_and_select(&filtered, 2, &Scaling::default());
        let bubble_sum: f64 = selected.bubbles.iter().map(|b| b.total_inbound_value).sum();
        let input_sum: f64 = flows.iter().map(|f| f.obs_value).sum();
        assert_eq!(bubble_sum, input_sum);
    }

    #[test]
    fn test_ranking_is_sorted_and_bounded() {
        let flows: Vec<FlowRecord> = (0..30)
            .map(|i| flow(&format!("O{}", i % 7), &format!("D{}", i % 5), ((i * 37) % 11) as f64))
            .collect();
        let filtered: Vec<&FlowRecord> = flows.iter().collect();

        for top_n in [1, 5, 50] {
            let selected = aggregate_and_select(&filtered, top_n, &Scaling::default());
            assert!(selected.flows.len() <= top_n);
            assert!(selected
                .flows
                .windows(2)
                .all(|w| w[0].total_value >= w[1].total_value));
        }
    }

    #[test]
    fn test_top_one_returns_single_largest_pair() {
        let flows = vec![flow("A", "B", 10.0), flow("C", "D", 40.0), flow("A", "B", 35.0)];
        let filtered: Vec<&FlowRecord> = flows.iter().collect();

        let selected = aggregate_and_select(&filtered, 1, &Scaling::default());
        assert_eq!(pairs(&selected), vec![("A", "B", 45.0)]);
        assert_eq!(selected.flows[0].rank, 1);
    }

    #[test]
    fn test_ties_break_on_origin_then_destination() {
        let flows = vec![
            flow("B", "A", 10.0),
            flow("A", "C", 10.0),
            flow("A", "B", 10.0),
        ];
        let filtered: Vec<&FlowRecord> = flows.iter().collect();

        let selected = aggregate_and_select(&filtered, 3, &Scaling::default());
        assert_eq!(
            pairs(&selected),
            vec![("A", "B", 10.0), ("A", "C", 10.0), ("B", "A", 10.0)]
        );
    }

    #[test]
    fn test_selection_is_deterministic() {
        let flows = vec![
            flow("X", "Y", 1.0),
            flow("Y", "X", 1.0),
            flow("Z", "Y", 2.0),
            flow("X", "Z", 1.0),
        ];
        let filtered: Vec<&FlowRecord> = flows.iter().collect();

        let first = aggregate_and_select(&filtered, 3, &Scaling::default());
        let second = aggregate_and_select(&filtered, 3, &Scaling::default());
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_input_gives_empty_selection() {
        let selected = aggregate_and_select(&[], 25, &Scaling::default());
        assert!(selected.flows.is_empty());
        assert!(selected.bubbles.is_empty());
        assert_eq!(selected.od_pairs, 0);
    }

    #[test]
    fn test_arc_thickness_is_log_scaled() {
        let scaling = Scaling {
            arc_width_scale: 2.0,
            bubble_radius_scale: 1.0,
        };
        assert_eq!(scaling.arc_thickness(0.0), 0.0);
        assert!((scaling.arc_thickness(std::f64::consts::E - 1.0) - 2.0).abs() < 1e-12);
        assert!(scaling.arc_thickness(1_000_000.0) < 30.0);
        assert!(scaling.arc_thickness(10.0) < scaling.arc_thickness(11.0));
    }
}
