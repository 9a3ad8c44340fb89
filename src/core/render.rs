//! Builds the deck.gl document for the flow map.
//!
//! The output follows the JSON shape pydeck emits (`@@type` layer tags,
//! `@@=` accessor expressions, camelCase keys), so any deck.gl JSON host can
//! draw it without further translation.

use crate::domain::model::{
    AggregatedFlow, DestinationBubble, RouteCoordinate, RouteTable, SectorTable,
};
use crate::utils::error::{FlowMapError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const NO_FLOWS_MESSAGE: &str = "No flows match the current selection";
pub const UNMAPPED_FLOWS_MESSAGE: &str = "None of the selected flows have map coordinates";

/// What to do when a country code has no row in the routes file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingCoordinatePolicy {
    #[default]
    Drop,
    Fail,
}

impl std::str::FromStr for MissingCoordinatePolicy {
    type Err = FlowMapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(MissingCoordinatePolicy::Drop),
            "fail" => Ok(MissingCoordinatePolicy::Fail),
            other => Err(FlowMapError::InvalidConfigValueError {
                field: "render.missing_coordinates".to_string(),
                value: other.to_string(),
                reason: "Expected 'drop' or 'fail'".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub missing_coordinates: MissingCoordinatePolicy,
    pub arc_source_color: [u8; 4],
    pub arc_target_color: [u8; 4],
    pub bubble_fill_color: [u8; 4],
    pub arc_tilt: f64,
    pub zoom: f64,
    /// `[latitude, longitude]` used when nothing is drawn.
    pub default_center: [f64; 2],
    pub map_provider: String,
    pub map_style: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            missing_coordinates: MissingCoordinatePolicy::Drop,
            arc_source_color: [0, 128, 200, 200],
            arc_target_color: [200, 0, 80, 200],
            bubble_fill_color: [30, 144, 255, 160],
            arc_tilt: 15.0,
            zoom: 2.0,
            default_center: [50.0, 10.0],
            map_provider: "carto".to_string(),
            map_style: "light".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: f64,
    pub pitch: f64,
    pub bearing: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcDatum {
    pub rank: usize,
    pub origin: String,
    pub destination: String,
    pub value: f64,
    pub width: f64,
    pub source_position: [f64; 2],
    pub target_position: [f64; 2],
    pub tooltip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BubbleDatum {
    pub destination: String,
    pub value: f64,
    pub radius: f64,
    pub position: [f64; 2],
    pub tooltip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcLayer {
    pub id: String,
    pub data: Vec<ArcDatum>,
    pub get_source_position: String,
    pub get_target_position: String,
    pub get_width: String,
    pub get_source_color: [u8; 4],
    pub get_target_color: [u8; 4],
    pub get_tilt: f64,
    pub pickable: bool,
    pub auto_highlight: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScatterplotLayer {
    pub id: String,
    pub data: Vec<BubbleDatum>,
    pub get_position: String,
    pub get_radius: String,
    pub get_fill_color: [u8; 4],
    pub pickable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "@@type")]
pub enum Layer {
    ArcLayer(ArcLayer),
    ScatterplotLayer(ScatterplotLayer),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tooltip {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSpec {
    pub initial_view_state: ViewState,
    pub layers: Vec<Layer>,
    pub map_provider: String,
    pub map_style: String,
    pub tooltip: Tooltip,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip)]
    pub dropped_flows: usize,
    #[serde(skip)]
    pub dropped_bubbles: usize,
}

impl LayerSpec {
    pub fn arcs(&self) -> &[ArcDatum] {
        self.layers
            .iter()
            .find_map(|layer| match layer {
                Layer::ArcLayer(arc) => Some(arc.data.as_slice()),
                Layer::ScatterplotLayer(_) => None,
            })
            .unwrap_or(&[])
    }

    pub fn bubbles(&self) -> &[BubbleDatum] {
        self.layers
            .iter()
            .find_map(|layer| match layer {
                Layer::ScatterplotLayer(scatter) => Some(scatter.data.as_slice()),
                Layer::ArcLayer(_) => None,
            })
            .unwrap_or(&[])
    }
}

pub fn format_value(value: f64) -> String {
    format!("{:.2}", value)
}

/// Sector names for a tooltip line; long lists collapse to a count.
pub fn sector_names(codes: &BTreeSet<String>, sectors: &SectorTable) -> String {
    if codes.len() > 3 {
        return format!("{} sectors", codes.len());
    }
    codes
        .iter()
        .map(|code| {
            sectors
                .get(code)
                .map(|label| label.sector_name.as_str())
                .unwrap_or(code.as_str())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn lookup<'a>(
    routes: &'a RouteTable,
    code: &str,
    role: &str,
    policy: MissingCoordinatePolicy,
) -> Result<Option<&'a RouteCoordinate>> {
    match (routes.get(code), policy) {
        (Some(coord), _) => Ok(Some(coord)),
        (None, MissingCoordinatePolicy::Drop) => {
            tracing::debug!("No coordinates for {} '{}', dropping", role, code);
            Ok(None)
        }
        (None, MissingCoordinatePolicy::Fail) => Err(FlowMapError::UnknownCoordinate {
            code: code.to_string(),
            role: role.to_string(),
        }),
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Center on the arcs (midpoint of mean origin and mean destination), else
/// on the bubbles, else on the configured default.
fn view_center(arcs: &[ArcDatum], bubbles: &[BubbleDatum], options: &RenderOptions) -> [f64; 2] {
    let origin_lat = mean(arcs.iter().map(|a| a.source_position[1]));
    let origin_lon = mean(arcs.iter().map(|a| a.source_position[0]));
    let dest_lat = mean(arcs.iter().map(|a| a.target_position[1]));
    let dest_lon = mean(arcs.iter().map(|a| a.target_position[0]));

    if let (Some(olat), Some(olon), Some(dlat), Some(dlon)) =
        (origin_lat, origin_lon, dest_lat, dest_lon)
    {
        return [(olat + dlat) / 2.0, (olon + dlon) / 2.0];
    }

    match (
        mean(bubbles.iter().map(|b| b.position[1])),
        mean(bubbles.iter().map(|b| b.position[0])),
    ) {
        (Some(lat), Some(lon)) => [lat, lon],
        _ => options.default_center,
    }
}

pub fn build_layers(
    flows: &[AggregatedFlow],
    bubbles: &[DestinationBubble],
    routes: &RouteTable,
    sectors: &SectorTable,
    options: &RenderOptions,
) -> Result<LayerSpec> {
    let policy = options.missing_coordinates;

    let mut arc_data = Vec::with_capacity(flows.len());
    let mut dropped_flows = 0;
    for flow in flows {
        let origin = lookup(routes, &flow.origin, "origin", policy)?;
        let destination = lookup(routes, &flow.destination, "destination", policy)?;
        let (Some(origin), Some(destination)) = (origin, destination) else {
            dropped_flows += 1;
            continue;
        };

        arc_data.push(ArcDatum {
            rank: flow.rank,
            origin: flow.origin.clone(),
            destination: flow.destination.clone(),
            value: flow.total_value,
            width: flow.thickness,
            source_position: origin.position(),
            target_position: destination.position(),
            tooltip: format!(
                "Origin: {}\nDestination: {}\nValue: {}\nRow: {}\nCol: {}",
                flow.origin,
                flow.destination,
                format_value(flow.total_value),
                sector_names(&flow.origin_sectors, sectors),
                sector_names(&flow.destination_sectors, sectors),
            ),
        });
    }

    let mut bubble_data = Vec::with_capacity(bubbles.len());
    let mut dropped_bubbles = 0;
    for bubble in bubbles {
        let Some(coord) = lookup(routes, &bubble.destination, "destination", policy)? else {
            dropped_bubbles += 1;
            continue;
        };

        bubble_data.push(BubbleDatum {
            destination: bubble.destination.clone(),
            value: bubble.total_inbound_value,
            radius: bubble.display_radius,
            position: coord.position(),
            tooltip: format!(
                "Destination: {}\nTotal inbound: {}",
                bubble.destination,
                format_value(bubble.total_inbound_value)
            ),
        });
    }

    if dropped_flows + dropped_bubbles > 0 {
        tracing::warn!(
            "⚠️ Dropped {} flows and {} bubbles without coordinates",
            dropped_flows,
            dropped_bubbles
        );
    }

    let [latitude, longitude] = view_center(&arc_data, &bubble_data, options);
    let message = match (flows.is_empty(), arc_data.is_empty()) {
        (true, _) => Some(NO_FLOWS_MESSAGE.to_string()),
        (false, true) => Some(UNMAPPED_FLOWS_MESSAGE.to_string()),
        (false, false) => None,
    };

    Ok(LayerSpec {
        initial_view_state: ViewState {
            latitude,
            longitude,
            zoom: options.zoom,
            pitch: 0.0,
            bearing: 0.0,
        },
        layers: vec![
            Layer::ArcLayer(ArcLayer {
                id: "flows".to_string(),
                data: arc_data,
                get_source_position: "@@=sourcePosition".to_string(),
                get_target_position: "@@=targetPosition".to_string(),
                get_width: "@@=width".to_string(),
                get_source_color: options.arc_source_color,
                get_target_color: options.arc_target_color,
                get_tilt: options.arc_tilt,
                pickable: true,
                auto_highlight: true,
            }),
            Layer::ScatterplotLayer(ScatterplotLayer {
                id: "destinations".to_string(),
                data: bubble_data,
                get_position: "@@=position".to_string(),
                get_radius: "@@=radius".to_string(),
                get_fill_color: options.bubble_fill_color,
                pickable: true,
            }),
        ],
        map_provider: options.map_provider.clone(),
        map_style: options.map_style.clone(),
        tooltip: Tooltip {
            text: "{tooltip}".to_string(),
        },
        message,
        dropped_flows,
        dropped_bubbles,
    })
}
