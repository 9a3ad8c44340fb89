use crate::core::aggregate::aggregate_and_select;
use crate::core::filter::{filter, FlowSelection};
use crate::core::loader::DataLoader;
use crate::core::render::{build_layers, LayerSpec};
use crate::core::report::{write_flow_table, FlowSummary};
use crate::core::{ConfigProvider, Datasets, Pipeline, Storage};
use crate::domain::model::{AggregatedFlow, LoadReport};
use crate::utils::error::Result;
use crate::utils::validation::Validate;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const MAP_FILE: &str = "flow_map.json";
pub const TABLE_FILE: &str = "top_flows.csv";
pub const SUMMARY_FILE: &str = "summary.json";

/// Everything one run produces, before it is written out.
#[derive(Debug, Clone)]
pub struct FlowMapResult {
    pub layer_spec: LayerSpec,
    pub flows: Vec<AggregatedFlow>,
    pub summary: FlowSummary,
    pub selection: FlowSelection,
    pub load_report: LoadReport,
    pub table_csv: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct SummaryDocument<'a> {
    generated_at: &'a DateTime<Utc>,
    selection: &'a FlowSelection,
    summary: &'a FlowSummary,
    load_report: &'a LoadReport,
}

pub struct FlowMapPipeline<S: Storage, C: ConfigProvider> {
    loader: DataLoader<S>,
    output: S,
    config: C,
}

impl<S: Storage, C: ConfigProvider> FlowMapPipeline<S, C> {
    /// `cache` holds the downloaded source files, `output` receives the results.
    pub fn new(cache: S, output: S, config: C) -> Self {
        let loader = DataLoader::new(cache, config.base_url().map(str::to_string))
            .with_refresh(config.refresh());
        Self {
            loader,
            output,
            config,
        }
    }

    pub fn config(&self) -> &C {
        &self.config
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for FlowMapPipeline<S, C> {
    async fn extract(&self) -> Result<Datasets> {
        self.loader
            .load(self.config.source_files(), self.config.schema())
            .await
    }

    async fn transform(&self, data: Datasets) -> Result<FlowMapResult> {
        // 名稱形式的產業選擇先轉成代碼
        let selection = self.config.selection().resolve_sectors(&data.sectors)?;
        selection.validate()?;

        let filtered = filter(&data.flows, &selection);
        if filtered.is_empty() {
            tracing::warn!("No flows match the current selection");
        }

        let selected = aggregate_and_select(&filtered, selection.top_n, self.config.scaling());
        let layer_spec = build_layers(
            &selected.flows,
            &selected.bubbles,
            &data.routes,
            &data.sectors,
            self.config.render_options(),
        )?;

        let summary = FlowSummary::new(&filtered, &selected, &layer_spec, &data.report);
        let table_csv = write_flow_table(&selected.flows, &summary, &data.sectors)?;

        Ok(FlowMapResult {
            layer_spec,
            flows: selected.flows,
            summary,
            selection,
            load_report: data.report,
            table_csv,
            generated_at: Utc::now(),
        })
    }

    async fn load(&self, result: FlowMapResult) -> Result<String> {
        let map_json = serde_json::to_vec_pretty(&result.layer_spec)?;
        self.output.write_file(MAP_FILE, &map_json).await?;

        self.output
            .write_file(TABLE_FILE, result.table_csv.as_bytes())
            .await?;

        let summary_json = serde_json::to_vec_pretty(&SummaryDocument {
            generated_at: &result.generated_at,
            selection: &result.selection,
            summary: &result.summary,
            load_report: &result.load_report,
        })?;
        self.output.write_file(SUMMARY_FILE, &summary_json).await?;

        tracing::debug!(
            "Wrote {}, {} and {}",
            MAP_FILE,
            TABLE_FILE,
            SUMMARY_FILE
        );
        Ok(self.output.location(MAP_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::aggregate::Scaling;
    use crate::core::filter::SectorSelection;
    use crate::core::loader::SourceFiles;
    use crate::core::render::{MissingCoordinatePolicy, RenderOptions};
    use crate::core::schema::SchemaConfig;
    use crate::domain::model::{FlowRecord, RouteCoordinate, SectorLabel};
    use crate::utils::error::FlowMapError;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        fn new() -> Self {
            Self {
                files: Arc::new(Mutex::new(HashMap::new())),
            }
        }

        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned()
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                FlowMapError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }

        async fn exists(&self, path: &str) -> bool {
            self.files.lock().await.contains_key(path)
        }

        fn location(&self, path: &str) -> String {
            format!("test_output/{}", path)
        }
    }

    #[derive(Default)]
    struct MockConfig {
        files: SourceFiles,
        schema: SchemaConfig,
        selection: FlowSelection,
        scaling: Scaling,
        render: RenderOptions,
    }

    impl ConfigProvider for MockConfig {
        fn base_url(&self) -> Option<&str> {
            None
        }

        fn cache_dir(&self) -> &str {
            "test_cache"
        }

        fn output_path(&self) -> &str {
            "test_output"
        }

        fn refresh(&self) -> bool {
            false
        }

        fn source_files(&self) -> &SourceFiles {
            &self.files
        }

        fn schema(&self) -> &SchemaConfig {
            &self.schema
        }

        fn selection(&self) -> &FlowSelection {
            &self.selection
        }

        fn scaling(&self) -> &Scaling {
            &self.scaling
        }

        fn render_options(&self) -> &RenderOptions {
            &self.render
        }
    }

    fn flow(origin: &str, dest: &str, row: &str, value: f64) -> FlowRecord {
        FlowRecord {
            origin_country: origin.to_string(),
            destination_country: dest.to_string(),
            origin_sector: row.to_string(),
            destination_sector: "C20".to_string(),
            obs_value: value,
        }
    }

    fn datasets() -> Datasets {
        let mut data = Datasets {
            flows: vec![
                flow("DE", "FR", "C10", 100.0),
                flow("IT", "FR", "C10", 20.0),
                flow("DE", "ES", "C11", 50.0),
                flow("FR", "FR", "C10", 500.0),
                flow("DE", "XX", "C10", 70.0),
            ],
            ..Datasets::default()
        };
        for (code, lat, lon) in [("DE", 51.0, 10.0), ("FR", 47.0, 2.0), ("IT", 42.0, 12.0), ("ES", 40.0, -4.0)] {
            data.routes.insert(
                code.to_string(),
                RouteCoordinate {
                    country_code: code.to_string(),
                    latitude: lat,
                    longitude: lon,
                },
            );
        }
        for (code, name) in [("C10", "Food"), ("C11", "Beverages"), ("C20", "Chemicals")] {
            data.sectors.insert(
                code.to_string(),
                SectorLabel {
                    sector_code: code.to_string(),
                    sector_name: name.to_string(),
                },
            );
        }
        data
    }

    fn pipeline(config: MockConfig) -> (FlowMapPipeline<MockStorage, MockConfig>, MockStorage) {
        let output = MockStorage::new();
        (
            FlowMapPipeline::new(MockStorage::new(), output.clone(), config),
            output,
        )
    }

    #[tokio::test]
    async fn test_transform_ranks_and_drops_unmapped_flows() {
        let (pipeline, _) = pipeline(MockConfig::default());

        let result = pipeline.transform(datasets()).await.unwrap();

        let ranked: Vec<(&str, &str)> = result
            .flows
            .iter()
            .map(|f| (f.origin.as_str(), f.destination.as_str()))
            .collect();
        assert_eq!(ranked, vec![("DE", "FR"), ("DE", "XX"), ("DE", "ES"), ("IT", "FR")]);

        assert_eq!(result.summary.filtered_records, 4);
        assert_eq!(result.summary.filtered_total_value, 240.0);
        assert_eq!(result.summary.flows_mapped, 3);
        assert_eq!(result.summary.dropped_flows, 1);
        assert_eq!(result.summary.dropped_bubbles, 1);
        assert_eq!(result.layer_spec.bubbles().len(), 2);
    }

    #[tokio::test]
    async fn test_transform_resolves_sector_names() {
        let config = MockConfig {
            selection: FlowSelection {
                origin_sector: SectorSelection::Code("beverages".to_string()),
                ..FlowSelection::default()
            },
            ..MockConfig::default()
        };
        let (pipeline, _) = pipeline(config);

        let result = pipeline.transform(datasets()).await.unwrap();

        assert_eq!(result.selection.origin_sector, SectorSelection::Code("C11".to_string()));
        assert_eq!(result.flows.len(), 1);
        assert_eq!(result.flows[0].destination, "ES");
    }

    #[tokio::test]
    async fn test_transform_with_no_matching_flows() {
        let config = MockConfig {
            selection: FlowSelection {
                origins: ["ES".to_string()].into_iter().collect(),
                ..FlowSelection::default()
            },
            ..MockConfig::default()
        };
        let (pipeline, _) = pipeline(config);

        let result = pipeline.transform(datasets()).await.unwrap();

        assert!(result.flows.is_empty());
        assert!(result.layer_spec.arcs().is_empty());
        assert!(result.layer_spec.message.is_some());
        assert_eq!(result.summary.filtered_total_value, 0.0);
    }

    #[tokio::test]
    async fn test_transform_fails_on_unknown_coordinate_when_strict() {
        let config = MockConfig {
            render: RenderOptions {
                missing_coordinates: MissingCoordinatePolicy::Fail,
                ..RenderOptions::default()
            },
            ..MockConfig::default()
        };
        let (pipeline, _) = pipeline(config);

        let err = pipeline.transform(datasets()).await.unwrap_err();
        assert!(matches!(err, FlowMapError::UnknownCoordinate { .. }));
    }

    #[tokio::test]
    async fn test_transform_rejects_out_of_range_top_n() {
        let config = MockConfig {
            selection: FlowSelection {
                top_n: 51,
                ..FlowSelection::default()
            },
            ..MockConfig::default()
        };
        let (pipeline, _) = pipeline(config);

        let err = pipeline.transform(datasets()).await.unwrap_err();
        assert!(matches!(err, FlowMapError::InvalidConfigValueError { .. }));
    }

    #[tokio::test]
    async fn test_load_writes_all_outputs() {
        let (pipeline, output) = pipeline(MockConfig::default());
        let result = pipeline.transform(datasets()).await.unwrap();

        let location = pipeline.load(result).await.unwrap();
        assert_eq!(location, "test_output/flow_map.json");

        let map: serde_json::Value =
            serde_json::from_slice(&output.get_file(MAP_FILE).await.unwrap()).unwrap();
        assert_eq!(map["layers"].as_array().unwrap().len(), 2);

        let table = String::from_utf8(output.get_file(TABLE_FILE).await.unwrap()).unwrap();
        assert_eq!(table.lines().count(), 5);

        let summary: serde_json::Value =
            serde_json::from_slice(&output.get_file(SUMMARY_FILE).await.unwrap()).unwrap();
        assert_eq!(summary["summary"]["od_pairs"], 4);
        assert_eq!(summary["selection"]["origin_sector"], "all");
    }
}
