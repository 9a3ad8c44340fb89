use crate::core::filter::FacetOptions;
use crate::core::report::{format_flow_table, FlowSummary};
use crate::core::Pipeline;
use crate::utils::error::Result;
use std::time::Instant;

/// What the caller needs to report once a run has finished.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub output_path: String,
    pub summary: FlowSummary,
    pub table: String,
    pub message: Option<String>,
}

pub struct FlowMapEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> FlowMapEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub async fn run(&self) -> Result<RunOutcome> {
        let started = Instant::now();
        tracing::info!("Starting flow map run");

        let datasets = self.pipeline.extract().await?;
        tracing::info!(
            "Extracted {} flow records in {:?}",
            datasets.flows.len(),
            started.elapsed()
        );

        let result = self.pipeline.transform(datasets).await?;
        tracing::info!(
            "Selected {} flows ({} mapped) across {} destinations",
            result.flows.len(),
            result.summary.flows_mapped,
            result.summary.destinations
        );

        let summary = result.summary.clone();
        let table = format_flow_table(&result.flows, &summary);
        let message = result.layer_spec.message.clone();

        let output_path = self.pipeline.load(result).await?;
        tracing::info!("Output saved to {} in {:?}", output_path, started.elapsed());

        Ok(RunOutcome {
            output_path,
            summary,
            table,
            message,
        })
    }

    /// Loads the data only, to list what each control can be set to.
    pub async fn facet_options(&self) -> Result<FacetOptions> {
        let datasets = self.pipeline.extract().await?;
        Ok(FacetOptions::from_flows(
            &datasets.flows,
            &datasets.sectors,
        ))
    }
}
