use crate::core::aggregate::Scaling;
use crate::core::filter::FlowSelection;
use crate::core::loader::SourceFiles;
use crate::core::pipeline::FlowMapResult;
use crate::core::render::RenderOptions;
use crate::core::schema::SchemaConfig;
use crate::domain::model::Datasets;
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn exists(&self, path: &str) -> impl std::future::Future<Output = bool> + Send;
    /// Human-readable location of `path`, for logs and the final report.
    fn location(&self, path: &str) -> String;
}

pub trait ConfigProvider: Send + Sync {
    fn base_url(&self) -> Option<&str>;
    fn cache_dir(&self) -> &str;
    fn output_path(&self) -> &str;
    fn refresh(&self) -> bool;
    fn source_files(&self) -> &SourceFiles;
    fn schema(&self) -> &SchemaConfig;
    fn selection(&self) -> &FlowSelection;
    fn scaling(&self) -> &Scaling;
    fn render_options(&self) -> &RenderOptions;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Datasets>;
    async fn transform(&self, data: Datasets) -> Result<FlowMapResult>;
    async fn load(&self, result: FlowMapResult) -> Result<String>;
}
