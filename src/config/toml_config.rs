use crate::core::aggregate::Scaling;
use crate::core::filter::FlowSelection;
use crate::core::loader::SourceFiles;
use crate::core::render::RenderOptions;
use crate::core::schema::SchemaConfig;
use crate::core::ConfigProvider;
use crate::utils::error::{FlowMapError, Result};
use crate::utils::validation::{
    validate_file_extensions, validate_non_empty_string, validate_path, validate_range,
    validate_url, Validate,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub sources: SourcesConfig,
    pub schema: SchemaConfig,
    pub selection: FlowSelection,
    pub scaling: Scaling,
    pub render: RenderOptions,
    pub load: LoadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Shared folder the files are downloaded from; `None` means cache only.
    pub base_url: Option<String>,
    pub cache_dir: String,
    pub refresh: bool,
    pub files: SourceFiles,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            cache_dir: "./cache".to_string(),
            refresh: false,
            files: SourceFiles::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub output_path: String,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            output_path: "./output".to_string(),
        }
    }
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| FlowMapError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${FLOW_MAP_BASE_URL})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| FlowMapError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        if let Some(base_url) = &self.sources.base_url {
            validate_url("sources.base_url", base_url)?;
        }
        validate_path("sources.cache_dir", &self.sources.cache_dir)?;
        validate_path("load.output_path", &self.load.output_path)?;

        let names = self.sources.files.names();
        for name in names {
            validate_non_empty_string("sources.files", name)?;
        }
        validate_file_extensions("sources.files", &names, &["csv"])?;

        self.selection.validate()?;

        for (field, value) in [
            ("scaling.arc_width_scale", self.scaling.arc_width_scale),
            ("scaling.bubble_radius_scale", self.scaling.bubble_radius_scale),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(FlowMapError::InvalidConfigValueError {
                    field: field.to_string(),
                    value: value.to_string(),
                    reason: "Scale must be a positive number".to_string(),
                });
            }
        }
        validate_range("render.zoom", self.render.zoom, 0.0, 24.0)?;

        Ok(())
    }
}

impl ConfigProvider for TomlConfig {
    fn base_url(&self) -> Option<&str> {
        self.sources.base_url.as_deref()
    }

    fn cache_dir(&self) -> &str {
        &self.sources.cache_dir
    }

    fn output_path(&self) -> &str {
        &self.load.output_path
    }

    fn refresh(&self) -> bool {
        self.sources.refresh
    }

    fn source_files(&self) -> &SourceFiles {
        &self.sources.files
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

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
