use crate::config::toml_config::TomlConfig;
use crate::core::filter::SectorSelection;
use crate::core::render::MissingCoordinatePolicy;
use crate::utils::error::Result;
use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "flow-map")]
#[command(about = "Render the largest trade flows between countries as a deck.gl flow map")]
pub struct CliConfig {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Shared folder the data files are downloaded from
    #[arg(long)]
    pub base_url: Option<String>,

    #[arg(long)]
    pub cache_dir: Option<String>,

    #[arg(long)]
    pub output_path: Option<String>,

    /// Origin country codes (comma separated); empty keeps all
    #[arg(long, value_delimiter = ',')]
    pub origin: Vec<String>,

    /// Destination country codes (comma separated, at most 20); empty keeps all
    #[arg(long, value_delimiter = ',')]
    pub destination: Vec<String>,

    /// Origin (row) sector code or name, or "all"
    #[arg(long)]
    pub origin_sector: Option<String>,

    /// Destination (column) sector code or name, or "all"
    #[arg(long)]
    pub destination_sector: Option<String>,

    /// Number of flows to draw, 1 to 50
    #[arg(long)]
    pub top_n: Option<usize>,

    /// "drop" or "fail" when a country has no coordinates
    #[arg(long)]
    pub missing_coordinates: Option<MissingCoordinatePolicy>,

    /// Download the data files even when cached
    #[arg(long)]
    pub refresh: bool,

    /// Print the available countries and sectors, then exit
    #[arg(long)]
    pub list_options: bool,

    /// Show the resolved configuration without loading any data
    #[arg(long)]
    pub dry_run: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,
}

impl CliConfig {
    /// 載入設定檔（若有），再套用命令列覆蓋設定
    pub fn resolve(&self) -> Result<TomlConfig> {
        let mut config = match &self.config {
            Some(path) => TomlConfig::from_file(path)?,
            None => TomlConfig::default(),
        };
        self.apply_overrides(&mut config);
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut TomlConfig) {
        if let Some(base_url) = &self.base_url {
            config.sources.base_url = Some(base_url.clone());
        }
        if let Some(cache_dir) = &self.cache_dir {
            config.sources.cache_dir = cache_dir.clone();
        }
        if let Some(output_path) = &self.output_path {
            config.load.output_path = output_path.clone();
        }
        if self.refresh {
            config.sources.refresh = true;
        }
        if !self.origin.is_empty() {
            config.selection.origins = normalize_codes(&self.origin);
        }
        if !self.destination.is_empty() {
            config.selection.destinations = normalize_codes(&self.destination);
        }
        if let Some(sector) = &self.origin_sector {
            config.selection.origin_sector = SectorSelection::parse(sector);
        }
        if let Some(sector) = &self.destination_sector {
            config.selection.destination_sector = SectorSelection::parse(sector);
        }
        if let Some(top_n) = self.top_n {
            config.selection.top_n = top_n;
        }
        if let Some(policy) = self.missing_coordinates {
            config.render.missing_coordinates = policy;
        }
    }
}

fn normalize_codes(codes: &[String]) -> std::collections::BTreeSet<String> {
    codes
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}
