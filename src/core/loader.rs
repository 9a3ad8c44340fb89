use crate::core::schema::{parse_flows, parse_routes, parse_sectors, SchemaConfig};
use crate::domain::model::{Datasets, LoadReport, RouteTable, SectorTable};
use crate::domain::ports::Storage;
use crate::utils::error::{FlowMapError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

/// File names inside the shared remote folder (and the local cache).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceFiles {
    pub flows: String,
    pub routes: String,
    pub sectors: String,
}

impl Default for SourceFiles {
    fn default() -> Self {
        Self {
            flows: "flatfile_eu-ic-io_ind-by-ind_23ed_2021.csv".to_string(),
            routes: "Map of routes data.csv".to_string(),
            sectors: "nace.csv".to_string(),
        }
    }
}

impl SourceFiles {
    pub fn names(&self) -> [&str; 3] {
        [self.flows.as_str(), self.routes.as_str(), self.sectors.as_str()]
    }
}

/// Builds `{base_url}/{file}`, percent-encoding the file name as one path segment.
pub fn remote_url(base_url: &str, file: &str) -> Result<Url> {
    let mut url = Url::parse(base_url).map_err(|e| FlowMapError::InvalidConfigValueError {
        field: "sources.base_url".to_string(),
        value: base_url.to_string(),
        reason: format!("Invalid URL format: {}", e),
    })?;

    url.path_segments_mut()
        .map_err(|_| FlowMapError::InvalidConfigValueError {
            field: "sources.base_url".to_string(),
            value: base_url.to_string(),
            reason: "URL cannot be used as a base".to_string(),
        })?
        .pop_if_empty()
        .push(file);

    Ok(url)
}

/// Fetches the source files through a local cache and parses them.
pub struct DataLoader<S: Storage> {
    cache: S,
    client: Client,
    base_url: Option<String>,
    refresh: bool,
}

/// Transport failures while fetching a file mean the file is unavailable.
fn unavailable(file: &str) -> impl Fn(reqwest::Error) -> FlowMapError + '_ {
    move |e| FlowMapError::DataUnavailable {
        file: file.to_string(),
        reason: e.to_string(),
    }
}

impl<S: Storage> DataLoader<S> {
    pub fn new(cache: S, base_url: Option<String>) -> Self {
        Self {
            cache,
            client: Client::new(),
            base_url,
            refresh: false,
        }
    }

    /// Ignore cached copies and download every file again.
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// 快取中有檔案就直接讀取，否則下載並寫入快取
    pub async fn fetch(&self, file: &str) -> Result<Vec<u8>> {
        if !self.refresh && self.cache.exists(file).await {
            tracing::debug!("Cache hit for {} at {}", file, self.cache.location(file));
            return self.cache.read_file(file).await;
        }

        let Some(base_url) = self.base_url.as_deref() else {
            return Err(FlowMapError::DataUnavailable {
                file: file.to_string(),
                reason: "not in cache and no base URL configured".to_string(),
            });
        };

        let url = remote_url(base_url, file)?;
        tracing::info!("📥 Downloading {} from {}", file, url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(unavailable(file))?;

        tracing::debug!("Response status for {}: {}", file, response.status());
        if !response.status().is_success() {
            return Err(FlowMapError::DataUnavailable {
                file: file.to_string(),
                reason: format!("HTTP {} from {}", response.status(), url),
            });
        }

        let data = response.bytes().await.map_err(unavailable(file))?.to_vec();
        self.cache.write_file(file, &data).await?;
        tracing::debug!(
            "Cached {} ({} bytes) at {}",
            file,
            data.len(),
            self.cache.location(file)
        );

        Ok(data)
    }

    /// Fetches all three files, then validates each against its schema.
    pub async fn load(&self, files: &SourceFiles, schema: &SchemaConfig) -> Result<Datasets> {
        let flow_data = self.fetch(&files.flows).await?;
        let route_data = self.fetch(&files.routes).await?;
        let sector_data = self.fetch(&files.sectors).await?;

        let flows = parse_flows(&files.flows, &flow_data, &schema.flows)?;
        let routes = parse_routes(&files.routes, &route_data, &schema.routes)?;
        let sectors = parse_sectors(&files.sectors, &sector_data, &schema.sectors)?;

        let mut route_table = RouteTable::new();
        for route in routes.rows {
            if route_table.contains_key(&route.country_code) {
                tracing::debug!("Duplicate route for {}, keeping the first", route.country_code);
                continue;
            }
            route_table.insert(route.country_code.clone(), route);
        }

        let mut sector_table = SectorTable::new();
        for sector in sectors.rows {
            sector_table
                .entry(sector.sector_code.clone())
                .or_insert(sector);
        }

        tracing::info!(
            "Loaded {} flow records, {} routes, {} sectors",
            flows.rows.len(),
            route_table.len(),
            sector_table.len()
        );

        Ok(Datasets {
            flows: flows.rows,
            routes: route_table,
            sectors: sector_table,
            report: LoadReport {
                flows: flows.report,
                routes: routes.report,
                sectors: sectors.report,
            },
        })
    }
}
