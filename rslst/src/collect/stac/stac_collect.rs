use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs::{create_dir_all, File};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::collect::imagery::{ImagerySource, SceneMeta, SceneQuery};
use crate::collect::stac::geotiff::GeoTiffBand;
use crate::config::StacConfig;
use crate::geo_core::{BoundingBox, GeoCore, WGS84_EPSG};
use crate::thermal::raster::{GridSpec, Raster};

fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {bytes:>10}/{total_bytes:10} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

/// STAC ItemCollection returned by `/search`
#[derive(Debug, Deserialize)]
struct ItemCollection {
    #[serde(default)]
    features: Vec<StacItem>,
    #[serde(default)]
    links: Vec<StacLink>,
}

#[derive(Debug, Deserialize)]
struct StacItem {
    id: String,
    #[serde(default)]
    bbox: Option<Vec<f64>>,
    properties: StacProperties,
    #[serde(default)]
    assets: BTreeMap<String, StacAsset>,
}

#[derive(Debug, Deserialize)]
struct StacProperties {
    #[serde(default)]
    datetime: Option<String>,
    #[serde(rename = "eo:cloud_cover", default)]
    cloud_cover: Option<f64>,
    #[serde(rename = "proj:epsg", default)]
    epsg: Option<i32>,
    /// Newer items carry "EPSG:xxxx" here instead of proj:epsg
    #[serde(rename = "proj:code", default)]
    proj_code: Option<String>,
    #[serde(default)]
    platform: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StacAsset {
    href: String,
}

#[derive(Debug, Clone, Deserialize)]
struct StacLink {
    rel: String,
    href: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    merge: bool,
}

fn parse_acquired(datetime: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc3339(datetime)
        .map(|dt| dt.date_naive())
        .ok()
        .or_else(|| NaiveDate::parse_from_str(datetime.get(..10)?, "%Y-%m-%d").ok())
}

impl StacItem {
    fn into_scene(self) -> Option<SceneMeta> {
        let acquired = self.properties.datetime.as_deref().and_then(parse_acquired);
        let footprint = match self.bbox.as_deref() {
            Some([min_x, min_y, max_x, max_y]) => BoundingBox::new(*min_x, *min_y, *max_x, *max_y),
            // 3D bbox
            Some([min_x, min_y, _, max_x, max_y, _]) => {
                BoundingBox::new(*min_x, *min_y, *max_x, *max_y)
            }
            _ => {
                debug!("Skipping item {}: no usable bbox", self.id);
                return None;
            }
        };
        let (Some(acquired), Some(cloud_cover)) = (acquired, self.properties.cloud_cover) else {
            debug!("Skipping item {}: missing datetime or eo:cloud_cover", self.id);
            return None;
        };
        let epsg = self.properties.epsg.or_else(|| {
            self.properties
                .proj_code
                .as_deref()
                .and_then(|code| code.strip_prefix("EPSG:"))
                .and_then(|code| code.parse().ok())
        });

        Some(SceneMeta {
            id: self.id,
            acquired,
            cloud_cover,
            footprint,
            epsg,
            platform: self.properties.platform,
            assets: self
                .assets
                .into_iter()
                .map(|(key, asset)| (key, asset.href))
                .collect(),
        })
    }
}

/// Parse one page of search results: the scenes and the link to the next page
fn parse_page(page: ItemCollection) -> (Vec<SceneMeta>, Option<StacLink>) {
    let next = page.links.into_iter().find(|link| link.rel == "next");
    let scenes = page
        .features
        .into_iter()
        .filter_map(StacItem::into_scene)
        .collect();
    (scenes, next)
}

/// Landsat archive behind a STAC API
///
/// Scenes are searched with `POST {endpoint}/search`; band assets are downloaded once into the
/// cache directory and decoded as GeoTIFF.
pub struct StacCollect {
    pub config: StacConfig,
    pub geo_core: GeoCore,
    client: Client,
    search_url: Url,
}

impl StacCollect {
    pub fn new(config: StacConfig) -> Result<Self> {
        let base = Url::parse(&format!("{}/", config.endpoint.trim_end_matches('/')))
            .context(format!("Invalid STAC endpoint: {}", config.endpoint))?;
        let search_url = base
            .join("search")
            .context("Failed to build STAC search URL")?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(StacCollect {
            config,
            geo_core: GeoCore::default(),
            client,
            search_url,
        })
    }

    pub fn search_url(&self) -> &Url {
        &self.search_url
    }

    /// JSON body of the first search request
    pub fn search_body(&self, query: &SceneQuery) -> Value {
        let mut filter = json!({
            "eo:cloud_cover": { "lt": query.max_cloud_cover }
        });
        if let Some(platform) = &self.config.platform {
            filter["platform"] = json!({ "eq": platform });
        }
        if let Some(category) = &self.config.collection_category {
            filter["landsat:collection_category"] = json!({ "eq": category });
        }
        json!({
            "collections": [self.config.collection],
            "bbox": query.bounds.to_array(),
            "datetime": query.window.to_rfc3339_interval(),
            "query": filter,
            "limit": self.config.page_limit,
        })
    }

    fn fetch_page(&self, url: &str, method: &str, body: Option<&Value>) -> Result<ItemCollection> {
        debug!("STAC {} {}", method, url);
        let request = if method.eq_ignore_ascii_case("GET") {
            self.client.get(url)
        } else {
            self.client.post(url).json(body.unwrap_or(&Value::Null))
        };
        let response = request
            .header("Accept", "application/geo+json")
            .send()
            .context(format!("Failed to send STAC search to {}", url))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            bail!("STAC API returned error {}: {}", status, body);
        }
        response
            .json()
            .context("Failed to parse STAC ItemCollection")
    }

    /// Cached file for an asset href
    fn cache_path_for_url(&self, href: &str) -> PathBuf {
        let name = Url::parse(href)
            .ok()
            .and_then(|url| {
                url.path_segments()
                    .and_then(|segments| segments.last().map(|s| s.to_string()))
            })
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| {
                href.chars()
                    .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
                    .collect()
            });
        self.config.cache_dir.join(name)
    }

    /// Download an asset unless it is already cached, returning the local path
    pub fn download(&self, href: &str) -> Result<PathBuf> {
        let path = self.cache_path_for_url(href);
        if path.exists() {
            info!("Reading asset from cache: {:?}", path);
            return Ok(path);
        }
        create_dir_all(&self.config.cache_dir).context(format!(
            "Failed to create cache directory: {:?}",
            self.config.cache_dir
        ))?;

        println!("Downloading {}", href);
        let response = self
            .client
            .get(href)
            .send()
            .context(format!("Failed to download {}", href))?;
        if !response.status().is_success() {
            bail!("Asset download returned {}: {}", response.status(), href);
        }

        let pb = ProgressBar::new(response.content_length().unwrap_or(0));
        pb.set_style(progress_style());
        pb.set_message(
            path.file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default(),
        );
        let partial = path.with_extension("part");
        let mut file =
            File::create(&partial).context(format!("Failed to create {:?}", partial))?;
        let mut reader = pb.wrap_read(response);
        std::io::copy(&mut reader, &mut file).context(format!("Failed to write {:?}", partial))?;
        pb.finish_with_message("downloaded");
        std::fs::rename(&partial, &path)
            .context(format!("Failed to move {:?} into the cache", partial))?;
        Ok(path)
    }

    /// Resample a decoded band onto a lon/lat grid by nearest neighbour
    pub fn resample(
        &self,
        tiff: &GeoTiffBand,
        epsg: i32,
        band: &str,
        grid: &GridSpec,
    ) -> Result<Raster> {
        let mut geo_core = self.geo_core.clone();
        geo_core.set_epsg(epsg);
        let data = if geo_core.is_wgs84() {
            (0..grid.len())
                .map(|i| {
                    let (lon, lat) = grid.index_center(i);
                    tiff.sample(lon, lat)
                })
                .collect()
        } else {
            // Proj handles are not Sync, so cell centres are projected sequentially
            let proj = geo_core.from_wgs84()?;
            (0..grid.len())
                .map(|i| {
                    let (lon, lat) = grid.index_center(i);
                    let (x, y): (f64, f64) = proj.convert((lon, lat)).ok()?;
                    tiff.sample(x, y)
                })
                .collect()
        };
        Raster::new(grid.clone(), band, data)
    }
}

impl ImagerySource for StacCollect {
    fn search(&self, query: &SceneQuery) -> Result<Vec<SceneMeta>> {
        let mut body = self.search_body(query);
        let mut url = self.search_url.to_string();
        let mut method = "POST".to_string();
        let mut scenes = Vec::new();

        for page_number in 1..=self.config.max_pages {
            let page = self.fetch_page(&url, &method, Some(&body))?;
            let (mut found, next) = parse_page(page);
            debug!("Page {}: {} items", page_number, found.len());
            scenes.append(&mut found);

            let Some(next) = next else {
                break;
            };
            if page_number == self.config.max_pages {
                warn!(
                    "Stopping after {} pages of STAC results; later pages are ignored",
                    page_number
                );
                break;
            }
            method = next.method.unwrap_or_else(|| "GET".to_string());
            match next.body {
                Some(Value::Object(extra)) if next.merge => {
                    if let Value::Object(current) = &mut body {
                        current.extend(extra);
                    }
                }
                Some(next_body) => body = next_body,
                None => {}
            }
            url = next.href;
        }

        info!(
            "STAC search returned {} scenes for {}",
            scenes.len(),
            query.window.label()
        );
        Ok(scenes)
    }

    fn load_band(&self, scene: &SceneMeta, band: &str, grid: &GridSpec) -> Result<Raster> {
        let asset = self.config.asset_for(band);
        let href = scene
            .assets
            .get(asset)
            .context(format!("Scene {} has no asset '{}' for band {}", scene.id, asset, band))?;
        let path = self.download(href)?;
        let bytes = std::fs::read(&path).context(format!("Failed to read {:?}", path))?;
        let tiff = GeoTiffBand::from_bytes(bytes)
            .context(format!("Failed to decode {} of scene {}", band, scene.id))?;
        self.resample(&tiff, scene.epsg.unwrap_or(WGS84_EPSG), band, grid)
    }
}
