use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

const ENV_PREFIX: &str = "THEATRES";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Listing page carrying the state dropdown.
    pub base_url: String,
    pub db_path: String,
    pub page_cache_path: String,
    pub search_cache_path: String,
    pub search_url: String,
    pub search_api_key: Option<String>,
    pub search_limit: u32,
    pub theatres_per_state: usize,
    /// GeoNames postal-code dump for the US (tab separated).
    pub postal_table_path: String,
    /// Where the postal table is downloaded from when the file is missing.
    pub postal_table_url: String,
}

impl Settings {
    /// Defaults overridden by `THEATRES_*` environment variables.
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("base_url", "http://cinematreasures.org/theaters/united-states/")?
            .set_default("db_path", "theatres.sqlite")?
            .set_default("page_cache_path", "theatres.json")?
            .set_default("search_cache_path", "restaurants.json")?
            .set_default("search_url", "https://api.yelp.com/v3/businesses/search")?
            .set_default("search_limit", 10)?
            .set_default("theatres_per_state", 10)?
            .set_default("postal_table_path", "data/US.txt")?
            .set_default(
                "postal_table_url",
                "https://symerio.github.io/postal-codes-data/data/geonames/US.txt",
            )?
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()
            .context("Failed to build settings")?;

        let settings: Settings = settings
            .try_deserialize()
            .context("Invalid THEATRES_* settings")?;
        settings.origin()?;
        Ok(settings)
    }

    /// Scheme + host of the listing site, e.g. `http://cinematreasures.org`.
    pub fn origin(&self) -> Result<String> {
        site_origin(&self.base_url)
    }

    pub fn api_key(&self) -> Result<&str> {
        self.search_api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow::anyhow!("{}_SEARCH_API_KEY must be set", ENV_PREFIX))
    }
}

pub fn site_origin(base_url: &str) -> Result<String> {
    let url = Url::parse(base_url).with_context(|| format!("Invalid base url {:?}", base_url))?;
    if url.host_str().is_none() {
        anyhow::bail!("Base url {:?} has no host", base_url);
    }
    Ok(url.origin().ascii_serialization())
}
