use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::fetch::{GetRequest, Transport};

static ZIP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{5})(?:-?\d{4})?$").unwrap());

// GeoNames postal dump columns.
const COL_POSTAL_CODE: usize = 1;
const COL_LATITUDE: usize = 9;
const COL_LONGITUDE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Offline US zip → coordinates table.
#[derive(Default)]
pub struct Geocoder {
    table: HashMap<String, Coordinates>,
}

impl Geocoder {
    /// Read the postal table at `path`, downloading it from `source_url` and
    /// saving it there first when the file does not exist yet.
    pub async fn load<T: Transport>(
        path: impl AsRef<Path>,
        source_url: &str,
        transport: &T,
    ) -> Result<Self> {
        let path = path.as_ref();
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Postal table {:?} missing, downloading {}", path, source_url);
                let raw = transport
                    .get(&GetRequest::new(source_url))
                    .await
                    .with_context(|| format!("Failed to download postal table {}", source_url))?;
                save(path, &raw)?;
                raw
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read postal table {:?}", path))
            }
        };
        let geocoder = Self::from_tsv(&raw);
        if geocoder.table.is_empty() {
            warn!("Postal table {:?} has no usable rows", path);
        }
        info!("Loaded {} postal codes from {:?}", geocoder.len(), path);
        Ok(geocoder)
    }

    /// Parse a GeoNames tab-separated dump. Malformed lines are skipped; the
    /// first row for a code wins.
    pub fn from_tsv(raw: &str) -> Self {
        let mut table = HashMap::new();
        for line in raw.lines() {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() <= COL_LONGITUDE {
                continue;
            }
            let lat = cols[COL_LATITUDE].trim().parse::<f64>();
            let lon = cols[COL_LONGITUDE].trim().parse::<f64>();
            let (Ok(latitude), Ok(longitude)) = (lat, lon) else {
                debug!("Skipping postal row without coordinates: {:?}", line);
                continue;
            };
            table
                .entry(cols[COL_POSTAL_CODE].trim().to_string())
                .or_insert(Coordinates {
                    latitude,
                    longitude,
                });
        }
        Self { table }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Coordinates for a 5-digit or ZIP+4 code; `None` when unknown.
    pub fn lookup(&self, zipcode: &str) -> Option<Coordinates> {
        let caps = ZIP_RE.captures(zipcode.trim())?;
        let found = self.table.get(&caps[1]).copied();
        if found.is_none() {
            debug!("No coordinates for zipcode {}", zipcode);
        }
        found
    }
}

fn save(path: &Path, raw: &str) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create postal table dir {:?}", dir))?;
    }
    fs::write(path, raw).with_context(|| format!("Failed to write postal table {:?}", path))
}
