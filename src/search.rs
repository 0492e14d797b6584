use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::cache::{request_signature, DocumentCache};
use crate::fetch::{GetRequest, Transport};
use crate::geocode::Coordinates;

const SEARCH_TERM: &str = "restaurants";
const SORT_BY: &str = "rating";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Restaurant {
    pub name: String,
    pub rating: f64,
    pub review_count: u64,
}

#[derive(Deserialize)]
struct SearchResponse {
    businesses: Vec<Restaurant>,
}

/// Business search near a point, cached by request signature.
pub struct RestaurantSearch<T> {
    cache: DocumentCache,
    transport: T,
    base_url: String,
    api_key: String,
    limit: u32,
}

impl<T: Transport> RestaurantSearch<T> {
    pub fn new(
        cache: DocumentCache,
        transport: T,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        limit: u32,
    ) -> Self {
        Self {
            cache,
            transport,
            base_url: base_url.into(),
            api_key: api_key.into(),
            limit,
        }
    }

    /// Query pairs in the order they are sent and keyed.
    fn params(&self, at: Coordinates) -> Vec<(String, String)> {
        vec![
            ("term".into(), SEARCH_TERM.into()),
            ("latitude".into(), format_coordinate(at.latitude)),
            ("longitude".into(), format_coordinate(at.longitude)),
            ("sort_by".into(), SORT_BY.into()),
            ("limit".into(), self.limit.to_string()),
        ]
    }

    /// Top-rated restaurants around `at`. Failures (auth, rate limit, bad
    /// JSON) are returned as errors; nothing is retried.
    pub async fn nearby(&mut self, at: Coordinates) -> Result<Vec<Restaurant>> {
        let params = self.params(at);
        let key = request_signature(&self.base_url, &params);

        let cached = self.cache.get(&key).map(str::to_string);
        let body = match cached {
            Some(body) => {
                debug!("Using cache: {}", key);
                body
            }
            None => {
                info!("Searching restaurants near {}, {}", at.latitude, at.longitude);
                let request = GetRequest {
                    url: self.base_url.clone(),
                    query: params,
                    bearer: Some(self.api_key.clone()),
                };
                let body = self.transport.get(&request).await?;
                self.cache.insert(key.as_str(), body.as_str())?;
                body
            }
        };

        parse_businesses(&body).with_context(|| format!("Bad search response for {}", key))
    }

    pub fn cache(&self) -> &DocumentCache {
        &self.cache
    }
}

pub fn parse_businesses(body: &str) -> Result<Vec<Restaurant>> {
    let parsed: SearchResponse = serde_json::from_str(body)?;
    Ok(parsed.businesses)
}

/// Shortest round-trip decimal, with a trailing ".0" on whole numbers so keys
/// line up with caches written by earlier tooling.
pub fn format_coordinate(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{:.1}", v)
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::stub::StubTransport;

    const BASE: &str = "https://api.yelp.com/v3/businesses/search";

    fn stub_body() -> String {
        std::fs::read_to_string("tests/fixtures/businesses.json").unwrap()
    }

    fn ann_arbor() -> Coordinates {
        Coordinates {
            latitude: 42.27,
            longitude: -83.74,
        }
    }

    #[test]
    fn signature_has_fixed_param_order() {
        let dir = tempfile::tempdir().unwrap();
        let search = RestaurantSearch::new(
            DocumentCache::open(dir.path().join("r.json")),
            StubTransport::default(),
            BASE,
            "key",
            10,
        );
        assert_eq!(
            request_signature(BASE, &search.params(ann_arbor())),
            "https://api.yelp.com/v3/businesses/search_term_restaurants_latitude_42.27\
             _longitude_-83.74_sort_by_rating_limit_10"
        );
    }

    #[test]
    fn whole_coordinates_keep_decimal_point() {
        assert_eq!(format_coordinate(42.0), "42.0");
        assert_eq!(format_coordinate(-83.7265), "-83.7265");
    }

    #[tokio::test]
    async fn eight_businesses_then_cache_hit() {
        let dir = tempfile::tempdir().unwrap();
        let transport = StubTransport::default().with_page(BASE, &stub_body());
        let mut search = RestaurantSearch::new(
            DocumentCache::open(dir.path().join("restaurants.json")),
            &transport,
            BASE,
            "secret-token",
            10,
        );

        let first = search.nearby(ann_arbor()).await.unwrap();
        assert_eq!(first.len(), 8);
        assert_eq!(
            first[0],
            Restaurant {
                name: "Zingerman's Delicatessen".into(),
                rating: 4.5,
                review_count: 5124,
            }
        );
        assert_eq!(first[7].name, "Frita Batidos");
        assert_eq!(first[7].review_count, 1523);

        let second = search.nearby(ann_arbor()).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(transport.calls(), 1);

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].bearer.as_deref(), Some("secret-token"));
        assert_eq!(seen[0].query[0], ("term".to_string(), "restaurants".to_string()));
    }

    #[tokio::test]
    async fn error_body_is_an_error_and_auth_failure_caches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let transport = StubTransport::default();
        let mut search = RestaurantSearch::new(
            DocumentCache::open(dir.path().join("restaurants.json")),
            &transport,
            BASE,
            "bad",
            10,
        );
        assert!(search.nearby(ann_arbor()).await.is_err());
        assert_eq!(search.cache().len(), 0);

        let err = parse_businesses(r#"{"error": {"code": "TOKEN_INVALID"}}"#);
        assert!(err.is_err());
    }
}
