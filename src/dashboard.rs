use anyhow::Result;
use serde::Serialize;
use tracing::warn;

use crate::db::{StateRow, Theatre, SENTINEL};
use crate::fetch::Transport;
use crate::geocode::{Coordinates, Geocoder};
use crate::search::{Restaurant, RestaurantSearch};

const RATING_TITLE: &str = "Barchart of restaurants rating";
const RATING_COLOR: &str = "rgb(252, 202, 109)";
const REVIEWS_TITLE: &str = "Barchart of restaurants review count";
const REVIEWS_COLOR: &str = "rgb(102, 166, 218)";

/// Map is centred on this marker when it has coordinates.
const CENTER_MARKER: usize = 4;

#[derive(Debug)]
pub struct StateEntry {
    pub id: i64,
    pub name: String,
}

pub fn state_index(rows: &[StateRow]) -> Vec<StateEntry> {
    rows.iter()
        .map(|r| StateEntry {
            id: r.id,
            name: capitalize(&r.name),
        })
        .collect()
}

#[derive(Debug)]
pub struct TheatreLine {
    pub rank: usize,
    pub name: String,
    pub address: String,
    pub zipcode: String,
    pub screens: String,
    pub phone: String,
    pub website: String,
}

#[derive(Debug)]
pub struct MapMarker {
    pub name: String,
    pub position: Option<Coordinates>,
}

#[derive(Debug)]
pub struct TheatreBoard {
    pub state: String,
    pub lines: Vec<TheatreLine>,
    pub markers: Vec<MapMarker>,
    pub center: Option<Coordinates>,
}

pub fn theatre_board(state: &str, theatres: &[Theatre], geocoder: &Geocoder) -> TheatreBoard {
    let lines = theatres
        .iter()
        .enumerate()
        .map(|(i, t)| TheatreLine {
            rank: i + 1,
            name: capitalize(&t.name),
            address: t.address.clone(),
            zipcode: display(&t.zipcode),
            screens: t.screens.to_string(),
            phone: display(&t.phone),
            website: display(&t.website),
        })
        .collect();

    let markers: Vec<MapMarker> = theatres
        .iter()
        .map(|t| MapMarker {
            name: capitalize(&t.name),
            position: t.zipcode.as_deref().and_then(|z| geocoder.lookup(z)),
        })
        .collect();

    let center = markers
        .get(CENTER_MARKER)
        .and_then(|m| m.position)
        .or_else(|| markers.iter().find_map(|m| m.position));

    TheatreBoard {
        state: state.to_lowercase(),
        lines,
        markers,
        center,
    }
}

#[derive(Debug, Serialize)]
pub struct BarSeries {
    pub title: &'static str,
    pub color: &'static str,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

#[derive(Debug)]
pub struct RestaurantBoard {
    pub theatre: String,
    pub restaurants: Vec<Restaurant>,
    pub rating_chart: BarSeries,
    pub review_chart: BarSeries,
}

/// Restaurants near every zipcode, merged by name: a repeated name keeps its
/// first position and takes the latest values.
pub async fn restaurant_board<T: Transport>(
    theatre: &str,
    zipcodes: &[String],
    geocoder: &Geocoder,
    search: &mut RestaurantSearch<T>,
) -> Result<RestaurantBoard> {
    let mut merged: Vec<Restaurant> = Vec::new();
    for zip in zipcodes {
        let Some(at) = geocoder.lookup(zip) else {
            warn!("No coordinates for zipcode {}, skipping", zip);
            continue;
        };
        for r in search.nearby(at).await? {
            match merged.iter_mut().find(|m| m.name == r.name) {
                Some(existing) => *existing = r,
                None => merged.push(r),
            }
        }
    }

    let labels: Vec<String> = merged.iter().map(|r| r.name.clone()).collect();
    Ok(RestaurantBoard {
        theatre: theatre.to_string(),
        rating_chart: BarSeries {
            title: RATING_TITLE,
            color: RATING_COLOR,
            labels: labels.clone(),
            values: merged.iter().map(|r| r.rating).collect(),
        },
        review_chart: BarSeries {
            title: REVIEWS_TITLE,
            color: REVIEWS_COLOR,
            labels,
            values: merged.iter().map(|r| r.review_count as f64).collect(),
        },
        restaurants: merged,
    })
}

/// "NEW york" -> "New york"
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn display(v: &Option<String>) -> String {
    v.clone().unwrap_or_else(|| SENTINEL.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DocumentCache;
    use crate::db::Screens;
    use crate::fetch::stub::StubTransport;

    const POSTAL: &str = "US\t48104\tAnn Arbor\tMichigan\tMI\t\t\t\t\t42.27\t-83.74\t4\n\
        US\t48377\tNovi\tMichigan\tMI\t\t\t\t\t42.5\t-83.47\t4\n";

    fn theatre(name: &str, zipcode: Option<&str>) -> Theatre {
        Theatre {
            name: name.into(),
            address: "1 Main St Town".into(),
            zipcode: zipcode.map(String::from),
            screens: Screens::Count(3),
            website: None,
            phone: None,
        }
    }

    #[test]
    fn capitalize_matches_title_case_of_first_word() {
        assert_eq!(capitalize("new york"), "New york");
        assert_eq!(capitalize("EMAGINE NOVI"), "Emagine novi");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn state_names_are_capitalized() {
        let rows = vec![StateRow {
            id: 7,
            name: "michigan".into(),
            url: "u".into(),
        }];
        let index = state_index(&rows);
        assert_eq!(index[0].id, 7);
        assert_eq!(index[0].name, "Michigan");
    }

    #[test]
    fn board_ranks_and_shows_sentinels() {
        let g = Geocoder::from_tsv(POSTAL);
        let board = theatre_board("Michigan", &[theatre("Roxy", None)], &g);
        assert_eq!(board.state, "michigan");
        assert_eq!(board.lines[0].rank, 1);
        assert_eq!(board.lines[0].zipcode, SENTINEL);
        assert_eq!(board.lines[0].website, SENTINEL);
        assert_eq!(board.lines[0].screens, "3");
        assert_eq!(board.markers[0].position, None);
        assert_eq!(board.center, None);
    }

    #[test]
    fn center_is_fifth_marker_when_located() {
        let g = Geocoder::from_tsv(POSTAL);
        let mut theatres: Vec<Theatre> = (0..4).map(|i| theatre(&format!("T{}", i), Some("48104"))).collect();
        theatres.push(theatre("Fifth", Some("48377")));
        let board = theatre_board("michigan", &theatres, &g);
        assert_eq!(board.center.unwrap().latitude, 42.5);
    }

    #[test]
    fn center_falls_back_to_first_located_marker() {
        let g = Geocoder::from_tsv(POSTAL);
        let theatres = vec![theatre("A", Some("00000")), theatre("B", Some("48377"))];
        let board = theatre_board("michigan", &theatres, &g);
        assert_eq!(board.center.unwrap().longitude, -83.47);
    }

    #[test]
    fn board_without_postal_table_still_lists_theatres() {
        let board = theatre_board("michigan", &[theatre("Roxy", Some("48104"))], &Geocoder::default());
        assert_eq!(board.lines.len(), 1);
        assert_eq!(board.lines[0].zipcode, "48104");
        assert_eq!(board.markers[0].position, None);
        assert_eq!(board.center, None);
    }

    #[tokio::test]
    async fn restaurants_merge_by_name_and_chart() {
        let dir = tempfile::tempdir().unwrap();
        let base = "https://api.yelp.com/v3/businesses/search";
        let body = std::fs::read_to_string("tests/fixtures/businesses.json").unwrap();
        let transport = StubTransport::default().with_page(base, &body);
        let mut search = RestaurantSearch::new(
            DocumentCache::open(dir.path().join("r.json")),
            &transport,
            base,
            "token",
            10,
        );
        let g = Geocoder::from_tsv(POSTAL);

        // Same zipcode twice plus an unknown one: second search is a cache hit.
        let zips = vec!["48104".to_string(), "48104".to_string(), "99999".to_string()];
        let board = restaurant_board("State Theatre", &zips, &g, &mut search).await.unwrap();

        assert_eq!(board.restaurants.len(), 8);
        assert_eq!(transport.calls(), 1);
        assert_eq!(board.rating_chart.title, RATING_TITLE);
        assert_eq!(board.review_chart.color, REVIEWS_COLOR);
        assert_eq!(board.rating_chart.labels[0], "Zingerman's Delicatessen");
        assert_eq!(board.rating_chart.values[5], 5.0);
        assert_eq!(board.review_chart.values[0], 5124.0);
    }
}
