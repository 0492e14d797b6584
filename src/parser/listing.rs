use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{absolutize, text_of};
use crate::db::StateListing;

static REGION_SELECT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("select#child_region_select").unwrap());
static THEATER_TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.theaters").unwrap());
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Listing order requested for every state page.
pub const SCREENS_DESC_QUERY: &str = "?sort=screens&order=desc";

/// States from the region dropdown, in dropdown order. The first option is
/// the "choose a state" placeholder and is skipped.
pub fn parse_states(html: &str, origin: &str) -> Vec<StateListing> {
    let doc = Html::parse_document(html);
    let Some(select) = doc.select(&REGION_SELECT).next() else {
        debug!("No region dropdown on page");
        return Vec::new();
    };

    select
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "option")
        .skip(1)
        .filter_map(|opt| {
            let Some(path) = opt.value().attr("value") else {
                debug!("Dropdown option without value: {:?}", text_of(opt));
                return None;
            };
            Some(StateListing {
                name: text_of(opt).to_lowercase(),
                url: format!("{}{}{}", origin, path, SCREENS_DESC_QUERY),
            })
        })
        .collect()
}

/// Detail-page URLs for the first `limit` rows of the theatre table, in
/// document order. Rows without a link are dropped, not backfilled.
pub fn parse_theatre_links(html: &str, origin: &str, limit: usize) -> Vec<String> {
    let doc = Html::parse_document(html);
    let Some(table) = doc.select(&THEATER_TABLE).next() else {
        debug!("No theatre table on page");
        return Vec::new();
    };

    body_rows(table)
        .take(limit)
        .filter_map(|row| {
            let href = row.select(&LINK).next()?.value().attr("href")?;
            Some(absolutize(origin, href))
        })
        .collect()
}

/// `tr` elements directly in the table or in a `tbody`; header rows in
/// `thead` are not theatres.
fn body_rows(table: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    table
        .children()
        .filter_map(ElementRef::wrap)
        .flat_map(|el| match el.value().name() {
            "tr" => vec![el],
            "tbody" => el
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|r| r.value().name() == "tr")
                .collect(),
            _ => Vec::new(),
        })
}
