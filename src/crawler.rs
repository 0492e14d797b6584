use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cache::DocumentCache;
use crate::db::{self, StateListing, StateRow, Theatre};
use crate::fetch::{PageFetcher, Transport};
use crate::parser::{listing, theatre};

/// Crawl totals returned after completion.
pub struct CrawlStats {
    pub states: usize,
    pub theatres: usize,
}

/// Walks the state dropdown and each state's listing, one page at a time.
pub struct Crawler<T> {
    fetcher: PageFetcher<T>,
    origin: String,
    per_state: usize,
}

impl<T: Transport> Crawler<T> {
    pub fn new(fetcher: PageFetcher<T>, origin: impl Into<String>, per_state: usize) -> Self {
        Self {
            fetcher,
            origin: origin.into(),
            per_state,
        }
    }

    /// Every state in the base page's dropdown, in dropdown order.
    pub async fn states(&mut self, base_url: &str) -> Result<Vec<StateListing>> {
        let html = self.fetcher.fetch(base_url).await?;
        let states = listing::parse_states(&html, &self.origin);
        if states.is_empty() {
            warn!("No states found on {}", base_url);
        }
        info!("Found {} states", states.len());
        Ok(states)
    }

    /// The first `per_state` theatres of a screen-sorted listing page, in the
    /// order the site lists them.
    pub async fn top_theatres(&mut self, listing_url: &str) -> Result<Vec<Theatre>> {
        let html = self.fetcher.fetch(listing_url).await?;
        let links = listing::parse_theatre_links(&html, &self.origin, self.per_state);

        let mut theatres = Vec::with_capacity(links.len());
        for url in links {
            let page = self.fetcher.fetch(&url).await?;
            let record = theatre::parse_theatre(&page, &self.origin)
                .with_context(|| format!("Failed to extract theatre from {}", url))?;
            theatres.push(record);
        }
        Ok(theatres)
    }

    pub fn cache(&self) -> &DocumentCache {
        self.fetcher.cache()
    }
}

/// Which stored theatres a crawl replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every state is crawled: the whole table is rebuilt.
    AllStates,
    /// Only the crawled states' rows are replaced; other states keep theirs.
    Selected,
}

/// Crawl `states` into the theatres table, saving each state's theatres as
/// soon as they are crawled.
pub async fn crawl_into_db<T: Transport>(
    conn: &Connection,
    crawler: &mut Crawler<T>,
    states: &[StateRow],
    scope: Scope,
) -> Result<CrawlStats> {
    if scope == Scope::AllStates {
        db::reset_theatres(conn)?;
    }

    let pb = ProgressBar::new(states.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let mut total = 0usize;
    for state in states {
        pb.set_message(state.name.clone());
        info!("Loading theatres of {}", state.name);
        let theatres = crawler
            .top_theatres(&state.url)
            .await
            .with_context(|| format!("Crawl failed for {}", state.name))?;
        if scope == Scope::Selected {
            db::delete_state_theatres(conn, state.id)?;
        }
        total += db::insert_theatres(conn, state.id, &theatres)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Crawled {} theatres across {} states", total, states.len());
    Ok(CrawlStats {
        states: states.len(),
        theatres: total,
    })
}
