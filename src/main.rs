mod cache;
mod crawler;
mod dashboard;
mod db;
mod fetch;
mod geocode;
mod parser;
mod search;
mod settings;

use std::time::Instant;

use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::cache::DocumentCache;
use crate::crawler::{Crawler, Scope};
use crate::fetch::{HttpTransport, PageFetcher};
use crate::geocode::Geocoder;
use crate::search::RestaurantSearch;
use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "theatre_scout", about = "US theatre listings with nearby restaurants")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the state dropdown and rebuild the states table
    Init,
    /// Rebuild the theatres table with the biggest theatres of each state
    Crawl {
        /// Only crawl these states (lowercase names, e.g. "new york")
        #[arg(short, long)]
        state: Vec<String>,
    },
    /// Init + crawl in one go
    Run,
    /// List stored states
    States,
    /// Theatre table and map points for a state
    Theatres {
        /// State name, any case
        state: String,
    },
    /// Restaurants near a theatre, with rating and review-count series
    Restaurants {
        /// Theatre name, any case
        theatre: String,
        /// Print the chart series as JSON
        #[arg(long)]
        json: bool,
    },
    /// Row and cache counts
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::load()?;

    match cli.command {
        Commands::Init => {
            let conn = db::connect(&settings.db_path)?;
            let n = init_states(&conn, &settings).await?;
            println!("Stored {} states", n);
            Ok(())
        }
        Commands::Crawl { state } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            crawl(&conn, &settings, &state).await
        }
        Commands::Run => {
            let conn = db::connect(&settings.db_path)?;
            let n = init_states(&conn, &settings).await?;
            println!("Stored {} states", n);
            crawl(&conn, &settings, &[]).await
        }
        Commands::States => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let index = dashboard::state_index(&db::fetch_states(&conn)?);
            if index.is_empty() {
                println!("No states stored. Run 'init' first.");
                return Ok(());
            }
            for s in &index {
                println!("{:>3}  {}", s.id, s.name);
            }
            Ok(())
        }
        Commands::Theatres { state } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let theatres = db::fetch_theatres(&conn, &state)?;
            if theatres.is_empty() {
                println!("No theatres stored for {:?}.", state);
                return Ok(());
            }
            let geocoder = match load_geocoder(&settings).await {
                Ok(geocoder) => geocoder,
                Err(e) => {
                    tracing::warn!("Map points unavailable: {:#}", e);
                    Geocoder::default()
                }
            };
            print_theatres(&dashboard::theatre_board(&state, &theatres, &geocoder));
            Ok(())
        }
        Commands::Restaurants { theatre, json } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let zipcodes = db::fetch_zipcodes_by_name(&conn, &theatre)?;
            if zipcodes.is_empty() {
                println!("No theatre named {:?} with a zipcode.", theatre);
                return Ok(());
            }
            let geocoder = load_geocoder(&settings).await?;
            let mut search = RestaurantSearch::new(
                DocumentCache::open(&settings.search_cache_path),
                HttpTransport::new(),
                settings.search_url.clone(),
                settings.api_key()?,
                settings.search_limit,
            );
            let board =
                dashboard::restaurant_board(&theatre, &zipcodes, &geocoder, &mut search).await?;
            tracing::debug!("{} searches cached", search.cache().len());
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&[&board.rating_chart, &board.review_chart])?
                );
            } else {
                print_restaurants(&board);
            }
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("States:          {}", s.states);
            println!("Theatres:        {}", s.theatres);
            println!("  no zipcode:    {}", s.without_zipcode);
            println!("  text screens:  {}", s.raw_screens);
            println!("Cached pages:    {}", DocumentCache::open(&settings.page_cache_path).len());
            println!("Cached searches: {}", DocumentCache::open(&settings.search_cache_path).len());
            Ok(())
        }
    }
}

fn page_crawler(settings: &Settings) -> anyhow::Result<Crawler<HttpTransport>> {
    let fetcher = PageFetcher::new(
        DocumentCache::open(&settings.page_cache_path),
        HttpTransport::new(),
    );
    Ok(Crawler::new(fetcher, settings.origin()?, settings.theatres_per_state))
}

async fn load_geocoder(settings: &Settings) -> anyhow::Result<Geocoder> {
    Geocoder::load(
        &settings.postal_table_path,
        &settings.postal_table_url,
        &HttpTransport::new(),
    )
    .await
}

async fn init_states(conn: &Connection, settings: &Settings) -> anyhow::Result<usize> {
    let mut crawler = page_crawler(settings)?;
    let states = crawler.states(&settings.base_url).await?;
    db::rebuild_states(conn, &states)
}

async fn crawl(conn: &Connection, settings: &Settings, only: &[String]) -> anyhow::Result<()> {
    let mut states = db::fetch_states(conn)?;
    if states.is_empty() {
        println!("No states stored. Run 'init' first.");
        return Ok(());
    }
    if !only.is_empty() {
        let wanted: Vec<String> = only.iter().map(|s| s.to_lowercase()).collect();
        states.retain(|s| wanted.contains(&s.name));
        if states.is_empty() {
            anyhow::bail!("None of {:?} are stored states", only);
        }
    }

    let t_crawl = Instant::now();
    println!("Crawling {} states...", states.len());
    let mut crawler = page_crawler(settings)?;
    let scope = if only.is_empty() {
        Scope::AllStates
    } else {
        Scope::Selected
    };
    let stats = crawler::crawl_into_db(conn, &mut crawler, &states, scope).await?;
    println!(
        "Stored {} theatres for {} states in {:.1}s ({} pages cached)",
        stats.theatres,
        stats.states,
        t_crawl.elapsed().as_secs_f64(),
        crawler.cache().len(),
    );
    Ok(())
}

fn print_theatres(board: &dashboard::TheatreBoard) {
    println!(
        "{:>3} | {:<28} | {:<30} | {:<10} | {:>7} | {:<14} | {}",
        "#", "Theatre", "Address", "Zipcode", "Screens", "Phone", "Website"
    );
    println!("{}", "-".repeat(120));
    for l in &board.lines {
        println!(
            "{:>3} | {:<28} | {:<30} | {:<10} | {:>7} | {:<14} | {}",
            l.rank,
            truncate(&l.name, 28),
            truncate(&l.address, 30),
            l.zipcode,
            truncate(&l.screens, 7),
            truncate(&l.phone, 14),
            l.website
        );
    }

    println!("\n--- Map ---");
    for m in &board.markers {
        match m.position {
            Some(p) => println!("  {:<28} {:>9.4} {:>10.4}", truncate(&m.name, 28), p.latitude, p.longitude),
            None => println!("  {:<28} {:>9} {:>10}", truncate(&m.name, 28), "-", "-"),
        }
    }
    if let Some(c) = board.center {
        println!("  centre: {:.4}, {:.4}", c.latitude, c.longitude);
    }
}

fn print_restaurants(board: &dashboard::RestaurantBoard) {
    println!("Restaurants near {}", board.theatre);
    println!("{:>3} | {:<36} | {:>6} | {:>8}", "#", "Restaurant", "Rating", "Reviews");
    println!("{}", "-".repeat(62));
    for (i, r) in board.restaurants.iter().enumerate() {
        println!(
            "{:>3} | {:<36} | {:>6.1} | {:>8}",
            i + 1,
            truncate(&r.name, 36),
            r.rating,
            r.review_count
        );
    }
    println!("\n{} restaurants | --json for chart series", board.restaurants.len());
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}
