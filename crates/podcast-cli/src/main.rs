//! `podcast-cli`: browse a podcast catalog and play episodes locally.
//!
//! - `browse`: terminal UI with search, chapters and a mouse-aware player
//! - `search`: print matching episodes (text or JSON)
//! - `chapters`: print an episode's chapter timeline
//! - `devices`: list audio output devices

mod catalog;
mod config;
mod logging;
mod ui;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::unbounded;
use podcast_types::Episode;
use serde::Serialize;
use time::OffsetDateTime;

use crate::catalog::{Catalog, SHORT_DESCRIPTION_CHARS, SortOrder};
use crate::config::CliConfig;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "podcast-cli", version = VERSION)]
struct Args {
    /// TOML settings file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output device name substring (overrides the config file).
    #[arg(long, global = true)]
    device: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the episode browser and player.
    Browse {
        /// Podcast JSON export.
        #[arg(long)]
        catalog: PathBuf,
    },
    /// Print episodes matching a query.
    Search {
        #[arg(long)]
        catalog: PathBuf,
        /// Case-insensitive text matched against titles and descriptions.
        query: Option<String>,
        #[arg(long, value_enum, default_value_t = SortOrder::Latest)]
        sort: SortOrder,
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Print the chapter timeline of one episode.
    Chapters {
        #[arg(long)]
        catalog: PathBuf,
        /// Episode id.
        eid: String,
    },
    /// List audio output devices.
    Devices,
}

/// One `search` result as printed with `--json`.
#[derive(Serialize)]
struct EpisodeRow<'a> {
    eid: &'a str,
    title: &'a str,
    pub_date: Option<&'a str>,
    duration_secs: Option<f64>,
    play_count: u64,
    summary: String,
}

impl<'a> EpisodeRow<'a> {
    fn new(ep: &'a Episode) -> Self {
        Self {
            eid: &ep.eid,
            title: &ep.title,
            pub_date: ep.pub_date.as_deref(),
            duration_secs: ep.duration_hint(),
            play_count: ep.play_count.unwrap_or(0),
            summary: catalog::short_description(&ep.description, SHORT_DESCRIPTION_CHARS),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Browse { catalog } => {
            let (log_tx, log_rx) = unbounded::<String>();
            logging::init_channel(log_tx);
            let settings =
                CliConfig::load_optional(args.config.as_deref())?.resolve(args.device.as_deref());
            let catalog = Catalog::load(&catalog)?;
            tracing::info!(
                title = %catalog.podcast.title,
                episodes = catalog.episodes().len(),
                "catalog loaded"
            );
            ui::run_tui(catalog, settings, log_rx)
        }
        Command::Search {
            catalog,
            query,
            sort,
            json,
        } => {
            logging::init_stderr();
            let catalog = Catalog::load(&catalog)?;
            let hits = catalog.query(query.as_deref().unwrap_or(""), sort);
            if json {
                let rows: Vec<EpisodeRow> = hits.into_iter().map(EpisodeRow::new).collect();
                let out = serde_json::to_string_pretty(&rows).context("encode results")?;
                println!("{out}");
            } else {
                print_episodes(&hits);
            }
            Ok(())
        }
        Command::Chapters { catalog, eid } => {
            logging::init_stderr();
            let catalog = Catalog::load(&catalog)?;
            let episode = catalog.require_episode(&eid)?;
            let chapters = catalog::chapters(&episode.description);
            if chapters.is_empty() {
                println!("{}: no chapters", episode.title);
            }
            for ch in chapters {
                println!("{:>5}  {}", ch.time, ch.text);
            }
            Ok(())
        }
        Command::Devices => {
            logging::init_stderr();
            let devices = podcast_player::device::output_devices()?;
            if devices.is_empty() {
                println!("no output devices");
            }
            for d in devices {
                let rates = d
                    .rates
                    .map(|(lo, hi)| format!("{lo}-{hi} Hz"))
                    .unwrap_or_else(|| "-".to_string());
                let mark = if d.is_default { " *" } else { "" };
                println!("{}  [{rates}]{mark}", d.name);
            }
            Ok(())
        }
    }
}

fn print_episodes(episodes: &[&Episode]) {
    let now = OffsetDateTime::now_utc();
    for ep in episodes {
        let length = ep
            .duration_hint()
            .map(catalog::format_clock)
            .unwrap_or_else(|| "-".to_string());
        let when = catalog::published_at(ep)
            .map(|d| catalog::relative_date(d, now))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<12} {:>8}  {:<14} {:>6}  {}",
            ep.eid,
            length,
            when,
            ep.play_count.unwrap_or(0),
            ep.title
        );
    }
    println!("{} episodes", episodes.len());
}
