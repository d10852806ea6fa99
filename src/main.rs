use std::process::ExitCode;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

mod app;
mod config;
mod db;
mod error;
mod feed;
mod filter;
mod models;
mod output;

use app::App;
use config::Config;
use models::{FeedSelector, NewFeedFilter, TimeColumn};

#[derive(Debug, Parser)]
#[command(name = "feedvault")]
#[command(about = "SQLite-backed RSS/Atom history: fetch, dedup, search")]
struct Cli {
    /// Path to the SQLite database (overrides the config file)
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Register a feed URL, or update its category
    Add {
        url: String,
        category: Option<String>,
    },
    /// List registered feeds
    List,
    /// Delete a feed with its entries and filters
    Delete {
        #[arg(long, conflicts_with = "url", required_unless_present = "url")]
        id: Option<i64>,
        #[arg(long)]
        url: Option<String>,
    },
    /// Fetch every feed and store new entries
    Fetch,
    /// Show entries for one day or the last N days (UTC)
    Updates {
        /// YYYY-MM-DD (UTC)
        #[arg(long, conflicts_with = "last")]
        date: Option<NaiveDate>,
        /// Last N days including today
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        last: i64,
        #[command(flatten)]
        opts: QueryOpts,
    },
    /// Full-text search (substring match when FTS5 is unavailable)
    Search {
        query: String,
        #[arg(long, default_value_t = 50)]
        limit: i64,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        fetch_first: bool,
    },
    /// Recent entries of one feed (TSV)
    Recent {
        feed_id: i64,
        #[arg(long, default_value_t = 50)]
        limit: i64,
        #[command(flatten)]
        opts: QueryOpts,
    },
    /// Recent entries of one feed after its enabled filters (TSV)
    RecentFiltered {
        feed_id: i64,
        #[arg(long, default_value_t = 50)]
        limit: i64,
        #[command(flatten)]
        opts: QueryOpts,
    },
    /// Manage saved feed filters
    #[command(subcommand)]
    Filter(FilterCommands),
}

#[derive(Debug, Args)]
struct QueryOpts {
    /// Fetch all feeds before querying
    #[arg(long)]
    fetch_first: bool,
    /// Use fetch time instead of publish time
    #[arg(long)]
    by_fetched: bool,
}

impl QueryOpts {
    fn column(&self) -> TimeColumn {
        TimeColumn::from_use_published(!self.by_fetched)
    }
}

#[derive(Debug, Subcommand)]
enum FilterCommands {
    /// Add a saved filter to a feed
    Add {
        feed_id: i64,
        name: String,
        /// Keywords that must all appear (comma-separated or JSON array)
        include_keywords: String,
        /// Keywords that must not appear (comma-separated or JSON array)
        #[arg(long, default_value = "")]
        exclude_keywords: String,
        /// Any of title,summary,content
        #[arg(long, default_value = "title,summary,content")]
        match_fields: String,
        #[arg(long)]
        case_sensitive: bool,
    },
    /// List saved filters
    List {
        #[arg(long)]
        feed_id: Option<i64>,
        #[arg(long)]
        enabled_only: bool,
    },
    /// Disable a filter but keep it on record
    Disable { filter_id: i64 },
    /// Delete a filter
    Remove { filter_id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load()
        .context("failed to load configuration")?
        .with_db_path(cli.db);

    let app = App::new(&config)
        .await
        .with_context(|| format!("failed to open database at {}", config.db_path))?;

    run(&app, cli.command).await
}

async fn fetch_first(app: &App, enabled: bool) -> anyhow::Result<()> {
    if enabled {
        let summary = app.ingest_all().await?;
        if summary.has_errors() {
            eprint!("{}", output::fetch_summary(&summary));
        }
    }
    Ok(())
}

fn print_entries<F>(entries: &[models::Entry], render: F)
where
    F: Fn(&[models::Entry]),
{
    if entries.is_empty() {
        println!("No entries found.");
    } else {
        render(entries);
    }
}

async fn run(app: &App, command: Commands) -> anyhow::Result<ExitCode> {
    let repo = &app.repository;

    match command {
        Commands::Add { url, category } => {
            let feed = repo.add_feed(&url, category.as_deref()).await?;
            println!(
                "Added/exists: id={} category={} url={} title={}",
                feed.id,
                feed.category,
                feed.url,
                feed.title.as_deref().unwrap_or("")
            );
        }

        Commands::List => {
            let feeds = repo.list_feeds().await?;
            if feeds.is_empty() {
                println!("No feeds registered.");
            }
            for feed in &feeds {
                println!("{}", output::feed_line(feed));
            }
        }

        Commands::Delete { id, url } => {
            let selector = match (id, url) {
                (Some(id), _) => FeedSelector::Id(id),
                (None, Some(url)) => FeedSelector::Url(url),
                (None, None) => anyhow::bail!("provide --id or --url"),
            };
            let deleted = repo.delete_feed(selector).await?;
            if deleted == 0 {
                println!("No matching feed found.");
                return Ok(ExitCode::from(1));
            }
            println!("Deleted {} feed(s).", deleted);
        }

        Commands::Fetch => {
            let summary = app.ingest_all().await?;
            print!("{}", output::fetch_summary(&summary));
            if summary.has_errors() {
                return Ok(ExitCode::from(2));
            }
        }

        Commands::Updates { date, last, opts } => {
            fetch_first(app, opts.fetch_first).await?;
            let entries = match date {
                Some(day) => repo.updates_for_day(day, opts.column()).await?,
                None => repo.updates_last_n_days(last, opts.column()).await?,
            };
            print_entries(&entries, |e| print!("{}", output::entries_grouped_by_day(e)));
        }

        Commands::Search {
            query,
            limit,
            category,
            fetch_first: fetch,
        } => {
            fetch_first(app, fetch).await?;
            let results = repo.search(&query, limit, category.as_deref()).await?;
            if results.is_empty() {
                println!("No matches.");
            } else {
                print!("{}", output::entries_grouped_by_day(&results));
            }
        }

        Commands::Recent { feed_id, limit, opts } => {
            fetch_first(app, opts.fetch_first).await?;
            let entries = repo.recent_for_feed(feed_id, limit, opts.column()).await?;
            print_entries(&entries, |e| e.iter().for_each(|x| println!("{}", output::entry_tsv(x))));
        }

        Commands::RecentFiltered { feed_id, limit, opts } => {
            fetch_first(app, opts.fetch_first).await?;
            let entries = repo
                .filtered_recent_for_feed(feed_id, limit, opts.column())
                .await?;
            print_entries(&entries, |e| e.iter().for_each(|x| println!("{}", output::entry_tsv(x))));
        }

        Commands::Filter(cmd) => return run_filter(app, cmd).await,
    }

    Ok(ExitCode::SUCCESS)
}

async fn run_filter(app: &App, command: FilterCommands) -> anyhow::Result<ExitCode> {
    let repo = &app.repository;

    match command {
        FilterCommands::Add {
            feed_id,
            name,
            include_keywords,
            exclude_keywords,
            match_fields,
            case_sensitive,
        } => {
            let filter = repo
                .add_filter(NewFeedFilter {
                    exclude_keywords,
                    match_fields,
                    case_sensitive,
                    ..NewFeedFilter::new(feed_id, name, include_keywords)
                })
                .await?;
            println!(
                "Added filter id={} feed_id={} name={}",
                filter.id, filter.feed_id, filter.name
            );
        }

        FilterCommands::List {
            feed_id,
            enabled_only,
        } => {
            let filters = repo.list_filters(feed_id, enabled_only).await?;
            if filters.is_empty() {
                println!("No filters found.");
            }
            for filter in &filters {
                println!("{}", output::filter_line(filter));
            }
        }

        FilterCommands::Disable { filter_id } => {
            let changed = repo.disable_filter(filter_id).await?;
            if changed == 0 {
                println!("No matching filter found.");
                return Ok(ExitCode::from(1));
            }
            println!("Disabled {} filter(s).", changed);
        }

        FilterCommands::Remove { filter_id } => {
            let changed = repo.remove_filter(filter_id).await?;
            if changed == 0 {
                println!("No matching filter found.");
                return Ok(ExitCode::from(1));
            }
            println!("Removed {} filter(s).", changed);
        }
    }

    Ok(ExitCode::SUCCESS)
}
