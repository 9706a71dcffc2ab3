//! `recall` — track markdown notes and review their headings as cards.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use recall_core::source::MarkdownVault;
use recall_core::{Card, CardId, CardStore, Rating, RecallConfig, Tracker};

#[derive(Parser)]
#[command(name = "recall", about = "Spaced-repetition review of note headings", version)]
struct Cli {
    /// Configuration file (created on the first tracking change)
    #[arg(long, global = true, default_value = "recall.toml")]
    config: PathBuf,

    /// Directory document paths are relative to
    #[arg(long, global = true, default_value = ".")]
    vault: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start tracking a document and index its headings
    Track {
        /// Document path inside the vault
        path: String,
    },

    /// Stop tracking a document and delete its cards
    Untrack {
        /// Document path inside the vault
        path: String,
    },

    /// Record that a tracked document was moved
    Rename {
        /// Previous document path
        from: String,
        /// New document path
        to: String,
    },

    /// Re-index every tracked document
    Reindex,

    /// List cards that are due now
    Due {
        /// Maximum cards to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// List the cards of one document
    Cards {
        /// Document path inside the vault
        path: String,
    },

    /// List tracked documents
    Docs,

    /// Show a card's heading and the section under it
    Show {
        /// Card id as shown by `due` or `cards`
        card: String,
    },

    /// Record a review outcome
    Review {
        /// Card id as shown by `due` or `cards`
        card: String,
        /// hard, good or easy
        rating: Rating,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let store = CardStore::open_with_config(&config.persistence).await;
    if !store.is_ready() {
        eprintln!("warning: card store unavailable; review and indexing are disabled");
    }
    let mut tracker = Tracker::new(config.tracking.clone(), store.clone());
    let vault = MarkdownVault::new(&cli.vault);

    let outcome = run(cli.command, &mut tracker, &vault);

    if tracker.config() != &config.tracking {
        config.tracking = tracker.config().clone();
        config
            .save(&cli.config)
            .with_context(|| format!("saving {}", cli.config.display()))?;
        info!(path = %cli.config.display(), "Tracking list saved");
    }

    let closed = store.close().await;
    outcome?;
    closed.context("writing card store")?;
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<RecallConfig> {
    if !path.exists() {
        return Ok(RecallConfig::default());
    }
    RecallConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
}

fn run(command: Command, tracker: &mut Tracker, vault: &MarkdownVault) -> anyhow::Result<()> {
    match command {
        Command::Track { path } => match tracker.track(&path, vault) {
            Some(report) if report.current == 0 && !vault.resolve(&path).exists() => {
                warn!(document = %path, "Tracking a document that does not exist yet");
                println!("Tracking {path} (not found in vault yet)");
            }
            Some(report) => println!("Tracking {path}: {} cards", report.current),
            None => println!("{path} is already tracked"),
        },

        Command::Untrack { path } => match tracker.untrack(&path) {
            Some(removed) => println!("Stopped tracking {path}; removed {removed} cards"),
            None => println!("{path} is not tracked"),
        },

        Command::Rename { from, to } => match tracker.on_renamed(&from, &to) {
            Some(moved) => println!("Moved {moved} cards from {from} to {to}"),
            None => bail!("{from} is not tracked"),
        },

        Command::Reindex => {
            let reports = tracker.reindex_all(vault);
            for report in &reports {
                println!(
                    "{}: {} cards ({} new, {} stale{})",
                    report.document,
                    report.current,
                    report.created,
                    report.stale.len(),
                    if report.deleted > 0 {
                        format!(", {} deleted", report.deleted)
                    } else {
                        String::new()
                    }
                );
            }
            let missing = tracker.tracked_documents().len() - reports.len();
            if missing > 0 {
                println!("{missing} tracked documents not found");
            }
        }

        Command::Due { limit } => {
            let due = tracker.due_cards();
            if due.is_empty() {
                println!("Nothing due");
            }
            for card in due.iter().take(limit) {
                print_card(card);
            }
            if due.len() > limit {
                println!("… and {} more", due.len() - limit);
            }
        }

        Command::Cards { path } => {
            for card in tracker.store().list_for_document(&path) {
                print_card(&card);
            }
        }

        Command::Docs => {
            for doc in tracker.tracked_documents() {
                let cards = tracker.store().list_for_document(doc).len();
                println!("{doc}  ({cards} cards)");
            }
        }

        Command::Show { card } => {
            let id = CardId::from(card);
            let Some(found) = tracker.store().get(&id) else {
                bail!("no card with id {id}");
            };
            println!("{}  ({})", found.question, found.document_path);
            println!();
            match tracker.answer(&id, vault) {
                Some(answer) if answer.is_empty() => println!("(no content under this heading)"),
                Some(answer) => println!("{answer}"),
                None => println!("(heading no longer found in {})", found.document_path),
            }
        }

        Command::Review { card, rating } => {
            let id = CardId::from(card);
            let Some(next) = tracker.review(&id, rating) else {
                bail!("no card with id {id}");
            };
            println!(
                "{id} rated {rating}: next review in {} (ease {:.2}, due {})",
                format_interval(next.interval),
                next.ease,
                format_due(next.due_date)
            );
        }
    }
    Ok(())
}

fn print_card(card: &Card) {
    println!(
        "{}  {:<40}  {}  every {}",
        card.id,
        card.question,
        format_due(card.due_date),
        format_interval(card.interval)
    );
}

fn format_due(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map_or_else(|| ms.to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string())
}

fn format_interval(days: u32) -> String {
    match days {
        1 => "1 day".to_string(),
        d if d < 60 => format!("{d} days"),
        d if d < 730 => format!("{:.1} months", f64::from(d) / 30.0),
        d => format!("{:.1} years", f64::from(d) / 365.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intervals_read_naturally() {
        assert_eq!(format_interval(1), "1 day");
        assert_eq!(format_interval(12), "12 days");
        assert_eq!(format_interval(90), "3.0 months");
        assert_eq!(format_interval(1095), "3.0 years");
    }

    #[test]
    fn due_dates_format_as_utc() {
        assert_eq!(format_due(0), "1970-01-01 00:00");
        assert_eq!(format_due(86_400_000 + 90_000), "1970-01-02 00:01");
    }

    #[test]
    fn cli_parses_review() {
        let cli = Cli::try_parse_from(["recall", "review", "af63bd4c8601b7df", "Easy"]).expect("parse");
        match cli.command {
            Command::Review { card, rating } => {
                assert_eq!(card, "af63bd4c8601b7df");
                assert_eq!(rating, Rating::Easy);
            }
            _ => panic!("expected review"),
        }
    }

    #[test]
    fn cli_parses_show() {
        let cli = Cli::try_parse_from(["recall", "--vault", "notes", "show", "af63bd4c8601b7df"])
            .expect("parse");
        assert_eq!(cli.vault, PathBuf::from("notes"));
        match cli.command {
            Command::Show { card } => assert_eq!(card, "af63bd4c8601b7df"),
            _ => panic!("expected show"),
        }
    }
}
