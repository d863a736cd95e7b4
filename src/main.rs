//! Main entry point for the runzim CLI application.
//!
//! Opens a ZIM archive and runs one query against it: archive information,
//! title listing, full-text search, entry details, raw dumps and random
//! articles.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::io::Write;
use std::process::ExitCode;

use runzim::cli::Command;
use runzim::zim::EntryKind;
use runzim::{Archive, Cli, Listing};

const PATH_WIDTH: usize = 60;
const TITLE_WIDTH: usize = 40;

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from(cli.log_level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let archive = Archive::open_with(&cli.file, cli.archive_options())
        .with_context(|| format!("cannot open '{}'", cli.file))?;

    match cli.command() {
        Command::Info => show_info(&archive, &cli.file)?,
        Command::List {
            prefix,
            limit,
            offset,
        } => {
            let listings = archive
                .list_by_prefix(&prefix, limit, offset)
                .with_context(|| format!("cannot list prefix '{prefix}'"))?;
            print_table(&listings);
            println!("Shown: {} articles", listings.len());
        }
        Command::Search {
            query,
            offset,
            limit,
        } => {
            let found = archive
                .search(&query, offset, limit)
                .with_context(|| format!("search for '{query}' failed"))?;
            match found.estimated_total {
                Some(total) => println!("Estimated matches: {total}"),
                None => println!("Estimated matches: at least {}", offset + found.results.len()),
            }
            print_table(&found.results);
            println!(
                "Shown: {} articles (offset: {})",
                found.results.len(),
                offset
            );
        }
        Command::Get { path } => show_entry(&archive, &path)?,
        Command::Dump { path, output } => dump_entry(&archive, &path, output.as_deref(), cli.quiet)?,
        Command::Random => {
            let entry = archive.random_entry().context("cannot pick a random article")?;
            println!("Path: {}", entry.path);
            println!("Title: {}", entry.title);
            println!("Mimetype: {}", entry.mimetype);
            println!("Size: {} bytes", entry.size());
        }
    }

    archive.close();
    Ok(())
}

fn show_info(archive: &Archive, file: &str) -> Result<()> {
    let info = archive.info().context("cannot read archive information")?;

    println!("{}", "=".repeat(80));
    println!("ZIM Archive Information");
    println!("{}", "=".repeat(80));
    println!("Filename: {file}");
    println!("File size: {}", format_size(info.file_size));
    println!("UUID: {}", info.uuid);
    println!("Version: {}.{}", info.major_version, info.minor_version);
    println!("Has main entry: {}", info.main_page_path.is_some());
    if let Some(main) = &info.main_page_path {
        println!("Main entry: {main}");
    }
    println!("Entry count: {}", info.content_entry_count);
    println!("All entry count: {}", info.entry_count);
    println!("Article count: {}", count_or_unknown(info.article_count));
    println!("Media count: {}", count_or_unknown(info.media_count));
    println!("Cluster count: {}", info.cluster_count);
    println!("Has fulltext index: {}", info.has_fulltext_index);
    println!("Has title index: {}", info.has_title_index);
    println!("Has checksum: {}", info.has_checksum);
    println!("Has illustration: {}", info.has_illustration());
    if info.has_illustration() {
        let sizes: Vec<String> = info.illustrations.iter().map(|i| i.to_string()).collect();
        println!("  Illustration sizes: {}", sizes.join(", "));
    }
    println!("MIME types: {}", info.mimetypes.join(", "));
    for (key, value) in &info.metadata {
        println!("{key}: {value}");
    }
    Ok(())
}

/// Print details of one entry; a redirect reports its immediate target
fn show_entry(archive: &Archive, path: &str) -> Result<()> {
    let (_, record) = archive
        .lookup(path)?
        .with_context(|| format!("no entry at '{path}'"))?;

    println!("Path: {}", archive.display_path(&record));
    println!("Title: {}", record.title_or_url());
    println!("Is redirect: {}", record.is_redirect());

    if let EntryKind::Redirect { target } = record.kind {
        let target = archive
            .directory_entry(target)
            .with_context(|| format!("cannot read redirect target of '{path}'"))?;
        println!("Redirects to: {}", archive.display_path(&target));
    } else {
        let entry = archive
            .get_entry(path)
            .with_context(|| format!("cannot read '{path}'"))?;
        println!("Mimetype: {}", entry.mimetype);
        println!("Size: {} bytes", entry.size());
    }
    Ok(())
}

/// `M/Counter` derived counts are absent from some archives
fn count_or_unknown(count: Option<u64>) -> String {
    count.map_or_else(|| "unknown".to_string(), |c| c.to_string())
}

fn dump_entry(archive: &Archive, path: &str, output: Option<&str>, quiet: bool) -> Result<()> {
    let entry = archive
        .get_entry(path)
        .with_context(|| format!("cannot dump '{path}'"))?;

    if let (Some(from), false) = (&entry.redirected_from, quiet) {
        eprintln!("Note: '{}' is a redirect to '{}'", from, entry.path);
    }

    let dump = entry.dump();
    if let Some(output) = output {
        fs::write(output, dump.data).with_context(|| format!("cannot write '{output}'"))?;
        if !quiet {
            eprintln!(
                "Dumped {} bytes to '{}' ({})",
                dump.data.len(),
                output,
                dump.mimetype
            );
        }
        return Ok(());
    }

    if !dump.is_text() && !quiet {
        eprintln!("# Content-Type: {}", dump.mimetype);
        eprintln!("# Size: {} bytes", dump.data.len());
        eprintln!("# Binary content - writing raw bytes to stdout");
    }

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(dump.data)?;
    stdout.flush()?;
    Ok(())
}

fn print_table(listings: &[Listing]) {
    println!("{:<PATH_WIDTH$} {:<TITLE_WIDTH$}", "Path", "Title");
    println!("{}", "-".repeat(PATH_WIDTH + TITLE_WIDTH));
    for listing in listings {
        let title: &str = if listing.title.is_empty() {
            "(no title)"
        } else {
            &listing.title
        };
        println!(
            "{:<PATH_WIDTH$} {:<TITLE_WIDTH$}",
            truncate(&listing.path, PATH_WIDTH),
            truncate(title, TITLE_WIDTH)
        );
    }
    println!("{}", "-".repeat(PATH_WIDTH + TITLE_WIDTH));
}

/// Cut `text` to `width` characters, ending in "..." when shortened
fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

/// Format a byte size into a human-readable string.
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
