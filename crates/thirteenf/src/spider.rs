use anyhow::bail;
use colored::Colorize;
use deadpool_postgres::Pool;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thirteenf_spider::sec::{extract, feed, filing, index, ingest};
use thirteenf_spider::{client, Config};
use tracing::{debug, info, warn};

/// Fetch the quarter's form index, failing when it is not published.
async fn quarter_index(
    http_client: &reqwest::Client,
    config: &Config,
    year: u16,
    quarter: u8,
) -> anyhow::Result<index::Index> {
    match index::fetch_index(http_client, config, year, quarter).await? {
        Some(index) => Ok(index),
        None => bail!("no form index published for {year}/QTR{quarter}"),
    }
}

/// `thirteenf download`: fetch the feeds of `dates`, or of every date the index lists.
pub(crate) async fn download(
    config: &Config,
    year: u16,
    quarter: u8,
    dates: Vec<String>,
    tui: bool,
) -> anyhow::Result<Vec<PathBuf>> {
    let http_client = client::build_client(config)?;

    let dates = if dates.is_empty() {
        let index = quarter_index(&http_client, config, year, quarter).await?;
        index.dates.into_iter().collect()
    } else {
        dates
    };
    if dates.is_empty() {
        warn!("no 13F filings listed for {year}/QTR{quarter}, nothing to download");
        return Ok(vec![]);
    }

    let feeds = feed::download_feeds(&http_client, config, year, quarter, &dates, tui).await?;
    report(tui, "feeds downloaded", feeds.len(), 0);

    Ok(feeds)
}

/// `thirteenf unpack`: extract the index's filings from the downloaded feeds.
pub(crate) async fn unpack(
    config: &Config,
    year: u16,
    quarter: u8,
    date: Option<String>,
    delete_feeds: bool,
    tui: bool,
) -> anyhow::Result<()> {
    let http_client = client::build_client(config)?;
    let index = quarter_index(&http_client, config, year, quarter).await?;
    let targets: HashSet<String> = index.accessions.into_iter().collect();

    // archive scans are blocking
    let config = config.clone();
    let summary = tokio::task::spawn_blocking(move || {
        extract::extract_quarter(
            &config,
            year,
            quarter,
            date.as_deref(),
            &targets,
            delete_feeds,
        )
    })
    .await??;

    if summary.feeds == 0 {
        bail!("no downloaded feeds to unpack in {year}/QTR{quarter}");
    }
    if !summary.remaining.is_empty() {
        debug!(
            "{} filings of the index were not found in the feeds",
            summary.remaining.len()
        );
    }
    report(
        tui,
        "filings extracted",
        summary.extracted.len(),
        summary.failed.len(),
    );
    if tui {
        for (path, reason) in &summary.failed {
            println!("  {} {}: {reason}", "x".red(), file_name(path));
        }
    }

    Ok(())
}

/// `thirteenf to-database`: store the extracted filings.
pub(crate) async fn to_database(
    pool: &Pool,
    config: &Config,
    year: u16,
    quarter: u8,
    filename: Option<String>,
    tui: bool,
) -> anyhow::Result<()> {
    let summary =
        ingest::ingest_quarter(pool, config, year, quarter, filename.as_deref(), tui).await?;

    report(
        tui,
        "filings stored",
        summary.inserted + summary.skipped,
        summary.failed.len(),
    );
    if tui {
        for (path, reason) in &summary.failed {
            println!("  {} {}: {reason}", "x".red(), file_name(path));
        }
    }

    Ok(())
}

/// `thirteenf inspect`: print the normalized submission and holdings of one filing.
pub(crate) fn inspect(path: &Path) -> anyhow::Result<()> {
    let filing = filing::read_filing(path)?;
    let submission = filing::normalize_submission(&filing.submission)?;
    let holdings = filing::normalize_holdings(&filing.information_table, None)?;

    let json = serde_json::json!({
        "accession_number": filing.accession_number,
        "submission": submission,
        "holdings": holdings,
    });
    println!("{}", serde_json::to_string_pretty(&json)?);

    Ok(())
}

/// `thirteenf run`: download, unpack and store a quarter.
pub(crate) async fn run(
    pool: &Pool,
    config: &Config,
    year: u16,
    quarter: u8,
    delete_feeds: bool,
    tui: bool,
) -> anyhow::Result<()> {
    let time = std::time::Instant::now();

    download(config, year, quarter, vec![], tui).await?;
    unpack(config, year, quarter, None, delete_feeds, tui).await?;
    to_database(pool, config, year, quarter, None, tui).await?;

    info!(
        "{year}/QTR{quarter} ingested, time elapsed: {:.2?}",
        time.elapsed()
    );

    Ok(())
}

fn report(tui: bool, what: &str, ok: usize, failed: usize) {
    if tui {
        println!(
            "{} {what}, {}",
            ok.to_string().green().bold(),
            format!("{failed} failed").red()
        );
    } else {
        info!("{ok} {what}, {failed} failed");
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
