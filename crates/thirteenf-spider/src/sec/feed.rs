use crate::client::get_text;
use crate::fs::download_file;
use crate::http::*;
use crate::{Config, Error, Result};
use futures::{stream, StreamExt};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, error, info, trace};

lazy_static! {
    /// A feed archive name in the directory listing, e.g. `20210510.nc.tar.gz`.
    static ref FEED: Regex =
        Regex::new(r"\b\d+\.[A-Za-z]+\.tar\.gz\b").expect("valid feed regex");
}

/// URL of the feed directory of a quarter.
pub fn feed_dir_url(config: &Config, year: u16, quarter: u8) -> String {
    format!("{}/Feed/{year}/QTR{quarter}/", config.archives_url)
}

/// Pick the feed archive names out of a directory listing, sorted and deduplicated.
///
/// With a non-empty `dates` filter only the archives whose date prefix is listed are kept.
pub fn parse_listing<S: AsRef<str>>(listing: &str, dates: &[S]) -> Vec<String> {
    let feeds: BTreeSet<&str> = FEED.find_iter(listing).map(|m| m.as_str()).collect();
    feeds
        .into_iter()
        .filter(|feed| {
            dates.is_empty() || {
                let prefix = feed.split('.').next().unwrap_or_default();
                dates.iter().any(|date| date.as_ref() == prefix)
            }
        })
        .map(str::to_string)
        .collect()
}

/// List the feed archives available for a quarter.
pub async fn list_feeds<S: AsRef<str>>(
    http_client: &HttpClient,
    config: &Config,
    year: u16,
    quarter: u8,
    dates: &[S],
) -> Result<Vec<String>> {
    let url = feed_dir_url(config, year, quarter);
    let listing = get_text(http_client, &url, config.http_retries)
        .await
        .map_err(|err| {
            error!("failed to list feeds for {year}/QTR{quarter}, error({err})");
            err
        })?;

    Ok(parse_listing(&listing, dates))
}

/// Download the feed archives of a quarter, at most `config.max_tasks` at a time.
///
/// Every selected download runs to completion (or failure) before this returns. Failures are
/// logged as they happen; afterwards the first one is returned. Archives already present
/// locally are not fetched again.
pub async fn download_feeds<S: AsRef<str>>(
    http_client: &HttpClient,
    config: &Config,
    year: u16,
    quarter: u8,
    dates: &[S],
    tui: bool,
) -> Result<Vec<PathBuf>> {
    let time = std::time::Instant::now();

    let dir = config.quarter_dir(year, quarter);
    tokio::fs::create_dir_all(&dir).await?;

    let feeds = list_feeds(http_client, config, year, quarter, dates).await?;
    info!(
        "downloading {} feeds for {year}/QTR{quarter} ({} at a time) ...",
        feeds.len(),
        config.max_tasks
    );

    let multi = if tui {
        MultiProgress::new()
    } else {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    };

    let results: Vec<(String, Result<PathBuf>)> = stream::iter(feeds)
        .map(|feed| {
            let url = format!("{}{feed}", feed_dir_url(config, year, quarter));
            let path = dir.join(&feed);
            let pb = crate::tui::download_bar(&multi, &feed, tui);
            async move {
                let res = download_feed(http_client, config, &url, path, &pb).await;
                pb.finish_and_clear();
                (feed, res)
            }
        })
        .buffer_unordered(config.max_tasks)
        .collect()
        .await;

    let mut downloaded = vec![];
    let mut first_err: Option<Error> = None;
    for (feed, res) in results {
        match res {
            Ok(path) => downloaded.push(path),
            Err(err) => {
                error!("failed to download {feed}, error({err})");
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
    }

    if let Some(err) = first_err {
        return Err(err);
    }

    downloaded.sort();
    debug!(
        "{} feeds ready for {year}/QTR{quarter}, {}",
        downloaded.len(),
        crate::time_elapsed(time)
    );

    Ok(downloaded)
}

async fn download_feed(
    http_client: &HttpClient,
    config: &Config,
    url: &str,
    path: PathBuf,
    pb: &ProgressBar,
) -> Result<PathBuf> {
    if tokio::fs::try_exists(&path).await? {
        debug!("{} already downloaded, skipping", path.display());
        return Ok(path);
    }

    trace!("downloading {url}");
    download_file(http_client, url, &path, config.http_retries, pb).await?;

    Ok(path)
}

//////////////////////////////////////////////////////////////
// -- TESTS --
//////////////////////////////////////////////////////////////

#[cfg(test)]
const LISTING: &str = r#"
<table>
<tr><td><a href="20210510.nc.tar.gz">20210510.nc.tar.gz</a></td><td>1.2 GB</td></tr>
<tr><td><a href="20210401.nc.tar.gz">20210401.nc.tar.gz</a></td><td>900 MB</td></tr>
<tr><td><a href="20210511.nc.tar.gz">20210511.nc.tar.gz</a></td><td>1.1 GB</td></tr>
<tr><td><a href="index.json">index.json</a></td></tr>
</table>
"#;

#[test]
fn listing_without_filter_keeps_every_feed() {
    let feeds = parse_listing::<&str>(LISTING, &[]);
    assert_eq!(
        feeds,
        vec![
            "20210401.nc.tar.gz",
            "20210510.nc.tar.gz",
            "20210511.nc.tar.gz"
        ]
    );
}

#[test]
fn listing_filtered_by_date() {
    let feeds = parse_listing(LISTING, &["20210511", "20210510", "20210601"]);
    assert_eq!(feeds, vec!["20210510.nc.tar.gz", "20210511.nc.tar.gz"]);
}
