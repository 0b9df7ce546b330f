use super::{ACCESSION, FEED_SUFFIX};
use crate::fs::list_files;
use crate::{Config, Result};
use flate2::read::MultiGzDecoder;
use std::collections::HashSet;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace, warn};

/// Result of scanning one feed archive.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Paths of the filings written next to the archive.
    pub extracted: Vec<PathBuf>,
    /// Targets this archive did not contain.
    pub remaining: HashSet<String>,
}

/// Result of scanning a set of feed archives.
#[derive(Debug, Default)]
pub struct QuarterExtraction {
    /// Number of archives considered.
    pub feeds: usize,
    pub extracted: Vec<PathBuf>,
    pub remaining: HashSet<String>,
    /// Archives that could not be read or deleted, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

/// Extract the filings whose accession numbers are in `targets` from a `.tar.gz` feed,
/// into the directory holding the feed.
///
/// Each target is extracted at most once; entries without an accession number, or whose
/// accession number is not (or no longer) a target, are skipped. The scan stops as soon as every
/// target has been found.
pub fn extract_feed(archive_path: &Path, targets: &HashSet<String>) -> Result<Extraction> {
    let mut remaining = targets.clone();
    let mut extracted = vec![];
    if remaining.is_empty() {
        return Ok(Extraction {
            extracted,
            remaining,
        });
    }

    let to_dir = archive_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    debug!("scanning {} for {} filings", archive_path.display(), remaining.len());
    let file = std::fs::File::open(archive_path)?;
    let mut archive = tar::Archive::new(MultiGzDecoder::new(BufReader::new(file)));

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();

        let Some(accession) = ACCESSION.find(&name) else {
            continue;
        };
        if !remaining.remove(accession.as_str()) {
            continue;
        }

        trace!("extracting {name} to {}", to_dir.display());
        if entry.unpack_in(to_dir)? {
            extracted.push(to_dir.join(&name));
        } else {
            warn!("skipped {name}: it would unpack outside of {}", to_dir.display());
        }

        if remaining.is_empty() {
            break;
        }
    }

    Ok(Extraction {
        extracted,
        remaining,
    })
}

/// Extract `targets` from the downloaded feeds of a quarter, in date order.
///
/// With `date` (`YYYYMMDD`) only the archives of that day are scanned. See [`extract_feeds`] for
/// the scan itself.
pub fn extract_quarter(
    config: &Config,
    year: u16,
    quarter: u8,
    date: Option<&str>,
    targets: &HashSet<String>,
    delete_feeds: bool,
) -> Result<QuarterExtraction> {
    let time = std::time::Instant::now();
    let mut feeds = list_files(&config.quarter_dir(year, quarter), FEED_SUFFIX)?;
    if let Some(date) = date {
        let prefix = format!("{date}.");
        feeds.retain(|feed| {
            feed.file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with(&prefix))
        });
    }
    info!(
        "extracting {} filings from {} feeds of {year}/QTR{quarter} ...",
        targets.len(),
        feeds.len()
    );

    let summary = extract_feeds(&feeds, targets, delete_feeds);
    info!(
        "{} filings extracted, {} not found, {} feeds failed, {}",
        summary.extracted.len(),
        summary.remaining.len(),
        summary.failed.len(),
        crate::time_elapsed(time)
    );

    Ok(summary)
}

/// Extract `targets` from `feeds`, in the order given.
///
/// The targets still missing are carried from one archive to the next. With `delete_feeds`
/// each archive is removed right after its scan, whether or not it held any target; an archive
/// that failed to scan is kept, so a later run can try it again. A failure to read or delete an
/// archive is logged and recorded, and the remaining archives are still processed.
pub fn extract_feeds(
    feeds: &[PathBuf],
    targets: &HashSet<String>,
    delete_feeds: bool,
) -> QuarterExtraction {
    let mut summary = QuarterExtraction {
        feeds: feeds.len(),
        remaining: targets.clone(),
        ..QuarterExtraction::default()
    };

    for feed in feeds {
        match extract_feed(feed, &summary.remaining) {
            Ok(extraction) => {
                debug!(
                    "{} filings extracted from {}",
                    extraction.extracted.len(),
                    feed.display()
                );
                summary.extracted.extend(extraction.extracted);
                summary.remaining = extraction.remaining;

                if delete_feeds {
                    trace!("deleting {}", feed.display());
                    if let Err(err) = std::fs::remove_file(feed) {
                        error!("failed to delete {}, error({err})", feed.display());
                        summary.failed.push((feed.clone(), err.to_string()));
                    }
                }
            }
            Err(err) => {
                error!("failed to extract {}, error({err})", feed.display());
                summary.failed.push((feed.clone(), err.to_string()));
            }
        }
    }

    summary
}
