use super::filing::{normalize_holdings, normalize_submission, read_filing};
use super::{store, FILING_SUFFIX};
use crate::fs::list_files;
use crate::http::*;
use crate::tui::{spinner, BatchProgress};
use crate::{Config, Result};
use deadpool_postgres::Pool;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace};

/// What ingesting one filing did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Holdings were copied into the portfolio table.
    Inserted { filing_id: i32, rows: u64 },
    /// The holdings of this filing were already stored; nothing was copied.
    AlreadyIngested { filing_id: i32 },
}

/// Parse the filing at `path` and store it.
///
/// The company and filing rows are resolved or created in one transaction, which is committed
/// before the holdings are considered. The holdings then go in with a single COPY, unless the
/// portfolio table already has rows for this filing. A filing without holdings counts as
/// already ingested once its filing row exists. Parsing happens first, so a filing that
/// does not parse leaves no trace in the database.
pub async fn ingest_filing(pg_client: &mut PgClient, path: &Path) -> Result<Outcome> {
    let filing = read_filing(path)?;
    let submission = normalize_submission(&filing.submission)?;
    let holdings = normalize_holdings(&filing.information_table, None)?;
    let cik = submission.cik.as_str();
    store::portfolio_table(cik)?;

    // company & filing
    let tx = pg_client.transaction().await?;
    if store::company_exists(&tx, cik).await?.is_none() {
        trace!("new company {cik}");
        store::add_company(&tx, &submission).await?;
    }
    let company_id = store::company_id(&tx, cik).await?;

    let known_filing = store::filing_exists(&tx, &filing.accession_number).await?.is_some();
    if !known_filing {
        store::add_filing(&tx, &submission, company_id, &filing.accession_number).await?;
    }
    let filing_id = store::filing_id(&tx, &filing.accession_number).await?;
    tx.commit().await?;

    // holdings
    if !store::portfolio_table_exists(&*pg_client, cik).await? {
        store::create_portfolio_table(&*pg_client, cik).await?;
    }
    if store::holdings_exist(&*pg_client, cik, filing_id).await? {
        debug!("{} already ingested as filing {filing_id}", filing.accession_number);
        return Ok(Outcome::AlreadyIngested { filing_id });
    }

    if holdings.is_empty() {
        // nothing to copy; a known filing was stored by an earlier run
        return Ok(if known_filing {
            Outcome::AlreadyIngested { filing_id }
        } else {
            Outcome::Inserted { filing_id, rows: 0 }
        });
    }

    let holdings = holdings.with_filing_id(filing_id);
    let rows = store::add_portfolio_rows(pg_client, cik, &holdings).await?;
    trace!("{}: {rows} holdings copied", filing.accession_number);

    Ok(Outcome::Inserted { filing_id, rows })
}

/// Counts of a batch ingestion, with the reason for every failure.
#[derive(Debug, Default)]
pub struct Summary {
    pub inserted: usize,
    pub skipped: usize,
    pub failed: Vec<(PathBuf, String)>,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.inserted + self.skipped + self.failed.len()
    }
}

async fn is_alive(pg_client: &PgClient) -> bool {
    !pg_client.is_closed() && pg_client.simple_query("").await.is_ok()
}

/// Ingest the extracted filings of a quarter, or only `filename` when given.
///
/// Filings are processed one after the other on a connection taken from `pool`. A failing filing
/// is logged and counted; the batch carries on, on a fresh connection if the failure closed the
/// current one.
pub async fn ingest_quarter(
    pool: &Pool,
    config: &Config,
    year: u16,
    quarter: u8,
    filename: Option<&str>,
    tui: bool,
) -> Result<Summary> {
    let time = std::time::Instant::now();

    // wait for a pg client from the pool
    let mut pg_client = pool.get().await.map_err(|err| {
        error!("failed to get a postgres client from the pool, error({err})");
        err
    })?;
    store::init_schema(&**pg_client).await?;

    let dir = config.quarter_dir(year, quarter);
    let paths = match filename {
        Some(name) => vec![dir.join(name)],
        None => list_files(&dir, FILING_SUFFIX)?,
    };
    info!(
        "ingesting {} filings from {} ...",
        paths.len(),
        dir.display()
    );

    let progress = BatchProgress::new(paths.len(), tui);
    let mut summary = Summary::default();

    for path in paths {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let pb = spinner(&progress.multi, name.clone(), tui);

        match ingest_filing(&mut pg_client, &path).await {
            Ok(Outcome::Inserted { .. }) => {
                summary.inserted += 1;
                progress.succeeded();
            }
            Ok(Outcome::AlreadyIngested { .. }) => {
                summary.skipped += 1;
                progress.succeeded();
            }
            Err(err) => {
                error!("failed to ingest {name}, error({err})");
                summary.failed.push((path, err.to_string()));
                progress.failed();

                // a failed COPY can take the connection down with it
                if !is_alive(&pg_client).await {
                    debug!("postgres connection lost, taking a new client from the pool");
                    pg_client = pool.get().await.map_err(|err| {
                        error!("failed to get a postgres client from the pool, error({err})");
                        err
                    })?;
                }
            }
        }

        pb.finish_and_clear();
    }

    progress.finish();
    info!(
        "{} filings inserted, {} already stored, {} failed, {}",
        summary.inserted,
        summary.skipped,
        summary.failed.len(),
        crate::time_elapsed(time)
    );

    Ok(summary)
}
