//! The 13F holdings pipeline over SEC EDGAR's bulk data.
//!
//! 1. [`index`]: which filings of a quarter are 13F reports, and on which dates they were published
//! 2. [`feed`]: download the daily feed archives holding those filings
//! 3. [`extract`]: pull just the wanted filings out of the archives
//! 4. [`filing`]: parse a filing into a submission record and its holdings table
//! 5. [`store`] & [`ingest`]: write companies, filings and per-company portfolios to PostgreSQL
use lazy_static::lazy_static;
use regex::Regex;

mod sql;

pub mod extract;
pub mod feed;
pub mod filing;
pub mod index;
pub mod ingest;
pub mod store;
pub mod xml;

/// File suffix of an extracted filing, e.g. `0001234567-21-000001.nc`.
pub const FILING_SUFFIX: &str = ".nc";

/// File suffix of a daily feed archive, e.g. `20210510.nc.tar.gz`.
pub const FEED_SUFFIX: &str = ".tar.gz";

lazy_static! {
    /// An accession number: `NNNNNNNNNN-NN-NNNNNN`.
    pub(crate) static ref ACCESSION: Regex =
        Regex::new(r"\d{10}-\d{2}-\d{6}").expect("valid accession number regex");
}
