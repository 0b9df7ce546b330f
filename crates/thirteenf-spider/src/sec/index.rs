use crate::client::get_text;
use crate::http::*;
use crate::{Config, Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

lazy_static! {
    static ref DATE: Regex =
        Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("valid date regex");
    static ref FILENAME: Regex =
        Regex::new(r"(\d{10}-\d{2}-\d{6})\.txt").expect("valid filename regex");
}

/// One selected line of a quarterly `form.idx`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    /// `YYYYMMDD`, the date key of the feed archive holding the filing.
    pub publish_date: String,
    pub accession_number: String,
    pub form_type: String,
}

/// What a quarter's index says needs downloading and extracting.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Index {
    /// Unique publish dates, `YYYYMMDD`.
    pub dates: BTreeSet<String>,
    /// Accession numbers in the order they appear in the index.
    pub accessions: Vec<String>,
}

impl FromIterator<IndexEntry> for Index {
    fn from_iter<I: IntoIterator<Item = IndexEntry>>(entries: I) -> Self {
        let mut index = Index::default();
        for entry in entries {
            index.dates.insert(entry.publish_date);
            index.accessions.push(entry.accession_number);
        }
        index
    }
}

/// URL of the quarterly form index, e.g. `.../full-index/2021/QTR2/form.idx`.
pub fn index_url(config: &Config, year: u16, quarter: u8) -> String {
    format!(
        "{}/full-index/{year}/QTR{quarter}/form.idx",
        config.archives_url
    )
}

/// Fetch the `form.idx` of a quarter and select the lines of `config.form_types`.
///
/// A non-success response means the index is unavailable (e.g. a quarter that has not started
/// yet) and yields `Ok(None)`; callers decide whether that is fatal.
pub async fn fetch_index(
    http_client: &HttpClient,
    config: &Config,
    year: u16,
    quarter: u8,
) -> Result<Option<Index>> {
    let url = index_url(config, year, quarter);
    info!("fetching {year}/QTR{quarter} form index ...");

    let text = match get_text(http_client, &url, config.http_retries).await {
        Ok(text) => text,
        Err(Error::Status { status, .. }) => {
            warn!("form index for {year}/QTR{quarter} unavailable, status({status})");
            return Ok(None);
        }
        Err(err) => {
            error!("failed to fetch form index for {year}/QTR{quarter}, error({err})");
            return Err(err);
        }
    };

    let index = parse_index(&text, &config.form_types)?;
    debug!(
        "{year}/QTR{quarter}: {} filings across {} dates",
        index.accessions.len(),
        index.dates.len()
    );

    Ok(Some(index))
}

/// Select the `form_types` lines of an index document into an [`Index`].
pub fn parse_index<S: AsRef<str>>(text: &str, form_types: &[S]) -> Result<Index> {
    Ok(parse_entries(text, form_types)?.into_iter().collect())
}

/// Parse every line starting with one of `form_types`.
///
/// Such a line must carry a `YYYY-MM-DD` date and an `NNNNNNNNNN-NN-NNNNNN.txt` filename;
/// a line missing either means the index format changed, and the whole parse fails.
pub fn parse_entries<S: AsRef<str>>(text: &str, form_types: &[S]) -> Result<Vec<IndexEntry>> {
    let mut entries = vec![];
    for (i, line) in text.lines().enumerate() {
        if !form_types.iter().any(|form| line.starts_with(form.as_ref())) {
            continue;
        }

        let malformed = || Error::MalformedIndexLine {
            line_no: i + 1,
            line: line.to_string(),
        };

        let date = DATE.captures(line).ok_or_else(malformed)?;
        let accession = FILENAME.captures(line).ok_or_else(malformed)?;

        entries.push(IndexEntry {
            publish_date: format!("{}{}{}", &date[1], &date[2], &date[3]),
            accession_number: accession[1].to_string(),
            form_type: line.split_whitespace().next().unwrap_or_default().to_string(),
        });
    }

    Ok(entries)
}

//////////////////////////////////////////////////////////////
// -- TESTS --
//////////////////////////////////////////////////////////////

#[cfg(test)]
const FORM_IDX: &str = "\
Description:           Master Index of EDGAR Dissemination Feed by Form Type
Last Data Received:    June 30, 2021

Form Type   Company Name                                                  CIK         Date Filed  File Name
---------------------------------------------------------------------------------------------------------------------------------------------
10-K        SOME OTHER CORP                                               0000320193  2021-05-10  edgar/data/320193/0000320193-21-000010.txt
13F-HR      ACME CORP                                                     0001234567  2021-05-10  edgar/data/1234567/0001234567-21-000001.txt
13F-HR      BETA CAPITAL MANAGEMENT LLC                                   0007654321  2021-05-11  edgar/data/7654321/0007654321-21-000003.txt
13F-HR/A    ACME CORP                                                     0001234567  2021-05-10  edgar/data/1234567/0001234567-21-000002.txt
13F-NT      GAMMA ADVISORS                                                0001111111  2021-05-12  edgar/data/1111111/0001111111-21-000004.txt
";

#[test]
fn selects_accepted_form_types() {
    let index = parse_index(FORM_IDX, &crate::config::DEFAULT_FORM_TYPES).unwrap();
    assert_eq!(
        index.dates.into_iter().collect::<Vec<_>>(),
        vec!["20210510", "20210511"]
    );
    assert_eq!(
        index.accessions,
        vec![
            "0001234567-21-000001",
            "0007654321-21-000003",
            "0001234567-21-000002"
        ]
    );
}

#[test]
fn entry_fields() {
    let line = "13F-HR  ACME CORP  0001234567  2021-05-10  edgar/data/1234567/0001234567-21-000001.txt";
    let entries = parse_entries(line, &["13F-HR"]).unwrap();
    assert_eq!(
        entries,
        vec![IndexEntry {
            publish_date: "20210510".to_string(),
            accession_number: "0001234567-21-000001".to_string(),
            form_type: "13F-HR".to_string(),
        }]
    );
}

#[test]
fn other_form_types_are_ignored() {
    let index = parse_index(FORM_IDX, &["10-K"]).unwrap();
    assert_eq!(index.accessions, vec!["0000320193-21-000010"]);
}

#[test]
fn malformed_selected_line_is_fatal() {
    let text = "13F-HR  ACME CORP  0001234567  edgar/data/1234567/0001234567-21-000001.txt";
    match parse_index(text, &["13F-HR"]) {
        Err(Error::MalformedIndexLine { line_no, .. }) => assert_eq!(line_no, 1),
        other => panic!("expected a malformed line error, got {other:?}"),
    }

    // lines of other form types are never inspected
    let text = "10-K  NO DATE HERE";
    assert!(parse_index(text, &["13F-HR"]).unwrap().accessions.is_empty());
}
