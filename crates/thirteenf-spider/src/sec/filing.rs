use super::xml::Element;
use super::ACCESSION;
use crate::{Error, Result};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use tracing::trace;

lazy_static! {
    static ref XML_BLOCK: Regex =
        Regex::new(r"(?s)<XML>(.*?)</XML>").expect("valid XML block regex");
}

/// Stands in for the information table of a filing that reports no holdings.
pub const EMPTY_INFORMATION_TABLE: &str =
    "<informationTable><infoTable></infoTable></informationTable>";

/// Columns of a holdings table, in order; persisted rows append `filing_id`.
pub const HOLDING_COLUMNS: [&str; 13] = [
    "portfolio_id",
    "nameofissuer",
    "titleofclass",
    "cusip",
    "value",
    "sshprnamt",
    "sshprnamttype",
    "investmentdiscretion",
    "sole",
    "shared",
    "nonne",
    "putcall",
    "othermanager",
];

/// SEC dates are `MM-DD-YYYY`.
const DATE_FORMAT: &str = "%m-%d-%Y";

/// A raw filing: the submission envelope and the information table, both parsed.
#[derive(Clone, Debug)]
pub struct Filing {
    pub accession_number: String,
    pub submission: Element,
    pub information_table: Element,
}

/// Read an extracted filing, e.g. `./buffer/2021/QTR2/0001234567-21-000001.nc`.
///
/// The accession number comes from the file name. A filing without a second `<XML>` block gets
/// [`EMPTY_INFORMATION_TABLE`]; one without any block is rejected.
pub fn read_filing(path: &Path) -> Result<Filing> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let accession_number = ACCESSION
        .find(&file_name)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            Error::MissingField(format!("accession number in file name {file_name:?}"))
        })?;

    let text = crate::fs::read_text(path)?;
    let (submission, information_table) =
        parse_blocks(&text)?.ok_or_else(|| Error::MissingSubmission(path.to_path_buf()))?;

    Ok(Filing {
        accession_number,
        submission,
        information_table,
    })
}

/// Split a filing into its two XML documents; `None` when there is no submission block.
pub fn parse_blocks(text: &str) -> Result<Option<(Element, Element)>> {
    let mut blocks = XML_BLOCK.captures_iter(text).map(|c| c.get(1).map_or("", |m| m.as_str()));

    let Some(submission) = blocks.next() else {
        return Ok(None);
    };
    let information_table = blocks.next().unwrap_or_else(|| {
        trace!("no information table found, using an empty one");
        EMPTY_INFORMATION_TABLE
    });

    Ok(Some((
        Element::parse(submission)?,
        Element::parse(information_table)?,
    )))
}

// Submission
// -------------------------------------------------------------------------------------------------

/// The filer and filing metadata of a submission envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubmissionRecord {
    pub cik: String,
    pub name: String,
    pub street1: Option<String>,
    pub street2: Option<String>,
    pub city: Option<String>,
    pub state_or_country: Option<String>,
    pub zip_code: Option<String>,
    pub file_number: String,
    /// `None` when the filing leaves it out; stored as NULL rather than a made-up date.
    pub period_of_report: Option<NaiveDate>,
    pub signature_date: Option<NaiveDate>,
}

// edgarSubmission
//  ├── headerData
//  │   └── filerInfo
//  │       ├── filer/credentials/cik
//  │       └── periodOfReport               MM-DD-YYYY
//  └── formData
//      ├── coverPage
//      │   ├── form13FFileNumber
//      │   └── filingManager
//      │       ├── name
//      │       └── address/{street1, street2, city, stateOrCountry, zipCode}
//      └── signatureBlock/signatureDate     MM-DD-YYYY
const CIK: &[&str] = &["headerData", "filerInfo", "filer", "credentials", "cik"];
const PERIOD_OF_REPORT: &[&str] = &["headerData", "filerInfo", "periodOfReport"];
const FILE_NUMBER: &[&str] = &["formData", "coverPage", "form13FFileNumber"];
const MANAGER: &[&str] = &["formData", "coverPage", "filingManager"];
const SIGNATURE_DATE: &[&str] = &["formData", "signatureBlock", "signatureDate"];

/// Flatten a submission envelope into a [`SubmissionRecord`].
///
/// CIK, manager name and file number are required. Address lines and both dates are optional;
/// a date that is present must parse.
pub fn normalize_submission(doc: &Element) -> Result<SubmissionRecord> {
    if doc.name != "edgarSubmission" {
        return Err(Error::MissingField("edgarSubmission".to_string()));
    }

    let manager = doc.find(MANAGER);
    let address = |field: &str| -> Option<String> {
        manager
            .and_then(|m| m.text_at(&["address", field]))
            .map(str::to_string)
    };

    Ok(SubmissionRecord {
        cik: required(doc, CIK)?.to_string(),
        name: manager
            .and_then(|m| m.text_at(&["name"]))
            .ok_or_else(|| Error::MissingField(MANAGER.join("/") + "/name"))?
            .to_string(),
        street1: address("street1"),
        street2: address("street2"),
        city: address("city"),
        state_or_country: address("stateOrCountry"),
        zip_code: address("zipCode"),
        file_number: required(doc, FILE_NUMBER)?.to_string(),
        period_of_report: date(doc, PERIOD_OF_REPORT, "periodOfReport")?,
        signature_date: date(doc, SIGNATURE_DATE, "signatureDate")?,
    })
}

fn required<'a>(doc: &'a Element, path: &[&str]) -> Result<&'a str> {
    doc.text_at(path)
        .ok_or_else(|| Error::MissingField(path.join("/")))
}

fn date(doc: &Element, path: &[&str], field: &'static str) -> Result<Option<NaiveDate>> {
    doc.text_at(path)
        .map(|value| {
            NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| Error::InvalidDate {
                field,
                value: value.to_string(),
            })
        })
        .transpose()
}

// Holdings
// -------------------------------------------------------------------------------------------------

/// One row of an information table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HoldingRecord {
    /// Position of the row within its table, from 0.
    pub portfolio_id: i32,
    #[serde(rename = "nameofissuer")]
    pub name_of_issuer: String,
    #[serde(rename = "titleofclass")]
    pub title_of_class: String,
    pub cusip: String,
    /// Market value as reported (thousands of dollars before 2023, dollars after).
    pub value: i64,
    #[serde(rename = "sshprnamt")]
    pub ssh_prn_amt: i64,
    /// `SH` (shares) or `PRN` (principal amount).
    #[serde(rename = "sshprnamttype")]
    pub ssh_prn_amt_type: String,
    #[serde(rename = "investmentdiscretion")]
    pub investment_discretion: String,
    pub sole: i64,
    pub shared: i64,
    /// Voting authority "None"; renamed so the column is not a SQL keyword.
    pub nonne: i64,
    #[serde(rename = "putcall")]
    pub put_call: Option<String>,
    #[serde(rename = "othermanager")]
    pub other_manager: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filing_id: Option<i32>,
}

/// A normalized information table. The column header is present even with no rows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HoldingsTable {
    pub columns: Vec<&'static str>,
    pub rows: Vec<HoldingRecord>,
}

impl HoldingsTable {
    fn new(rows: Vec<HoldingRecord>, filing_id: Option<i32>) -> Self {
        let mut columns = HOLDING_COLUMNS.to_vec();
        if filing_id.is_some() {
            columns.push("filing_id");
        }
        Self { columns, rows }
    }

    /// Tag every row with the `filing_id` it is persisted under.
    pub fn with_filing_id(self, filing_id: i32) -> Self {
        let rows = self
            .rows
            .into_iter()
            .map(|row| HoldingRecord {
                filing_id: Some(filing_id),
                ..row
            })
            .collect();
        Self::new(rows, Some(filing_id))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// informationTable
//  └── infoTable                 one or many
//      ├── nameOfIssuer
//      ├── titleOfClass
//      ├── cusip
//      ├── value                 may be written as a decimal, e.g. "1500.00"
//      ├── shrsOrPrnAmt/{sshPrnamt, sshPrnamtType}
//      ├── putCall               optional
//      ├── investmentDiscretion
//      ├── otherManager          optional
//      └── votingAuthority/{Sole, Shared, None}

/// Normalize an information table into a [`HoldingsTable`].
///
/// Entries without any child element (the empty placeholder) are dropped. The first bad entry,
/// a missing required field or a number that does not parse, fails the whole table: a filing is
/// either stored completely or not at all.
pub fn normalize_holdings(doc: &Element, filing_id: Option<i32>) -> Result<HoldingsTable> {
    if doc.name != "informationTable" {
        return Err(Error::MissingField("informationTable".to_string()));
    }

    let rows = doc
        .children_named("infoTable")
        .filter(|entry| !entry.children.is_empty())
        .enumerate()
        .map(|(row, entry)| holding(row, entry, filing_id))
        .collect::<Result<Vec<_>>>()?;

    Ok(HoldingsTable::new(rows, filing_id))
}

fn holding(row: usize, entry: &Element, filing_id: Option<i32>) -> Result<HoldingRecord> {
    let text = |path: &[&str]| -> Result<&str> {
        entry
            .text_at(path)
            .ok_or_else(|| Error::MissingField(format!("row {row}: {}", path.join("/"))))
    };
    let number = |path: &[&str], field: &'static str| -> Result<i64> {
        let value = text(path)?;
        parse_integer(value).ok_or_else(|| Error::InvalidNumber {
            row,
            field,
            value: value.to_string(),
        })
    };
    let optional = |name: &str| entry.text_at(&[name]).map(str::to_string);

    Ok(HoldingRecord {
        portfolio_id: i32::try_from(row).map_err(|_| Error::InvalidNumber {
            row,
            field: "portfolio_id",
            value: row.to_string(),
        })?,
        name_of_issuer: clean(text(&["nameOfIssuer"])?),
        title_of_class: clean(text(&["titleOfClass"])?),
        cusip: clean(text(&["cusip"])?),
        value: number(&["value"], "value")?,
        ssh_prn_amt: number(&["shrsOrPrnAmt", "sshPrnamt"], "sshprnamt")?,
        ssh_prn_amt_type: clean(text(&["shrsOrPrnAmt", "sshPrnamtType"])?),
        investment_discretion: clean(text(&["investmentDiscretion"])?),
        sole: number(&["votingAuthority", "Sole"], "sole")?,
        shared: number(&["votingAuthority", "Shared"], "shared")?,
        nonne: number(&["votingAuthority", "None"], "nonne")?,
        put_call: optional("putCall").map(|v| clean(&v)),
        other_manager: optional("otherManager"),
        filing_id,
    })
}

/// Parse as a float, then truncate; filers write integers like `"1500.00"`.
fn parse_integer(value: &str) -> Option<i64> {
    let value = value.trim().parse::<f64>().ok()?;
    if !value.is_finite() || value.abs() >= i64::MAX as f64 {
        return None;
    }
    Some(value.trunc() as i64)
}

fn clean(value: &str) -> String {
    value.trim().to_uppercase()
}

//////////////////////////////////////////////////////////////
// -- TESTS --
//////////////////////////////////////////////////////////////

#[cfg(test)]
const SUBMISSION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<edgarSubmission xmlns="http://www.sec.gov/edgar/thirteenffiler" xmlns:com="http://www.sec.gov/edgar/common">
  <headerData>
    <submissionType>13F-HR</submissionType>
    <filerInfo>
      <liveTestFlag>LIVE</liveTestFlag>
      <filer>
        <credentials>
          <cik>0001234567</cik>
          <ccc>XXXXXXXX</ccc>
        </credentials>
      </filer>
      <periodOfReport>03-31-2021</periodOfReport>
    </filerInfo>
  </headerData>
  <formData>
    <coverPage>
      <reportCalendarOrQuarter>03-31-2021</reportCalendarOrQuarter>
      <filingManager>
        <name>ACME CORP</name>
        <address>
          <com:street1>1 MAIN STREET</com:street1>
          <com:city>SPRINGFIELD</com:city>
          <com:stateOrCountry>IL</com:stateOrCountry>
          <com:zipCode>62701</com:zipCode>
        </address>
      </filingManager>
      <form13FFileNumber>028-12345</form13FFileNumber>
    </coverPage>
    <signatureBlock>
      <name>JANE DOE</name>
      <signatureDate>05-10-2021</signatureDate>
    </signatureBlock>
  </formData>
</edgarSubmission>"#;

#[cfg(test)]
const INFO_TABLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ns1:informationTable xmlns:ns1="http://www.sec.gov/edgar/document/thirteenf/informationtable">
  <ns1:infoTable>
    <ns1:nameOfIssuer> Apple Inc </ns1:nameOfIssuer>
    <ns1:titleOfClass>com</ns1:titleOfClass>
    <ns1:cusip>037833100</ns1:cusip>
    <ns1:value>1500.00</ns1:value>
    <ns1:shrsOrPrnAmt>
      <ns1:sshPrnamt>12000</ns1:sshPrnamt>
      <ns1:sshPrnamtType>sh</ns1:sshPrnamtType>
    </ns1:shrsOrPrnAmt>
    <ns1:investmentDiscretion>SOLE</ns1:investmentDiscretion>
    <ns1:votingAuthority>
      <ns1:Sole>12000</ns1:Sole>
      <ns1:Shared>0</ns1:Shared>
      <ns1:None>0</ns1:None>
    </ns1:votingAuthority>
  </ns1:infoTable>
  <ns1:infoTable>
    <ns1:nameOfIssuer>Tesla Inc</ns1:nameOfIssuer>
    <ns1:titleOfClass>COM</ns1:titleOfClass>
    <ns1:cusip>88160r101</ns1:cusip>
    <ns1:value>250</ns1:value>
    <ns1:shrsOrPrnAmt>
      <ns1:sshPrnamt>400</ns1:sshPrnamt>
      <ns1:sshPrnamtType>SH</ns1:sshPrnamtType>
    </ns1:shrsOrPrnAmt>
    <ns1:putCall>put</ns1:putCall>
    <ns1:investmentDiscretion>DFND</ns1:investmentDiscretion>
    <ns1:otherManager>1</ns1:otherManager>
    <ns1:votingAuthority>
      <ns1:Sole>0</ns1:Sole>
      <ns1:Shared>400</ns1:Shared>
      <ns1:None>0</ns1:None>
    </ns1:votingAuthority>
  </ns1:infoTable>
</ns1:informationTable>"#;

#[cfg(test)]
fn filing_text(blocks: &[&str]) -> String {
    let mut text = String::from("<SEC-DOCUMENT>0001234567-21-000001.txt\n");
    for block in blocks {
        text.push_str("<DOCUMENT>\n<TEXT>\n<XML>\n");
        text.push_str(block);
        text.push_str("\n</XML>\n</TEXT>\n</DOCUMENT>\n");
    }
    text.push_str("</SEC-DOCUMENT>\n");
    text
}

#[test]
fn submission_fields() {
    let (submission, _) = parse_blocks(&filing_text(&[SUBMISSION, INFO_TABLE]))
        .unwrap()
        .unwrap();
    let record = normalize_submission(&submission).unwrap();

    assert_eq!(record.cik, "0001234567");
    assert_eq!(record.name, "ACME CORP");
    assert_eq!(record.street1.as_deref(), Some("1 MAIN STREET"));
    assert_eq!(record.street2, None);
    assert_eq!(record.city.as_deref(), Some("SPRINGFIELD"));
    assert_eq!(record.state_or_country.as_deref(), Some("IL"));
    assert_eq!(record.zip_code.as_deref(), Some("62701"));
    assert_eq!(record.file_number, "028-12345");
    assert_eq!(record.period_of_report, NaiveDate::from_ymd_opt(2021, 3, 31));
    assert_eq!(record.signature_date, NaiveDate::from_ymd_opt(2021, 5, 10));
}

#[test]
fn missing_dates_are_none_but_bad_dates_fail() {
    let without = SUBMISSION
        .replace("<periodOfReport>03-31-2021</periodOfReport>", "")
        .replace("<signatureDate>05-10-2021</signatureDate>", "");
    let record = normalize_submission(&Element::parse(&without).unwrap()).unwrap();
    assert_eq!(record.period_of_report, None);
    assert_eq!(record.signature_date, None);

    let bad = SUBMISSION.replace("05-10-2021</signatureDate>", "2021-05-10</signatureDate>");
    assert!(matches!(
        normalize_submission(&Element::parse(&bad).unwrap()),
        Err(Error::InvalidDate { field: "signatureDate", .. })
    ));
}

#[test]
fn missing_cik_fails() {
    let without = SUBMISSION.replace("<cik>0001234567</cik>", "");
    assert!(matches!(
        normalize_submission(&Element::parse(&without).unwrap()),
        Err(Error::MissingField(_))
    ));
}

#[test]
fn holdings_rows() {
    let (_, table) = parse_blocks(&filing_text(&[SUBMISSION, INFO_TABLE]))
        .unwrap()
        .unwrap();
    let holdings = normalize_holdings(&table, None).unwrap();

    assert_eq!(holdings.columns, HOLDING_COLUMNS.to_vec());
    assert_eq!(holdings.len(), 2);

    let apple = &holdings.rows[0];
    assert_eq!(apple.portfolio_id, 0);
    assert_eq!(apple.name_of_issuer, "APPLE INC");
    assert_eq!(apple.title_of_class, "COM");
    assert_eq!(apple.value, 1500);
    assert_eq!(apple.ssh_prn_amt_type, "SH");
    assert_eq!(apple.sole, 12000);
    assert_eq!(apple.put_call, None);
    assert_eq!(apple.other_manager, None);
    assert_eq!(apple.filing_id, None);

    let tesla = &holdings.rows[1];
    assert_eq!(tesla.portfolio_id, 1);
    assert_eq!(tesla.cusip, "88160R101");
    assert_eq!(tesla.put_call.as_deref(), Some("PUT"));
    assert_eq!(tesla.other_manager.as_deref(), Some("1"));
    assert_eq!(tesla.shared, 400);
}

#[test]
fn single_entry_table() {
    let end = INFO_TABLE.find("</ns1:infoTable>").unwrap() + "</ns1:infoTable>".len();
    let single = format!("{}\n</ns1:informationTable>", &INFO_TABLE[..end]);
    let holdings = normalize_holdings(&Element::parse(&single).unwrap(), Some(7)).unwrap();

    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings.rows[0].filing_id, Some(7));
    assert_eq!(holdings.columns.last(), Some(&"filing_id"));
}

#[test]
fn filing_without_holdings() {
    let (_, table) = parse_blocks(&filing_text(&[SUBMISSION])).unwrap().unwrap();
    let holdings = normalize_holdings(&table, None).unwrap();

    assert!(holdings.is_empty());
    assert_eq!(holdings.columns, HOLDING_COLUMNS.to_vec());
}

#[test]
fn filing_without_blocks() {
    assert!(parse_blocks("<SEC-DOCUMENT></SEC-DOCUMENT>").unwrap().is_none());
    assert!(parse_blocks(&filing_text(&["<edgarSubmission><a></edgarSubmission>"])).is_err());
}

#[test]
fn bad_number_fails_the_table() {
    let bad = INFO_TABLE.replace("<ns1:value>250</ns1:value>", "<ns1:value>n/a</ns1:value>");
    match normalize_holdings(&Element::parse(&bad).unwrap(), None) {
        Err(Error::InvalidNumber { row, field, .. }) => {
            assert_eq!(row, 1);
            assert_eq!(field, "value");
        }
        other => panic!("expected an invalid number error, got {other:?}"),
    }
}

#[test]
fn decimal_integers_truncate() {
    assert_eq!(parse_integer("1500.00"), Some(1500));
    assert_eq!(parse_integer(" 42 "), Some(42));
    assert_eq!(parse_integer("7.9"), Some(7));
    assert_eq!(parse_integer("1,500"), None);
    assert_eq!(parse_integer("NaN"), None);
}

#[test]
fn inspection_json_keeps_row_order() {
    let holdings = normalize_holdings(&Element::parse(INFO_TABLE).unwrap(), None).unwrap();
    let json = serde_json::to_value(&holdings).unwrap();

    let rows = json["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row["portfolio_id"], i as i64);
        assert!(row.get("filing_id").is_none());
        for column in HOLDING_COLUMNS {
            assert!(row.get(column).is_some(), "missing column {column}");
        }
    }
}

#[test]
fn read_filing_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("0001234567-21-000001.nc");
    std::fs::write(&path, filing_text(&[SUBMISSION, INFO_TABLE])).unwrap();

    let filing = read_filing(&path).unwrap();
    assert_eq!(filing.accession_number, "0001234567-21-000001");
    assert_eq!(filing.submission.name, "edgarSubmission");
    assert_eq!(filing.information_table.name, "informationTable");

    let empty = dir.path().join("0001234567-21-000002.nc");
    std::fs::write(&empty, "no xml here").unwrap();
    assert!(matches!(read_filing(&empty), Err(Error::MissingSubmission(_))));
}
