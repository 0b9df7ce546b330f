use super::filing::{HoldingsTable, SubmissionRecord};
use super::sql;
use crate::http::*;
use crate::{Error, Result};
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{GenericClient, Transaction};
use tracing::{debug, error, trace};

/// Column types of a portfolio table, in COPY order.
const PORTFOLIO_TYPES: [Type; 14] = [
    Type::INT4,
    Type::VARCHAR,
    Type::VARCHAR,
    Type::VARCHAR,
    Type::INT8,
    Type::INT8,
    Type::VARCHAR,
    Type::VARCHAR,
    Type::INT8,
    Type::INT8,
    Type::INT8,
    Type::VARCHAR,
    Type::VARCHAR,
    Type::INT4,
];

/// Create the `company` and `filing` tables if they are missing.
pub async fn init_schema<C: GenericClient + Sync>(pg_client: &C) -> Result<()> {
    pg_client
        .batch_execute(&format!(
            "{};\n{};",
            sql::CREATE_COMPANY_TABLE,
            sql::CREATE_FILING_TABLE
        ))
        .await
        .map_err(|err| {
            error!("failed to create the company & filing tables, error({err})");
            err
        })?;
    Ok(())
}

/// Name of the portfolio table of `cik`, e.g. `c0001234567`.
///
/// The CIK ends up in SQL as an identifier, so anything but ASCII digits is refused.
pub fn portfolio_table(cik: &str) -> Result<String> {
    if cik.is_empty() || !cik.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidCik(cik.to_string()));
    }
    Ok(format!("c{cik}"))
}

// company
// -------------------------------------------------------------------------------------------------

pub async fn company_exists<C: GenericClient + Sync>(pg_client: &C, cik: &str) -> Result<Option<i32>> {
    let row = pg_client.query_opt(sql::GET_COMPANY_ID, &[&cik]).await?;
    Ok(row.map(|row| row.get(0)))
}

/// Insert the filer of `record`; a CIK already present is left as it is.
pub async fn add_company<C: GenericClient + Sync>(pg_client: &C, record: &SubmissionRecord) -> Result<()> {
    let n = pg_client
        .execute(
            sql::INSERT_COMPANY,
            &[
                &record.cik,
                &record.name,
                &record.street1,
                &record.street2,
                &record.city,
                &record.state_or_country,
                &record.zip_code,
            ],
        )
        .await?;
    trace!("company {}: {n} rows inserted", record.cik);
    Ok(())
}

/// `company_id` of `cik`, which must exist.
pub async fn company_id<C: GenericClient + Sync>(pg_client: &C, cik: &str) -> Result<i32> {
    let row = pg_client.query_one(sql::GET_COMPANY_ID, &[&cik]).await?;
    Ok(row.get(0))
}

// filing
// -------------------------------------------------------------------------------------------------

pub async fn filing_exists<C: GenericClient + Sync>(
    pg_client: &C,
    accession_number: &str,
) -> Result<Option<i32>> {
    let row = pg_client
        .query_opt(sql::GET_FILING_ID, &[&accession_number])
        .await?;
    Ok(row.map(|row| row.get(0)))
}

/// Insert a filing of `company_id`; an accession number already present is left as it is.
pub async fn add_filing<C: GenericClient + Sync>(
    pg_client: &C,
    record: &SubmissionRecord,
    company_id: i32,
    accession_number: &str,
) -> Result<()> {
    let n = pg_client
        .execute(
            sql::INSERT_FILING,
            &[
                &company_id,
                &record.file_number,
                &accession_number,
                &record.period_of_report,
                &record.signature_date,
            ],
        )
        .await?;
    trace!("filing {accession_number}: {n} rows inserted");
    Ok(())
}

/// `filing_id` of `accession_number`, which must exist.
pub async fn filing_id<C: GenericClient + Sync>(pg_client: &C, accession_number: &str) -> Result<i32> {
    let row = pg_client
        .query_one(sql::GET_FILING_ID, &[&accession_number])
        .await?;
    Ok(row.get(0))
}

// portfolio
// -------------------------------------------------------------------------------------------------

pub async fn portfolio_table_exists<C: GenericClient + Sync>(pg_client: &C, cik: &str) -> Result<bool> {
    let table = portfolio_table(cik)?;
    let row = pg_client.query_one(sql::PORTFOLIO_EXISTS, &[&table]).await?;
    Ok(row.get(0))
}

pub async fn create_portfolio_table<C: GenericClient + Sync>(pg_client: &C, cik: &str) -> Result<()> {
    let table = portfolio_table(cik)?;
    debug!("creating portfolio table {table}");
    pg_client
        .batch_execute(&sql::for_table(sql::CREATE_PORTFOLIO_TABLE, &table))
        .await
        .map_err(|err| {
            error!("failed to create portfolio table {table}, error({err})");
            err
        })?;
    Ok(())
}

/// Whether any holdings of `filing_id` are already in the portfolio table of `cik`.
pub async fn holdings_exist<C: GenericClient + Sync>(
    pg_client: &C,
    cik: &str,
    filing_id: i32,
) -> Result<bool> {
    if !portfolio_table_exists(pg_client, cik).await? {
        return Ok(false);
    }

    let table = portfolio_table(cik)?;
    let statement = sql::for_table(sql::HOLDINGS_EXIST, &table);
    let row = pg_client.query_one(statement.as_str(), &[&filing_id]).await?;
    Ok(row.get(0))
}

/// Bulk insert `holdings` into the portfolio table of `cik` with a binary COPY.
///
/// Every row must carry its `filing_id` (see [`HoldingsTable::with_filing_id`]). The COPY runs in
/// its own transaction: on failure nothing is inserted, and the error is returned.
pub async fn add_portfolio_rows(
    pg_client: &mut PgClient,
    cik: &str,
    holdings: &HoldingsTable,
) -> Result<u64> {
    let table = portfolio_table(cik)?;
    if let Some(row) = holdings.rows.iter().find(|row| row.filing_id.is_none()) {
        return Err(Error::MissingField(format!(
            "filing_id of row {} for {table}",
            row.portfolio_id
        )));
    }

    let tx = pg_client.transaction().await?;
    match pg_copy(&tx, &table, holdings).await {
        Ok(n) => {
            tx.commit().await.map_err(|err| {
                error!("failed to commit holdings into {table}, error({err})");
                err
            })?;
            Ok(n)
        }
        Err(err) => {
            error!("failed to copy holdings into {table}, rolling back, error({err})");
            if let Err(rollback_err) = tx.rollback().await {
                error!("failed to roll back holdings of {table}, error({rollback_err})");
            }
            Err(err)
        }
    }
}

/// Execute the COPY statement.
///
/// A single bad row fails the whole statement, and with it the transaction.
async fn pg_copy(tx: &Transaction<'_>, table: &str, holdings: &HoldingsTable) -> Result<u64> {
    let statement = sql::for_table(sql::COPY_PORTFOLIO, table);
    let sink = tx.copy_in(statement.as_str()).await?;
    let writer = BinaryCopyInWriter::new(sink, &PORTFOLIO_TYPES);
    futures::pin_mut!(writer);

    for x in &holdings.rows {
        let row: [&(dyn ToSql + Sync); 14] = [
            &x.portfolio_id,
            &x.name_of_issuer,
            &x.title_of_class,
            &x.cusip,
            &x.value,
            &x.ssh_prn_amt,
            &x.ssh_prn_amt_type,
            &x.investment_discretion,
            &x.sole,
            &x.shared,
            &x.nonne,
            &x.put_call,
            &x.other_manager,
            &x.filing_id,
        ];
        writer.as_mut().write(&row).await?;
    }

    Ok(writer.finish().await?)
}

//////////////////////////////////////////////////////////////
// -- TESTS --
//////////////////////////////////////////////////////////////

#[test]
fn portfolio_table_names() {
    assert_eq!(portfolio_table("0001234567").unwrap(), "c0001234567");
    assert_eq!(portfolio_table("320193").unwrap(), "c320193");
}

#[test]
fn portfolio_table_refuses_non_digits() {
    for cik in ["", "12a4", "1; DROP TABLE company", " 123", "１２３"] {
        assert!(
            matches!(portfolio_table(cik), Err(Error::InvalidCik(_))),
            "{cik:?} accepted"
        );
    }
}

#[test]
fn portfolio_statements_use_the_table_name() {
    let statement = sql::for_table(sql::COPY_PORTFOLIO, "c42");
    assert!(statement.contains("COPY c42 ("));
    assert!(!statement.contains("{table}"));

    // one COPY type per canonical column, plus filing_id
    assert_eq!(
        PORTFOLIO_TYPES.len(),
        super::filing::HOLDING_COLUMNS.len() + 1
    );
}
