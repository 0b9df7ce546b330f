use deadpool_postgres::{ManagerConfig, Pool, RecyclingMethod};
use dotenv::var;
use std::path::Path;
use thirteenf_spider::sec::ingest::{ingest_filing, ingest_quarter, Outcome};
use thirteenf_spider::sec::store;
use thirteenf_spider::Config;
use tokio_postgres::{self as pg, NoTls};

// Filers used only by these tests, so reruns against the same database start clean.
const CIK: &str = "0009990001";
const ACCESSION: &str = "0009990001-21-000001";
const BROKEN_CIK: &str = "0009990002";
const BROKEN_ACCESSION: &str = "0009990002-21-000001";
const EMPTY_CIK: &str = "0009990003";
const EMPTY_ACCESSION: &str = "0009990003-21-000001";
const CHECKED_CIK: &str = "0009990004";
const CHECKED_ACCESSION: &str = "0009990004-21-000001";
const RESHAPED_CIK: &str = "0009990005";
const RESHAPED_ACCESSION: &str = "0009990005-21-000001";
const LATER_CIK: &str = "0009990006";
const LATER_ACCESSION: &str = "0009990006-21-000001";

const TEST_CIKS: [&str; 6] = [CIK, BROKEN_CIK, EMPTY_CIK, CHECKED_CIK, RESHAPED_CIK, LATER_CIK];

fn filing(cik: &str, info_table: &str) -> String {
    format!(
        "<SEC-DOCUMENT>
<DOCUMENT>
<TYPE>13F-HR
<TEXT>
<XML>
<?xml version=\"1.0\" encoding=\"UTF-8\"?>
<edgarSubmission xmlns=\"http://www.sec.gov/edgar/thirteenffiler\">
  <headerData>
    <filerInfo>
      <filer><credentials><cik>{cik}</cik></credentials></filer>
      <periodOfReport>03-31-2021</periodOfReport>
    </filerInfo>
  </headerData>
  <formData>
    <coverPage>
      <filingManager>
        <name>TEST CAPITAL</name>
        <address><street1>1 TEST WAY</street1><city>TESTVILLE</city><zipCode>00000</zipCode></address>
      </filingManager>
      <form13FFileNumber>028-99999</form13FFileNumber>
    </coverPage>
  </formData>
</edgarSubmission>
</XML>
</TEXT>
</DOCUMENT>
<DOCUMENT>
<TYPE>INFORMATION TABLE
<TEXT>
<XML>
{info_table}
</XML>
</TEXT>
</DOCUMENT>
</SEC-DOCUMENT>
"
    )
}

fn info_table(values: &[&str]) -> String {
    let entries: String = values
        .iter()
        .map(|value| {
            format!(
                "<infoTable>
  <nameOfIssuer>ISSUER</nameOfIssuer><titleOfClass>COM</titleOfClass><cusip>000000000</cusip>
  <value>{value}</value>
  <shrsOrPrnAmt><sshPrnamt>10</sshPrnamt><sshPrnamtType>SH</sshPrnamtType></shrsOrPrnAmt>
  <investmentDiscretion>SOLE</investmentDiscretion>
  <votingAuthority><Sole>10</Sole><Shared>0</Shared><None>0</None></votingAuthority>
</infoTable>"
            )
        })
        .collect();
    format!("<informationTable>{entries}</informationTable>")
}

async fn connect() -> Option<pg::Client> {
    let Ok(url) = var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };
    let (pg_client, pg_conn) = pg::connect(&url, NoTls).await.unwrap();
    tokio::spawn(async move {
        if let Err(err) = pg_conn.await {
            panic!("postgres connection error: {}", err)
        }
    });
    Some(pg_client)
}

fn pool() -> Pool {
    let mut pg_config = deadpool_postgres::Config::new();
    pg_config.url = var("DATABASE_URL").ok();
    pg_config.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    pg_config
        .create_pool(Some(deadpool_postgres::Runtime::Tokio1), NoTls)
        .unwrap()
}

async fn forget(pg_client: &pg::Client, cik: &str) {
    pg_client
        .batch_execute(&format!("DROP TABLE IF EXISTS c{cik}"))
        .await
        .unwrap();
    pg_client
        .execute(
            "DELETE FROM filing WHERE company_id IN (SELECT company_id FROM company WHERE cik = $1)",
            &[&cik],
        )
        .await
        .unwrap();
    pg_client
        .execute("DELETE FROM company WHERE cik = $1", &[&cik])
        .await
        .unwrap();
}

async fn count(pg_client: &pg::Client, query: &str, param: &str) -> i64 {
    pg_client.query_one(query, &[&param]).await.unwrap().get(0)
}

fn write(dir: &Path, accession: &str, text: &str) -> std::path::PathBuf {
    let path = dir.join(format!("{accession}.nc"));
    std::fs::write(&path, text).unwrap();
    path
}

// One test, so the shared tables are never created concurrently.
#[tokio::test]
async fn ingestion_is_idempotent_and_all_or_nothing() {
    let Some(mut pg_client) = connect().await else {
        return;
    };
    store::init_schema(&pg_client).await.unwrap();
    for cik in TEST_CIKS {
        forget(&pg_client, cik).await;
    }

    let storage = tempfile::tempdir().unwrap();
    let config = Config {
        storage_path: storage.path().to_path_buf(),
        ..Config::default()
    };
    let dir = config.quarter_dir(2021, 2);
    std::fs::create_dir_all(&dir).unwrap();

    // -- INGEST TWICE --
    let path = write(&dir, ACCESSION, &filing(CIK, &info_table(&["100", "1500.00", "7"])));

    let first = ingest_filing(&mut pg_client, &path).await.unwrap();
    let Outcome::Inserted { filing_id, rows } = first else {
        panic!("expected a first insert, got {first:?}");
    };
    assert_eq!(rows, 3);

    let second = ingest_filing(&mut pg_client, &path).await.unwrap();
    assert_eq!(second, Outcome::AlreadyIngested { filing_id });

    assert_eq!(
        count(&pg_client, "SELECT COUNT(*) FROM company WHERE cik = $1", CIK).await,
        1
    );
    assert_eq!(
        count(&pg_client, "SELECT COUNT(*) FROM filing WHERE accnumber = $1", ACCESSION).await,
        1
    );
    let holdings: i64 = pg_client
        .query_one(
            format!("SELECT COUNT(*) FROM c{CIK} WHERE filing_id = $1").as_str(),
            &[&filing_id],
        )
        .await
        .unwrap()
        .get(0);
    assert_eq!(holdings, 3);
    let value: i64 = pg_client
        .query_one(
            format!("SELECT value FROM c{CIK} WHERE filing_id = $1 AND portfolio_id = 1").as_str(),
            &[&filing_id],
        )
        .await
        .unwrap()
        .get(0);
    assert_eq!(value, 1500);

    // -- A BROKEN FILING LEAVES NOTHING BEHIND --
    let broken = write(
        &dir,
        BROKEN_ACCESSION,
        &filing(BROKEN_CIK, &info_table(&["100", "lots"])),
    );
    assert!(ingest_filing(&mut pg_client, &broken).await.is_err());
    assert_eq!(
        count(&pg_client, "SELECT COUNT(*) FROM company WHERE cik = $1", BROKEN_CIK).await,
        0
    );
    assert!(!store::portfolio_table_exists(&pg_client, BROKEN_CIK).await.unwrap());

    // -- THE BATCH CARRIES ON PAST FAILURES --
    let summary = ingest_quarter(&pool(), &config, 2021, 2, None, false)
        .await
        .unwrap();
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, broken);
    std::fs::remove_file(&broken).unwrap();

    // -- AN EMPTIED PORTFOLIO IS FILLED AGAIN --
    pg_client
        .batch_execute(&format!("DELETE FROM c{CIK}"))
        .await
        .unwrap();
    let refill = ingest_filing(&mut pg_client, &path).await.unwrap();
    assert_eq!(refill, Outcome::Inserted { filing_id, rows: 3 });
    assert_eq!(
        count(&pg_client, "SELECT COUNT(*) FROM company WHERE cik = $1", CIK).await,
        1
    );
    assert_eq!(
        count(&pg_client, "SELECT COUNT(*) FROM filing WHERE accnumber = $1", ACCESSION).await,
        1
    );

    // -- A FILING WITHOUT HOLDINGS IS STORED ONCE --
    let empty = write(&dir, EMPTY_ACCESSION, &filing(EMPTY_CIK, &info_table(&[])));
    let first = ingest_filing(&mut pg_client, &empty).await.unwrap();
    let Outcome::Inserted { filing_id, rows: 0 } = first else {
        panic!("expected an empty first insert, got {first:?}");
    };
    let second = ingest_filing(&mut pg_client, &empty).await.unwrap();
    assert_eq!(second, Outcome::AlreadyIngested { filing_id });

    failed_copies_are_rolled_back(&mut pg_client).await;

    for cik in TEST_CIKS {
        forget(&pg_client, cik).await;
    }
}

// A COPY the table refuses stores no holdings, and the batch carries on with the next filing,
// even when the failure took the connection down.
async fn failed_copies_are_rolled_back(pg_client: &mut pg::Client) {
    let storage = tempfile::tempdir().unwrap();
    let config = Config {
        storage_path: storage.path().to_path_buf(),
        ..Config::default()
    };
    let dir = config.quarter_dir(2021, 3);
    std::fs::create_dir_all(&dir).unwrap();

    // every row breaks the table's constraint
    store::create_portfolio_table(&*pg_client, CHECKED_CIK)
        .await
        .unwrap();
    pg_client
        .batch_execute(&format!(
            "ALTER TABLE c{CHECKED_CIK} ADD CONSTRAINT small_value CHECK (value < 1000)"
        ))
        .await
        .unwrap();
    let checked = write(
        &dir,
        CHECKED_ACCESSION,
        &filing(CHECKED_CIK, &info_table(&["100", "1500"])),
    );

    // a table laid out differently from a portfolio
    pg_client
        .batch_execute(&format!(
            "CREATE TABLE c{RESHAPED_CIK} (portfolio_id INTEGER, filing_id INTEGER)"
        ))
        .await
        .unwrap();
    let reshaped = write(
        &dir,
        RESHAPED_ACCESSION,
        &filing(RESHAPED_CIK, &info_table(&["100"])),
    );

    write(&dir, LATER_ACCESSION, &filing(LATER_CIK, &info_table(&["1", "2"])));

    let summary = ingest_quarter(&pool(), &config, 2021, 3, None, false)
        .await
        .unwrap();

    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.failed.len(), 2);
    assert_eq!(summary.failed[0].0, checked);
    assert!(
        summary.failed[0].1.contains("small_value"),
        "reason without the constraint: {}",
        summary.failed[0].1
    );
    assert_eq!(summary.failed[1].0, reshaped);

    // metadata stays committed, the holdings were rolled back
    assert_eq!(
        count(pg_client, "SELECT COUNT(*) FROM filing WHERE accnumber = $1", CHECKED_ACCESSION).await,
        1
    );
    let checked_rows: i64 = pg_client
        .query_one(format!("SELECT COUNT(*) FROM c{CHECKED_CIK}").as_str(), &[])
        .await
        .unwrap()
        .get(0);
    assert_eq!(checked_rows, 0);

    let later_rows: i64 = pg_client
        .query_one(format!("SELECT COUNT(*) FROM c{LATER_CIK}").as_str(), &[])
        .await
        .unwrap()
        .get(0);
    assert_eq!(later_rows, 2);
}
