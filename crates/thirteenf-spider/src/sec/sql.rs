//////////////////////////////////////////////////////////////////
// company
//////////////////////////////////////////////////////////////////

/// `company` is the master table of 13F filers, one row per CIK.
pub(crate) static CREATE_COMPANY_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS company (
        company_id      SERIAL PRIMARY KEY,
        cik             VARCHAR NOT NULL UNIQUE,
        name            VARCHAR NOT NULL,
        street1         VARCHAR,
        street2         VARCHAR,
        city            VARCHAR,
        stateorcountry  VARCHAR,
        zipcode         VARCHAR
    )
";

pub(crate) static GET_COMPANY_ID: &str = "
    SELECT company_id
    FROM company
    WHERE cik = $1
";

pub(crate) static INSERT_COMPANY: &str = "
    INSERT INTO company (cik, name, street1, street2, city, stateorcountry, zipcode)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT (cik) DO NOTHING
";

//////////////////////////////////////////////////////////////////
// filing
//////////////////////////////////////////////////////////////////

/// `filing` holds one row per accepted 13F submission.
pub(crate) static CREATE_FILING_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS filing (
        filing_id       SERIAL PRIMARY KEY,
        company_id      INTEGER NOT NULL REFERENCES company (company_id),
        filenumber      VARCHAR NOT NULL,
        accnumber       VARCHAR NOT NULL UNIQUE,
        periodofreport  DATE,
        signaturedate   DATE
    )
";

pub(crate) static GET_FILING_ID: &str = "
    SELECT filing_id
    FROM filing
    WHERE accnumber = $1
";

pub(crate) static INSERT_FILING: &str = "
    INSERT INTO filing (company_id, filenumber, accnumber, periodofreport, signaturedate)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (accnumber) DO NOTHING
";

//////////////////////////////////////////////////////////////////
// portfolios, one `c<cik>` table per company
//////////////////////////////////////////////////////////////////

pub(crate) static PORTFOLIO_EXISTS: &str = "
    SELECT EXISTS (
        SELECT 1
        FROM information_schema.tables
        WHERE table_schema = current_schema()
        AND table_name = $1
    )
";

/// `{table}` is replaced by a validated `c<cik>` identifier.
pub(crate) static CREATE_PORTFOLIO_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS {table} (
        portfolio_id          INTEGER NOT NULL,
        nameofissuer          VARCHAR NOT NULL,
        titleofclass          VARCHAR NOT NULL,
        cusip                 VARCHAR NOT NULL,
        value                 BIGINT NOT NULL,
        sshprnamt             BIGINT NOT NULL,
        sshprnamttype         VARCHAR NOT NULL,
        investmentdiscretion  VARCHAR NOT NULL,
        sole                  BIGINT NOT NULL,
        shared                BIGINT NOT NULL,
        nonne                 BIGINT NOT NULL,
        putcall               VARCHAR,
        othermanager          VARCHAR,
        filing_id             INTEGER NOT NULL REFERENCES filing (filing_id),
        PRIMARY KEY (portfolio_id, filing_id)
    )
";

pub(crate) static HOLDINGS_EXIST: &str = "
    SELECT EXISTS (
        SELECT 1
        FROM {table}
        WHERE filing_id = $1
    )
";

pub(crate) static COPY_PORTFOLIO: &str = "
    COPY {table} (
        portfolio_id, nameofissuer, titleofclass, cusip, value, sshprnamt, sshprnamttype,
        investmentdiscretion, sole, shared, nonne, putcall, othermanager, filing_id
    )
    FROM STDIN (FORMAT binary)
";

/// Fill in the `{table}` placeholder of a portfolio statement.
pub(crate) fn for_table(statement: &str, table: &str) -> String {
    statement.replace("{table}", table)
}
