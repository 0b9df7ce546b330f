use crate::{Error, Result};
use dotenv::var;
use std::path::PathBuf;

/// The primary 13F filing and its amendment.
pub const DEFAULT_FORM_TYPES: [&str; 2] = ["13F-HR", "13F-HR/A"];

pub const DEFAULT_ARCHIVES_URL: &str = "https://www.sec.gov/Archives/edgar";
pub const DEFAULT_STORAGE_PATH: &str = "./buffer";
pub const DEFAULT_MAX_TASKS: usize = 5;
pub const DEFAULT_HTTP_RETRIES: u32 = 3;

/// Runtime settings, resolved once from the environment (and `.env`) and handed to every
/// component explicitly.
///
/// | variable           | default                              |
/// |--------------------|--------------------------------------|
/// | `DATABASE_URL`     | required by database commands        |
/// | `USER_AGENT`       | required by HTTP commands            |
/// | `CONTACT_EMAIL`    | required by HTTP commands            |
/// | `STORAGE_PATH`     | `./buffer`                           |
/// | `MAX_TASKS`        | `5`                                  |
/// | `HTTP_RETRIES`     | `3`                                  |
/// | `SEC_ARCHIVES_URL` | `https://www.sec.gov/Archives/edgar` |
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: Option<String>,
    pub user_agent: Option<String>,
    pub contact_email: Option<String>,
    pub storage_path: PathBuf,
    pub max_tasks: usize,
    pub http_retries: u32,
    pub archives_url: String,
    pub form_types: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            user_agent: None,
            contact_email: None,
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            max_tasks: DEFAULT_MAX_TASKS,
            http_retries: DEFAULT_HTTP_RETRIES,
            archives_url: DEFAULT_ARCHIVES_URL.to_string(),
            form_types: DEFAULT_FORM_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Config {
    /// Read the configuration from environment variables, falling back to the defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let max_tasks = parse_var("MAX_TASKS")?.unwrap_or(defaults.max_tasks);
        if max_tasks == 0 {
            return Err(Error::Config("MAX_TASKS must be at least 1".to_string()));
        }

        Ok(Self {
            database_url: var("DATABASE_URL").ok(),
            user_agent: var("USER_AGENT").ok(),
            contact_email: var("CONTACT_EMAIL").ok(),
            storage_path: var("STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_path),
            max_tasks,
            http_retries: parse_var("HTTP_RETRIES")?.unwrap_or(defaults.http_retries),
            archives_url: var("SEC_ARCHIVES_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.archives_url),
            form_types: defaults.form_types,
        })
    }

    pub fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| Error::Config("DATABASE_URL is not set".to_string()))
    }

    /// The `User-Agent` header value: the agent name followed by the operator's email.
    pub fn user_agent(&self) -> Result<String> {
        match (&self.user_agent, &self.contact_email) {
            (Some(agent), Some(email)) => Ok(format!("{agent} {email}")),
            _ => Err(Error::Config(
                "USER_AGENT and CONTACT_EMAIL must both be set".to_string(),
            )),
        }
    }

    /// Local directory holding the feeds and filings of one quarter, e.g. `./buffer/2021/QTR2`.
    pub fn quarter_dir(&self, year: u16, quarter: u8) -> PathBuf {
        self.storage_path
            .join(year.to_string())
            .join(format!("QTR{quarter}"))
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("invalid {key}: {value:?}"))),
        Err(_) => Ok(None),
    }
}

//////////////////////////////////////////////////////////////
// -- TESTS --
//////////////////////////////////////////////////////////////

#[test]
fn quarter_dir_layout() {
    let config = Config {
        storage_path: PathBuf::from("/data"),
        ..Config::default()
    };
    assert_eq!(
        config.quarter_dir(2021, 2),
        PathBuf::from("/data/2021/QTR2")
    );
}

#[test]
fn user_agent_needs_contact() {
    let mut config = Config {
        user_agent: Some("Sample Company".to_string()),
        ..Config::default()
    };
    assert!(config.user_agent().is_err());

    config.contact_email = Some("admin@sample.com".to_string());
    assert_eq!(config.user_agent().unwrap(), "Sample Company admin@sample.com");
}
