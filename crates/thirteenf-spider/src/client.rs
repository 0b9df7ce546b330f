use crate::http::*;
use crate::{Config, Error, Result};
use reqwest::{Response, StatusCode};
use std::future::Future;
use std::time::Duration;
use tracing::{trace, warn};

/// First pause between attempts; doubled on every further attempt.
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Build the HTTP client used for every SEC request.
///
/// EDGAR rejects anonymous traffic, so the `User-Agent` must name the operator and a contact
/// email, e.g. `"Sample Company admin@sample.com"`.
pub fn build_client(config: &Config) -> Result<HttpClient> {
    let user_agent = config.user_agent()?;
    let client = reqwest::ClientBuilder::new()
        .user_agent(user_agent)
        .build()?;
    Ok(client)
}

/// `429 Too Many Requests` and every `5xx` are worth another go.
pub(crate) fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Run an idempotent operation, retrying transient failures up to `retries` more times with
/// exponential backoff.
pub async fn with_retry<T, F, Fut>(retries: u32, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < retries && err.is_transient() => {
                let delay = BACKOFF_BASE * 2u32.pow(attempt.min(6));
                attempt += 1;
                warn!("{what} failed, retrying in {delay:?} ({attempt}/{retries}), error({err})");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// GET `url`, turning any non-success status into [`Error::Status`].
pub async fn get(http_client: &HttpClient, url: &str) -> Result<Response> {
    trace!("GET {url}");
    let response = http_client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Status {
            url: url.to_string(),
            status,
        });
    }
    Ok(response)
}

/// GET `url` and read the whole body as text, with retries.
pub async fn get_text(http_client: &HttpClient, url: &str, retries: u32) -> Result<String> {
    with_retry(retries, url, || async move {
        let text = get(http_client, url).await?.text().await?;
        Ok(text)
    })
    .await
}

//////////////////////////////////////////////////////////////
// -- TESTS --
//////////////////////////////////////////////////////////////

#[tokio::test]
async fn retry_gives_up_on_permanent_errors() {
    let mut calls = 0;
    let res: Result<()> = with_retry(3, "permanent", || {
        calls += 1;
        async { Err(Error::MissingField("cik".to_string())) }
    })
    .await;
    assert!(res.is_err());
    assert_eq!(calls, 1);
}

#[tokio::test]
async fn retry_repeats_transient_errors() {
    let mut calls = 0;
    let res: Result<u32> = with_retry(2, "transient", || {
        calls += 1;
        let attempt = calls;
        async move {
            if attempt < 3 {
                Err(Error::Status {
                    url: "http://localhost/".to_string(),
                    status: StatusCode::SERVICE_UNAVAILABLE,
                })
            } else {
                Ok(attempt)
            }
        }
    })
    .await;
    assert_eq!(res.unwrap(), 3);
}

#[test]
fn only_throttling_and_server_errors_retry() {
    assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
    assert!(is_retryable(StatusCode::BAD_GATEWAY));
    assert!(!is_retryable(StatusCode::NOT_FOUND));
    assert!(!is_retryable(StatusCode::FORBIDDEN));
}
