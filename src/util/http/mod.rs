use std::{
    borrow::Cow,
    collections::HashMap,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Result};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use reqwest::{header, Client, Method, RequestBuilder, Response};

use crate::logging::Logger;

pub mod element;
pub mod user_agent;

/// 每個請求的逾時時間
#[cfg(not(test))]
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
#[cfg(test)]
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Telegram puts the bot token into the path: `/bot{token}/sendMessage`.
static REG_BOT_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/bot[^/]+").expect("Failed to compile bot token regex"));

/// A singleton instance of the reqwest client.
static CLIENT: OnceCell<Client> = OnceCell::new();

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("http"));

/// Returns the reqwest client singleton instance or creates one if it doesn't exist.
///
/// The client carries the request timeout and a random desktop browser user
/// agent; callers may still override the `User-Agent` header per request.
fn get_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        // reqwest is built without a bundled crypto provider
        let _ = rustls::crypto::ring::default_provider().install_default();

        let builder = Client::builder();
        // each #[tokio::test] has its own runtime, pooled connections must not outlive it
        #[cfg(test)]
        let builder = builder.pool_max_idle_per_host(0);

        builder
            .brotli(true)
            .gzip(true)
            .connect_timeout(Duration::from_secs(5))
            .timeout(REQUEST_TIMEOUT)
            .tcp_nodelay(true)
            .pool_idle_timeout(Duration::from_secs(30))
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(user_agent::gen_random_ua())
            .build()
            .map_err(|e| anyhow!("Failed to create reqwest client: {:?}", e))
    })
}

/// Performs an HTTP GET request and returns the response as text.
///
/// A non-2xx status is reported as an error.
pub async fn get(url: &str, headers: Option<header::HeaderMap>) -> Result<String> {
    get_response(url, headers)
        .await?
        .error_for_status()
        .map_err(|e| {
            anyhow!(
                "Unexpected status from {}: {:?}",
                loggable_url(url),
                e.without_url()
            )
        })?
        .text()
        .await
        .map_err(|e| anyhow!("Error parsing response text: {:?}", e.without_url()))
}

pub async fn get_response(url: &str, headers: Option<header::HeaderMap>) -> Result<Response> {
    send(Method::GET, url, headers, None::<fn(_) -> _>).await
}

/// Performs an HTTP POST request with form data and returns the response as text.
///
/// The status is not checked here; APIs such as Telegram describe the failure
/// in the body.
pub async fn post(
    url: &str,
    headers: Option<header::HeaderMap>,
    params: Option<HashMap<&str, String>>,
) -> Result<String> {
    let body_fn: Option<fn(RequestBuilder) -> RequestBuilder> = None;
    let response = match params {
        Some(p) => {
            send(
                Method::POST,
                url,
                headers,
                Some(move |rb: RequestBuilder| rb.form(&p)),
            )
            .await?
        }
        None => send(Method::POST, url, headers, body_fn).await?,
    };

    response
        .text()
        .await
        .map_err(|why| anyhow!("Error parsing response text: {:?}", why.without_url()))
}

/// Builds a header map that replaces the client's default user agent.
pub fn user_agent_header(user_agent: &str) -> Option<header::HeaderMap> {
    let value = header::HeaderValue::from_str(user_agent).ok()?;
    let mut headers = header::HeaderMap::new();
    headers.insert(header::USER_AGENT, value);
    Some(headers)
}

/// Masks credentials carried in the path so the url can be logged.
pub fn loggable_url(url: &str) -> Cow<'_, str> {
    REG_BOT_TOKEN.replace_all(url, "/bot***")
}

/// Sends an HTTP request once. There is no retry: a failed quote is skipped
/// until the next scheduled run.
async fn send(
    method: Method,
    url: &str,
    headers: Option<header::HeaderMap>,
    body: Option<impl FnOnce(RequestBuilder) -> RequestBuilder>,
) -> Result<Response> {
    let visit_log = format!("{}:{}", method, loggable_url(url));
    let client = get_client()?;
    let mut rb = client.request(method, url);

    if let Some(h) = headers {
        rb = rb.headers(h);
    }

    if let Some(body_fn) = body {
        rb = body_fn(rb);
    }

    let start = Instant::now();
    let res = rb.send().await;
    let elapsed = start.elapsed().as_millis();

    match res {
        Ok(response) => {
            LOGGER.info(format!("{} {} {} ms", visit_log, response.status(), elapsed));
            Ok(response)
        }
        Err(why) => {
            let why = why.without_url();
            LOGGER.error(format!("{} failed because {:?}. {} ms", visit_log, why, elapsed));
            Err(anyhow!("Failed to send request to {}: {:?}", visit_log, why))
        }
    }
}
