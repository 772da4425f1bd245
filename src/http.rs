use crate::errors::*;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::time::Duration;

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
pub const READ_TIMEOUT: Duration = Duration::from_secs(240);

pub struct Client {
    http: reqwest::Client,
}

impl Client {
    /// Registry lookups are bounded by [`CONNECT_TIMEOUT`] and [`READ_TIMEOUT`].
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()?;
        Ok(Client { http })
    }

    /// Send a GET request, anything but `200 OK` is an error.
    pub async fn request(&self, url: &str, headers: HeaderMap) -> Result<reqwest::Response> {
        debug!("Requesting {url:?}...");
        let response = self
            .http
            .get(url)
            .headers(headers)
            .send()
            .await
            .context("Failed to send http request")?;
        let status = response.status();
        if status != StatusCode::OK {
            bail!("Received http status {status} for {url:?}");
        }
        Ok(response)
    }

    pub async fn fetch(&self, url: &str) -> Result<bytes::Bytes> {
        let response = self.request(url, HeaderMap::new()).await?;
        let buf = response.bytes().await.context("Failed to read http body")?;
        Ok(buf)
    }
}
