//! HTTP connector: GET to fetch, POST/PUT/PATCH to send

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;

use crate::domain::Record;
use crate::transform::text;

use super::{ConnectorError, DestinationWriter, HttpAuth, HttpConnectorConfig, HttpMethod, SourceReader};

fn build_client(config: &HttpConnectorConfig, default_timeout_ms: u64) -> Result<Client, ConnectorError> {
    Client::builder()
        .timeout(config.timeout(default_timeout_ms))
        .build()
        .map_err(ConnectorError::Network)
}

fn with_auth(request: RequestBuilder, config: &HttpConnectorConfig) -> RequestBuilder {
    let request = config
        .headers
        .iter()
        .fold(request, |req, (name, value)| req.header(name.as_str(), value.as_str()));
    match &config.auth {
        Some(HttpAuth::Basic { username, password }) => request.basic_auth(username, password.as_ref()),
        Some(HttpAuth::Bearer { token }) => request.bearer_auth(token),
        None => request,
    }
}

async fn check_status(response: Response) -> Result<Response, ConnectorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    debug!(%status, "check_status: request failed");
    let message = response.text().await.unwrap_or_default();
    Err(ConnectorError::Status {
        status: status.as_u16(),
        message,
    })
}

pub struct HttpSource {
    config: HttpConnectorConfig,
    http: Client,
}

impl HttpSource {
    pub fn new(config: HttpConnectorConfig, default_timeout_ms: u64) -> Result<Self, ConnectorError> {
        debug!(url = %config.url, "HttpSource::new: called");
        let http = build_client(&config, default_timeout_ms)?;
        Ok(Self { config, http })
    }

    /// Use an existing client; its timeout applies
    pub fn with_client(config: HttpConnectorConfig, http: Client) -> Self {
        Self { config, http }
    }
}

#[async_trait]
impl SourceReader for HttpSource {
    async fn fetch(&self) -> Result<Value, ConnectorError> {
        debug!(url = %self.config.url, "HttpSource::fetch: called");
        let query: Vec<(&str, String)> = self.config.params.iter().map(|(k, v)| (k.as_str(), text(v))).collect();
        let request = with_auth(self.http.get(&self.config.url), &self.config).query(&query);

        let response = check_status(request.send().await?).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ConnectorError::parse(&self.config.url, e))
    }

    fn describe(&self) -> String {
        format!("api:{}", self.config.url)
    }
}

pub struct HttpDestination {
    config: HttpConnectorConfig,
    http: Client,
}

impl HttpDestination {
    pub fn new(config: HttpConnectorConfig, default_timeout_ms: u64) -> Result<Self, ConnectorError> {
        debug!(url = %config.url, method = ?config.method, "HttpDestination::new: called");
        let http = build_client(&config, default_timeout_ms)?;
        Ok(Self { config, http })
    }

    /// Use an existing client; its timeout applies
    pub fn with_client(config: HttpConnectorConfig, http: Client) -> Self {
        Self { config, http }
    }
}

#[async_trait]
impl DestinationWriter for HttpDestination {
    async fn send(&self, records: &[Record]) -> Result<(), ConnectorError> {
        debug!(url = %self.config.url, record_count = records.len(), "HttpDestination::send: called");
        let method = match self.config.method {
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
        };
        let request = with_auth(self.http.request(method, &self.config.url), &self.config).json(records);
        check_status(request.send().await?).await?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("api:{}", self.config.url)
    }
}
