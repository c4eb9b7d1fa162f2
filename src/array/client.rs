//! REST Array Client
//!
//! Talks to an array's REST gateway. Logging in stores the CSRF token the
//! gateway hands back; every mutating call sends it along with the
//! session's basic credentials.

use crate::context::RequestContext;
use crate::domain::ports::{
    ArrayClient, ArrayClientFactory, AuthFailure, ConnectConfig, HostRegistration,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, Instrument};

/// Header carrying the session token
pub const TOKEN_HEADER: &str = "EMC-CSRF-TOKEN";

const LOGIN_PATH: &str = "/api/types/loginSessionInfo/instances";
const HOST_PATH: &str = "/api/types/host/instances";
const INITIATOR_PATH: &str = "/api/types/hostInitiator/instances";

/// Host type: manually registered host
const HOST_TYPE_MANUAL: u32 = 1;
const INITIATOR_TYPE_FC: u32 = 1;
const INITIATOR_TYPE_ISCSI: u32 = 2;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Deserialize)]
struct Collection {
    #[serde(default)]
    entries: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
struct Instance {
    content: InstanceContent,
}

#[derive(Debug, Deserialize)]
struct InstanceContent {
    id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateHost<'a> {
    #[serde(rename = "type")]
    host_type: u32,
    name: &'a str,
    description: &'a str,
}

#[derive(Clone)]
struct Session {
    username: String,
    password: String,
    token: String,
}

/// Client for one array's REST gateway
pub struct RestArrayClient {
    http: reqwest::Client,
    base_url: Url,
    session: RwLock<Option<Session>>,
}

impl RestArrayClient {
    pub fn new(endpoint: &str, insecure: bool) -> Result<Self> {
        let base_url = Url::parse(endpoint)
            .map_err(|e| Error::Configuration(format!("invalid endpoint '{}': {}", endpoint, e)))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.host_str().is_none() {
            return Err(Error::Configuration(format!(
                "invalid endpoint '{}': expected http(s)://host",
                endpoint
            )));
        }

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("http client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            session: RwLock::new(None),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Internal(format!("failed to build URL for {}: {}", path, e)))
    }

    fn operation_error(&self, operation: &str, reason: impl ToString) -> Error {
        Error::ArrayOperationFailed {
            array_id: self.base_url.to_string(),
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Build an authenticated request; fails when no session is open
    fn request(&self, method: reqwest::Method, url: Url, operation: &str) -> Result<reqwest::RequestBuilder> {
        let session = self
            .session
            .read()
            .clone()
            .ok_or_else(|| self.operation_error(operation, "no session"))?;
        Ok(self
            .http
            .request(method, url)
            .basic_auth(session.username, Some(session.password))
            .header(TOKEN_HEADER, session.token)
            .header("X-EMC-REST-CLIENT", "true"))
    }

    async fn send<T: serde::de::DeserializeOwned + Default>(
        &self,
        req: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<T> {
        let response = req.send().await.map_err(|e| self.operation_error(operation, e))?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(self.operation_error(operation, format!("{}: {}", status, body)));
        }
        if body.trim().is_empty() {
            return Ok(T::default());
        }
        serde_json::from_str(&body).map_err(|e| self.operation_error(operation, e))
    }

    async fn find_host(&self, name: &str) -> Result<Option<String>> {
        let mut url = self.url(HOST_PATH)?;
        url.set_query(Some(&format!(
            "fields=id,name&filter={}",
            urlencoding::encode(&format!("name eq \"{}\"", name))
        )));
        let req = self.request(reqwest::Method::GET, url, "find_host")?;
        let hosts: Collection = self.send(req, "find_host").await?;
        Ok(hosts.entries.into_iter().next().map(|h| h.content.id))
    }

    async fn create_host(&self, host: &HostRegistration) -> Result<String> {
        let body = CreateHost {
            host_type: HOST_TYPE_MANUAL,
            name: &host.name,
            description: &host.long_name,
        };
        let req = self
            .request(reqwest::Method::POST, self.url(HOST_PATH)?, "create_host")?
            .json(&body);
        let created: Option<Instance> = self.send(req, "create_host").await?;
        created
            .map(|i| i.content.id)
            .ok_or_else(|| self.operation_error("create_host", "empty response"))
    }

    async fn add_initiator(&self, host_id: &str, initiator_type: u32, wwn_or_iqn: &str) -> Result<()> {
        let body = json!({
            "host": { "id": host_id },
            "initiatorType": initiator_type,
            "initiatorWWNorIqn": wwn_or_iqn,
        });
        let req = self
            .request(reqwest::Method::POST, self.url(INITIATOR_PATH)?, "add_initiator")?
            .json(&body);
        let _: serde_json::Value = self.send(req, "add_initiator").await?;
        Ok(())
    }
}

#[async_trait]
impl ArrayClient for RestArrayClient {
    async fn authenticate(&self, config: &ConnectConfig) -> std::result::Result<(), AuthFailure> {
        let url = self
            .url(LOGIN_PATH)
            .map_err(|e| AuthFailure::Unreachable(e.to_string()))?;

        let response = self
            .http
            .get(url)
            .basic_auth(&config.username, Some(&config.password))
            .header("X-EMC-REST-CLIENT", "true")
            .send()
            .await
            .map_err(|e| AuthFailure::Unreachable(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AuthFailure::InvalidCredentials(response.status().to_string()));
            }
            status if !status.is_success() => {
                return Err(AuthFailure::Unreachable(status.to_string()));
            }
            _ => {}
        }

        let token = response
            .headers()
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthFailure::Unreachable(format!("login response without {}", TOKEN_HEADER)))?
            .to_string();

        *self.session.write() = Some(Session {
            username: config.username.clone(),
            password: config.password.clone(),
            token,
        });
        debug!(endpoint = %self.base_url, "session established");
        Ok(())
    }

    fn token(&self) -> String {
        self.session
            .read()
            .as_ref()
            .map(|s| s.token.clone())
            .unwrap_or_default()
    }

    async fn register_host(&self, ctx: &RequestContext, host: &HostRegistration) -> Result<()> {
        async move {
            let host_id = match self.find_host(&host.name).await? {
                Some(id) => {
                    debug!(host_id = %id, "host already registered");
                    id
                }
                None => {
                    let id = self.create_host(host).await?;
                    info!(host_id = %id, name = %host.name, "host created");
                    id
                }
            };

            for iqn in &host.iscsi_initiators {
                self.add_initiator(&host_id, INITIATOR_TYPE_ISCSI, iqn).await?;
            }
            for wwn in &host.fc_initiators {
                self.add_initiator(&host_id, INITIATOR_TYPE_FC, wwn).await?;
            }
            Ok(())
        }
        .instrument(ctx.span())
        .await
    }
}

/// Builds [`RestArrayClient`]s during reloads
#[derive(Debug, Default, Clone, Copy)]
pub struct RestClientFactory;

impl ArrayClientFactory for RestClientFactory {
    fn create(&self, endpoint: &str, insecure: bool) -> Result<Arc<dyn ArrayClient>> {
        Ok(Arc::new(RestArrayClient::new(endpoint, insecure)?))
    }
}
