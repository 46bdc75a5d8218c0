//! HTTP collaborators on the gateway: status, providers, auth check.
//!
//! Every call is independent and failure-soft: callers render an
//! "unavailable" placeholder instead of propagating the error further.

use serde::Deserialize;
use url::Url;

/// Collaborator call error.
#[derive(Debug)]
pub struct ApiError(pub String);

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError(e.to_string())
    }
}

/// Gateway health summary.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusInfo {
    pub status: String,
    #[serde(default)]
    pub sessions: u64,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// One configured LLM provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProvidersResponse {
    #[serde(default)]
    providers: Vec<ProviderInfo>,
}

#[derive(Debug, Clone, Deserialize)]
struct AuthCheckResponse {
    #[serde(default)]
    required: bool,
}

/// Derive the HTTP origin serving the REST endpoints from the WebSocket url.
pub fn http_base_for(ws_url: &str) -> Result<String, ApiError> {
    let mut url = Url::parse(ws_url).map_err(|e| ApiError(e.to_string()))?;
    let scheme = match url.scheme() {
        "wss" => "https",
        _ => "http",
    };
    url.set_scheme(scheme)
        .map_err(|_| ApiError(format!("cannot map scheme of {ws_url}")))?;
    url.set_path("");
    url.set_query(None);
    Ok(url.to_string().trim_end_matches('/').to_string())
}

/// REST-side client for the gateway.
pub struct GatewayApi {
    client: reqwest::Client,
    base: String,
}

impl GatewayApi {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: base.into(),
        }
    }

    pub async fn status(&self) -> Result<StatusInfo, ApiError> {
        let url = format!("{}/api/status", self.base);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    pub async fn providers(&self) -> Result<Vec<ProviderInfo>, ApiError> {
        let url = format!("{}/api/providers", self.base);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body: ProvidersResponse = response.json().await?;
        Ok(body.providers)
    }

    pub async fn activate_provider(&self, id: &str) -> Result<(), ApiError> {
        let url = format!("{}/api/providers/activate", self.base);
        self.client
            .post(&url)
            .json(&serde_json::json!({ "provider": id }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn auth_required(&self) -> Result<bool, ApiError> {
        let url = format!("{}/api/auth/check", self.base);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body: AuthCheckResponse = response.json().await?;
        Ok(body.required)
    }
}
