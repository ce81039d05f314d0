//! Provider adapter for a sandbox-manager REST API.

use crate::config::ProviderSettings;
use crate::sandbox::{
    domain::{
        HttpMethod, ProxyRequest, ProxyResponse, SandboxConfig, SandboxId, SandboxState,
    },
    ports::{ObservedState, ProviderError, ProviderResult, SandboxProvider},
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Header carrying the create de-duplication key.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Header the manager sets on proxy responses when the sandbox is gone.
pub const SANDBOX_ERROR_HEADER: &str = "x-sandbox-error";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedSandbox {
    #[serde(alias = "id")]
    sandbox_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SandboxStatusBody {
    #[serde(alias = "id")]
    sandbox_id: String,
    state: String,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchStatusRequest<'a> {
    sandbox_ids: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct BatchStatusBody {
    #[serde(default)]
    sandboxes: Vec<SandboxStatusBody>,
}

/// Sandbox provider backed by HTTP calls to a sandbox manager.
#[derive(Debug, Clone)]
pub struct HttpSandboxProvider {
    client: Client,
    base_url: String,
    api_token: Option<String>,
    connect_timeout: Duration,
    batch_limit: Option<usize>,
}

impl HttpSandboxProvider {
    /// Builds a provider from connection settings.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Connect`] when the HTTP client cannot be
    /// constructed.
    pub fn new(settings: &ProviderSettings) -> ProviderResult<Self> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout())
            .build()
            .map_err(|err| ProviderError::Connect(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_owned(),
            api_token: settings.api_token.clone(),
            connect_timeout: settings.connect_timeout(),
            batch_limit: settings.batch_limit,
        })
    }

    /// Returns the manager base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self.client.request(method, self.url(path));
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder) -> ProviderResult<Response> {
        builder
            .send()
            .await
            .map_err(|err| self.map_send_error(&err))
    }

    fn map_send_error(&self, err: &reqwest::Error) -> ProviderError {
        if err.is_connect() {
            ProviderError::Connect(err.to_string())
        } else if err.is_timeout() {
            ProviderError::Timeout(self.connect_timeout)
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

async fn error_text(response: Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(text) if !text.trim().is_empty() => format!("{status}: {}", text.trim()),
        _ => status.to_string(),
    }
}

/// Maps a failed control-plane response to a provider error.
async fn control_error(response: Response, sandbox_id: Option<&SandboxId>) -> ProviderError {
    let status = response.status();
    match (status, sandbox_id) {
        (StatusCode::NOT_FOUND, Some(id)) => ProviderError::NotFound(id.clone()),
        _ if status.is_server_error() => ProviderError::Transport(error_text(response).await),
        _ => ProviderError::Rejected(error_text(response).await),
    }
}

fn observed(body: SandboxStatusBody) -> ProviderResult<(SandboxId, ObservedState)> {
    let state = SandboxState::try_from(body.state.as_str())
        .map_err(|err| ProviderError::InvalidResponse(err.to_string()))?;
    let observation = ObservedState {
        state,
        detail: body.detail,
    };
    Ok((SandboxId::new(body.sandbox_id), observation))
}

fn response_headers(response: &Response) -> BTreeMap<String, String> {
    response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|text| (name.as_str().to_owned(), text.to_owned()))
        })
        .collect()
}

fn parse_body(text: &str) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()))
}

#[async_trait]
impl SandboxProvider for HttpSandboxProvider {
    async fn create(&self, config: &SandboxConfig) -> ProviderResult<SandboxId> {
        let mut builder = self.request(Method::POST, "/v1/sandboxes").json(config);
        if let Some(key) = config.idempotency_key() {
            builder = builder.header(IDEMPOTENCY_HEADER, key.as_str());
        }

        let response = self.send(builder).await?;
        if !response.status().is_success() {
            return Err(control_error(response, None).await);
        }
        let created = response
            .json::<CreatedSandbox>()
            .await
            .map_err(|err| ProviderError::InvalidResponse(err.to_string()))?;
        Ok(SandboxId::new(created.sandbox_id))
    }

    async fn status(&self, sandbox_id: &SandboxId) -> ProviderResult<ObservedState> {
        let path = format!("/v1/sandboxes/{sandbox_id}");
        let response = self.send(self.request(Method::GET, &path)).await?;
        if !response.status().is_success() {
            return Err(control_error(response, Some(sandbox_id)).await);
        }
        let body = response
            .json::<SandboxStatusBody>()
            .await
            .map_err(|err| ProviderError::InvalidResponse(err.to_string()))?;
        observed(body).map(|(_, state)| state)
    }

    async fn batch_status(
        &self,
        sandbox_ids: &[SandboxId],
    ) -> ProviderResult<HashMap<SandboxId, ObservedState>> {
        let payload = BatchStatusRequest {
            sandbox_ids: sandbox_ids.iter().map(SandboxId::as_str).collect(),
        };
        let builder = self
            .request(Method::POST, "/v1/sandboxes/status:batch")
            .json(&payload);
        let response = self.send(builder).await?;

        match response.status() {
            StatusCode::NOT_FOUND
            | StatusCode::METHOD_NOT_ALLOWED
            | StatusCode::NOT_IMPLEMENTED => {
                return Err(ProviderError::Unsupported("batch_status"));
            }
            status if !status.is_success() => return Err(control_error(response, None).await),
            _ => {}
        }

        let body = response
            .json::<BatchStatusBody>()
            .await
            .map_err(|err| ProviderError::InvalidResponse(err.to_string()))?;
        body.sandboxes.into_iter().map(observed).collect()
    }

    async fn forward(
        &self,
        sandbox_id: &SandboxId,
        request: &ProxyRequest,
    ) -> ProviderResult<ProxyResponse> {
        let path = format!("/v1/sandboxes/{sandbox_id}/proxy{}", request.path());
        let mut builder = self.request(to_method(request.method()), &path);
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.data().is_empty() {
            builder = builder.json(request.data());
        }

        let response = self.send(builder).await?;
        let is_gone = response
            .headers()
            .get(SANDBOX_ERROR_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.eq_ignore_ascii_case("not_found"));
        if is_gone {
            return Err(ProviderError::NotFound(sandbox_id.clone()));
        }

        let status = response.status().as_u16();
        let headers = response_headers(&response);
        let text = response
            .text()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;
        Ok(ProxyResponse::new(status, parse_body(&text)).with_headers(headers))
    }

    fn batch_limit(&self) -> Option<usize> {
        self.batch_limit
    }
}
