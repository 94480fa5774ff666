use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use serde_json::Value;

use super::{ClientFactory, IdentityProbe, RemoteError, ResourceClient, ServiceKind};
use crate::model::{Credentials, KindId, Payload};

const SIGNING_CONTEXT: &str = "stratus gateway request signing v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Blocking client for one service of a resource gateway, bound to one
/// credential set.
pub struct GatewayClient {
    base_url: Url,
    service: ServiceKind,
    credentials: Credentials,
    client: Client,
}

impl GatewayClient {
    pub fn new(
        base_url: &str,
        service: ServiceKind,
        credentials: Credentials,
    ) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .user_agent("stratus")
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Failed(format!("build http client: {}", e)))?;
        let base_url = Url::parse(base_url)
            .map_err(|e| RemoteError::Failed(format!("invalid gateway url {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::Failed(format!("invalid gateway url {}", base_url)));
        }
        Ok(Self {
            base_url,
            service,
            credentials,
            client,
        })
    }

    /// `<base>/v1/<service>/<region>/<kind>/<tail..>`, each tail part one
    /// escaped segment (ids may be ARNs containing `/`).
    fn url(&self, region: &str, kind: KindId, tail: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v1", self.service, region, kind])
                .extend(tail);
        }
        url
    }

    fn signed(&self, req: RequestBuilder, method: &str, url: &Url) -> RequestBuilder {
        sign(req, &self.credentials, method, url.as_str())
    }
}

impl ResourceClient for GatewayClient {
    fn list(&self, kind: KindId, region: &str) -> Result<Vec<Payload>, RemoteError> {
        let url = self.url(region, kind, &[]);
        let resp = self
            .signed(self.client.get(url.clone()), "GET", &url)
            .send()
            .map_err(transport_error)?;
        let body: Value = ensure_ok(resp)?
            .json()
            .map_err(|e| RemoteError::Failed(format!("parse list response: {}", e)))?;
        match body {
            Value::Array(items) => Ok(items),
            Value::Object(mut obj) => match obj.remove("items") {
                Some(Value::Array(items)) => Ok(items),
                _ => Err(RemoteError::Failed("list response has no items".to_string())),
            },
            _ => Err(RemoteError::Failed("unexpected list response".to_string())),
        }
    }

    fn describe(&self, kind: KindId, region: &str, id: &str) -> Result<Payload, RemoteError> {
        let url = self.url(region, kind, &[id]);
        let resp = self
            .signed(self.client.get(url.clone()), "GET", &url)
            .send()
            .map_err(transport_error)?;
        ensure_ok(resp)?
            .json()
            .map_err(|e| RemoteError::Failed(format!("parse describe response: {}", e)))
    }

    fn act(
        &self,
        kind: KindId,
        region: &str,
        action: &str,
        id: &str,
        params: &Payload,
    ) -> Result<Payload, RemoteError> {
        let url = self.url(region, kind, &[id, "actions", action]);
        let resp = self
            .signed(self.client.post(url.clone()), "POST", &url)
            .json(params)
            .send()
            .map_err(transport_error)?;
        let resp = ensure_ok(resp)?;
        if resp.content_length() == Some(0) {
            return Ok(Value::Null);
        }
        Ok(resp.json().unwrap_or(Value::Null))
    }
}

/// Builds one `GatewayClient` per service.
pub struct GatewayFactory {
    base_url: String,
}

impl GatewayFactory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl ClientFactory for GatewayFactory {
    fn connect(
        &self,
        service: ServiceKind,
        credentials: &Credentials,
        _region: &str,
    ) -> Result<Arc<dyn ResourceClient>, RemoteError> {
        let client = GatewayClient::new(&self.base_url, service, credentials.clone())?;
        Ok(Arc::new(client))
    }
}

/// Asks the gateway which account a credential set belongs to.
pub struct GatewayProbe {
    base_url: String,
    client: Client,
}

impl GatewayProbe {
    pub fn new(base_url: &str) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .user_agent("stratus")
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Failed(format!("build http client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

impl IdentityProbe for GatewayProbe {
    fn probe(&self, credentials: &Credentials) -> Result<String, RemoteError> {
        let url = format!("{}/v1/sts/whoami", self.base_url);
        let resp = sign(self.client.get(&url), credentials, "GET", &url)
            .send()
            .map_err(transport_error)?;
        let body: Value = ensure_ok(resp)?
            .json()
            .map_err(|e| RemoteError::Failed(format!("parse whoami: {}", e)))?;
        body.get("account")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| RemoteError::Failed("whoami response has no account".to_string()))
    }
}

fn sign(req: RequestBuilder, creds: &Credentials, method: &str, url: &str) -> RequestBuilder {
    let stamp = time::OffsetDateTime::now_utc().unix_timestamp().to_string();
    let key = blake3::derive_key(SIGNING_CONTEXT, creds.secret_access_key.as_bytes());
    let mut hasher = blake3::Hasher::new_keyed(&key);
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    hasher.update(stamp.as_bytes());
    let signature = hasher.finalize().to_hex();

    let mut req = req
        .header("x-stratus-access-key", &creds.access_key_id)
        .header("x-stratus-date", stamp)
        .header("x-stratus-signature", signature.as_str());
    if let Some(token) = &creds.session_token {
        req = req.header("x-stratus-session-token", token);
    }
    req
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() || err.is_connect() {
        RemoteError::Transient(err.to_string())
    } else {
        RemoteError::Failed(err.to_string())
    }
}

fn ensure_ok(resp: Response) -> Result<Response, RemoteError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = error_message(resp).unwrap_or_else(|| status.to_string());
    Err(classify_status(status, message))
}

fn error_message(resp: Response) -> Option<String> {
    let v: Value = resp.json().ok()?;
    v.get("error")
        .and_then(|x| x.as_str())
        .or_else(|| v.get("message").and_then(|x| x.as_str()))
        .map(|s| s.to_string())
}

fn classify_status(status: StatusCode, message: String) -> RemoteError {
    match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            RemoteError::Transient(format!("throttled: {}", message))
        }
        StatusCode::UNAUTHORIZED => {
            RemoteError::Failed(format!("unauthorized (credentials invalid or expired): {}", message))
        }
        StatusCode::FORBIDDEN => RemoteError::Failed(format!("forbidden: {}", message)),
        s if s.is_server_error() => RemoteError::Transient(format!("{}: {}", s, message)),
        _ => RemoteError::Failed(message),
    }
}
