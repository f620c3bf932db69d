//! A client for the network controller's REST API.

use crate::Connector;
use bytes::Bytes;
use http::{header, Method, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::{
    client::legacy::{connect::HttpConnector as TcpConnector, Client},
    rt::TokioExecutor,
};
use kube_network_manager_core::{
    ApiError, Create, FqName, ObjRef, SharedApi, VncApi, VncKind, VncObject,
};
use serde_json::{json, Map, Value};
use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::time;

const REQUEST_TIMEOUT: time::Duration = time::Duration::from_secs(30);
const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// Properties that describe an object's placement rather than its state.
const METADATA_FIELDS: [&str; 6] = [
    "uuid",
    "fq_name",
    "parent_type",
    "parent_uuid",
    "href",
    "parent_href",
];

/// A client for a set of controller replicas.
///
/// Requests go to the last endpoint that answered. When an endpoint cannot be
/// reached, the request is retried against the remaining endpoints in order
/// and the first one that answers becomes the active endpoint.
#[derive(Clone)]
pub struct HttpApi {
    client: Client<TcpConnector, Full<Bytes>>,
    endpoints: Arc<[String]>,
    active: Arc<AtomicUsize>,
    token: Option<String>,
}

/// Connects to the controller once any of its replicas answers.
#[derive(Clone, Debug)]
pub struct HttpConnector {
    endpoints: Vec<String>,
    token: Option<String>,
}

// === impl HttpConnector ===

impl HttpConnector {
    pub fn new(hosts: &[String], port: u16, token: Option<String>) -> Self {
        Self {
            endpoints: hosts.iter().map(|host| format!("{host}:{port}")).collect(),
            token,
        }
    }
}

#[async_trait::async_trait]
impl Connector for HttpConnector {
    async fn connect(&self) -> Result<SharedApi, ApiError> {
        let api = HttpApi::new(self.endpoints.clone(), self.token.clone());
        api.ping().await?;
        tracing::debug!(endpoint = %api.endpoint(), "Endpoint healthy");
        Ok(Arc::new(api))
    }

    fn endpoints(&self) -> Vec<String> {
        self.endpoints.clone()
    }
}

// === impl HttpApi ===

impl HttpApi {
    /// Creates a client for the controller replicas at `endpoints`
    /// (`host:port`).
    pub fn new(endpoints: Vec<String>, token: Option<String>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self {
            client,
            endpoints: endpoints.into(),
            active: Arc::new(AtomicUsize::new(0)),
            token,
        }
    }

    /// The endpoint requests are currently sent to.
    pub fn endpoint(&self) -> &str {
        self.endpoints
            .get(self.active.load(Ordering::Acquire))
            .map(String::as_str)
            .unwrap_or_default()
    }

    async fn fq_name_to_id(&self, kind: VncKind, fq_name: &FqName) -> Result<String, ApiError> {
        let req = json!({ "type": kind.as_str(), "fq_name": fq_name });
        let (status, body) = self.send(Method::POST, "/fqname-to-id", Some(req)).await?;
        match status {
            s if s.is_success() => {
                let rsp = serde_json::from_slice::<Value>(&body)?;
                rsp.get("uuid")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::Status {
                        status: s.as_u16(),
                        body: "response is missing a uuid".to_string(),
                    })
            }
            StatusCode::NOT_FOUND => Err(ApiError::not_found(kind, fq_name)),
            s => Err(unexpected(s, &body)),
        }
    }

    /// Sends a request, failing over to the next endpoint when the active one
    /// cannot be reached.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<(StatusCode, Bytes), ApiError> {
        let body = match body {
            Some(body) => Bytes::from(serde_json::to_vec(&body)?),
            None => Bytes::new(),
        };

        let first = self.active.load(Ordering::Acquire);
        let mut last = None;
        for i in 0..self.endpoints.len() {
            let idx = (first + i) % self.endpoints.len();
            let endpoint = &self.endpoints[idx];
            match self.send_to(endpoint, &method, path, body.clone()).await {
                Ok(rsp) => {
                    if idx != first {
                        tracing::info!(%endpoint, "Failed over to another controller endpoint");
                        self.active.store(idx, Ordering::Release);
                    }
                    return Ok(rsp);
                }
                Err(error @ ApiError::Connection(_)) => {
                    tracing::warn!(%endpoint, %error, "Controller endpoint unreachable");
                    last = Some(error);
                }
                Err(error) => return Err(error),
            }
        }
        Err(last.unwrap_or_else(|| ApiError::Connection("no endpoints configured".to_string())))
    }

    async fn send_to(
        &self,
        endpoint: &str,
        method: &Method,
        path: &str,
        body: Bytes,
    ) -> Result<(StatusCode, Bytes), ApiError> {
        let uri = format!("http://{endpoint}{path}")
            .parse::<Uri>()
            .map_err(|e| ApiError::Connection(e.to_string()))?;

        let mut req = http::Request::builder()
            .method(method.clone())
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = self.token.as_deref() {
            req = req.header(AUTH_TOKEN_HEADER, token);
        }
        let req = req
            .body(Full::new(body))
            .map_err(|e| ApiError::Connection(e.to_string()))?;

        tracing::trace!(%method, %endpoint, %path, "Sending");
        let rsp = time::timeout(REQUEST_TIMEOUT, self.client.request(req))
            .await
            .map_err(|_| ApiError::Connection(format!("{method} {path} timed out")))?
            .map_err(|e| ApiError::Connection(e.to_string()))?;
        let status = rsp.status();
        let body = rsp
            .into_body()
            .collect()
            .await
            .map_err(|e| ApiError::Connection(e.to_string()))?
            .to_bytes();
        tracing::trace!(%method, %endpoint, %path, %status, "Received");
        Ok((status, body))
    }
}

#[async_trait::async_trait]
impl VncApi for HttpApi {
    async fn read(&self, kind: VncKind, fq_name: &FqName) -> Result<VncObject, ApiError> {
        let uuid = self.fq_name_to_id(kind, fq_name).await?;
        self.read_by_uuid(kind, &uuid).await
    }

    async fn read_by_uuid(&self, kind: VncKind, uuid: &str) -> Result<VncObject, ApiError> {
        let path = format!("/{kind}/{uuid}");
        let (status, body) = self.send(Method::GET, &path, None).await?;
        match status {
            s if s.is_success() => decode(kind, serde_json::from_slice(&body)?),
            StatusCode::NOT_FOUND => Err(ApiError::not_found(kind, uuid)),
            s => Err(unexpected(s, &body)),
        }
    }

    async fn create(&self, mut obj: VncObject) -> Result<Create, ApiError> {
        let path = format!("/{}", obj.kind.plural());
        let (status, body) = self.send(Method::POST, &path, Some(encode(&obj))).await?;
        match status {
            s if s.is_success() => {
                let created = decode(obj.kind, serde_json::from_slice(&body)?)?;
                obj.uuid = created.uuid;
                Ok(Create::Created(obj))
            }
            StatusCode::CONFLICT => {
                let existing = self.read(obj.kind, &obj.fq_name).await?;
                Ok(Create::AlreadyExists(existing))
            }
            s => Err(unexpected(s, &body)),
        }
    }

    async fn update(&self, obj: &VncObject) -> Result<(), ApiError> {
        let uuid = match obj.uuid() {
            Some(uuid) => uuid.to_string(),
            None => self.fq_name_to_id(obj.kind, &obj.fq_name).await?,
        };
        let path = format!("/{}/{uuid}", obj.kind);
        let (status, body) = self.send(Method::PUT, &path, Some(encode(obj))).await?;
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(ApiError::not_found(obj.kind, &obj.fq_name)),
            s => Err(unexpected(s, &body)),
        }
    }

    async fn delete(&self, kind: VncKind, uuid: &str) -> Result<(), ApiError> {
        let path = format!("/{kind}/{uuid}");
        let (status, body) = self.send(Method::DELETE, &path, None).await?;
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(ApiError::not_found(kind, uuid)),
            StatusCode::CONFLICT => Err(ApiError::RefsExist {
                kind,
                uuid: uuid.to_string(),
            }),
            s => Err(unexpected(s, &body)),
        }
    }

    async fn list(&self, kind: VncKind) -> Result<Vec<VncObject>, ApiError> {
        let plural = kind.plural();
        let path = format!("/{plural}?detail=True");
        let (status, body) = self.send(Method::GET, &path, None).await?;
        if !status.is_success() {
            return Err(unexpected(status, &body));
        }
        let mut rsp = serde_json::from_slice::<Map<String, Value>>(&body)?;
        match rsp.remove(&plural) {
            Some(Value::Array(items)) => items.into_iter().map(|item| decode(kind, item)).collect(),
            _ => Ok(vec![]),
        }
    }

    async fn ping(&self) -> Result<(), ApiError> {
        let (status, body) = self.send(Method::GET, "/", None).await?;
        if status.is_success() {
            return Ok(());
        }
        Err(unexpected(status, &body))
    }

    async fn ref_relax_for_delete(&self, uuid: &str, ref_uuid: &str) -> Result<(), ApiError> {
        let req = json!({ "uuid": uuid, "ref-uuid": ref_uuid });
        let (status, body) = self
            .send(Method::POST, "/ref-relax-for-delete", Some(req))
            .await?;
        if status.is_success() {
            return Ok(());
        }
        Err(unexpected(status, &body))
    }
}

impl fmt::Debug for HttpApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpApi")
            .field("endpoints", &self.endpoints)
            .field("active", &self.endpoint())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn unexpected(status: StatusCode, body: &[u8]) -> ApiError {
    ApiError::Status {
        status: status.as_u16(),
        body: String::from_utf8_lossy(body).into_owned(),
    }
}

/// The JSON field name of a kind, e.g. `virtual_network`.
fn field(kind: VncKind) -> String {
    kind.as_str().replace('-', "_")
}

/// Encodes an object as a `{"<kind>": {...}}` request body.
fn encode(obj: &VncObject) -> Value {
    let mut body = obj.attributes.clone();
    body.insert("fq_name".to_string(), json!(obj.fq_name));
    if let Some(parent) = obj.parent_type {
        body.insert("parent_type".to_string(), json!(parent.as_str()));
    }
    if let Some(uuid) = obj.uuid() {
        body.insert("uuid".to_string(), json!(uuid));
    }

    let mut refs = Map::new();
    for r in &obj.refs {
        let list = refs
            .entry(format!("{}_refs", field(r.kind)))
            .or_insert_with(|| Value::Array(vec![]));
        if let Value::Array(list) = list {
            list.push(json!({ "to": r.to, "uuid": r.uuid, "attr": r.attr }));
        }
    }
    body.extend(refs);

    let mut envelope = Map::new();
    envelope.insert(obj.kind.as_str().to_string(), Value::Object(body));
    Value::Object(envelope)
}

/// Decodes an object from a response, which may or may not be wrapped in a
/// `{"<kind>": {...}}` envelope.
fn decode(kind: VncKind, value: Value) -> Result<VncObject, ApiError> {
    let mut body = match value {
        Value::Object(mut map) => match map.remove(kind.as_str()) {
            Some(Value::Object(inner)) => inner,
            Some(other) => {
                map.insert(kind.as_str().to_string(), other);
                map
            }
            None => map,
        },
        other => return Err(unexpected(StatusCode::OK, other.to_string().as_bytes())),
    };

    let uuid = body
        .get("uuid")
        .and_then(Value::as_str)
        .map(str::to_string);
    let fq_name = match body.get("fq_name") {
        Some(fq_name) => serde_json::from_value::<FqName>(fq_name.clone())?,
        None => FqName::default(),
    };
    let parent_type = body
        .get("parent_type")
        .cloned()
        .and_then(|p| serde_json::from_value::<VncKind>(p).ok());
    for key in METADATA_FIELDS {
        body.remove(key);
    }

    let mut obj = VncObject {
        uuid,
        parent_type,
        ..VncObject::new(kind, fq_name)
    };
    for (key, value) in body {
        if key.ends_with("_back_refs") || is_children(&key) {
            continue;
        }
        if let Some(to_kind) = key.strip_suffix("_refs").and_then(ref_kind) {
            for r in value.as_array().into_iter().flatten() {
                obj.refs.push(ObjRef {
                    kind: to_kind,
                    uuid: r
                        .get("uuid")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    to: serde_json::from_value(r.get("to").cloned().unwrap_or(Value::Null))
                        .unwrap_or_default(),
                    attr: r.get("attr").cloned().filter(|a| !a.is_null()),
                });
            }
            continue;
        }
        obj.attributes.insert(key, value);
    }
    Ok(obj)
}

fn ref_kind(prefix: &str) -> Option<VncKind> {
    serde_json::from_value(Value::String(prefix.replace('_', "-"))).ok()
}

/// Child collections, e.g. `virtual_networks` on a project.
fn is_children(key: &str) -> bool {
    key.strip_suffix('s').and_then(ref_kind).is_some()
}
