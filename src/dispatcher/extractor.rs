//! Request Extractor (§4.7): turns an incoming `hyper` request into the flat
//! record the dispatcher needs — nothing here knows about scripts, VFS
//! paths, or environment variable naming; that's `env.rs`'s job.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::{HeaderMap, Method, Request};
use serde_json::{Map, Value};

pub struct ExtractedRequest {
    pub method: Method,
    pub raw_uri: String,
    pub raw_query: Option<String>,
    pub path: String,
    pub remote_addr: SocketAddr,
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    pub segments: Vec<String>,
    pub form: HashMap<String, String>,
    pub json: Map<String, Value>,
    pub body: Bytes,
}

/// Consumes the request, reading its body in full. Per §4.7, body parsing
/// is only attempted for methods that customarily carry one; a parse
/// failure never fails the request, it just leaves the corresponding map
/// empty.
pub async fn extract<B>(req: Request<B>, remote_addr: SocketAddr) -> ExtractedRequest
where
    B: Body<Data = Bytes> + Send,
    B::Error: std::fmt::Display,
{
    let (parts, body) = req.into_parts();

    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            log::warn!("failed to read request body: {err}");
            Bytes::new()
        }
    };

    let raw_uri = parts.uri.to_string();
    let raw_query = parts.uri.query().map(str::to_string);
    let path = layerfs::normalize(parts.uri.path());
    let segments = path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let query = parts
        .uri
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    let content_type = parts
        .headers
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let can_have_body = matches!(parts.method, Method::POST | Method::PUT | Method::PATCH);

    let mut json = Map::new();
    let mut form = HashMap::new();

    if can_have_body {
        if content_type.starts_with("application/json") {
            if let Ok(Value::Object(map)) = serde_json::from_slice(&body_bytes) {
                json = map;
            }
        } else {
            form = parse_form_body(&content_type, &body_bytes).await;
        }
    }

    ExtractedRequest {
        method: parts.method,
        raw_uri,
        raw_query,
        path,
        remote_addr,
        headers: parts.headers,
        query,
        segments,
        form,
        json,
        body: body_bytes,
    }
}

async fn parse_form_body(content_type: &str, body: &Bytes) -> HashMap<String, String> {
    if let Ok(boundary) = multer::parse_boundary(content_type) {
        return parse_multipart(body.clone(), boundary).await;
    }

    if content_type.starts_with("application/x-www-form-urlencoded") || content_type.is_empty() {
        return url::form_urlencoded::parse(body).into_owned().collect();
    }

    HashMap::new()
}

async fn parse_multipart(body: Bytes, boundary: String) -> HashMap<String, String> {
    let stream = futures::stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);
    let mut out = HashMap::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                log::debug!("multipart parse error, stopping early: {err}");
                break;
            }
        };

        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match field.bytes().await {
            Ok(bytes) => {
                out.insert(name, String::from_utf8_lossy(&bytes).into_owned());
            }
            Err(err) => log::debug!("failed to read multipart field {name}: {err}"),
        }
    }

    out
}
