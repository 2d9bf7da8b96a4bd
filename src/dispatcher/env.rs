//! Environment variable assembly (§6): turns an extracted request, bound
//! path parameters, and render data into the CGI-like environment map the
//! interpreter sees. Named `PHP_*` per the external interpreter's own
//! contract (§6's table), not because this crate implements PHP.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use super::extractor::ExtractedRequest;

const DEFAULT_MAX_EXECUTION_TIME_SECS: u64 = 30;
const DEFAULT_SOCKET_TIMEOUT_SECS: u64 = 30;

#[allow(clippy::too_many_arguments)]
pub fn assemble(
    wrapper_path: &Path,
    document_root: &Path,
    script_name: &str,
    request: &ExtractedRequest,
    path_params: &HashMap<String, String>,
    render_data: &HashMap<String, Value>,
    prelude_path: &Path,
) -> HashMap<String, String> {
    let mut env = HashMap::new();

    env.insert("SCRIPT_FILENAME".to_string(), wrapper_path.display().to_string());
    env.insert("SCRIPT_NAME".to_string(), script_name.to_string());
    env.insert("PHP_SELF".to_string(), script_name.to_string());
    env.insert("DOCUMENT_ROOT".to_string(), document_root.display().to_string());

    env.insert("REQUEST_URI".to_string(), request.raw_uri.clone());
    env.insert("REQUEST_METHOD".to_string(), request.method.as_str().to_string());
    env.insert("QUERY_STRING".to_string(), request.raw_query.clone().unwrap_or_default());

    if let Some(host) = request.headers.get(hyper::header::HOST).and_then(|v| v.to_str().ok()) {
        env.insert("HTTP_HOST".to_string(), host.to_string());
    }
    env.insert("REMOTE_ADDR".to_string(), request.remote_addr.ip().to_string());

    env.insert("PHP_PATH".to_string(), request.path.clone());
    for (i, segment) in request.segments.iter().enumerate() {
        env.insert(format!("PHP_PATH_SEGMENT_{i}"), segment.clone());
    }
    env.insert(
        "PHP_PATH_SEGMENT_COUNT".to_string(),
        request.segments.len().to_string(),
    );

    for (name, value) in path_params {
        env.insert(format!("PHP_PATH_PARAM_{name}"), value.clone());
    }
    if let Ok(encoded) = serde_json::to_string(path_params) {
        env.insert("PHP_PATH_PARAMS".to_string(), encoded);
    }

    for (name, value) in &request.query {
        env.insert(format!("PHP_QUERY_{name}"), value.clone());
    }
    for (name, value) in &request.form {
        env.insert(format!("PHP_FORM_{name}"), value.clone());
    }

    if let Ok(encoded) = serde_json::to_string(&request.json) {
        env.insert("PHP_JSON".to_string(), encoded);
    }
    for (key, value) in &request.json {
        if let Ok(encoded) = serde_json::to_string(value) {
            env.insert(format!("PHP_JSON_{key}"), encoded);
        }
    }

    for (name, value) in request.headers.iter() {
        if let Ok(value) = value.to_str() {
            env.insert(format!("PHP_HEADER_{}", header_env_name(name.as_str())), value.to_string());
        }
    }

    for (name, value) in render_data {
        if let Ok(encoded) = serde_json::to_string(value) {
            env.insert(format!("PHP_VAR_{name}"), encoded);
        }
    }

    env.insert("PHP_AUTO_PREPEND_FILE".to_string(), prelude_path.display().to_string());
    env.insert(
        "PHP_MAX_EXECUTION_TIME".to_string(),
        DEFAULT_MAX_EXECUTION_TIME_SECS.to_string(),
    );
    env.insert(
        "PHP_DEFAULT_SOCKET_TIMEOUT".to_string(),
        DEFAULT_SOCKET_TIMEOUT_SECS.to_string(),
    );

    env
}

fn header_env_name(name: &str) -> String {
    name.to_uppercase().replace('-', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::{HeaderMap, Method};
    use serde_json::Map;
    use std::net::SocketAddr;

    fn sample_request() -> ExtractedRequest {
        let mut headers = HeaderMap::new();
        headers.insert(hyper::header::HOST, "example.com".parse().unwrap());

        ExtractedRequest {
            method: Method::GET,
            raw_uri: "/widgets/42?color=red".to_string(),
            raw_query: Some("color=red".to_string()),
            path: "/widgets/42".to_string(),
            remote_addr: "127.0.0.1:9000".parse::<SocketAddr>().unwrap(),
            headers,
            query: HashMap::from([("color".to_string(), "red".to_string())]),
            segments: vec!["widgets".to_string(), "42".to_string()],
            form: HashMap::new(),
            json: Map::new(),
            body: bytes::Bytes::new(),
        }
    }

    #[test]
    fn assembles_path_and_segment_vars() {
        let request = sample_request();
        let params = HashMap::from([("id".to_string(), "42".to_string())]);
        let env = assemble(
            Path::new("/tmp/wrapper.php"),
            Path::new("/tmp"),
            "/_wrapper.php",
            &request,
            &params,
            &HashMap::new(),
            Path::new("/tmp/globals.php"),
        );

        assert_eq!(env["PHP_PATH"], "/widgets/42");
        assert_eq!(env["PHP_PATH_SEGMENT_0"], "widgets");
        assert_eq!(env["PHP_PATH_SEGMENT_1"], "42");
        assert_eq!(env["PHP_PATH_SEGMENT_COUNT"], "2");
        assert_eq!(env["PHP_PATH_PARAM_id"], "42");
        assert_eq!(env["PHP_QUERY_color"], "red");
        assert_eq!(env["HTTP_HOST"], "example.com");
        assert_eq!(env["SCRIPT_FILENAME"], "/tmp/wrapper.php");
    }

    #[test]
    fn json_render_data_and_headers_are_encoded() {
        let request = sample_request();
        let render_data = HashMap::from([("count".to_string(), Value::from(3))]);
        let env = assemble(
            Path::new("/tmp/wrapper.php"),
            Path::new("/tmp"),
            "/_wrapper.php",
            &request,
            &HashMap::new(),
            &render_data,
            Path::new("/tmp/globals.php"),
        );

        assert_eq!(env["PHP_VAR_count"], "3");
        assert_eq!(env["PHP_HEADER_HOST"], "example.com");
    }
}
