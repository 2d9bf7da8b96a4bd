//! The scripting runtime itself is an opaque external collaborator (§9):
//! this module only defines the hook the dispatcher invokes and carries one
//! concrete, non-default implementation (§10.6) for diagnostics and tests.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InterpreterError {
    #[error("interpreter failed: {0}")]
    Failed(String),
}

/// What the interpreter hands back after running a script. The design
/// document describes this as writing "status, headers, and body to the
/// response writer directly"; here that writer is simply the return value,
/// which the dispatcher copies onto the outgoing `hyper::Response`.
#[derive(Debug, Clone)]
pub struct InterpreterResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl InterpreterResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        InterpreterResponse {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }
}

/// *(document-root, environment-map, request body) → response | error* (§6).
/// The dispatcher calls this once per request against the wrapper script's
/// document root; the real implementation is out of scope for this crate.
pub trait ScriptInterpreter: Send + Sync {
    fn serve(
        &self,
        document_root: &Path,
        script_filename: &Path,
        env: &HashMap<String, String>,
        body: &[u8],
    ) -> Result<InterpreterResponse, InterpreterError>;
}

/// Always-available, opt-in diagnostic interpreter: writes the assembled
/// environment back as a JSON response body instead of running anything.
/// Never wired in as the default in `serve` (§10.6) — it exists so the
/// dispatcher's environment assembly can be exercised end-to-end (both in
/// tests and by a curious operator) without a real scripting engine.
pub struct EchoInterpreter;

#[derive(Serialize)]
struct EchoBody<'a> {
    document_root: String,
    script_filename: String,
    env: &'a HashMap<String, String>,
    body_len: usize,
}

impl ScriptInterpreter for EchoInterpreter {
    fn serve(
        &self,
        document_root: &Path,
        script_filename: &Path,
        env: &HashMap<String, String>,
        body: &[u8],
    ) -> Result<InterpreterResponse, InterpreterError> {
        let payload = EchoBody {
            document_root: document_root.display().to_string(),
            script_filename: script_filename.display().to_string(),
            env,
            body_len: body.len(),
        };

        let json = serde_json::to_vec(&payload)
            .map_err(|err| InterpreterError::Failed(err.to_string()))?;

        Ok(InterpreterResponse {
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: json,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn echo_interpreter_reports_document_root_and_body_length() {
        let interpreter = EchoInterpreter;
        let mut env = HashMap::new();
        env.insert("PHP_PATH".to_string(), "/demos/hello.php".to_string());

        let response = interpreter
            .serve(
                Path::new("/tmp/vfs/files/demos"),
                &PathBuf::from("/tmp/vfs/files/demos/_hello.php"),
                &env,
                b"abc",
            )
            .unwrap();

        assert_eq!(response.status, 200);
        let decoded: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(decoded["body_len"], 3);
        assert_eq!(decoded["env"]["PHP_PATH"], "/demos/hello.php");
    }
}
