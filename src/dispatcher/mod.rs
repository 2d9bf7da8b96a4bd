//! Script Dispatcher (§4.9): the state machine that turns a resolved
//! virtual script path and an extracted request into a call against the
//! interpreter hook, and that call's result into an HTTP response.

mod env;
mod extractor;
pub mod pattern;
mod prelude;

pub use extractor::{extract, ExtractedRequest};

use std::collections::HashMap;
use std::path::Path;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use layerfs::{EmbeddedImage, Vfs};
use serde_json::Value;

use crate::interpreter::ScriptInterpreter;

/// Everything the dispatcher needs beyond the VFS and the request itself.
pub struct DispatchContext<'a> {
    pub vfs: &'a Vfs,
    pub image: &'a EmbeddedImage,
    pub interpreter: &'a dyn ScriptInterpreter,
    /// Host directory to pull missing scripts in from, if configured (`--source`).
    pub source_dir: Option<&'a Path>,
}

/// Serves one request for the script at `script_vpath`. `path_params` are
/// whatever a caller's own route matching (`pattern::match_pattern`) bound
/// for this request; the dispatcher only consumes them, it doesn't compute
/// them, since route registration is a concern outside this module.
pub fn dispatch(
    ctx: &DispatchContext,
    script_vpath: &str,
    path_params: &HashMap<String, String>,
    render_data: &HashMap<String, Value>,
    request: &ExtractedRequest,
) -> Response<Full<Bytes>> {
    let prelude_path = match prelude::ensure_prelude(ctx.vfs, ctx.image) {
        Ok(path) => path,
        Err(err) => return server_error(format!("failed to materialize prelude: {err}")),
    };

    let resolved = match resolve_script(ctx, script_vpath) {
        Some(resolved) => resolved,
        None => return not_found(),
    };

    let wrapper_path = match build_wrapper(ctx.vfs, &resolved, &prelude_path) {
        Ok(path) => path,
        Err(err) => return server_error(format!("failed to build wrapper script: {err}")),
    };

    let document_root = match wrapper_path.parent() {
        Some(dir) => dir,
        None => return server_error("wrapper script has no parent directory".to_string()),
    };
    let script_name = format!("/_{}", layerfs::basename(&resolved.vpath));

    let environment = env::assemble(
        &wrapper_path,
        document_root,
        &script_name,
        request,
        path_params,
        render_data,
        &prelude_path,
    );

    match ctx.interpreter.serve(document_root, &wrapper_path, &environment, &request.body) {
        Ok(response) => translate(response),
        Err(err) => server_error(format!("interpreter failed: {err}")),
    }
}

struct Resolved {
    vpath: String,
    host_path: std::path::PathBuf,
}

/// Step 2 of §4.9: literal lookup, then a best-effort pull from the
/// configured source directory, then a `{param}`-aware sibling match.
fn resolve_script(ctx: &DispatchContext, script_vpath: &str) -> Option<Resolved> {
    let canonical = layerfs::normalize(script_vpath);

    if let Ok(host_path) = ctx.vfs.resolve_path(&canonical) {
        return Some(Resolved { vpath: canonical, host_path });
    }

    if let Some(source_dir) = ctx.source_dir {
        let candidate = source_dir.join(canonical.trim_start_matches('/'));
        if candidate.is_file() {
            if let Err(err) = ctx.vfs.add_source(&candidate, &canonical) {
                log::warn!("failed to pull {} in from source directory: {err}", canonical);
            } else if let Ok(host_path) = ctx.vfs.resolve_path(&canonical) {
                return Some(Resolved { vpath: canonical, host_path });
            }
        }
    }

    if canonical.contains('{') {
        if let Some(resolved) = resolve_via_sibling_match(ctx.vfs, &canonical) {
            return Some(resolved);
        }
    }

    None
}

fn resolve_via_sibling_match(vfs: &Vfs, canonical: &str) -> Option<Resolved> {
    let dir = layerfs::parent(canonical);
    let name = layerfs::basename(canonical);
    let regex = pattern::template_to_regex(name);

    let prefix = if dir == "/" { "/".to_string() } else { format!("{dir}/") };

    for candidate in vfs.list_files() {
        let Some(rest) = candidate.strip_prefix(&prefix) else { continue };
        if rest.contains('/') {
            continue;
        }
        if regex.is_match(rest) {
            if let Ok(host_path) = vfs.resolve_path(&candidate) {
                return Some(Resolved { vpath: candidate, host_path });
            }
        }
    }

    None
}

/// Step 4 of §4.9: a wrapper that requires the prelude, then the resolved
/// script, named `_<basename>` alongside the file it wraps.
fn build_wrapper(vfs: &Vfs, resolved: &Resolved, prelude_path: &Path) -> layerfs::Result<std::path::PathBuf> {
    let dir = layerfs::parent(&resolved.vpath);
    let name = layerfs::basename(&resolved.vpath);
    let wrapper_vpath = layerfs::join(&dir, &format!("_{name}"));

    let body = format!(
        "<?php\nrequire '{}';\nrequire '{}';\n",
        prelude_path.display(),
        resolved.host_path.display(),
    );

    vfs.create_virtual(&wrapper_vpath, body.into_bytes())?;
    vfs.resolve_path(&wrapper_vpath)
}

fn translate(response: crate::interpreter::InterpreterResponse) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    );
    for (name, value) in &response.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Full::new(Bytes::from(response.body)))
        .unwrap_or_else(|_| not_found())
}

fn not_found() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Full::new(Bytes::from_static(b"not found")))
        .unwrap()
}

fn server_error(message: String) -> Response<Full<Bytes>> {
    log::error!("dispatcher error: {message}");
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .body(Full::new(Bytes::from(message)))
        .unwrap()
}
