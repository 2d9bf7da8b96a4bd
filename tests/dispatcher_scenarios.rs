//! End-to-end scenarios from SPEC_FULL.md §8, exercised through the public
//! crate API with an in-process mock interpreter instead of a real
//! scripting engine.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Mutex;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, StatusCode};
use layerfs::{EmbeddedImage, ImageNode, Vfs};
use scriptserve::interpreter::{InterpreterError, InterpreterResponse, ScriptInterpreter};
use scriptserve::{dispatch, extract, DispatchContext};

fn sample_image() -> EmbeddedImage {
    let mut prelude = BTreeMap::new();
    prelude.insert(
        "globals.php".to_string(),
        ImageNode::file(b"<?php // globals prelude\n".to_vec()),
    );
    let mut root = BTreeMap::new();
    root.insert("prelude".to_string(), ImageNode::dir(prelude));
    EmbeddedImage::from_root(ImageNode::dir(root))
}

fn addr() -> SocketAddr {
    "127.0.0.1:9001".parse().unwrap()
}

/// Records the environment it was invoked with and echoes the wrapper
/// script's contents back as the response body, so tests can assert both
/// on the assembled environment and on what the dispatcher actually wrote
/// to disk.
struct RecordingInterpreter {
    last_env: Mutex<Option<HashMap<String, String>>>,
}

impl RecordingInterpreter {
    fn new() -> Self {
        RecordingInterpreter {
            last_env: Mutex::new(None),
        }
    }
}

impl ScriptInterpreter for RecordingInterpreter {
    fn serve(
        &self,
        _document_root: &Path,
        script_filename: &Path,
        env: &HashMap<String, String>,
        _body: &[u8],
    ) -> Result<InterpreterResponse, InterpreterError> {
        *self.last_env.lock().unwrap() = Some(env.clone());
        let contents = std::fs::read_to_string(script_filename)
            .map_err(|err| InterpreterError::Failed(err.to_string()))?;
        Ok(InterpreterResponse::ok(contents))
    }
}

async fn extract_get(path_and_query: &str) -> scriptserve::ExtractedRequest {
    let req = Request::builder()
        .method("GET")
        .uri(path_and_query)
        .body(Full::new(Bytes::new()))
        .unwrap();
    extract(req, addr()).await
}

#[tokio::test]
async fn simple_virtual_read_is_dispatched() {
    let tmp = tempfile::tempdir().unwrap();
    let vfs = Vfs::new(tmp.path(), false).unwrap();
    vfs.create_virtual("/hello.php", b"<?php echo 'hi';".to_vec())
        .unwrap();

    let image = sample_image();
    let interpreter = RecordingInterpreter::new();
    let ctx = DispatchContext {
        vfs: &vfs,
        image: &image,
        interpreter: &interpreter,
        source_dir: None,
    };

    let request = extract_get("/hello.php").await;
    let response = dispatch(&ctx, "/hello.php", &HashMap::new(), &HashMap::new(), &request);

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn parent_child_shadowing_resolves_child_value() {
    let tmp = tempfile::tempdir().unwrap();
    let parent = Vfs::new(tmp.path(), false).unwrap();
    parent
        .create_virtual("/page.php", b"<?php echo 'parent';".to_vec())
        .unwrap();

    let child = parent.branch().unwrap();
    child
        .create_virtual("/page.php", b"<?php echo 'child';".to_vec())
        .unwrap();

    assert_eq!(child.get_content("/page.php").unwrap(), b"<?php echo 'child';");
    assert_eq!(parent.get_content("/page.php").unwrap(), b"<?php echo 'parent';");

    child.cleanup();
    parent.cleanup();
}

#[tokio::test]
async fn origin_preserving_copy_tracks_disk_changes() {
    let tmp = tempfile::tempdir().unwrap();
    let host_file = tmp.path().join("shared.php");
    std::fs::write(&host_file, "<?php // v1").unwrap();

    let vfs = Vfs::new(tmp.path().join("vfs-root"), true).unwrap();
    vfs.add_source(&host_file, "/shared.php").unwrap();
    vfs.copy("/shared.php", "/aliased.php", true).unwrap();

    std::fs::write(&host_file, "<?php // v2").unwrap();

    let start = std::time::Instant::now();
    loop {
        if vfs.get_content("/aliased.php").unwrap() == b"<?php // v2" {
            break;
        }
        assert!(start.elapsed() < std::time::Duration::from_secs(2), "disk change never observed");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    vfs.cleanup();
}

#[tokio::test]
async fn path_parameters_are_exposed_to_the_environment() {
    let tmp = tempfile::tempdir().unwrap();
    let vfs = Vfs::new(tmp.path(), false).unwrap();
    vfs.create_virtual("/widgets/{id}.php", b"<?php echo 'widget';".to_vec())
        .unwrap();

    let image = sample_image();
    let interpreter = RecordingInterpreter::new();
    let ctx = DispatchContext {
        vfs: &vfs,
        image: &image,
        interpreter: &interpreter,
        source_dir: None,
    };

    let request = extract_get("/widgets/42").await;
    let params = HashMap::from([("id".to_string(), "42".to_string())]);
    let response = dispatch(&ctx, "/widgets/{id}.php", &params, &HashMap::new(), &request);

    assert_eq!(response.status(), StatusCode::OK);
    let env = interpreter.last_env.lock().unwrap().clone().unwrap();
    assert_eq!(env["PHP_PATH_PARAM_id"], "42");
    assert_eq!(env["PHP_PATH_PARAMS"], "{\"id\":\"42\"}");
}

#[tokio::test]
async fn deferred_cleanup_waits_for_outstanding_branches() {
    let tmp = tempfile::tempdir().unwrap();
    let parent = Vfs::new(tmp.path(), false).unwrap();
    let child = parent.branch().unwrap();

    parent.cleanup();
    assert!(!parent.is_torn_down());

    child.cleanup();

    let start = std::time::Instant::now();
    while !parent.is_torn_down() {
        assert!(start.elapsed() < std::time::Duration::from_secs(2), "parent never torn down");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn dispatcher_wraps_target_with_prelude() {
    let tmp = tempfile::tempdir().unwrap();
    let vfs = Vfs::new(tmp.path(), false).unwrap();
    vfs.create_virtual("/target.php", b"<?php echo 'target';".to_vec())
        .unwrap();

    let image = sample_image();
    let interpreter = RecordingInterpreter::new();
    let ctx = DispatchContext {
        vfs: &vfs,
        image: &image,
        interpreter: &interpreter,
        source_dir: None,
    };

    let request = extract_get("/target.php").await;
    let response = dispatch(&ctx, "/target.php", &HashMap::new(), &HashMap::new(), &request);

    assert_eq!(response.status(), StatusCode::OK);

    let env = interpreter.last_env.lock().unwrap().clone().unwrap();
    assert_eq!(env["SCRIPT_NAME"], "/_target.php");
    assert_eq!(env["PHP_SELF"], "/_target.php");

    use http_body_util::BodyExt;
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8(body_bytes.to_vec()).unwrap();
    // The wrapper requires the prelude before the target script.
    assert!(body.contains("globals.php"));
    assert!(body.contains("target.php"));
}

#[tokio::test]
async fn missing_script_without_source_dir_is_404() {
    let tmp = tempfile::tempdir().unwrap();
    let vfs = Vfs::new(tmp.path(), false).unwrap();
    let image = sample_image();
    let interpreter = RecordingInterpreter::new();
    let ctx = DispatchContext {
        vfs: &vfs,
        image: &image,
        interpreter: &interpreter,
        source_dir: None,
    };

    let request = extract_get("/nope.php").await;
    let response = dispatch(&ctx, "/nope.php", &HashMap::new(), &HashMap::new(), &request);

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
