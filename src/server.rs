//! HTTP listener (§5), grounded on the grounding repository's `web::LiveServer`:
//! a plain `tokio` accept loop feeding each connection through `hyper`'s
//! HTTP/1 server, with one task per connection.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use layerfs::{EmbeddedImage, Vfs};
use tokio::net::TcpListener;

use crate::dispatcher::{self, DispatchContext};
use crate::interpreter::ScriptInterpreter;

pub struct Server {
    vfs: Vfs,
    image: Arc<EmbeddedImage>,
    interpreter: Arc<dyn ScriptInterpreter>,
    source_dir: Option<PathBuf>,
}

impl Server {
    pub fn new(
        vfs: Vfs,
        image: Arc<EmbeddedImage>,
        interpreter: Arc<dyn ScriptInterpreter>,
        source_dir: Option<PathBuf>,
    ) -> Self {
        Server {
            vfs,
            image,
            interpreter,
            source_dir,
        }
    }

    pub async fn run(self, address: SocketAddr) -> anyhow::Result<()> {
        let listener = TcpListener::bind(address).await?;
        let server = Arc::new(self);

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = Arc::clone(&server);

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let server = Arc::clone(&server);
                    async move { Ok::<_, Infallible>(server.handle(req, remote_addr).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    log::error!("error serving connection: {err}");
                }
            });
        }
    }

    /// Resolves the script for a request literally, at its own canonical
    /// path. Path-parameter binding (§4.8, §4.9 step 2) is fully wired
    /// through the dispatcher for embedders that call it with a templated
    /// script path directly; this binary has no route table of its own, so
    /// it always dispatches literally with an empty parameter set.
    async fn handle(
        &self,
        req: Request<Incoming>,
        remote_addr: SocketAddr,
    ) -> hyper::Response<http_body_util::Full<bytes::Bytes>> {
        let request = dispatcher::extract(req, remote_addr).await;
        let script_vpath = request.path.clone();

        let ctx = DispatchContext {
            vfs: &self.vfs,
            image: &self.image,
            interpreter: self.interpreter.as_ref(),
            source_dir: self.source_dir.as_deref(),
        };

        dispatcher::dispatch(&ctx, &script_vpath, &HashMap::new(), &HashMap::new(), &request)
    }
}
