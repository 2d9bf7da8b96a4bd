//! `scriptserve serve` (§10.3): brings up a VFS, mounts configured source
//! directories at its root, and starts the HTTP listener.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use layerfs::{EmbeddedImage, Vfs};

use crate::interpreter::{EchoInterpreter, ScriptInterpreter};
use crate::server::Server;

const DEFAULT_BIND_ADDRESS: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);
const DEFAULT_PORT: u16 = 8080;

const SCRIPT_EXTENSIONS: &[&str] = &["php"];

static EMBEDDED_IMAGE_BYTES: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/embedded_image.bincode"));

/// Serves scripts out of a layered virtual filesystem over HTTP.
#[derive(Debug, Parser)]
pub struct ServeCommand {
    /// Host directory to mount read-write at the VFS root. May be given
    /// more than once; later mounts take precedence on path conflicts.
    #[clap(long = "source")]
    pub sources: Vec<PathBuf>,

    /// The IP address to listen on. Defaults to `127.0.0.1`.
    #[clap(long)]
    pub address: Option<IpAddr>,

    /// The port to listen on. Defaults to `8080`.
    #[clap(long)]
    pub port: Option<u16>,

    /// Enables the change detector's periodic disk re-hashing (§4.6).
    #[clap(long)]
    pub dev: bool,

    /// Serves the diagnostic echo interpreter (§10.6) instead of refusing
    /// to start. There is no real scripting engine in this crate; a real
    /// deployment embeds `scriptserve` as a library and supplies its own
    /// `ScriptInterpreter`.
    #[clap(long)]
    pub diagnostic: bool,
}

impl ServeCommand {
    pub fn run(self) -> anyhow::Result<()> {
        let interpreter: Arc<dyn ScriptInterpreter> = if self.diagnostic {
            Arc::new(EchoInterpreter)
        } else {
            bail!(
                "no ScriptInterpreter configured; pass --diagnostic to serve the echo \
                 interpreter, or embed scriptserve as a library with your own interpreter"
            );
        };

        let temp_root = std::env::temp_dir().join("scriptserve");
        let vfs = Vfs::new(&temp_root, self.dev).context("failed to create vfs")?;

        for source in &self.sources {
            vfs.add_source_dir(source, "/", SCRIPT_EXTENSIONS)
                .with_context(|| format!("failed to mount source directory {}", source.display()))?;
        }

        let image = Arc::new(
            EmbeddedImage::load(EMBEDDED_IMAGE_BYTES).context("failed to load embedded image")?,
        );

        let source_dir = self.sources.first().cloned();
        let server = Server::new(vfs, image, interpreter, source_dir);

        let ip = self.address.unwrap_or(DEFAULT_BIND_ADDRESS.into());
        let port = self.port.unwrap_or(DEFAULT_PORT);
        let address = SocketAddr::from((ip, port));

        let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
        runtime.block_on(async move {
            log::info!("listening on http://{address}");
            server.run(address).await
        })
    }
}
