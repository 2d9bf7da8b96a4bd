//! Reader for the read-only, compiled-in image backing `Origin::Embed`.
//!
//! The image itself is built at compile time by the top-level crate's
//! `build.rs` (which walks a directory and `bincode`-serializes an
//! `ImageNode` tree) and handed to `Vfs::add_embedded`/`add_embedded_dir` as
//! a `&EmbeddedImage` produced by `EmbeddedImage::load`. `layerfs` only
//! needs to know how to deserialize and navigate that tree; it has no
//! opinion on how the bytes were produced.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A directory tree of files, as captured at compile time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ImageNode {
    File(Vec<u8>),
    Dir(BTreeMap<String, ImageNode>),
}

impl ImageNode {
    pub fn dir(children: BTreeMap<String, ImageNode>) -> Self {
        ImageNode::Dir(children)
    }

    pub fn file(bytes: impl Into<Vec<u8>>) -> Self {
        ImageNode::File(bytes.into())
    }
}

/// A deserialized embedded image, ready to be queried by slash-separated
/// image-relative path (distinct from virtual paths — an image may be
/// mounted at any virtual prefix).
pub struct EmbeddedImage {
    root: ImageNode,
}

impl EmbeddedImage {
    /// Deserialize an image from the bytes produced by the build script.
    pub fn load(bytes: &[u8]) -> Result<Self> {
        let root: ImageNode = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map(|(node, _)| node)
            .map_err(|err| Error::invalid_argument(format!("corrupt embedded image: {err}")))?;
        Ok(EmbeddedImage { root })
    }

    pub fn from_root(root: ImageNode) -> Self {
        EmbeddedImage { root }
    }

    /// Look up bytes at a slash-separated path within the image, e.g.
    /// `"demos/hello.lua"`.
    pub fn read(&self, fs_path: &str) -> Result<&[u8]> {
        let mut node = &self.root;
        for segment in fs_path.split('/').filter(|s| !s.is_empty()) {
            match node {
                ImageNode::Dir(children) => {
                    node = children
                        .get(segment)
                        .ok_or_else(|| Error::not_found(fs_path))?;
                }
                ImageNode::File(_) => return Err(Error::not_found(fs_path)),
            }
        }
        match node {
            ImageNode::File(bytes) => Ok(bytes),
            ImageNode::Dir(_) => Err(Error::invalid_argument(format!(
                "{fs_path} is a directory in the embedded image"
            ))),
        }
    }

    /// List every file path (slash-separated, relative to `fs_dir`) under a
    /// directory in the image, for `add_embedded_dir`.
    pub fn list_dir(&self, fs_dir: &str) -> Result<Vec<String>> {
        let mut node = &self.root;
        for segment in fs_dir.split('/').filter(|s| !s.is_empty()) {
            match node {
                ImageNode::Dir(children) => {
                    node = children
                        .get(segment)
                        .ok_or_else(|| Error::not_found(fs_dir))?;
                }
                ImageNode::File(_) => return Err(Error::not_found(fs_dir)),
            }
        }

        let mut out = Vec::new();
        collect_files(node, String::new(), &mut out);
        Ok(out)
    }
}

fn collect_files(node: &ImageNode, prefix: String, out: &mut Vec<String>) {
    match node {
        ImageNode::File(_) => out.push(prefix),
        ImageNode::Dir(children) => {
            for (name, child) in children {
                let next_prefix = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}/{name}")
                };
                collect_files(child, next_prefix, out);
            }
        }
    }
}
