//! Globals Prelude (§4.10): the one always-available asset the dispatcher
//! guarantees exists in every VFS before it serves anything. Registration
//! is idempotent — materializing it again on every request would be wrong,
//! so this checks first.

use layerfs::{EmbeddedImage, Vfs};

/// Virtual path the prelude lives at. Leading underscore keeps it out of
/// the way of anything a mounted source tree or embedded demo might name.
pub const PRELUDE_VIRTUAL_PATH: &str = "/_prelude/globals.php";

const PRELUDE_IMAGE_PATH: &str = "prelude/globals.php";

/// Ensures `vpath` resolves inside `vfs`, registering it from `image` on
/// first use. Returns the host path the interpreter should prepend.
pub fn ensure_prelude(vfs: &Vfs, image: &EmbeddedImage) -> layerfs::Result<std::path::PathBuf> {
    if !vfs.file_exists(PRELUDE_VIRTUAL_PATH) {
        vfs.add_embedded(image, PRELUDE_IMAGE_PATH, PRELUDE_VIRTUAL_PATH)?;
    }
    vfs.resolve_path(PRELUDE_VIRTUAL_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use layerfs::ImageNode;
    use std::collections::BTreeMap;

    fn sample_image() -> EmbeddedImage {
        let mut prelude = BTreeMap::new();
        prelude.insert("globals.php".to_string(), ImageNode::file(b"<?php // globals\n".to_vec()));
        let mut root = BTreeMap::new();
        root.insert("prelude".to_string(), ImageNode::dir(prelude));
        EmbeddedImage::from_root(ImageNode::dir(root))
    }

    #[test]
    fn registers_prelude_once() {
        let tmp = tempfile::tempdir().unwrap();
        let vfs = Vfs::new(tmp.path(), false).unwrap();
        let image = sample_image();

        let first = ensure_prelude(&vfs, &image).unwrap();
        assert!(first.exists());

        let second = ensure_prelude(&vfs, &image).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn prelude_is_visible_to_branches() {
        let tmp = tempfile::tempdir().unwrap();
        let parent = Vfs::new(tmp.path(), false).unwrap();
        let image = sample_image();
        ensure_prelude(&parent, &image).unwrap();

        let child = parent.branch().unwrap();
        assert!(child.file_exists(PRELUDE_VIRTUAL_PATH));
    }
}
