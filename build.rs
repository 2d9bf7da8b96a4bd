use std::collections::BTreeMap;
use std::env;
use std::io;
use std::path::{Path, PathBuf};

use fs_err as fs;
use layerfs::ImageNode;

fn image_from_fs_path(path: &Path) -> io::Result<ImageNode> {
    println!("cargo:rerun-if-changed={}", path.display());

    if path.is_dir() {
        let mut children = BTreeMap::new();

        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let file_name = entry.file_name().to_str().unwrap().to_owned();
            if file_name.starts_with('.') {
                continue;
            }
            children.insert(file_name, image_from_fs_path(&entry.path())?);
        }

        Ok(ImageNode::dir(children))
    } else {
        Ok(ImageNode::file(fs::read(path)?))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = PathBuf::from(env::var_os("OUT_DIR").unwrap());
    let manifest_dir = PathBuf::from(env::var_os("CARGO_MANIFEST_DIR").unwrap());
    let embed_dir = manifest_dir.join("embed");

    let root = image_from_fs_path(&embed_dir)?;
    let bytes = bincode::serde::encode_to_vec(&root, bincode::config::standard())?;
    fs::write(out_dir.join("embedded_image.bincode"), bytes)?;

    Ok(())
}
