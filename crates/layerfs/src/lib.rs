//! Layered virtual filesystem with origin-preserving copies, hierarchical
//! branching, and background change detection.
//!
//! A `Vfs` maps virtual, slash-separated paths to bytes drawn from one of
//! three backing kinds (`Origin`): a reference to a host-disk file, a blob
//! extracted once from a compiled-in read-only image, or bytes supplied
//! directly by a caller. A VFS can be branched: the child shadows or
//! tombstones paths from its parent without mutating it, and the parent's
//! temp directory is only torn down once every branch descended from it has
//! called `cleanup()`.

mod branch;
mod error;
mod hash;
mod id;
mod image;
mod origin;
mod path;
mod record;
mod vfs;
mod watch;

pub use error::{Error, Result};
pub use hash::FileHash;
pub use id::{InstanceId, VfsId};
pub use image::{EmbeddedImage, ImageNode};
pub use origin::Origin;
pub use path::{basename, join, normalize, parent, segments};
pub use record::{Backing, FileRecord};
pub use vfs::Vfs;
