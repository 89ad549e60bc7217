//! Where a pull writes its layers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use eci_core::error::Result;
use eci_store::FileStore;

use crate::artifact::Role;

/// Pull destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every titled layer under this directory, at its title path
    Directory(PathBuf),
    /// Selected roles to explicit files; everything else is discarded
    Files {
        kernel: Option<PathBuf>,
        initrd: Option<PathBuf>,
        root: Option<PathBuf>,
    },
}

impl Target {
    /// Only the root disk, written to `path`.
    pub fn root_file(path: impl Into<PathBuf>) -> Self {
        Target::Files {
            kernel: None,
            initrd: None,
            root: Some(path.into()),
        }
    }

    /// File store implementing this target.
    pub fn ingester(&self) -> Result<FileStore> {
        match self {
            Target::Directory(dir) => FileStore::new(dir),
            Target::Files { .. } => {
                let routes: HashMap<String, PathBuf> = self
                    .routes()
                    .map(|(role, path)| (role.as_str().to_string(), path.to_path_buf()))
                    .collect();
                Ok(FileStore::with_roles(routes))
            }
        }
    }

    /// Path a layer with this role and title is written to.
    pub fn location(&self, role: Role, title: &str) -> Option<PathBuf> {
        match self {
            Target::Directory(dir) => Some(dir.join(title)),
            Target::Files { .. } => self
                .routes()
                .find(|(r, _)| *r == role)
                .map(|(_, path)| path.to_path_buf()),
        }
    }

    fn routes(&self) -> impl Iterator<Item = (Role, &Path)> {
        let routes = match self {
            Target::Directory(_) => [None, None, None],
            Target::Files {
                kernel,
                initrd,
                root,
            } => [
                kernel.as_deref().map(|p| (Role::Kernel, p)),
                initrd.as_deref().map(|p| (Role::Initrd, p)),
                root.as_deref().map(|p| (Role::RootDisk, p)),
            ],
        };
        routes.into_iter().flatten()
    }
}
