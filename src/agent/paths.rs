use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Confines every requested path to the configured data root.
///
/// Normalization is component-level: root, prefix, and parent-dir segments
/// are dropped before joining, so the resolved path is a descendant of the
/// data root by construction and resolving twice yields the same path.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, requested: &str) -> PathBuf {
        let mut clean = PathBuf::new();
        for component in Path::new(requested).components() {
            match component {
                Component::Normal(seg) => clean.push(seg),
                Component::ParentDir => {
                    clean.pop();
                }
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }

        // A leading reference to the root directory name is redundant:
        // "data/report.txt" and "report.txt" mean the same file.
        let rel = match self.root.file_name() {
            Some(root_name) if clean.starts_with(root_name) => clean
                .strip_prefix(root_name)
                .map(Path::to_path_buf)
                .unwrap_or(clean),
            _ => clean,
        };

        self.root.join(rel)
    }

    pub async fn read(&self, requested: &str) -> std::io::Result<String> {
        fs::read_to_string(self.resolve(requested)).await
    }

    pub async fn read_bytes(&self, requested: &str) -> std::io::Result<Vec<u8>> {
        fs::read(self.resolve(requested)).await
    }

    pub async fn write(&self, requested: &str, contents: &str) -> std::io::Result<()> {
        let full = self.resolve(requested);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut f = fs::File::create(&full).await?;
        f.write_all(contents.as_bytes()).await?;
        Ok(())
    }

    pub fn exists(&self, requested: &str) -> bool {
        self.resolve(requested).exists()
    }
}
