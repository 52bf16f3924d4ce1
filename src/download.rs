// src/download.rs

//! File-download collaborator: where console connection files end up.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use anyhow::{Context, Result};
use tracing::info;

/// A connection file handed to the external console viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleFile {
    pub file_name: String,
    pub mime_type: String,
    pub contents: String,
}

/// Receives finished console files.
pub trait FileDownloader: Send + Sync {
    fn download(&self, file: ConsoleFile) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Writes console files into a directory.
#[derive(Debug, Clone)]
pub struct DirectoryDownloader {
    dir: PathBuf,
}

impl DirectoryDownloader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl FileDownloader for DirectoryDownloader {
    fn download(&self, file: ConsoleFile) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            tokio::fs::create_dir_all(&self.dir)
                .await
                .with_context(|| format!("creating download dir {:?}", self.dir))?;

            let path = self.dir.join(&file.file_name);
            tokio::fs::write(&path, file.contents.as_bytes())
                .await
                .with_context(|| format!("writing console file {:?}", path))?;

            info!(path = %path.display(), mime = %file.mime_type, "console file written");
            Ok(())
        })
    }
}
