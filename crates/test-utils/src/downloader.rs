use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use vmflow::download::{ConsoleFile, FileDownloader};

/// Downloader that keeps every file in memory.
#[derive(Default)]
pub struct RecordingDownloader {
    files: Mutex<Vec<ConsoleFile>>,
    fail: Mutex<bool>,
}

impl RecordingDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> Vec<ConsoleFile> {
        self.files.lock().unwrap().clone()
    }

    /// Make every following download fail.
    pub fn fail_downloads(&self) {
        *self.fail.lock().unwrap() = true;
    }
}

impl FileDownloader for RecordingDownloader {
    fn download(&self, file: ConsoleFile) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if *self.fail.lock().unwrap() {
                return Err(anyhow!("download of {} refused", file.file_name));
            }
            self.files.lock().unwrap().push(file);
            Ok(())
        })
    }
}
