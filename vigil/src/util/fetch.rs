//! Fetch input batches from a URL or the local filesystem.
use anyhow::Result;
use log::info;
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};
use vigil_core::{
    pipeline::{BatchFetcher, LocalFetcher},
    PipelineError,
};

/// File name used when the URL path does not end with one.
const DEFAULT_FILE_NAME: &str = "input.csv";

/// Downloads `http://` and `https://` sources, copies anything else from the local
/// filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpFetcher;

impl HttpFetcher {
    fn download(&self, url: &str, dest_dir: &Path) -> Result<PathBuf> {
        info!("Download file from {:?}", url);
        let external = |e: reqwest::Error| {
            PipelineError::ExternalService(format!("failed to download {}: {}", url, e))
        };
        let response = reqwest::blocking::get(url)
            .and_then(|r| r.error_for_status())
            .map_err(external)?;
        let file_name = response
            .url()
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_FILE_NAME)
            .to_string();
        let content = response.bytes().map_err(external)?;

        fs::create_dir_all(dest_dir).map_err(|e| PipelineError::storage(dest_dir, e))?;
        let path = dest_dir.join(file_name);
        let mut file = File::create(&path).map_err(|e| PipelineError::storage(&path, e))?;
        file.write_all(&content)
            .and_then(|_| file.flush())
            .map_err(|e| PipelineError::storage(&path, e))?;
        info!("Downloaded file as {:?}", path);
        Ok(path)
    }
}

impl BatchFetcher for HttpFetcher {
    fn fetch(&self, source: &str, dest_dir: &Path) -> Result<PathBuf> {
        if source.starts_with("http://") || source.starts_with("https://") {
            self.download(source, dest_dir)
        } else {
            LocalFetcher.fetch(source, dest_dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn local_paths_are_copied() -> Result<()> {
        let dir = TempDir::new("http_fetcher")?;
        let src = dir.path().join("batch.csv");
        fs::write(&src, "aa_000\n1.0\n")?;

        let dst = HttpFetcher.fetch(&src.to_string_lossy(), &dir.path().join("input"))?;
        assert_eq!(dst, dir.path().join("input").join("batch.csv"));
        assert_eq!(fs::read_to_string(dst)?, "aa_000\n1.0\n");
        Ok(())
    }

    #[test]
    fn unreachable_url_is_external_service_error() -> Result<()> {
        let dir = TempDir::new("http_fetcher")?;
        let err = HttpFetcher
            .fetch("http://127.0.0.1:9/batch.csv", dir.path())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::ExternalService(_))
        ));
        Ok(())
    }
}
