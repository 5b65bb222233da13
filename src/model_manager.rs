//! Local cache management for embedding model files.
//!
//! Model and tokenizer files are downloaded once into a cache directory and
//! verified on later runs against a SHA-256 checksum sidecar recorded at
//! download time, so a corrupted or truncated file is detected and replaced.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::models::{BuiltinModel, ModelInfo};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Download error: {0}")]
    DownloadError(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Downloaded {file_type} file failed verification after writing")]
    VerificationFailed { file_type: String },
}

/// Downloads and verifies embedding model files in a local cache directory.
#[derive(Clone)]
pub struct ModelManager {
    models_dir: PathBuf,
    download_lock: Arc<Mutex<()>>,
}

impl ModelManager {
    /// Creates a manager rooted at the default models directory.
    pub fn new_default() -> io::Result<Self> {
        Self::new(Self::get_default_models_dir())
    }

    /// Resolves the default models directory: the `NEWSCAT_CACHE` environment
    /// variable, then the platform cache directory, then `~/.cache`, then the
    /// system temp directory.
    pub fn get_default_models_dir() -> PathBuf {
        if let Ok(path) = env::var("NEWSCAT_CACHE") {
            return PathBuf::from(path).join("models");
        }

        if let Some(cache_dir) = dirs::cache_dir() {
            return cache_dir.join("newscat").join("models");
        }

        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".cache").join("newscat").join("models");
        }

        env::temp_dir().join("newscat").join("models")
    }

    pub fn new<P: AsRef<Path>>(models_dir: P) -> io::Result<Self> {
        let models_dir = models_dir.as_ref().to_path_buf();
        fs::create_dir_all(&models_dir)?;
        Ok(Self {
            models_dir,
            download_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn get_model_path(&self, model: BuiltinModel) -> PathBuf {
        self.models_dir.join(model.get_model_info().name).join("model.onnx")
    }

    pub fn get_tokenizer_path(&self, model: BuiltinModel) -> PathBuf {
        self.models_dir.join(model.get_model_info().name).join("tokenizer.json")
    }

    pub fn is_model_downloaded(&self, model: BuiltinModel) -> bool {
        let model_path = self.get_model_path(model);
        let tokenizer_path = self.get_tokenizer_path(model);
        log::debug!(
            "Cache check: model {:?} (exists: {}), tokenizer {:?} (exists: {})",
            model_path,
            model_path.exists(),
            tokenizer_path,
            tokenizer_path.exists()
        );
        model_path.exists() && tokenizer_path.exists()
    }

    /// Downloads model and tokenizer files, reusing any existing file that
    /// still matches its recorded checksum.
    pub async fn download_model(&self, model: BuiltinModel) -> Result<(), ModelError> {
        let info = model.get_model_info();
        let _lock = self.download_lock.lock().await;

        log::info!(
            "Fetching {} (~{} MB)",
            info.name,
            model.characteristics().model_size_mb
        );
        let model_dir = self.models_dir.join(info.name);
        fs::create_dir_all(&model_dir)?;

        let model_path = self.get_model_path(model);
        let model_result = self.fetch_or_reuse(&info, &model_path, FileKind::Model).await;

        let tokenizer_path = self.get_tokenizer_path(model);
        let tokenizer_result = self
            .fetch_or_reuse(&info, &tokenizer_path, FileKind::Tokenizer)
            .await;

        match (model_result, tokenizer_result) {
            (Ok(()), Ok(())) => {
                log::info!("Model and tokenizer ready in {:?}", model_dir);
                Ok(())
            }
            (Err(e), _) | (_, Err(e)) => {
                log::error!("Model setup failed: {}", e);
                let _ = self.remove_download(model);
                Err(e)
            }
        }
    }

    async fn fetch_or_reuse(
        &self,
        info: &ModelInfo,
        path: &Path,
        kind: FileKind,
    ) -> Result<(), ModelError> {
        if path.exists() {
            match self.verify_file(path, kind) {
                Ok(true) => {
                    log::info!("Reusing verified {} file at {:?}", kind.as_str(), path);
                    return Ok(());
                }
                Ok(false) => {
                    log::warn!(
                        "{} file at {:?} failed checksum verification, redownloading",
                        kind.as_str(),
                        path
                    );
                }
                Err(e) => return Err(e),
            }
        }
        self.download_file(kind.url(info), path, kind).await
    }

    async fn download_file(
        &self,
        url: &str,
        path: &Path,
        kind: FileKind,
    ) -> Result<(), ModelError> {
        log::info!("Downloading {} file from {}", kind.as_str(), url);
        let response = reqwest::get(url).await?.error_for_status()?;
        let bytes = response.bytes().await?;
        log::info!("Downloaded {} bytes", bytes.len());

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &bytes)?;
        fs::write(checksum_path(path), sha256_hex(&bytes))?;

        if !self.verify_file(path, kind)? {
            return Err(ModelError::VerificationFailed {
                file_type: kind.as_str().to_string(),
            });
        }

        log::info!("{} file downloaded and verified", kind.as_str());
        Ok(())
    }

    fn verify_file(&self, path: &Path, kind: FileKind) -> Result<bool, ModelError> {
        let sidecar = checksum_path(path);
        if !sidecar.exists() {
            log::debug!("No checksum recorded for {:?}", path);
            return Ok(false);
        }
        let expected = fs::read_to_string(&sidecar)?.trim().to_string();
        let actual = sha256_hex(&fs::read(path)?);
        if expected != actual {
            log::warn!(
                "Checksum mismatch for {} file: recorded {}, got {}",
                kind.as_str(),
                expected,
                actual
            );
        }
        Ok(expected == actual)
    }

    /// Verifies both files against their recorded checksums.
    pub fn verify_model(&self, model: BuiltinModel) -> Result<bool, ModelError> {
        let model_path = self.get_model_path(model);
        let tokenizer_path = self.get_tokenizer_path(model);

        if !model_path.exists() || !tokenizer_path.exists() {
            return Ok(false);
        }

        let model_ok = self.verify_file(&model_path, FileKind::Model)?;
        let tokenizer_ok = self.verify_file(&tokenizer_path, FileKind::Tokenizer)?;
        Ok(model_ok && tokenizer_ok)
    }

    pub fn remove_download(&self, model: BuiltinModel) -> Result<(), ModelError> {
        for path in [self.get_model_path(model), self.get_tokenizer_path(model)] {
            if path.exists() {
                fs::remove_file(&path)?;
            }
            let sidecar = checksum_path(&path);
            if sidecar.exists() {
                fs::remove_file(&sidecar)?;
            }
        }
        Ok(())
    }

    /// Downloads the model if missing, and re-downloads it if verification
    /// fails.
    pub async fn ensure_model_downloaded(&self, model: BuiltinModel) -> Result<(), ModelError> {
        if !self.is_model_downloaded(model) {
            log::info!("Model {:?} not found in cache, downloading", model);
            self.download_model(model).await?;
        } else if !self.verify_model(model)? {
            log::info!("Model {:?} failed verification, re-downloading", model);
            self.remove_download(model)?;
            self.download_model(model).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum FileKind {
    Model,
    Tokenizer,
}

impl FileKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Tokenizer => "tokenizer",
        }
    }

    fn url<'a>(&self, info: &'a ModelInfo) -> &'a str {
        match self {
            Self::Model => info.model_url,
            Self::Tokenizer => info.tokenizer_url,
        }
    }
}

fn checksum_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".sha256");
    path.with_file_name(name)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_models_dir_honors_cache_env() {
        env::set_var("NEWSCAT_CACHE", "/tmp/newscat-test-cache");
        let path = ModelManager::get_default_models_dir();
        assert!(path.to_str().unwrap().contains("/tmp/newscat-test-cache/models"));
        env::remove_var("NEWSCAT_CACHE");

        let path = ModelManager::get_default_models_dir();
        assert!(path.to_str().unwrap().contains("newscat"));
    }

    #[test]
    fn checksum_sidecar_sits_next_to_file() {
        let path = Path::new("/tmp/newscat/models/all-MiniLM-L6-v2/model.onnx");
        assert_eq!(
            checksum_path(path),
            Path::new("/tmp/newscat/models/all-MiniLM-L6-v2/model.onnx.sha256")
        );
    }

    #[test]
    fn corrupted_file_fails_verification() -> Result<(), ModelError> {
        let manager = ModelManager::new("/tmp/newscat-test-verify/models")?;
        let model = BuiltinModel::MiniLM;
        let model_path = manager.get_model_path(model);
        fs::create_dir_all(model_path.parent().unwrap())?;

        fs::write(&model_path, b"model bytes")?;
        fs::write(checksum_path(&model_path), sha256_hex(b"model bytes"))?;
        assert!(manager.verify_file(&model_path, FileKind::Model)?);

        fs::write(&model_path, b"corrupted data")?;
        assert!(!manager.verify_file(&model_path, FileKind::Model)?);

        let _ = fs::remove_dir_all("/tmp/newscat-test-verify");
        Ok(())
    }

    #[tokio::test]
    #[ignore = "downloads model files over the network"]
    async fn download_round_trip() -> Result<(), ModelError> {
        let manager = ModelManager::new("/tmp/newscat-test-download/models")?;
        let model = BuiltinModel::MiniLM;

        manager.ensure_model_downloaded(model).await?;
        assert!(manager.is_model_downloaded(model));
        assert!(manager.verify_model(model)?);

        manager.remove_download(model)?;
        assert!(!manager.is_model_downloaded(model));
        Ok(())
    }
}
