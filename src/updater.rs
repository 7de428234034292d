//! Fetch-and-place for bundled files (blacklists, engine archives).
//!
//! One parametrized operation: download `url`, then either replace the
//! destination file or unpack a zip archive into the destination folder.
//! Hooks run first so running binaries can be released before they are
//! overwritten.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

#[derive(thiserror::Error, Debug)]
pub enum UpdateError {
    #[error("pre-update hook failed: {0}")]
    Hook(String),

    #[error("download of {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("download of {url} failed with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid archive: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl UpdateError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Hook(_) => "UPDATE_HOOK_FAILED",
            Self::Network { .. } => "NETWORK_ERROR",
            Self::Status { .. } => "UPSTREAM_STATUS",
            Self::Io { .. } => "UPDATE_IO_ERROR",
            Self::Archive(_) => "UPDATE_ARCHIVE_INVALID",
        }
    }
}

#[async_trait]
pub trait PreUpdateHook: Send + Sync {
    /// Release whatever holds the files about to be replaced.
    async fn before_update(&self) -> anyhow::Result<()>;

    async fn after_update(&self, _placed: &PlacedUpdate) {}
}

#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub url: String,
    /// Target file, or target folder when `extract` is set.
    pub destination: PathBuf,
    pub extract: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlacedUpdate {
    pub destination: PathBuf,
    pub bytes: usize,
    /// Files written; 1 unless an archive was unpacked.
    pub files: usize,
}

pub async fn fetch_and_place(
    client: &reqwest::Client,
    request: &UpdateRequest,
    hook: Option<&dyn PreUpdateHook>,
) -> Result<PlacedUpdate, UpdateError> {
    if let Some(hook) = hook {
        hook.before_update()
            .await
            .map_err(|e| UpdateError::Hook(e.to_string()))?;
    }

    tracing::info!("Downloading {} → {}", request.url, request.destination.display());
    let bytes = download(client, &request.url).await?;

    let destination = request.destination.clone();
    let extract = request.extract;
    let placed = tokio::task::spawn_blocking(move || place(&bytes, &destination, extract))
        .await
        .map_err(|e| UpdateError::Io {
            path: request.destination.clone(),
            source: io::Error::new(io::ErrorKind::Other, e.to_string()),
        })??;

    tracing::info!(
        "Placed {} ({} bytes, {} file(s))",
        placed.destination.display(),
        placed.bytes,
        placed.files
    );
    if let Some(hook) = hook {
        hook.after_update(&placed).await;
    }
    Ok(placed)
}

async fn download(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, UpdateError> {
    let network = |e: reqwest::Error| UpdateError::Network {
        url: url.to_string(),
        message: e.to_string(),
    };
    let response = client.get(url).send().await.map_err(network)?;
    if !response.status().is_success() {
        return Err(UpdateError::Status {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }
    let bytes = response.bytes().await.map_err(network)?;
    Ok(bytes.to_vec())
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> UpdateError + '_ {
    move |source| UpdateError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Stage `bytes` in a temp file next to the destination, then move or
/// unpack it.
fn place(bytes: &[u8], destination: &Path, extract: bool) -> Result<PlacedUpdate, UpdateError> {
    let staging_dir = if extract {
        destination.to_path_buf()
    } else {
        destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    };
    std::fs::create_dir_all(&staging_dir).map_err(io_err(&staging_dir))?;

    let mut staged = tempfile::NamedTempFile::new_in(&staging_dir).map_err(io_err(&staging_dir))?;
    io::Write::write_all(&mut staged, bytes).map_err(io_err(staged.path()))?;

    if !extract {
        staged
            .persist(destination)
            .map_err(|e| UpdateError::Io {
                path: destination.to_path_buf(),
                source: e.error,
            })?;
        return Ok(PlacedUpdate {
            destination: destination.to_path_buf(),
            bytes: bytes.len(),
            files: 1,
        });
    }

    let files = extract_zip(staged.reopen().map_err(io_err(staged.path()))?, destination)?;
    Ok(PlacedUpdate {
        destination: destination.to_path_buf(),
        bytes: bytes.len(),
        files,
    })
}

fn extract_zip(file: std::fs::File, target_dir: &Path) -> Result<usize, UpdateError> {
    let mut archive = zip::ZipArchive::new(file)?;
    let mut written = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            tracing::warn!("Skipping archive entry with unsafe path: {}", entry.name());
            continue;
        };
        let out_path = target_dir.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(io_err(&out_path))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let mut outfile = std::fs::File::create(&out_path).map_err(io_err(&out_path))?;
        io::copy(&mut entry, &mut outfile).map_err(io_err(&out_path))?;
        written += 1;
    }
    Ok(written)
}
