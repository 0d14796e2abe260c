//! Local model storage: download and unpack the model archive once.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use tar::Archive;

use crate::error::{Error, Result};

/// Sentinel written only after a complete download and extraction.
pub const COMPLETE_MARKER: &str = ".complete";

/// Name of the temporary archive inside the model directory.
pub const ARCHIVE_NAME: &str = "model.tar.gz";

const CHUNK_SIZE: usize = 8192;

/// An open response body.
pub struct Download {
    /// Body length if the remote advertised one.
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

/// Remote fetch capability.
pub trait Fetch: Send + Sync {
    /// Open `url` for streaming.
    ///
    /// # Errors
    ///
    /// Returns a fetch error on transport failure or a non-success status.
    fn fetch(&self, url: &str) -> Result<Download>;
}

/// Time allowed to establish a connection to the model host.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking HTTP(S) fetcher.
///
/// Only connecting is bounded by a timeout; reading the body may take as long
/// as the archive needs.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    connect_timeout: Duration,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

impl HttpFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    fn client(&self) -> reqwest::Result<reqwest::blocking::Client> {
        reqwest::blocking::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(None)
            .build()
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Download> {
        let fetch_error = |source: reqwest::Error| Error::Fetch {
            url: url.to_string(),
            source,
        };

        let client = self.client().map_err(fetch_error)?;
        let response = client.get(url).send().map_err(fetch_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::FetchStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(Download {
            content_length: response.content_length(),
            body: Box::new(response),
        })
    }
}

/// Ensures a model directory exists locally, fetching it at most once.
pub struct ModelStore<F = HttpFetcher> {
    fetcher: F,
    show_progress: bool,
}

impl ModelStore<HttpFetcher> {
    /// Create a store backed by HTTP.
    #[must_use]
    pub fn new() -> Self {
        Self::with_fetcher(HttpFetcher::new())
    }
}

impl Default for ModelStore<HttpFetcher> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Fetch> ModelStore<F> {
    #[must_use]
    pub const fn with_fetcher(fetcher: F) -> Self {
        Self {
            fetcher,
            show_progress: false,
        }
    }

    /// Draw a progress bar while downloading.
    #[must_use]
    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Return `local_dir`, downloading and extracting `url` into it first if needed.
    ///
    /// A directory carrying the completion marker is trusted as-is and no
    /// network or disk writes happen. A directory without the marker is
    /// downloaded into again; files already in it are kept and archive
    /// entries overwrite same-named files.
    ///
    /// # Errors
    ///
    /// Returns a fetch error if the download fails, an archive error if the
    /// archive cannot be unpacked, or a model-directory error on local I/O failure.
    pub fn ensure_local<P: AsRef<Path>>(&self, url: &str, local_dir: P) -> Result<PathBuf> {
        let local_dir = local_dir.as_ref();

        if is_complete(local_dir) {
            tracing::debug!("Model directory {} already complete", local_dir.display());
            return Ok(local_dir.to_path_buf());
        }

        if local_dir.exists() {
            tracing::warn!(
                "Model directory {} is incomplete, downloading again",
                local_dir.display()
            );
        }

        fs::create_dir_all(local_dir).map_err(|source| dir_error(local_dir, source))?;

        let archive_path = local_dir.join(ARCHIVE_NAME);
        self.download(url, &archive_path)?;

        tracing::info!("Extracting model into {}", local_dir.display());
        extract_archive(&archive_path, local_dir)?;

        fs::remove_file(&archive_path).map_err(|source| dir_error(&archive_path, source))?;
        File::create(local_dir.join(COMPLETE_MARKER))
            .map_err(|source| dir_error(local_dir, source))?;

        tracing::info!("Model ready at {}", local_dir.display());
        Ok(local_dir.to_path_buf())
    }

    /// Stream `url` into `path` in fixed-size chunks.
    fn download(&self, url: &str, path: &Path) -> Result<u64> {
        tracing::info!("Downloading model from {url}");

        let Download {
            content_length,
            mut body,
        } = self.fetcher.fetch(url)?;

        let pb = if self.show_progress {
            progress_bar(content_length)
        } else {
            ProgressBar::hidden()
        };

        let mut file = File::create(path).map_err(|source| dir_error(path, source))?;
        let transfer_error = |source: std::io::Error| Error::Transfer {
            url: url.to_string(),
            source,
        };

        let mut buffer = [0u8; CHUNK_SIZE];
        let mut downloaded = 0u64;
        loop {
            let bytes_read = body.read(&mut buffer).map_err(transfer_error)?;
            if bytes_read == 0 {
                break;
            }
            file.write_all(&buffer[..bytes_read])
                .map_err(transfer_error)?;
            downloaded += bytes_read as u64;
            pb.set_position(downloaded);
        }
        file.flush().map_err(transfer_error)?;

        pb.finish_and_clear();
        tracing::info!("Downloaded {downloaded} bytes");
        Ok(downloaded)
    }
}

/// Whether `local_dir` holds a completely extracted model.
#[must_use]
pub fn is_complete(local_dir: &Path) -> bool {
    local_dir.join(COMPLETE_MARKER).is_file()
}

fn dir_error(path: &Path, source: std::io::Error) -> Error {
    Error::ModelDir {
        path: path.to_path_buf(),
        source,
    }
}

fn progress_bar(total: Option<u64>) -> ProgressBar {
    match total {
        Some(len) => {
            let pb = ProgressBar::new(len);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
                    )
                    .expect("valid template")
                    .progress_chars("#>-"),
            );
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {bytes} downloaded")
                    .expect("valid template"),
            );
            pb
        }
    }
}

/// Unpack a gzip-compressed tarball into `dest`.
fn extract_archive(archive_path: &Path, dest: &Path) -> Result<()> {
    let archive_error = |source: std::io::Error| Error::Archive {
        path: archive_path.to_path_buf(),
        source,
    };

    let file = File::open(archive_path).map_err(archive_error)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive.unpack(dest).map_err(archive_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn model_archive() -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let files: [(&str, &[u8]); 2] = [
            ("saved_model.onnx", b"graph"),
            ("variables/variables.index", b"weights"),
        ];
        for (name, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, contents).unwrap();
        }

        builder.into_inner().unwrap().finish().unwrap()
    }

    /// Serves a fixed payload, or a 404 for the first `failures` calls.
    struct StubFetcher {
        payload: Vec<u8>,
        failures: usize,
        calls: AtomicUsize,
    }

    impl StubFetcher {
        fn new(payload: Vec<u8>) -> Self {
            Self {
                payload,
                failures: 0,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing_first(payload: Vec<u8>, failures: usize) -> Self {
            Self {
                failures,
                ..Self::new(payload)
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Fetch for &StubFetcher {
        fn fetch(&self, url: &str) -> Result<Download> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(Error::FetchStatus {
                    url: url.to_string(),
                    status: 404,
                });
            }
            Ok(Download {
                content_length: Some(self.payload.len() as u64),
                body: Box::new(Cursor::new(self.payload.clone())),
            })
        }
    }

    #[test]
    fn test_cold_start_extracts_and_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("model");
        let fetcher = StubFetcher::new(model_archive());

        let path = ModelStore::with_fetcher(&fetcher)
            .ensure_local("https://example.invalid/model.tar.gz", &dir)
            .unwrap();

        assert_eq!(path, dir);
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(fs::read(dir.join("saved_model.onnx")).unwrap(), b"graph");
        assert!(dir.join("variables/variables.index").is_file());
        assert!(!dir.join(ARCHIVE_NAME).exists());
        assert!(is_complete(&dir));
    }

    #[test]
    fn test_second_call_does_not_fetch() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("model");
        let fetcher = StubFetcher::new(model_archive());
        let store = ModelStore::with_fetcher(&fetcher);

        store.ensure_local("https://example.invalid/m", &dir).unwrap();
        store.ensure_local("https://example.invalid/m", &dir).unwrap();

        assert_eq!(fetcher.calls(), 1);
    }

    #[test]
    fn test_complete_directory_is_trusted() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("model");
        fs::create_dir_all(&dir).unwrap();
        File::create(dir.join(COMPLETE_MARKER)).unwrap();
        let fetcher = StubFetcher::new(Vec::new());

        let path = ModelStore::with_fetcher(&fetcher)
            .ensure_local("https://example.invalid/m", &dir)
            .unwrap();

        assert_eq!(path, dir);
        assert_eq!(fetcher.calls(), 0);
    }

    #[test]
    fn test_failed_fetch_is_retried() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("model");
        let fetcher = StubFetcher::failing_first(model_archive(), 1);
        let store = ModelStore::with_fetcher(&fetcher);

        let err = store
            .ensure_local("https://example.invalid/missing", &dir)
            .unwrap_err();
        assert!(err.is_fetch());
        assert!(!is_complete(&dir));

        store
            .ensure_local("https://example.invalid/missing", &dir)
            .unwrap();
        assert_eq!(fetcher.calls(), 2);
        assert!(is_complete(&dir));
    }

    #[test]
    fn test_incomplete_directory_is_filled_in_place() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("model");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("notes.txt"), b"keep me").unwrap();
        fs::write(dir.join("saved_model.onnx"), b"truncated").unwrap();
        let fetcher = StubFetcher::new(model_archive());

        ModelStore::with_fetcher(&fetcher)
            .ensure_local("https://example.invalid/m", &dir)
            .unwrap();

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(fs::read(dir.join("notes.txt")).unwrap(), b"keep me");
        assert_eq!(fs::read(dir.join("saved_model.onnx")).unwrap(), b"graph");
        assert!(is_complete(&dir));
    }

    #[test]
    fn test_existing_files_survive_failed_fetch() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("mydata");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("precious.txt"), b"user data").unwrap();
        let fetcher = StubFetcher::failing_first(model_archive(), 1);

        let err = ModelStore::with_fetcher(&fetcher)
            .ensure_local("https://example.invalid/missing", &dir)
            .unwrap_err();

        assert!(matches!(err, Error::FetchStatus { status: 404, .. }));
        assert_eq!(fs::read(dir.join("precious.txt")).unwrap(), b"user data");
        assert!(!is_complete(&dir));
    }

    /// Yields some bytes, then fails as a dropped connection would.
    struct BrokenBody {
        sent: bool,
    }

    impl Read for BrokenBody {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.sent {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                ));
            }
            self.sent = true;
            let n = buf.len().min(16);
            buf[..n].fill(0x1f);
            Ok(n)
        }
    }

    struct BrokenFetcher;

    impl Fetch for BrokenFetcher {
        fn fetch(&self, _url: &str) -> Result<Download> {
            Ok(Download {
                content_length: Some(1 << 20),
                body: Box::new(BrokenBody { sent: false }),
            })
        }
    }

    #[test]
    fn test_interrupted_body_is_transfer_error() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("model");

        let err = ModelStore::with_fetcher(BrokenFetcher)
            .ensure_local("https://example.invalid/m", &dir)
            .unwrap_err();

        assert!(err.is_fetch());
        assert!(
            matches!(err, Error::Transfer { ref source, .. } if source.kind() == std::io::ErrorKind::ConnectionReset)
        );
        assert!(!is_complete(&dir));
    }

    #[test]
    fn test_http_client_builds_with_connect_timeout() {
        let fetcher = HttpFetcher::with_connect_timeout(Duration::from_secs(5));
        assert!(fetcher.client().is_ok());
        assert_eq!(HttpFetcher::new().connect_timeout, CONNECT_TIMEOUT);
    }

    #[test]
    fn test_corrupt_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("model");
        let fetcher = StubFetcher::new(b"definitely not gzip".to_vec());

        let err = ModelStore::with_fetcher(&fetcher)
            .ensure_local("https://example.invalid/m", &dir)
            .unwrap_err();

        assert!(err.is_archive());
        assert!(!is_complete(&dir));
    }
}
