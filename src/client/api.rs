use crate::api::handlers::files::{FileRecord, UploadResponse};
use crate::utils::naming::sanitize_filename;
use futures::{StreamExt, TryStreamExt};
use percent_encoding::percent_decode_str;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_DISPOSITION, HeaderMap};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Server returned {status}: {message}")]
    Server { status: StatusCode, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid server URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Transfer cancelled")]
    Cancelled,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP client for the file-sharing API.
#[derive(Clone)]
pub struct FileShareClient {
    http: reqwest::Client,
    base_url: Url,
}

impl FileShareClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(base_url)?;
        // Relative joins below must append to the path, not replace its last segment
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path)?)
    }

    /// Shareable link for a file; what "Copy Link" hands out.
    pub fn download_url(&self, file_id: &str) -> Result<Url, ClientError> {
        let mut url = self.endpoint("api/files/")?;
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .push(file_id)
            .push("download");
        Ok(url)
    }

    pub async fn list_files(&self) -> Result<Vec<FileRecord>, ClientError> {
        let response = self.http.get(self.endpoint("api/files")?).send().await?;
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Upload one file as the multipart `file` field.
    ///
    /// `on_progress` receives `(bytes_sent, total_bytes)` as the body is
    /// streamed. Cancelling `cancel` drops the in-flight request.
    pub async fn upload<F>(
        &self,
        path: &Path,
        on_progress: F,
        cancel: CancellationToken,
    ) -> Result<UploadResponse, ClientError>
    where
        F: Fn(u64, Option<u64>) + Send + Sync + 'static,
    {
        let url = self.endpoint("api/files/upload")?;
        let file = tokio::fs::File::open(path).await?;
        let total = file.metadata().await?.len();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unnamed")
            .to_string();

        let sent = Arc::new(AtomicU64::new(0));
        let stream = ReaderStream::new(file).inspect_ok(move |chunk| {
            let len = chunk.len() as u64;
            let so_far = sent.fetch_add(len, Ordering::Relaxed) + len;
            on_progress(so_far, Some(total));
        });

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(stream), total)
            .file_name(file_name);
        let form = Form::new().part("file", part);

        let work = async {
            let response = self.http.post(url).multipart(form).send().await?;
            let response = Self::check_status(response).await?;
            Ok::<_, ClientError>(response.json::<UploadResponse>().await?)
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            result = work => result,
        }
    }

    /// Download a file into `dest_dir` under the server-suggested name.
    ///
    /// Existing files are never replaced: a clash picks `name (1).ext`,
    /// `name (2).ext` and so on. A failed transfer leaves nothing behind.
    pub async fn download(&self, file_id: &str, dest_dir: &Path) -> Result<PathBuf, ClientError> {
        let response = self.http.get(self.download_url(file_id)?).send().await?;
        let response = Self::check_status(response).await?;

        let suggested = suggested_filename(response.headers()).unwrap_or_else(|| file_id.to_string());
        let (mut out, dest) = create_unique(dest_dir, &sanitize_filename(&suggested)).await?;

        let written = async {
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                out.write_all(&chunk?).await?;
            }
            out.flush().await?;
            Ok::<_, ClientError>(())
        }
        .await;

        if let Err(e) = written {
            drop(out);
            let _ = tokio::fs::remove_file(&dest).await;
            return Err(e);
        }

        Ok(dest)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string(),
        };
        Err(ClientError::Server { status, message })
    }
}

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// `report.pdf` -> `report (n).pdf`; dotfiles and extensionless names get the
/// suffix at the end.
fn numbered_name(name: &str, n: u32) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{} ({}).{}", stem, n, ext),
        _ => format!("{} ({})", name, n),
    }
}

async fn create_unique(dir: &Path, name: &str) -> Result<(tokio::fs::File, PathBuf), ClientError> {
    for n in 0..MAX_NAME_ATTEMPTS {
        let candidate = if n == 0 {
            dir.join(name)
        } else {
            dir.join(numbered_name(name, n))
        };
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(file) => return Ok((file, candidate)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("No free file name for {} in {}", name, dir.display()),
    )
    .into())
}

/// Pull the download name out of `Content-Disposition`, preferring the
/// RFC 5987 `filename*` form.
pub fn suggested_filename(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;

    let mut plain = None;
    for param in value.split(';').map(str::trim) {
        if let Some(encoded) = param.strip_prefix("filename*=") {
            let encoded = encoded
                .strip_prefix("UTF-8''")
                .or_else(|| encoded.strip_prefix("utf-8''"))
                .unwrap_or(encoded);
            if let Ok(decoded) = percent_decode_str(encoded).decode_utf8() {
                return Some(decoded.into_owned());
            }
        } else if let Some(name) = param.strip_prefix("filename=") {
            plain = Some(name.trim_matches('"').to_string());
        }
    }
    plain.filter(|n| !n.is_empty())
}
