//! File transfer: listing, uploads and streamed downloads

use std::path::{Path, PathBuf};

use bytes::Bytes;
use http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, HeaderValue};
use http::Method;

use super::SessionManager;
use crate::error::{Error, Result};
use crate::multipart::MultipartForm;
use crate::transport::{Body, CONTENT_TYPE_OCTET_STREAM, Transport};

const FILES: &str = "files";

pub(super) fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidArgument(format!("no file name in {}", path.display())))
}

/// Last segment of a server-side resource name
fn base_name(resource: &str) -> &str {
    resource.rsplit('/').next().unwrap_or(resource)
}

async fn read_source(src: &Path) -> Result<Bytes> {
    source_len(src).await?;
    Ok(Bytes::from(tokio::fs::read(src).await?))
}

/// Size of an upload source, `FileNotFound` when it is missing
async fn source_len(src: &Path) -> Result<u64> {
    match tokio::fs::metadata(src).await {
        Ok(m) if m.is_file() => Ok(m.len()),
        Ok(_) => Err(Error::InvalidArgument(format!("{} is not a file", src.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::FileNotFound(src.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::InvalidArgument(format!("invalid header value: {value}")))
}

/// Make sure `dest` can be written: not a directory, parent present
async fn prepare_destination(dest: &Path) -> Result<()> {
    if tokio::fs::metadata(dest).await.is_ok_and(|m| m.is_dir()) {
        return Err(Error::InvalidArgument(format!(
            "{} is an existing directory",
            dest.display()
        )));
    }
    let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    match tokio::fs::metadata(parent).await {
        Ok(m) if m.is_dir() => Ok(()),
        Ok(_) => Err(Error::NotADirectory(parent.display().to_string())),
        Err(_) => {
            tokio::fs::create_dir_all(parent).await?;
            Ok(())
        }
    }
}

impl<T: Transport> SessionManager<T> {
    /// Names of the files the session has on the server
    pub async fn files(&self) -> Result<Vec<String>> {
        self.check_session()?;
        let data = self.get_request(FILES, None, None).await?.into_json()?;
        match data {
            serde_json::Value::Array(items) => Ok(items
                .into_iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect()),
            other => Err(Error::Protocol(format!("expected a file list, got: {other}"))),
        }
    }

    /// One URL per file the session has on the server
    pub async fn file_urls(&self) -> Result<Vec<String>> {
        Ok(self
            .files()
            .await?
            .iter()
            .map(|f| self.make_url(FILES, Some(f)))
            .collect())
    }

    /// Upload a file, overwriting any server copy with the same name
    pub async fn upload(&self, src: &Path, dst_name: Option<&str>) -> Result<Option<serde_json::Value>> {
        self.check_session()?;
        self.upload_file(src, dst_name, true).await
    }

    /// Single-part upload of `src`.
    ///
    /// `put` sends `PUT files/<name>`; otherwise the file is POSTed to
    /// `files/`. The destination name defaults to the source file name.
    pub async fn upload_file(
        &self,
        src: &Path,
        dst_name: Option<&str>,
        put: bool,
    ) -> Result<Option<serde_json::Value>> {
        let len = source_len(src).await?;
        let name = match dst_name.filter(|n| !n.is_empty()) {
            Some(n) => n.to_string(),
            None => file_name_of(src)?,
        };

        let (method, resource) = if put {
            (Method::PUT, Some(name.as_str()))
        } else {
            (Method::POST, None)
        };
        let mut request = self.build_request(method, Some(FILES), resource, None, None)?;
        request.headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
        request.headers.insert(
            CONTENT_DISPOSITION,
            header_value(&format!("attachment; filename={name}"))?,
        );

        tracing::info!(src = %src.display(), name = %name, bytes = len, "uploading file");
        let response = self
            .transact(request.body(Body::File {
                path: src.to_path_buf(),
                len,
            }))
            .await?;
        Ok(response.payload.as_json().cloned())
    }

    /// POST `src` as multipart/form-data to `resource`, after `form`'s fields
    pub async fn upload_multipart(
        &self,
        resource: &str,
        src: &Path,
        dst_name: Option<&str>,
        form: MultipartForm,
    ) -> Result<Option<serde_json::Value>> {
        let content = read_source(src).await?;
        let name = match dst_name.filter(|n| !n.is_empty()) {
            Some(n) => n.to_string(),
            None => file_name_of(src)?,
        };
        let data = form.encode(&name, &content);

        let mut request = self.build_request(Method::POST, None, Some(resource), None, None)?;
        request.headers.insert(CONTENT_LENGTH, HeaderValue::from(data.len() as u64));
        let response = self
            .transact(request.body(Body::Bytes {
                content_type: MultipartForm::content_type(),
                data,
            }))
            .await?;
        Ok(response.payload.as_json().cloned())
    }

    /// Stream a session file to local storage.
    ///
    /// Saves to `save_as` when given, else to the file's base name in the
    /// current directory. Returns the saved path and the byte count.
    pub async fn download(&self, name: &str, save_as: Option<&Path>) -> Result<(PathBuf, u64)> {
        self.check_session()?;
        let dest = match save_as {
            Some(p) => p.to_path_buf(),
            None => PathBuf::from(base_name(name)),
        };
        prepare_destination(&dest).await?;

        let request = self.build_request(
            Method::GET,
            Some(FILES),
            Some(name),
            None,
            Some(CONTENT_TYPE_OCTET_STREAM),
        )?;
        tracing::debug!(method = %request.method, url = %request.url, dest = %dest.display(), "download");
        let bytes = self
            .transport
            .download(request, &dest)
            .await
            .map_err(|e| Error::DownloadFailed {
                name: name.to_string(),
                source: Box::new(e),
            })?;
        Ok((dest, bytes))
    }

    /// Download every session file into `dst_dir` (default: current directory)
    pub async fn download_all(&self, dst_dir: Option<&Path>) -> Result<Vec<(PathBuf, u64)>> {
        let mut saved = Vec::new();
        for f in self.files().await? {
            let save_as = dst_dir.map(|d| d.join(base_name(&f)));
            saved.push(self.download(&f, save_as.as_deref()).await?);
        }
        Ok(saved)
    }
}
