use std::{fs::File, io::{Seek, Write}, path::{Path, PathBuf}, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use reqwest::{blocking::{Client, RequestBuilder}, redirect::Policy};
use tempfile::NamedTempFile;

const USER_AGENT: &str = concat!("streetnets/", env!("CARGO_PKG_VERSION"));

/// Write-then-rename wrapper for atomic big-file outputs
pub(crate) struct PendingWrite {
    target: PathBuf,
    tmp: Option<(NamedTempFile, bool)>, // (file, need_fsync_dir)
}

impl PendingWrite {
    /// Open a file for a big write.
    pub(crate) fn open(target: &Path, force: bool) -> Result<Self> {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
        if !force && target.exists() {
            bail!("Refusing to overwrite existing file: {}", target.display());
        }
        let need_fsync_dir = target.parent().is_some();
        let tmp = NamedTempFile::new_in(target.parent().unwrap_or(Path::new(".")))
            .context("create temp file")?;

        Ok(Self { target: target.to_path_buf(), tmp: Some((tmp, need_fsync_dir)) })
    }

    /// Finalize the big write.
    pub(crate) fn finalize(&mut self) -> Result<()> {
        let (tmp, need_fsync_dir) = self.tmp.take()
            .ok_or_else(|| anyhow!("{} was already finalized", self.target.display()))?;
        tmp.as_file().sync_all().ok(); // best-effort fsync file
        tmp.persist(&self.target)
            .with_context(|| format!("rename to {}", self.target.display()))?;
        if need_fsync_dir {
            if let Some(dir) = self.target.parent() {
                let _ = File::open(dir).and_then(|f| f.sync_all());
            }
        }
        Ok(())
    }

    fn file(&mut self) -> std::io::Result<&mut NamedTempFile> {
        self.tmp.as_mut()
            .map(|(file, _)| file)
            .ok_or_else(|| std::io::Error::other("write after finalize"))
    }
}

impl Write for PendingWrite {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file()?.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.file()?.flush()
    }
}

impl Seek for PendingWrite {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        self.file()?.as_file_mut().seek(pos)
    }
}

/// Replace `target` with `bytes` in one rename.
pub(crate) fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let mut sink = PendingWrite::open(target, true)?;
    sink.write_all(bytes).with_context(|| format!("write {}", target.display()))?;
    sink.finalize()
}

/// Blocking HTTP client shared by the pipeline's network stages.
pub(crate) fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(Policy::limited(10))
        .timeout(timeout)
        .build()
        .context("build http client")
}

fn with_auth(request: RequestBuilder, auth: Option<(&str, &str)>) -> RequestBuilder {
    match auth {
        Some((user, password)) => request.basic_auth(user, Some(password)),
        None => request,
    }
}

/// Download `url` to `out_path` through a temp file, optionally with basic auth.
///
/// Authenticated downloads first resolve the redirect chain and then request
/// the final location again with credentials, since credentials are dropped
/// on cross-host redirects.
pub(crate) fn download_file(client: &Client, url: &str, out_path: &Path, auth: Option<(&str, &str)>) -> Result<()> {
    let mut sink = PendingWrite::open(out_path, true)?;

    let mut resp = with_auth(client.get(url), auth).send()
        .with_context(|| format!("GET {url}"))?;
    if auth.is_some() && resp.url().as_str() != url {
        let location = resp.url().clone();
        resp = with_auth(client.get(location.clone()), auth).send()
            .with_context(|| format!("GET {location}"))?;
    }
    let mut resp = resp.error_for_status()
        .with_context(|| format!("GET {url} returned error status"))?;

    std::io::copy(&mut resp, &mut sink).with_context(|| format!("write {}", out_path.display()))?;

    sink.finalize()?;
    Ok(())
}
