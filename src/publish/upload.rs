use std::{collections::BTreeSet, fs::File, io, path::{Path, PathBuf}, thread, time::{Duration, Instant}};

use anyhow::{Context, Result, anyhow, bail, ensure};
use log::{info, warn};
use quick_xml::{Reader, events::Event};
use reqwest::{StatusCode, blocking::{Client, multipart}};
use serde::Deserialize;
use serde_json::{Value, json};
use tempfile::NamedTempFile;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

use crate::common::{http_client, md5_file};
use crate::config::{Config, DataverseKeys, Keys};

use super::stage::{Format, formats};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_PAUSE: Duration = Duration::from_secs(10);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(1200);

/// Description template and tags shown for each uploaded file of a format.
fn file_labels(format: &str) -> (&'static str, [&'static str; 3]) {
    match format {
        "graphml" => (
            "Zip file contains GraphML files of all the urban street networks in {}.",
            ["GraphML", "Street Network", "Models"],
        ),
        "geojson" => (
            "Zip file contains GeoJSON files of all the urban street networks in {}.",
            ["GeoJSON", "Street Network", "Models"],
        ),
        _ => (
            "Zip file contains node/edge list CSV files of all the urban street networks in {}.",
            ["Node/Edge List", "Street Network", "Models"],
        ),
    }
}

// ---------------------------------------------------------------------------
// Naming and payloads
// ---------------------------------------------------------------------------

/// Name of a staged zip on the server: `france-FRA.zip` -> `france-FRA_graphml.zip`.
pub fn server_filename(staged: &Path, format: &str) -> Result<String> {
    let stem = staged.file_stem().and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("[upload] Invalid staged file name {}", staged.display()))?;
    Ok(format!("{stem}_{format}.zip"))
}

/// Display name of a staged zip's country: `cote_d_ivoire-CIV.zip` -> `Cote D Ivoire`.
pub fn country_name(file_name: &str) -> String {
    let stem = file_name.strip_suffix(".zip").unwrap_or(file_name);
    let country = stem.rsplit_once('-').map_or(stem, |(country, _)| country);
    let mut out = String::with_capacity(country.len());
    let mut word_start = true;
    for c in country.replace('_', " ").chars() {
        if word_start { out.extend(c.to_uppercase()) } else { out.extend(c.to_lowercase()) }
        word_start = !c.is_alphabetic();
    }
    out
}

/// The `jsonData` form field: description and tags, both naming the country.
pub fn upload_payload(format: &str, file_name: &str) -> Value {
    let (description, tags) = file_labels(format);
    let country = country_name(file_name);
    let mut categories: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
    categories.push(country.clone());
    json!({ "description": description.replace("{}", &country), "categories": categories })
}

/// Wrap a staged zip in another zip so the repository, which unpacks one
/// level of zip on upload, keeps the staged file whole.
pub fn wrap_in_zip(staged: &Path, entry_name: &str) -> Result<NamedTempFile> {
    let mut outer = NamedTempFile::new().context("[upload] Failed to create temp file")?;
    {
        let mut zip = ZipWriter::new(outer.as_file_mut());
        zip.start_file(entry_name, SimpleFileOptions::default().compression_method(CompressionMethod::Stored))?;
        let mut file = File::open(staged).with_context(|| format!("[upload] Failed to open {}", staged.display()))?;
        io::copy(&mut file, &mut zip)?;
        zip.finish()?;
    }
    Ok(outer)
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DataFile {
    #[serde(default)]
    filename: String,
    #[serde(default)]
    md5: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    #[serde(rename = "dataFile")]
    data_file: DataFile,
}

#[derive(Debug, Deserialize)]
struct AddedFiles {
    files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

impl<T> ApiResponse<T> {
    fn into_data(self) -> Result<Option<T>> {
        match self.status.as_deref() {
            Some("OK") | None => Ok(self.data),
            Some(status) => bail!("[upload] Server returned {status}: {}", self.message.unwrap_or_default()),
        }
    }
}

/// File names listed in a dataset version's files response.
pub fn parse_file_list(body: &str) -> Result<BTreeSet<String>> {
    let response: ApiResponse<Vec<FileEntry>> = serde_json::from_str(body).context("[upload] Invalid file list")?;
    Ok(response.into_data()?.unwrap_or_default().into_iter().map(|f| f.data_file.filename).collect())
}

/// Server checksum of the file added by an upload.
pub fn parse_added_md5(body: &str) -> Result<String> {
    let response: ApiResponse<AddedFiles> = serde_json::from_str(body).context("[upload] Invalid upload response")?;
    response.into_data()?
        .and_then(|data| data.files.into_iter().next())
        .and_then(|f| f.data_file.md5)
        .ok_or_else(|| anyhow!("[upload] Upload response has no checksum"))
}

/// `(file_id, file_name)` of every entry in a SWORD statement feed. Entry
/// ids end in `.../{file_id}/{file_name}`.
pub fn parse_statement(xml: &str) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let (mut in_entry, mut in_id) = (false, false);
    let mut files = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) => match e.local_name().as_ref() {
                b"entry" => in_entry = true,
                b"id" => in_id = in_entry,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"entry" => in_entry = false,
                b"id" => in_id = false,
                _ => {}
            },
            Event::Text(t) if in_id => {
                let id = t.unescape()?;
                let mut parts = id.rsplit('/');
                match (parts.next(), parts.next()) {
                    (Some(name), Some(file_id)) => files.push((file_id.to_string(), name.to_string())),
                    _ => bail!("[upload] Unexpected statement entry id {id:?}"),
                }
            }
            _ => {}
        }
    }
    Ok(files)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Dataverse native API and SWORD client for one installation.
pub struct Dataverse {
    host: String,
    api_key: String,
    client: Client,
}

impl Dataverse {
    pub fn new(keys: &DataverseKeys) -> Result<Self> {
        Ok(Self {
            host: keys.host.trim_end_matches('/').to_string(),
            api_key: keys.api_key.clone(),
            client: http_client(UPLOAD_TIMEOUT)?,
        })
    }

    /// Names of the files in a dataset's draft version.
    pub fn draft_filenames(&self, doi: &str) -> Result<BTreeSet<String>> {
        let url = format!("{}/api/v1/datasets/:persistentId/versions/:draft/files", self.host);
        let body = self.client.get(&url)
            .query(&[("key", self.api_key.as_str()), ("persistentId", doi)])
            .send()
            .with_context(|| format!("[upload] Failed to list draft files of {doi}"))?
            .text()?;
        parse_file_list(&body)
    }

    /// Delete every file in a dataset's draft version. Returns the number deleted.
    pub fn delete_draft_files(&self, doi: &str) -> Result<usize> {
        let sword = format!("{}/dvn/api/data-deposit/v1.1/swordv2", self.host);
        let resp = self.client.get(format!("{sword}/statement/study/{doi}"))
            .basic_auth(&self.api_key, None::<&str>)
            .send()
            .with_context(|| format!("[upload] Failed to get statement of {doi}"))?;
        ensure!(resp.status() == StatusCode::OK, "[upload] Statement of {doi} returned {}", resp.status());

        let files = parse_statement(&resp.text()?)?;
        info!("[upload] There are {} files to delete in {doi}", files.len());
        let start = Instant::now();
        for (file_id, name) in &files {
            let resp = self.client.delete(format!("{sword}/edit-media/file/{file_id}"))
                .basic_auth(&self.api_key, None::<&str>)
                .send()
                .with_context(|| format!("[upload] Failed to delete {name}"))?;
            ensure!(resp.status() == StatusCode::NO_CONTENT, "[upload] Deleting {name} returned {}", resp.status());
            info!("[upload] Deleted {name}");
        }
        info!("[upload] Deleted {} files in {:.0} seconds", files.len(), start.elapsed().as_secs_f64());
        Ok(files.len())
    }

    /// Upload one staged zip and check the server's checksum against ours.
    pub fn upload(&self, doi: &str, staged: &Path, format: &str) -> Result<()> {
        let file_name = staged.file_name().and_then(|s| s.to_str())
            .ok_or_else(|| anyhow!("[upload] Invalid staged file name {}", staged.display()))?;
        let server_name = server_filename(staged, format)?;
        let md5 = md5_file(staged)?;
        let outer = wrap_in_zip(staged, &server_name)?;

        let form = multipart::Form::new()
            .text("jsonData", upload_payload(format, file_name).to_string())
            .part("file", multipart::Part::file(outer.path())?.file_name(format!("{server_name}.zip")));
        let url = format!("{}/api/v1/datasets/:persistentId/add", self.host);

        info!("[upload] Uploading {} to {doi}", staged.display());
        let start = Instant::now();
        let resp = self.client.post(&url)
            .query(&[("persistentId", doi), ("key", self.api_key.as_str())])
            .multipart(form)
            .send()
            .with_context(|| format!("[upload] Failed to upload {}", staged.display()))?;
        let status = resp.status();
        let server_md5 = parse_added_md5(&resp.text()?)?;
        ensure!(server_md5 == md5, "[upload] Checksums do not match: {md5} and {server_md5}");
        info!("[upload] Response {status} in {:.1} seconds and checksums match", start.elapsed().as_secs_f64());
        Ok(())
    }

    /// `upload` with up to `MAX_ATTEMPTS` attempts, pausing after each failure.
    pub fn upload_with_retry(&self, doi: &str, staged: &Path, format: &str) -> Result<()> {
        let mut last_error = anyhow!("[upload] No attempts made");
        for attempt in 1..=MAX_ATTEMPTS {
            match self.upload(doi, staged, format) {
                Ok(()) => return Ok(()),
                Err(e) => last_error = e,
            }
            warn!("[upload] {last_error:#}");
            thread::sleep(RETRY_PAUSE);
            if attempt < MAX_ATTEMPTS {
                info!("[upload] Retrying (attempt {} of {MAX_ATTEMPTS})", attempt + 1);
            }
        }
        Err(last_error.context(format!("[upload] Giving up on {}", staged.display())))
    }
}

/// Outcome of an upload run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: Vec<PathBuf>,
}

fn staged_zips(format: &Format) -> Result<Vec<PathBuf>> {
    let mut zips: Vec<PathBuf> = std::fs::read_dir(&format.staging)
        .with_context(|| format!("[upload] Failed to list {}", format.staging.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|e| e == "zip"))
        .collect();
    zips.sort();
    Ok(zips)
}

/// Upload every staged zip not yet in its dataset's draft, optionally
/// clearing the drafts first. Files that fail every attempt are reported,
/// not fatal.
pub fn upload_files(config: &Config, keys: &Keys, delete_existing: bool) -> Result<UploadReport> {
    let dataverse_keys = keys.dataverse.as_ref()
        .ok_or_else(|| anyhow!("[upload] Missing dataverse section in keys file"))?;
    let dataverse = Dataverse::new(dataverse_keys)?;
    let start = Instant::now();

    let mut targets = Vec::new();
    for format in formats(config) {
        match dataverse_keys.dois.get(format.name) {
            Some(doi) => targets.push((format, doi.as_str())),
            None => warn!("[upload] No DOI configured for {}, skipping", format.name),
        }
    }

    if delete_existing {
        for (_, doi) in &targets { dataverse.delete_draft_files(doi)?; }
    }

    let mut report = UploadReport::default();
    for (format, doi) in &targets {
        let existing = dataverse.draft_filenames(doi)?;
        info!("[upload] {} files already in the draft of {doi}", existing.len());
        for staged in staged_zips(format)? {
            if existing.contains(&server_filename(&staged, format.name)?) {
                info!("[upload] Already uploaded {}", staged.display());
                report.skipped += 1;
                continue;
            }
            match dataverse.upload_with_retry(doi, &staged, format.name) {
                Ok(()) => report.uploaded += 1,
                Err(e) => {
                    warn!("{e:#}");
                    report.failed.push(staged);
                }
            }
        }
    }

    info!(
        "[upload] Uploaded {}, skipped {}, failed {} in {:.0} seconds",
        report.uploaded, report.skipped, report.failed.len(), start.elapsed().as_secs_f64(),
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zip::ZipArchive;

    #[test]
    fn names_and_payloads() {
        let staged = Path::new("/staging/nelist/cote_d_ivoire-CIV.zip");
        assert_eq!(server_filename(staged, "nelist").unwrap(), "cote_d_ivoire-CIV_nelist.zip");
        assert_eq!(country_name("cote_d_ivoire-CIV.zip"), "Cote D Ivoire");
        assert_eq!(country_name("united_states-USA.zip"), "United States");

        let payload = upload_payload("graphml", "iraq-IRQ.zip");
        assert_eq!(payload["description"], "Zip file contains GraphML files of all the urban street networks in Iraq.");
        assert_eq!(payload["categories"], json!(["GraphML", "Street Network", "Models", "Iraq"]));
    }

    #[test]
    fn staged_zip_is_wrapped_whole() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("iraq-IRQ.zip");
        std::fs::write(&staged, b"inner zip bytes").unwrap();

        let outer = wrap_in_zip(&staged, "iraq-IRQ_graphml.zip").unwrap();
        let mut archive = ZipArchive::new(File::open(outer.path()).unwrap()).unwrap();
        assert_eq!(archive.len(), 1);
        let mut entry = archive.by_name("iraq-IRQ_graphml.zip").unwrap();
        let mut bytes = Vec::new();
        io::Read::read_to_end(&mut entry, &mut bytes).unwrap();
        assert_eq!(bytes, b"inner zip bytes");
    }

    #[test]
    fn api_responses() {
        let list = r#"{"status":"OK","data":[{"dataFile":{"filename":"a_graphml.zip","md5":"x"}},{"dataFile":{"filename":"b_graphml.zip"}}]}"#;
        let names = parse_file_list(list).unwrap();
        assert!(names.contains("a_graphml.zip") && names.contains("b_graphml.zip"));
        assert!(parse_file_list(r#"{"status":"OK","data":[]}"#).unwrap().is_empty());

        let added = r#"{"status":"OK","data":{"files":[{"dataFile":{"filename":"a.zip","md5":"abc123"}}]}}"#;
        assert_eq!(parse_added_md5(added).unwrap(), "abc123");
        let refused = r#"{"status":"ERROR","message":"Dataset is locked"}"#;
        assert!(parse_added_md5(refused).unwrap_err().to_string().contains("Dataset is locked"));
    }

    #[test]
    fn statement_entries() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <id>https://host/dvn/api/data-deposit/v1.1/swordv2/statement/study/doi:10.7910/DVN/X</id>
  <entry>
    <id>https://host/dvn/api/data-deposit/v1.1/swordv2/edit-media/file/123/iraq-IRQ_graphml.zip</id>
  </entry>
  <entry>
    <id>https://host/dvn/api/data-deposit/v1.1/swordv2/edit-media/file/456/peru-PER_graphml.zip</id>
  </entry>
</feed>"#;
        assert_eq!(parse_statement(xml).unwrap(), [
            ("123".to_string(), "iraq-IRQ_graphml.zip".to_string()),
            ("456".to_string(), "peru-PER_graphml.zip".to_string()),
        ]);
        assert!(parse_statement("<feed><id>x</id></feed>").unwrap().is_empty());
    }
}
