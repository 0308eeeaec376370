//! NSSM executable provisioning.
//!
//! Resolution order: a copy already on PATH, then the newest version in the
//! local cache, then a fresh download. Discovery scrapes the upstream
//! download page — the CI build is preferred over the stable release, with
//! one hardcoded known-good version as the last resort — and only the
//! 64-bit executable is extracted from the archive into the version-keyed
//! cache directory.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::{info, warn};
use regex::Regex;

use crate::platform::windows::app_data_dir;

const DOWNLOAD_PAGE: &str = "https://nssm.cc/download";
const BASE_URL: &str = "https://nssm.cc";
const FALLBACK_VERSION: &str = "2.24";
const FALLBACK_URL: &str = "https://nssm.cc/release/nssm-2.24.zip";

pub struct NssmProvider {
    cache_dir: PathBuf,
}

impl Default for NssmProvider {
    fn default() -> Self {
        NssmProvider {
            cache_dir: app_data_dir().join("svcman").join("nssm"),
        }
    }
}

impl NssmProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_dir(cache_dir: PathBuf) -> Self {
        NssmProvider { cache_dir }
    }

    /// Path to a usable `nssm.exe`, downloading into the cache only when
    /// neither PATH nor the cache already has one.
    pub fn resolve(&self) -> Result<PathBuf> {
        if let Ok(on_path) = which::which("nssm.exe") {
            return Ok(on_path);
        }
        if let Some(cached) = self.find_cached() {
            return Ok(cached);
        }
        self.download_latest()
    }

    /// Newest cached version wins; a version directory without the
    /// executable (e.g. an interrupted extraction) is skipped.
    fn find_cached(&self) -> Option<PathBuf> {
        let entries = fs::read_dir(&self.cache_dir).ok()?;
        let mut versions: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        versions.sort();
        versions.into_iter().rev().find_map(|dir| {
            let exe = dir.join("nssm.exe");
            exe.exists().then_some(exe)
        })
    }

    fn download_latest(&self) -> Result<PathBuf> {
        let (version, url) = self.discover_release();
        info!("Downloading NSSM {version}...");

        let archive = reqwest::blocking::get(&url)
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("Failed to download NSSM from {url}"))?
            .bytes()
            .with_context(|| format!("Failed to read NSSM archive from {url}"))?;

        let version_dir = self.cache_dir.join(&version);
        fs::create_dir_all(&version_dir).with_context(|| {
            format!("Failed to create NSSM cache directory {}", version_dir.display())
        })?;

        let exe = version_dir.join("nssm.exe");
        extract_win64_exe(&archive, &exe)?;
        info!("Downloaded NSSM {version} to {}", exe.display());
        Ok(exe)
    }

    fn discover_release(&self) -> (String, String) {
        let page = reqwest::blocking::get(DOWNLOAD_PAGE)
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text());

        match page {
            Ok(page) => parse_download_page(&page).unwrap_or_else(|| {
                warn!("Could not parse an NSSM version from the download page, using fallback");
                fallback_release()
            }),
            Err(e) => {
                warn!("Failed to fetch the NSSM download page ({e}), using fallback version");
                fallback_release()
            }
        }
    }
}

fn fallback_release() -> (String, String) {
    (FALLBACK_VERSION.to_string(), FALLBACK_URL.to_string())
}

/// Pick the newest release reference off the download page. The CI build
/// (`/ci/nssm-X.zip`) is preferred over the stable release
/// (`/release/nssm-X.zip`) — it is the one recommended for current Windows.
pub(crate) fn parse_download_page(page: &str) -> Option<(String, String)> {
    let ci = Regex::new(r#"/ci/nssm-([^"]+)\.zip"#).ok()?;
    if let Some(captures) = ci.captures(page) {
        let version = &captures[1];
        return Some((version.to_string(), format!("{BASE_URL}/ci/nssm-{version}.zip")));
    }

    let release = Regex::new(r#"/release/nssm-([^"]+)\.zip"#).ok()?;
    let captures = release.captures(page)?;
    let version = &captures[1];
    Some((
        version.to_string(),
        format!("{BASE_URL}/release/nssm-{version}.zip"),
    ))
}

/// The archive ships win32 and win64 trees; only `win64/nssm.exe` is wanted.
fn extract_win64_exe(archive: &[u8], target: &Path) -> Result<()> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))
        .context("Failed to read the NSSM archive")?;

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .context("Failed to read an NSSM archive entry")?;
        let name = entry.name().to_string();
        if name.contains("win64") && name.ends_with("nssm.exe") {
            let mut out = fs::File::create(target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
            std::io::copy(&mut entry, &mut out)
                .with_context(|| format!("Failed to extract nssm.exe to {}", target.display()))?;
            return Ok(());
        }
    }

    bail!("could not find a win64 nssm.exe in the downloaded archive")
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOWNLOAD_PAGE_HTML: &str = r#"
        <h1>Download</h1>
        <p>The latest release build:</p>
        <a href="/release/nssm-2.24.zip">nssm 2.24</a>
        <p>Windows 10 Creators Update users should use the prerelease build:</p>
        <a href="/ci/nssm-2.24-101-g897c7ad.zip">nssm 2.24-101-g897c7ad</a>
    "#;

    #[test]
    fn page_parsing_prefers_the_ci_build() {
        let (version, url) = parse_download_page(DOWNLOAD_PAGE_HTML).unwrap();
        assert_eq!(version, "2.24-101-g897c7ad");
        assert_eq!(url, "https://nssm.cc/ci/nssm-2.24-101-g897c7ad.zip");
    }

    #[test]
    fn page_parsing_falls_back_to_the_stable_release() {
        let page = r#"<a href="/release/nssm-2.24.zip">nssm 2.24</a>"#;
        let (version, url) = parse_download_page(page).unwrap();
        assert_eq!(version, "2.24");
        assert_eq!(url, "https://nssm.cc/release/nssm-2.24.zip");
    }

    #[test]
    fn page_without_any_reference_yields_none() {
        assert_eq!(parse_download_page("<html>nothing useful</html>"), None);
    }

    #[test]
    fn cache_scan_prefers_the_newest_version_directory() {
        let dir = tempfile::tempdir().unwrap();
        for version in ["2.23", "2.24"] {
            let version_dir = dir.path().join(version);
            fs::create_dir_all(&version_dir).unwrap();
            fs::write(version_dir.join("nssm.exe"), b"exe").unwrap();
        }

        let provider = NssmProvider::with_cache_dir(dir.path().to_path_buf());
        let exe = provider.find_cached().unwrap();
        assert!(exe.ends_with(Path::new("2.24").join("nssm.exe")));
    }

    #[test]
    fn cache_scan_skips_directories_without_the_executable() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("2.25")).unwrap();
        let older = dir.path().join("2.24");
        fs::create_dir_all(&older).unwrap();
        fs::write(older.join("nssm.exe"), b"exe").unwrap();

        let provider = NssmProvider::with_cache_dir(dir.path().to_path_buf());
        let exe = provider.find_cached().unwrap();
        assert!(exe.starts_with(&older));
    }

    #[test]
    fn empty_cache_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let provider = NssmProvider::with_cache_dir(dir.path().join("missing"));
        assert_eq!(provider.find_cached(), None);
    }

    #[test]
    fn extraction_pulls_only_the_win64_entry() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options = SimpleFileOptions::default();
            writer
                .start_file("nssm-2.24/win32/nssm.exe", options)
                .unwrap();
            writer.write_all(b"32-bit").unwrap();
            writer
                .start_file("nssm-2.24/win64/nssm.exe", options)
                .unwrap();
            writer.write_all(b"64-bit").unwrap();
            writer.finish().unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nssm.exe");
        extract_win64_exe(&buf, &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"64-bit");
    }

    #[test]
    fn extraction_without_a_win64_entry_is_an_error() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
            writer
                .start_file("nssm-2.24/win32/nssm.exe", SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"32-bit").unwrap();
            writer.finish().unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        assert!(extract_win64_exe(&buf, &dir.path().join("nssm.exe")).is_err());
    }
}
