//! Vocabulary download for vocabsync.
//!
//! Fetches a source URL, unpacks `.zip` (first entry) and `.gz` payloads, and
//! decodes the result as UTF-8 text.

use std::io::{Cursor, Read};
use std::time::Duration;

use reqwest::Client;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};
use url::Url;

use vocabsync_shared::{DownloadConfig, Result, VocabError};

/// User-Agent string for download requests.
const USER_AGENT: &str = concat!("vocabsync/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// HTTP behaviour for downloads.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub max_redirects: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from(&DownloadConfig::default())
    }
}

impl From<&DownloadConfig> for FetchOptions {
    fn from(config: &DownloadConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_redirects: config.max_redirects,
        }
    }
}

// ---------------------------------------------------------------------------
// Payload handling
// ---------------------------------------------------------------------------

/// How a downloaded payload is packed, decided by the URL path suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Zip,
    Gzip,
}

impl Compression {
    pub fn from_url(url: &Url) -> Self {
        let path = url.path().to_ascii_lowercase();
        if path.ends_with(".zip") {
            Self::Zip
        } else if path.ends_with(".gz") {
            Self::Gzip
        } else {
            Self::None
        }
    }
}

/// Unpack `bytes` and decode them as UTF-8.
pub fn decode_payload(bytes: &[u8], compression: Compression) -> Result<String> {
    let raw = match compression {
        Compression::None => bytes.to_vec(),
        Compression::Zip => first_zip_entry(bytes)?,
        Compression::Gzip => {
            let mut out = Vec::new();
            flate2::read::MultiGzDecoder::new(bytes)
                .read_to_end(&mut out)
                .map_err(|e| VocabError::Archive(format!("gzip: {e}")))?;
            out
        }
    };

    String::from_utf8(raw)
        .map_err(|e| VocabError::Archive(format!("payload is not valid UTF-8: {e}")))
}

fn first_zip_entry(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| VocabError::Archive(format!("zip: {e}")))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| VocabError::Archive(format!("zip entry {index}: {e}")))?;
        if entry.is_dir() {
            continue;
        }
        debug!(entry = entry.name(), "reading zip entry");
        let mut out = Vec::new();
        entry
            .read_to_end(&mut out)
            .map_err(|e| VocabError::Archive(format!("zip entry {index}: {e}")))?;
        return Ok(out);
    }

    Err(VocabError::Archive("zip archive has no file entries".into()))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// A downloaded and decoded vocabulary.
#[derive(Debug, Clone)]
pub struct Download {
    pub url: String,
    /// Decoded serialized graph.
    pub text: String,
    pub compression: Compression,
    /// Size of the response body as received.
    pub bytes: usize,
    /// SHA-256 of the response body as received.
    pub sha256: String,
}

/// HTTP client for vocabulary sources.
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(options: FetchOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(options.max_redirects))
            .timeout(options.timeout)
            .build()
            .map_err(|e| VocabError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Download `url`. Anything but HTTP 200 is an [`VocabError::HttpStatus`].
    #[instrument(skip_all, fields(url = %url))]
    pub async fn download(&self, url: &str) -> Result<Download> {
        let parsed = Url::parse(url)
            .map_err(|e| VocabError::validation(format!("invalid source URL '{url}': {e}")))?;

        let response = self
            .client
            .get(parsed.clone())
            .send()
            .await
            .map_err(|e| VocabError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(VocabError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| VocabError::Network(format!("{url}: body read failed: {e}")))?;

        let compression = Compression::from_url(&parsed);
        let text = decode_payload(&body, compression)?;
        let sha256 = sha256_hex(&body);

        info!(bytes = body.len(), ?compression, sha256 = %sha256, "downloaded vocabulary");
        Ok(Download {
            url: url.to_string(),
            text,
            compression,
            bytes: body.len(),
            sha256,
        })
    }
}
