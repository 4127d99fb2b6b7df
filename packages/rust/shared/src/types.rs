//! Core domain types: ledger rows, vocabulary jobs, sheet updates and the
//! per-job error taxonomy.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Ledger row schema
// ---------------------------------------------------------------------------

/// Column positions of a ledger row, in sheet order.
pub mod column {
    pub const TITLE: usize = 0;
    pub const SOURCE_URL: usize = 1;
    pub const FILE_TYPE: usize = 2;
    pub const SHORT_NAME: usize = 3;
    pub const NAMESPACE: usize = 4;
    pub const READY: usize = 5;
    pub const GENERATED_NAMESPACE: usize = 6;
    pub const TRIPLE_COUNT: usize = 7;
    pub const ERROR_KIND: usize = 8;
    pub const ERROR_MESSAGE: usize = 9;
    pub const CATALOG_ENTRY: usize = 10;
}

/// Number of operator-filled input columns.
pub const INPUT_COLUMNS: usize = 6;

/// Total number of columns in a ledger row.
pub const ROW_WIDTH: usize = 11;

/// Header line used when exporting the ledger as a sheet.
pub const LEDGER_HEADER: [&str; ROW_WIDTH] = [
    "Title",
    "URL",
    "File Type",
    "Short Name",
    "Namespace",
    "Ready",
    "Generated Namespace",
    "Triple Count",
    "Error Type",
    "Error Message",
    "Skosmos Entry",
];

/// One raw row of the job ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    /// Zero-based position of the row in ledger order.
    pub position: usize,
    /// Cell values; trailing empty cells may be absent.
    pub cells: Vec<String>,
}

impl LedgerRow {
    pub fn new(position: usize, cells: Vec<String>) -> Self {
        Self { position, cells }
    }

    /// Cell value at `index`, or `""` when the row is shorter.
    pub fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map(String::as_str).unwrap_or("")
    }

    /// Write the output columns of `update` into this row, padding it to the
    /// full schema width first. Every output column is overwritten.
    pub fn apply(&mut self, update: &SheetUpdate) {
        if self.cells.len() < ROW_WIDTH {
            self.cells.resize(ROW_WIDTH, String::new());
        }
        self.cells[column::GENERATED_NAMESPACE] = update.namespace.clone().unwrap_or_default();
        self.cells[column::TRIPLE_COUNT] = update
            .triple_count
            .map(|c| c.to_string())
            .unwrap_or_default();
        self.cells[column::ERROR_KIND] = update
            .error
            .as_ref()
            .map(JobError::kind)
            .unwrap_or_default();
        self.cells[column::ERROR_MESSAGE] = update
            .error
            .as_ref()
            .map(JobError::message)
            .unwrap_or_default();
        self.cells[column::CATALOG_ENTRY] = update.catalog_entry.clone().unwrap_or_default();
    }
}

// ---------------------------------------------------------------------------
// VocabFormat
// ---------------------------------------------------------------------------

/// The RDF serializations a ledger row may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VocabFormat {
    RdfXml,
    Turtle,
    N3,
    NTriples,
}

impl VocabFormat {
    /// Map a ledger file-type token (`rdf`, `ttl`, `n3`, `nt`) to a format.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "rdf" => Some(Self::RdfXml),
            "ttl" => Some(Self::Turtle),
            "n3" => Some(Self::N3),
            "nt" => Some(Self::NTriples),
            _ => None,
        }
    }

    /// MIME type understood by the triple store.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::RdfXml => "application/rdf-xml",
            Self::Turtle => "application/x-turtle",
            Self::N3 => "text/n3; charset=utf-8",
            Self::NTriples => "application/n-triples",
        }
    }

    /// File extension used for local copies.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::RdfXml => "rdf",
            Self::Turtle => "ttl",
            Self::N3 => "n3",
            Self::NTriples => "nt",
        }
    }
}

impl std::fmt::Display for VocabFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

// ---------------------------------------------------------------------------
// VocabularyJob
// ---------------------------------------------------------------------------

/// The input side of one ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyJob {
    /// Position of the originating row.
    pub position: usize,
    /// Human-readable vocabulary title (also the scheme label).
    pub title: String,
    /// Where the serialized vocabulary is downloaded from.
    pub source_url: String,
    /// Declared file-type token, validated by the pipeline.
    pub file_type: String,
    /// Short identifier used for catalog entries and local file names.
    pub short_name: String,
    /// Operator-declared namespace, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Whether the row is flagged ready (`y`).
    pub ready: bool,
}

impl VocabularyJob {
    /// Read the input columns of a row.
    ///
    /// A row must carry exactly the schema's columns; any other width is a
    /// `Missing Input` error and the row is never downloaded.
    pub fn from_row(row: &LedgerRow) -> std::result::Result<Self, JobError> {
        let found = row.cells.len();
        if found != ROW_WIDTH {
            return Err(JobError::MissingInput {
                found,
                expected: ROW_WIDTH,
            });
        }

        let namespace = row.cell(column::NAMESPACE).trim();
        Ok(Self {
            position: row.position,
            title: row.cell(column::TITLE).trim().to_string(),
            source_url: row.cell(column::SOURCE_URL).trim().to_string(),
            file_type: row.cell(column::FILE_TYPE).trim().to_string(),
            short_name: row.cell(column::SHORT_NAME).trim().to_string(),
            namespace: (!namespace.is_empty()).then(|| namespace.to_string()),
            ready: row.cell(column::READY).trim().eq_ignore_ascii_case("y"),
        })
    }
}

// ---------------------------------------------------------------------------
// JobError
// ---------------------------------------------------------------------------

/// Why a single vocabulary job failed. Never aborts the batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobError {
    #[error("invalid file type '{token}'")]
    InvalidMimeType { token: String },

    #[error("download failed: {message}")]
    Download {
        status: Option<u16>,
        message: String,
    },

    #[error("could not parse vocabulary: {message}")]
    Parse { message: String },

    #[error("no namespace detected: {message}")]
    NoNamespaceDetected { message: String },

    #[error("skosify failed: {message}")]
    Skosify { message: String },

    #[error("upload failed: {message}")]
    Upload {
        status: Option<u16>,
        message: String,
    },

    #[error("row has {found} columns, expected {expected}")]
    MissingInput { found: usize, expected: usize },

    #[error("{type_name}: {message}")]
    Unknown { type_name: String, message: String },
}

impl JobError {
    /// Classify an unexpected error, keeping its Rust type name.
    pub fn unknown<E: std::fmt::Display>(error: &E) -> Self {
        Self::Unknown {
            type_name: std::any::type_name::<E>().to_string(),
            message: error.to_string(),
        }
    }

    /// Text written to the ledger's error-kind column.
    pub fn kind(&self) -> String {
        match self {
            Self::InvalidMimeType { .. } => "INVALID MIME TYPE".into(),
            Self::Download {
                status: Some(status),
                ..
            } => format!("DOWNLOAD ERROR ({status})"),
            Self::Download { status: None, .. } => "DOWNLOAD ERROR".into(),
            Self::Parse { .. } => "PARSE ERROR".into(),
            Self::NoNamespaceDetected { .. } => "NO NAMESPACE DETECTED".into(),
            Self::Skosify { .. } => "SKOSIFY ERROR".into(),
            Self::Upload {
                status: Some(status),
                ..
            } => format!("UPLOAD ERROR ({status})"),
            Self::Upload { status: None, .. } => "UPLOAD ERROR".into(),
            Self::MissingInput { .. } => "Missing Input".into(),
            Self::Unknown { .. } => "UNKNOWN ERROR".into(),
        }
    }

    /// Text written to the ledger's error-message column.
    pub fn message(&self) -> String {
        match self {
            Self::Download { message, .. }
            | Self::Parse { message }
            | Self::NoNamespaceDetected { message }
            | Self::Skosify { message }
            | Self::Upload { message, .. } => message.clone(),
            _ => self.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// SheetUpdate
// ---------------------------------------------------------------------------

/// Result record accumulated while one job runs; always written back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triple_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_entry: Option<String>,
}

impl SheetUpdate {
    /// Record an error unless an earlier one is already held.
    pub fn record_error(&mut self, error: JobError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
