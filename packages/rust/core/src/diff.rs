//! Compare the graphs held by the triple store with the namespaces the
//! ledger says were published.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, instrument, warn};

use vocabsync_shared::{LedgerRow, Result, VocabError, column};
use vocabsync_storage::Ledger;
use vocabsync_store::StoreClient;

/// Directory under the output path that receives the diff reports.
pub const REPORT_DIR: &str = "graph_entries";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphDiff {
    pub store_graphs: usize,
    pub ledger_graphs: usize,
    /// Namespaces claimed by more than one ledger row.
    pub duplicates: Vec<String>,
    pub not_in_store: Vec<String>,
    pub not_in_ledger: Vec<String>,
}

impl GraphDiff {
    pub fn in_sync(&self) -> bool {
        self.not_in_store.is_empty() && self.not_in_ledger.is_empty()
    }
}

/// Namespace each row published: the generated one, else the declared one.
pub fn ledger_namespaces(rows: &[LedgerRow]) -> Vec<String> {
    rows.iter()
        .filter_map(|row| {
            let generated = row.cell(column::GENERATED_NAMESPACE).trim();
            let declared = row.cell(column::NAMESPACE).trim();
            let ns = if generated.is_empty() { declared } else { generated };
            (!ns.is_empty()).then(|| ns.to_string())
        })
        .collect()
}

/// Set difference in both directions, sorted.
pub fn compare(store: &[String], ledger: &[String]) -> GraphDiff {
    let mut seen = BTreeSet::new();
    let mut duplicates = BTreeSet::new();
    for ns in ledger {
        if !seen.insert(ns.as_str()) {
            duplicates.insert(ns.clone());
        }
    }
    let in_store: BTreeSet<&str> = store.iter().map(String::as_str).collect();

    GraphDiff {
        store_graphs: in_store.len(),
        ledger_graphs: seen.len(),
        duplicates: duplicates.into_iter().collect(),
        not_in_store: seen
            .difference(&in_store)
            .map(|s| s.to_string())
            .collect(),
        not_in_ledger: in_store
            .difference(&seen)
            .map(|s| s.to_string())
            .collect(),
    }
}

/// Write `not_in_store.json` and `not_in_ledger.json` under
/// `<output>/graph_entries/`. Returns the report directory.
pub fn write_reports(diff: &GraphDiff, output_dir: &Path) -> Result<PathBuf> {
    let dir = output_dir.join(REPORT_DIR);
    std::fs::create_dir_all(&dir).map_err(|e| VocabError::io(&dir, e))?;

    for (name, entries) in [
        ("not_in_store.json", &diff.not_in_store),
        ("not_in_ledger.json", &diff.not_in_ledger),
    ] {
        let path = dir.join(name);
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| VocabError::validation(format!("cannot serialize {name}: {e}")))?;
        std::fs::write(&path, json).map_err(|e| VocabError::io(&path, e))?;
    }
    Ok(dir)
}

/// List the store's graphs and compare them with the ledger.
#[instrument(skip_all)]
pub async fn diff_store(store: &StoreClient, ledger: &Ledger) -> Result<GraphDiff> {
    let graphs = store.list_graphs().await?;
    let rows = ledger.load_rows().await?;
    let diff = compare(&graphs, &ledger_namespaces(&rows));

    for ns in &diff.duplicates {
        warn!(namespace = %ns, "namespace used by more than one ledger row");
    }
    info!(
        store = diff.store_graphs,
        ledger = diff.ledger_graphs,
        not_in_store = diff.not_in_store.len(),
        not_in_ledger = diff.not_in_ledger.len(),
        "graph diff computed"
    );
    Ok(diff)
}
