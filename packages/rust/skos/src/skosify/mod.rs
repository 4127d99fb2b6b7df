//! Skosify Adapter: structural SKOS repair behind a trait, plus the
//! checkpoint that serializes the graph on every exit path.

mod command;
mod native;

use std::path::{Path, PathBuf};

use oxigraph::model::Graph;
use tracing::{info, warn};

use vocabsync_shared::{Result, SkosifyBackend, SkosifyConfig};

use crate::io::write_turtle;

pub use command::SkosifyCommand;
pub use native::NativeSkosify;

// ---------------------------------------------------------------------------
// Options and report
// ---------------------------------------------------------------------------

/// What the repair routine should do. Every step is on by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkosifyOptions {
    /// Human-readable scheme label (required).
    pub label: String,
    /// Namespace the concepts live under.
    pub namespace: String,
    /// Language tag forced onto untagged labels.
    pub default_language: Option<String>,
    pub mark_top_concepts: bool,
    pub eliminate_redundancy: bool,
    pub break_cycles: bool,
    /// Drop `related` links between hierarchically related concepts.
    pub cleanup_related: bool,
    pub cleanup_classes: bool,
    pub cleanup_properties: bool,
    pub cleanup_unreachable: bool,
}

impl SkosifyOptions {
    pub fn new(label: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            namespace: namespace.into(),
            default_language: None,
            mark_top_concepts: true,
            eliminate_redundancy: true,
            break_cycles: true,
            cleanup_related: true,
            cleanup_classes: true,
            cleanup_properties: true,
            cleanup_unreachable: true,
        }
    }

    pub fn with_default_language(mut self, language: Option<String>) -> Self {
        self.default_language = language;
        self
    }
}

/// Counts of what a repair run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkosifyReport {
    /// IRI of the concept scheme the concepts were attached to.
    pub scheme: Option<String>,
    pub literals_tagged: usize,
    pub in_scheme_added: usize,
    pub relations_enriched: usize,
    pub cycles_broken: usize,
    pub redundant_removed: usize,
    pub related_pruned: usize,
    pub top_concepts: usize,
    pub classes_removed: usize,
    pub properties_removed: usize,
    pub unreachable_removed: usize,
}

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// A SKOS repair routine. Failures are `VocabError::Skosify`.
pub trait Skosify: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Repair `graph` in place.
    fn skosify(&self, graph: &mut Graph, options: &SkosifyOptions) -> Result<SkosifyReport>;
}

/// Build the backend selected in `[skosify]`.
pub fn backend_from_config(config: &SkosifyConfig) -> Box<dyn Skosify> {
    match config.backend {
        SkosifyBackend::Native => Box::new(NativeSkosify),
        SkosifyBackend::Command => Box::new(SkosifyCommand::new(
            config.command.clone(),
            config.extra_args.clone(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// Owns the working graph and writes it to `path` when dropped, unless it
/// was already written by [`Checkpoint::finish`].
pub struct Checkpoint {
    graph: Graph,
    path: PathBuf,
    written: bool,
}

impl Checkpoint {
    pub fn new(graph: Graph, path: impl Into<PathBuf>) -> Self {
        Self {
            graph,
            path: path.into(),
            written: false,
        }
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Serialize now and hand back the graph and its Turtle text.
    pub fn finish(mut self) -> Result<(Graph, String)> {
        self.written = true;
        let text = write_turtle(&self.graph, &self.path)?;
        Ok((std::mem::take(&mut self.graph), text))
    }
}

impl Drop for Checkpoint {
    fn drop(&mut self) {
        if self.written {
            return;
        }
        match write_turtle(&self.graph, &self.path) {
            Ok(_) => warn!(path = %self.path.display(), "checkpoint written during unwind"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "checkpoint write failed"),
        }
    }
}

/// Result of a checkpointed repair: the serialized graph always exists,
/// the repair itself may have failed.
#[derive(Debug)]
pub struct CheckpointOutcome {
    pub graph: Graph,
    /// Turtle text written to the checkpoint file.
    pub turtle: String,
    pub report: Result<SkosifyReport>,
}

/// Run `backend` over `graph` and serialize the resulting state to `path`
/// whatever the outcome. Only a failure to write the checkpoint is an `Err`.
pub fn skosify_with_checkpoint(
    backend: &dyn Skosify,
    graph: Graph,
    options: &SkosifyOptions,
    path: &Path,
) -> Result<CheckpointOutcome> {
    let mut checkpoint = Checkpoint::new(graph, path);
    let report = backend.skosify(checkpoint.graph_mut(), options);

    match &report {
        Ok(r) => info!(
            backend = backend.name(),
            scheme = r.scheme.as_deref().unwrap_or(""),
            cycles_broken = r.cycles_broken,
            top_concepts = r.top_concepts,
            "skosify finished"
        ),
        Err(e) => warn!(backend = backend.name(), error = %e, "skosify failed, keeping partial graph"),
    }

    let (graph, turtle) = checkpoint.finish()?;
    Ok(CheckpointOutcome {
        graph,
        turtle,
        report,
    })
}
