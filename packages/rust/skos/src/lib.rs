//! RDF graph handling for vocabsync.
//!
//! - [`io`]: parse the ledger's RDF formats and serialize Turtle
//! - [`transform`]: graph rewrites toward SKOS conventions
//! - [`namespace`]: base-namespace detection
//! - [`skosify`]: structural SKOS repair with a serialize-on-exit checkpoint

pub mod io;
pub mod namespace;
pub mod skosify;
pub mod transform;
pub mod vocab;

pub use io::{parse_file, parse_str, to_turtle, write_turtle};
pub use namespace::{detect_namespace, strip_local_name};
pub use skosify::{
    Checkpoint, CheckpointOutcome, NativeSkosify, Skosify, SkosifyCommand, SkosifyOptions,
    SkosifyReport, backend_from_config, skosify_with_checkpoint,
};
pub use transform::{
    add_predicate_variant, add_type_variant, mark_top_concepts, merge_graph,
    normalize_language_tags, owl_imports, replace_object,
};

/// Re-exported so downstream crates can name graph types without a direct
/// dependency on the RDF library.
pub use oxigraph::model::Graph;
