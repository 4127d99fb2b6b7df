//! Namespace Detector: infer the base URI a graph's concepts live under.

use oxigraph::model::vocab::rdf;
use oxigraph::model::{Graph, NamedNodeRef, SubjectRef};
use tracing::debug;

use vocabsync_shared::{Result, VocabError};

use crate::vocab::skos;

/// Infer the namespace of `graph` from one of its concepts, falling back to
/// one of its concept schemes.
///
/// Which resource is picked among several candidates is unspecified. The
/// result is only reliable when all concepts share one base URI.
pub fn detect_namespace(graph: &Graph) -> Result<String> {
    let resource = first_named_of_type(graph, skos::CONCEPT)
        .or_else(|| first_named_of_type(graph, skos::CONCEPT_SCHEME))
        .ok_or_else(|| VocabError::NoNamespace("graph has no skos:Concept or skos:ConceptScheme".into()))?;

    let namespace = strip_local_name(resource.as_str()).ok_or_else(|| {
        VocabError::NoNamespace(format!("no namespace left after stripping <{resource}>"))
    })?;
    debug!(resource = %resource, namespace = %namespace, "detected namespace");
    Ok(namespace)
}

fn first_named_of_type<'a>(graph: &'a Graph, class: NamedNodeRef<'_>) -> Option<NamedNodeRef<'a>> {
    graph
        .subjects_for_predicate_object(rdf::TYPE, class)
        .find_map(|subject| match subject {
            SubjectRef::NamedNode(node) => Some(node),
            _ => None,
        })
}

/// Drop the last path segment of `iri`, keeping the trailing separator.
///
/// The IRI is split on `/` first; when the last segment contains a `#`, the
/// cut happens after the last `#` instead.
///
/// `http://ex.org/scheme/123` becomes `http://ex.org/scheme/` and
/// `http://ex.org/vocab#c1` becomes `http://ex.org/vocab#`.
pub fn strip_local_name(iri: &str) -> Option<String> {
    let slash_end = iri.rfind('/').map(|i| i + 1).unwrap_or(0);
    let end = match iri[slash_end..].rfind('#') {
        Some(hash) => slash_end + hash + 1,
        None => slash_end,
    };

    let namespace = &iri[..end];
    if namespace.is_empty() || namespace.ends_with("://") {
        return None;
    }
    Some(namespace.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxigraph::model::{NamedNode, TripleRef};

    fn typed(iri: &str, class: NamedNodeRef<'_>) -> Graph {
        let mut g = Graph::new();
        g.insert(TripleRef::new(&NamedNode::new_unchecked(iri), rdf::TYPE, class));
        g
    }

    #[test]
    fn single_concept_namespace() {
        let g = typed("http://ex.org/scheme/123", skos::CONCEPT);
        assert_eq!(detect_namespace(&g).unwrap(), "http://ex.org/scheme/");
    }

    #[test]
    fn falls_back_to_concept_scheme() {
        let g = typed("http://ex.org/thes#scheme", skos::CONCEPT_SCHEME);
        assert_eq!(detect_namespace(&g).unwrap(), "http://ex.org/thes#");
    }

    #[test]
    fn concept_wins_over_scheme() {
        let mut g = typed("http://ex.org/schemes/main", skos::CONCEPT_SCHEME);
        g.insert(TripleRef::new(
            &NamedNode::new_unchecked("http://ex.org/concepts/7"),
            rdf::TYPE,
            skos::CONCEPT,
        ));
        assert_eq!(detect_namespace(&g).unwrap(), "http://ex.org/concepts/");
    }

    #[test]
    fn empty_graph_has_no_namespace() {
        let err = detect_namespace(&Graph::new()).unwrap_err();
        assert!(matches!(err, VocabError::NoNamespace(_)));

        let g = typed("http://ex.org/a/b", NamedNodeRef::new_unchecked("http://ex.org/Other"));
        assert!(detect_namespace(&g).is_err());
    }

    #[test]
    fn unstrippable_iri_is_an_error() {
        let g = typed("urn:isbn:123", skos::CONCEPT);
        assert!(matches!(detect_namespace(&g), Err(VocabError::NoNamespace(_))));
    }

    #[test]
    fn strip_rules() {
        assert_eq!(strip_local_name("http://ex.org/v/1").as_deref(), Some("http://ex.org/v/"));
        assert_eq!(strip_local_name("http://ex.org/v/").as_deref(), Some("http://ex.org/v/"));
        assert_eq!(strip_local_name("http://ex.org/a/b#c").as_deref(), Some("http://ex.org/a/b#"));
        assert_eq!(strip_local_name("http://ex.org"), None);
        assert_eq!(strip_local_name("nothing"), None);
    }
}
