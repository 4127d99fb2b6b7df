//! Triple Transform Library.
//!
//! Graph rewrites used to coerce foreign ontologies toward SKOS. Every
//! operation collects its matches first and then mutates, so a rewrite never
//! observes its own output. All of them return the number of triples added
//! or rewritten.

use oxigraph::model::vocab::{rdf, rdfs};
use oxigraph::model::{
    Graph, Literal, NamedNodeRef, Subject, SubjectRef, TermRef, Triple, TripleRef,
};
use std::collections::BTreeSet;

use tracing::debug;

use vocabsync_shared::{Result, VocabError};

use crate::vocab::{owl, skos};

/// Predicates whose literal values carry a language tag.
pub const LABEL_PREDICATES: [NamedNodeRef<'static>; 3] =
    [skos::PREF_LABEL, skos::ALT_LABEL, rdfs::LABEL];

/// For every `(s, old, o)` add `(s, new, o)` unless `s` already has a `new`
/// value. Existing `new` values are never overwritten and `old` triples stay.
pub fn add_predicate_variant(graph: &mut Graph, old: NamedNodeRef<'_>, new: NamedNodeRef<'_>) -> usize {
    let matches: Vec<Triple> = graph
        .triples_for_predicate(old)
        .map(TripleRef::into_owned)
        .collect();

    let mut added = 0;
    for triple in &matches {
        if graph
            .object_for_subject_predicate(&triple.subject, new)
            .is_none()
        {
            graph.insert(TripleRef::new(&triple.subject, new, &triple.object));
            added += 1;
        }
    }
    debug!(old = %old, new = %new, matched = matches.len(), added, "added predicate variant");
    added
}

/// For every `(s, rdf:type, old)` add `(s, rdf:type, new)`.
pub fn add_type_variant(graph: &mut Graph, old: NamedNodeRef<'_>, new: NamedNodeRef<'_>) -> usize {
    let subjects: Vec<Subject> = graph
        .subjects_for_predicate_object(rdf::TYPE, old)
        .map(SubjectRef::into_owned)
        .collect();

    subjects
        .iter()
        .filter(|s| graph.insert(TripleRef::new(*s, rdf::TYPE, new)))
        .count()
}

/// Rewrite every triple whose object is `old` to point at `new` instead.
///
/// When the rewritten triple already exists the old one is simply removed,
/// so the triple count for that predicate shrinks by one.
pub fn replace_object(graph: &mut Graph, old: TermRef<'_>, new: TermRef<'_>) -> usize {
    let matches: Vec<Triple> = graph
        .triples_for_object(old)
        .map(TripleRef::into_owned)
        .collect();

    for triple in &matches {
        graph.remove(triple);
        graph.insert(TripleRef::new(&triple.subject, &triple.predicate, new));
    }
    debug!(rewritten = matches.len(), "replaced object");
    matches.len()
}

/// Assert every resource typed `type_class` as a top concept of `scheme`.
pub fn mark_top_concepts(
    graph: &mut Graph,
    type_class: NamedNodeRef<'_>,
    scheme: NamedNodeRef<'_>,
) -> usize {
    let subjects: Vec<Subject> = graph
        .subjects_for_predicate_object(rdf::TYPE, type_class)
        .map(SubjectRef::into_owned)
        .collect();

    subjects
        .iter()
        .filter(|s| graph.insert(TripleRef::new(*s, skos::TOP_CONCEPT_OF, scheme)))
        .count()
}

/// Re-tag every `prefLabel`, `altLabel` and `rdfs:label` literal with `tag`.
///
/// The old literal is removed. Other triples that reference the exact old
/// literal are left alone. Literals already carrying `tag` are untouched, so
/// reapplying the same tag is a no-op.
pub fn normalize_language_tags(graph: &mut Graph, tag: &str) -> Result<usize> {
    let tag = normalized_tag(tag)?;

    let mut rewrites = Vec::new();
    for predicate in LABEL_PREDICATES {
        for triple in graph.triples_for_predicate(predicate) {
            if let TermRef::Literal(literal) = triple.object {
                if literal.language() != Some(tag.as_str()) {
                    rewrites.push((triple.into_owned(), literal.value().to_string()));
                }
            }
        }
    }

    for (triple, value) in &rewrites {
        graph.remove(triple);
        let tagged = Literal::new_language_tagged_literal_unchecked(value.as_str(), tag.as_str());
        graph.insert(TripleRef::new(&triple.subject, &triple.predicate, &tagged));
    }
    debug!(tag = %tag, rewritten = rewrites.len(), "normalized language tags");
    Ok(rewrites.len())
}

/// Validate a BCP47 tag and return it in the form literals store it.
pub fn normalized_tag(tag: &str) -> Result<String> {
    let tagged = Literal::new_language_tagged_literal("", tag.trim())
        .map_err(|e| VocabError::validation(format!("invalid language tag '{tag}': {e}")))?;
    Ok(tagged.language().unwrap_or_default().to_string())
}

/// Distinct `owl:imports` targets, sorted. Blank-node and literal objects
/// are ignored.
pub fn owl_imports(graph: &Graph) -> Vec<String> {
    let targets: BTreeSet<String> = graph
        .triples_for_predicate(owl::IMPORTS)
        .filter_map(|t| match t.object {
            TermRef::NamedNode(n) => Some(n.as_str().to_string()),
            _ => None,
        })
        .collect();
    targets.into_iter().collect()
}

/// Insert every triple of `other` into `graph`.
pub fn merge_graph(graph: &mut Graph, other: &Graph) -> usize {
    other.iter().filter(|t| graph.insert(*t)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxigraph::model::{BlankNode, NamedNode};

    fn node(iri: &str) -> NamedNode {
        NamedNode::new_unchecked(iri)
    }

    fn sample() -> Graph {
        let mut g = Graph::new();
        let a = node("http://ex.org/a");
        let b = node("http://ex.org/b");
        let title = node("http://purl.org/dc/terms/title");
        g.insert(TripleRef::new(&a, rdf::TYPE, owl::CLASS));
        g.insert(TripleRef::new(&b, rdf::TYPE, owl::CLASS));
        g.insert(TripleRef::new(&a, &title, &Literal::new_simple_literal("A title")));
        g.insert(TripleRef::new(&b, &title, &Literal::new_simple_literal("B title")));
        g.insert(TripleRef::new(&b, skos::PREF_LABEL, &Literal::new_simple_literal("B label")));
        g
    }

    #[test]
    fn predicate_variant_fills_gaps_only() {
        let mut g = sample();
        let title = node("http://purl.org/dc/terms/title");
        let added = add_predicate_variant(&mut g, title.as_ref(), skos::PREF_LABEL);
        assert_eq!(added, 1);

        let a = node("http://ex.org/a");
        let b = node("http://ex.org/b");
        assert!(g.contains(TripleRef::new(&a, skos::PREF_LABEL, &Literal::new_simple_literal("A title"))));
        // b's existing prefLabel is kept and not duplicated
        assert_eq!(g.objects_for_subject_predicate(&b, skos::PREF_LABEL).count(), 1);
        // old predicate triples are kept
        assert_eq!(g.triples_for_predicate(&title).count(), 2);
    }

    #[test]
    fn variants_are_idempotent() {
        let mut g = sample();
        let title = node("http://purl.org/dc/terms/title");
        add_predicate_variant(&mut g, title.as_ref(), skos::PREF_LABEL);
        add_type_variant(&mut g, owl::CLASS, skos::CONCEPT);
        let once = g.clone();

        assert_eq!(add_predicate_variant(&mut g, title.as_ref(), skos::PREF_LABEL), 0);
        assert_eq!(add_type_variant(&mut g, owl::CLASS, skos::CONCEPT), 0);
        assert_eq!(g.len(), once.len());
        assert!(once.iter().all(|t| g.contains(t)));
    }

    #[test]
    fn type_variant_adds_concept_declarations() {
        let mut g = sample();
        assert_eq!(add_type_variant(&mut g, owl::CLASS, skos::CONCEPT), 2);
        assert_eq!(g.subjects_for_predicate_object(rdf::TYPE, skos::CONCEPT).count(), 2);
        assert_eq!(g.subjects_for_predicate_object(rdf::TYPE, owl::CLASS).count(), 2);
    }

    #[test]
    fn replace_object_preserves_count_or_shrinks_on_collision() {
        let mut g = sample();
        let b = node("http://ex.org/b");
        g.insert(TripleRef::new(&b, rdf::TYPE, skos::CONCEPT));

        let before = g.triples_for_predicate(rdf::TYPE).count();
        let rewritten = replace_object(&mut g, owl::CLASS.into(), skos::CONCEPT.into());
        assert_eq!(rewritten, 2);
        assert_eq!(g.triples_for_object(owl::CLASS).count(), 0);
        // a: remove 1 add 1, b: replacement already existed, net removal
        assert_eq!(g.triples_for_predicate(rdf::TYPE).count(), before - 1);
    }

    #[test]
    fn top_concepts_marked_once() {
        let mut g = sample();
        let scheme = node("http://ex.org/scheme");
        assert_eq!(mark_top_concepts(&mut g, owl::CLASS, scheme.as_ref()), 2);
        assert_eq!(mark_top_concepts(&mut g, owl::CLASS, scheme.as_ref()), 0);
        assert_eq!(g.subjects_for_predicate_object(skos::TOP_CONCEPT_OF, &scheme).count(), 2);
    }

    #[test]
    fn language_tags_are_rewritten() {
        let mut g = sample();
        let b = node("http://ex.org/b");
        g.insert(TripleRef::new(&b, rdfs::LABEL, &Literal::new_language_tagged_literal_unchecked("Bee", "fr")));

        assert_eq!(normalize_language_tags(&mut g, "de").unwrap(), 2);
        for predicate in LABEL_PREDICATES {
            for t in g.triples_for_predicate(predicate) {
                match t.object {
                    TermRef::Literal(l) => assert_eq!(l.language(), Some("de")),
                    _ => panic!("label should stay a literal"),
                }
            }
        }
        // same tag again changes nothing
        assert_eq!(normalize_language_tags(&mut g, "de").unwrap(), 0);
        // dc:title literals are not label predicates
        let title = node("http://purl.org/dc/terms/title");
        assert!(g.contains(TripleRef::new(&b, &title, &Literal::new_simple_literal("B title"))));
    }

    #[test]
    fn imports_are_listed_once_and_sorted() {
        let mut g = sample();
        let ontology = node("http://ex.org/onto");
        let z = node("http://ex.org/z.ttl");
        let y = node("http://ex.org/y.rdf");
        g.insert(TripleRef::new(&ontology, owl::IMPORTS, &z));
        g.insert(TripleRef::new(&ontology, owl::IMPORTS, &y));
        g.insert(TripleRef::new(&node("http://ex.org/other"), owl::IMPORTS, &z));
        g.insert(TripleRef::new(&ontology, owl::IMPORTS, &BlankNode::default()));

        assert_eq!(owl_imports(&g), ["http://ex.org/y.rdf", "http://ex.org/z.ttl"]);
        assert!(owl_imports(&sample()).is_empty());
    }

    #[test]
    fn merge_counts_new_triples_only() {
        let mut g = sample();
        let mut other = Graph::new();
        let c = node("http://ex.org/c");
        other.insert(TripleRef::new(&c, rdf::TYPE, owl::CLASS));
        other.insert(TripleRef::new(&node("http://ex.org/a"), rdf::TYPE, owl::CLASS));

        let before = g.len();
        assert_eq!(merge_graph(&mut g, &other), 1);
        assert_eq!(g.len(), before + 1);
        assert_eq!(merge_graph(&mut g, &other), 0);
    }

    #[test]
    fn invalid_language_tag_is_rejected() {
        let mut g = sample();
        let err = normalize_language_tags(&mut g, "not a tag").unwrap_err();
        assert!(matches!(err, VocabError::Validation { .. }));
        assert_eq!(normalized_tag("EN-gb").unwrap(), "en-gb");
    }
}
