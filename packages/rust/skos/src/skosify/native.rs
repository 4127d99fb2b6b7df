//! In-process SKOS repair.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use oxigraph::model::vocab::{rdf, rdfs, xsd};
use oxigraph::model::{
    Graph, Literal, NamedNode, NamedNodeRef, Subject, SubjectRef, Term, TermRef, Triple, TripleRef,
};
use tracing::{debug, info, warn};

use vocabsync_shared::{Result, VocabError};

use super::{Skosify, SkosifyOptions, SkosifyReport};
use crate::transform::normalized_tag;
use crate::vocab::{dc, dcterms, owl, skos};

/// Literal-valued predicates that receive the default language.
const TAGGABLE: [NamedNodeRef<'static>; 11] = [
    skos::PREF_LABEL,
    skos::ALT_LABEL,
    skos::HIDDEN_LABEL,
    rdfs::LABEL,
    skos::DEFINITION,
    skos::NOTE,
    skos::SCOPE_NOTE,
    dc::TITLE,
    dc::DESCRIPTION,
    dcterms::TITLE,
    dcterms::DESCRIPTION,
];

const CLASS_TYPES: [NamedNodeRef<'static>; 2] = [owl::CLASS, rdfs::CLASS];

const PROPERTY_TYPES: [NamedNodeRef<'static>; 4] = [
    rdf::PROPERTY,
    owl::OBJECT_PROPERTY,
    owl::DATATYPE_PROPERTY,
    owl::ANNOTATION_PROPERTY,
];

/// Child IRI to the IRIs of its broader concepts.
type Hierarchy = BTreeMap<String, BTreeSet<String>>;

/// Repairs graphs without leaving the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeSkosify;

impl Skosify for NativeSkosify {
    fn name(&self) -> &'static str {
        "native"
    }

    fn skosify(&self, graph: &mut Graph, options: &SkosifyOptions) -> Result<SkosifyReport> {
        let label = options.label.trim();
        if label.is_empty() {
            return Err(VocabError::Skosify("a concept scheme label is required".into()));
        }
        let namespace = NamedNode::new(options.namespace.trim()).map_err(|e| {
            VocabError::Skosify(format!("invalid namespace '{}': {e}", options.namespace))
        })?;
        let language = options
            .default_language
            .as_deref()
            .map(normalized_tag)
            .transpose()
            .map_err(|e| VocabError::Skosify(e.to_string()))?;
        if graph
            .subjects_for_predicate_object(rdf::TYPE, skos::CONCEPT)
            .next()
            .is_none()
        {
            return Err(VocabError::Skosify("graph contains no skos:Concept".into()));
        }

        let mut report = SkosifyReport::default();

        if let Some(lang) = &language {
            report.literals_tagged = tag_untagged_literals(graph, lang);
        }

        let scheme = setup_scheme(graph, &namespace);
        label_scheme(graph, scheme.as_ref(), label, language.as_deref());
        report.in_scheme_added = add_in_scheme(graph, scheme.as_ref());
        report.relations_enriched = enrich_relations(graph);

        if options.break_cycles {
            report.cycles_broken = break_cycles(graph);
        }
        if options.eliminate_redundancy {
            report.redundant_removed = eliminate_redundancy(graph);
        }
        if options.cleanup_related {
            report.related_pruned = prune_related(graph);
        }
        if options.mark_top_concepts {
            report.top_concepts = mark_top_concepts(graph, scheme.as_ref());
        }
        if options.cleanup_classes {
            report.classes_removed = remove_definitions(graph, &CLASS_TYPES, |g, node| {
                g.subjects_for_predicate_object(rdf::TYPE, node).next().is_none()
            });
        }
        if options.cleanup_properties {
            report.properties_removed = remove_definitions(graph, &PROPERTY_TYPES, |g, node| {
                g.triples_for_predicate(node).next().is_none()
            });
        }
        if options.cleanup_unreachable {
            report.unreachable_removed = remove_unreachable(graph);
        }

        report.scheme = Some(scheme.into_string());
        info!(
            scheme = report.scheme.as_deref().unwrap_or(""),
            triples = graph.len(),
            cycles_broken = report.cycles_broken,
            redundant_removed = report.redundant_removed,
            unreachable_removed = report.unreachable_removed,
            "native skosify done"
        );
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Labels and scheme
// ---------------------------------------------------------------------------

fn tag_untagged_literals(graph: &mut Graph, lang: &str) -> usize {
    let mut untagged = Vec::new();
    for predicate in TAGGABLE {
        for triple in graph.triples_for_predicate(predicate) {
            if let TermRef::Literal(literal) = triple.object {
                if literal.language().is_none() && literal.datatype() == xsd::STRING {
                    untagged.push(triple.into_owned());
                }
            }
        }
    }

    for triple in &untagged {
        if let Term::Literal(literal) = &triple.object {
            let tagged = Literal::new_language_tagged_literal_unchecked(literal.value(), lang);
            graph.remove(triple);
            graph.insert(TripleRef::new(&triple.subject, &triple.predicate, &tagged));
        }
    }
    untagged.len()
}

/// Pick the scheme concepts are attached to: the first existing scheme, else
/// a lone `owl:Ontology`, else a new scheme at the namespace.
fn setup_scheme(graph: &mut Graph, namespace: &NamedNode) -> NamedNode {
    let mut schemes = named_of_type(graph, skos::CONCEPT_SCHEME);
    if !schemes.is_empty() {
        if schemes.len() > 1 {
            warn!(count = schemes.len(), "several concept schemes, using the first");
        }
        return schemes.swap_remove(0);
    }

    let ontologies = named_of_type(graph, owl::ONTOLOGY);
    if let [ontology] = ontologies.as_slice() {
        debug!(ontology = %ontology, "promoting owl:Ontology to concept scheme");
        graph.insert(TripleRef::new(ontology, rdf::TYPE, skos::CONCEPT_SCHEME));
        return ontology.clone();
    }

    let ns = namespace.as_str();
    let iri = ns
        .strip_suffix('/')
        .or_else(|| ns.strip_suffix('#'))
        .unwrap_or(ns);
    let scheme = NamedNode::new(iri).unwrap_or_else(|_| namespace.clone());
    debug!(scheme = %scheme, "creating concept scheme");
    graph.insert(TripleRef::new(&scheme, rdf::TYPE, skos::CONCEPT_SCHEME));
    scheme
}

fn label_scheme(graph: &mut Graph, scheme: NamedNodeRef<'_>, label: &str, lang: Option<&str>) {
    let has_label = [rdfs::LABEL, skos::PREF_LABEL, dc::TITLE, dcterms::TITLE]
        .into_iter()
        .any(|p| graph.object_for_subject_predicate(scheme, p).is_some());
    if has_label {
        return;
    }
    let literal = match lang {
        Some(lang) => Literal::new_language_tagged_literal_unchecked(label, lang),
        None => Literal::new_simple_literal(label),
    };
    graph.insert(TripleRef::new(scheme, rdfs::LABEL, &literal));
}

fn add_in_scheme(graph: &mut Graph, scheme: NamedNodeRef<'_>) -> usize {
    let concepts: Vec<Subject> = graph
        .subjects_for_predicate_object(rdf::TYPE, skos::CONCEPT)
        .filter(|c| graph.object_for_subject_predicate(*c, skos::IN_SCHEME).is_none())
        .map(SubjectRef::into_owned)
        .collect();

    for concept in &concepts {
        graph.insert(TripleRef::new(concept, skos::IN_SCHEME, scheme));
    }
    concepts.len()
}

// ---------------------------------------------------------------------------
// Hierarchy
// ---------------------------------------------------------------------------

/// Add missing `narrower`/`broader` inverses and make `related` symmetric.
fn enrich_relations(graph: &mut Graph) -> usize {
    let mut missing = Vec::new();
    for (predicate, inverse) in [
        (skos::BROADER, skos::NARROWER),
        (skos::NARROWER, skos::BROADER),
        (skos::RELATED, skos::RELATED),
    ] {
        for (a, b) in named_pairs(graph, predicate) {
            missing.push((b, inverse, a));
        }
    }

    missing
        .iter()
        .filter(|(s, p, o)| {
            graph.insert(TripleRef::new(
                NamedNodeRef::new_unchecked(s),
                *p,
                NamedNodeRef::new_unchecked(o),
            ))
        })
        .count()
}

/// Remove `broader` edges that close a cycle, walking down from the
/// concepts that have no broader concept.
fn break_cycles(graph: &mut Graph) -> usize {
    let parents = hierarchy(graph);
    let mut children: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut nodes: BTreeSet<&str> = BTreeSet::new();
    for (child, ps) in &parents {
        nodes.insert(child.as_str());
        for parent in ps {
            nodes.insert(parent.as_str());
            children.entry(parent.as_str()).or_default().push(child.as_str());
        }
    }

    let roots = nodes.iter().filter(|n| !parents.contains_key(**n));
    // Nodes only reachable through a cycle are visited last.
    let starts: Vec<&str> = roots.chain(nodes.iter()).copied().collect();

    let mut on_stack: HashSet<&str> = HashSet::new();
    let mut done: HashSet<&str> = HashSet::new();
    let mut back_edges: Vec<(String, String)> = named_pairs(graph, skos::BROADER)
        .into_iter()
        .filter(|(child, parent)| child == parent)
        .collect();

    for start in starts {
        if done.contains(start) {
            continue;
        }
        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
        on_stack.insert(start);

        while let Some((node, next)) = stack.last_mut() {
            let node = *node;
            let kids = children.get(node).map(Vec::as_slice).unwrap_or(&[]);
            match kids.get(*next) {
                Some(&child) => {
                    *next += 1;
                    if on_stack.contains(child) {
                        back_edges.push((child.to_string(), node.to_string()));
                    } else if !done.contains(child) {
                        on_stack.insert(child);
                        stack.push((child, 0));
                    }
                }
                None => {
                    on_stack.remove(node);
                    done.insert(node);
                    stack.pop();
                }
            }
        }
    }

    for (child, parent) in &back_edges {
        warn!(child = %child, parent = %parent, "breaking hierarchy cycle");
        unlink(graph, child, parent);
    }
    back_edges.len()
}

/// Remove `broader` edges already implied through another broader concept.
fn eliminate_redundancy(graph: &mut Graph) -> usize {
    let parents = hierarchy(graph);
    let mut redundant = Vec::new();

    for (child, ps) in &parents {
        if ps.len() < 2 {
            continue;
        }
        for parent in ps {
            let implied = ps
                .iter()
                .filter(|other| *other != parent)
                .any(|other| ancestors(&parents, other).contains(parent.as_str()));
            if implied {
                redundant.push((child.clone(), parent.clone()));
            }
        }
    }

    for (child, parent) in &redundant {
        debug!(child = %child, parent = %parent, "removing redundant broader");
        unlink(graph, child, parent);
    }
    redundant.len()
}

/// Drop `related` links between concepts on the same hierarchy path.
fn prune_related(graph: &mut Graph) -> usize {
    let parents = hierarchy(graph);
    let overlapping: Vec<(String, String)> = named_pairs(graph, skos::RELATED)
        .into_iter()
        .filter(|(a, b)| {
            ancestors(&parents, a).contains(b.as_str()) || ancestors(&parents, b).contains(a.as_str())
        })
        .collect();

    let mut removed = 0;
    for (a, b) in &overlapping {
        let (a, b) = (NamedNodeRef::new_unchecked(a), NamedNodeRef::new_unchecked(b));
        if graph.remove(TripleRef::new(a, skos::RELATED, b)) {
            removed += 1;
        }
        if graph.remove(TripleRef::new(b, skos::RELATED, a)) {
            removed += 1;
        }
    }
    removed
}

/// Attach every concept without a broader concept to `scheme` as a top concept.
fn mark_top_concepts(graph: &mut Graph, scheme: NamedNodeRef<'_>) -> usize {
    let tops: Vec<Subject> = graph
        .subjects_for_predicate_object(rdf::TYPE, skos::CONCEPT)
        .filter(|c| graph.object_for_subject_predicate(*c, skos::BROADER).is_none())
        .map(SubjectRef::into_owned)
        .collect();

    for concept in &tops {
        graph.insert(TripleRef::new(concept, skos::TOP_CONCEPT_OF, scheme));
        if let Subject::NamedNode(node) = concept {
            graph.insert(TripleRef::new(scheme, skos::HAS_TOP_CONCEPT, node));
        }
    }
    tops.len()
}

fn hierarchy(graph: &Graph) -> Hierarchy {
    let mut parents = Hierarchy::new();
    for (child, parent) in named_pairs(graph, skos::BROADER) {
        if child != parent {
            parents.entry(child).or_default().insert(parent);
        }
    }
    parents
}

fn ancestors<'a>(parents: &'a Hierarchy, start: &str) -> HashSet<&'a str> {
    let mut seen = HashSet::new();
    let mut queue: VecDeque<&str> = parents
        .get(start)
        .into_iter()
        .flatten()
        .map(String::as_str)
        .collect();
    while let Some(node) = queue.pop_front() {
        if seen.insert(node) {
            queue.extend(parents.get(node).into_iter().flatten().map(String::as_str));
        }
    }
    seen
}

fn unlink(graph: &mut Graph, child: &str, parent: &str) {
    let (child, parent) = (
        NamedNodeRef::new_unchecked(child),
        NamedNodeRef::new_unchecked(parent),
    );
    graph.remove(TripleRef::new(child, skos::BROADER, parent));
    graph.remove(TripleRef::new(parent, skos::NARROWER, child));
}

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

/// Remove every triple about a resource typed as one of `types` that is not
/// also a concept and for which `unused` holds.
fn remove_definitions(
    graph: &mut Graph,
    types: &[NamedNodeRef<'static>],
    unused: impl Fn(&Graph, NamedNodeRef<'_>) -> bool,
) -> usize {
    let mut doomed: Vec<NamedNode> = Vec::new();
    for class in types {
        for node in named_of_type(graph, *class) {
            let is_concept = graph.contains(TripleRef::new(&node, rdf::TYPE, skos::CONCEPT));
            if !is_concept
                && !node.as_str().starts_with(skos::NAMESPACE)
                && unused(graph, node.as_ref())
                && !doomed.contains(&node)
            {
                doomed.push(node);
            }
        }
    }

    for node in &doomed {
        let triples: Vec<Triple> = graph
            .triples_for_subject(node)
            .map(TripleRef::into_owned)
            .collect();
        for triple in &triples {
            graph.remove(triple);
        }
    }
    doomed.len()
}

/// Remove triples whose subject cannot be reached from a scheme, concept or
/// collection.
fn remove_unreachable(graph: &mut Graph) -> usize {
    let mut reachable: HashSet<Subject> = HashSet::new();
    let mut queue: VecDeque<Subject> = VecDeque::new();
    for class in [
        skos::CONCEPT_SCHEME,
        skos::CONCEPT,
        skos::COLLECTION,
        skos::ORDERED_COLLECTION,
    ] {
        queue.extend(
            graph
                .subjects_for_predicate_object(rdf::TYPE, class)
                .map(SubjectRef::into_owned),
        );
    }

    while let Some(subject) = queue.pop_front() {
        if !reachable.insert(subject.clone()) {
            continue;
        }
        for triple in graph.triples_for_subject(&subject) {
            match triple.object {
                TermRef::NamedNode(node) => queue.push_back(node.into_owned().into()),
                TermRef::BlankNode(node) => queue.push_back(node.into_owned().into()),
                _ => {}
            }
        }
    }

    let orphans: Vec<Triple> = graph
        .iter()
        .filter(|t| !reachable.contains(&t.subject.into_owned()))
        .map(TripleRef::into_owned)
        .collect();
    for triple in &orphans {
        graph.remove(triple);
    }
    if !orphans.is_empty() {
        debug!(removed = orphans.len(), "removed unreachable triples");
    }
    orphans.len()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Named resources typed `class`, sorted by IRI.
fn named_of_type(graph: &Graph, class: NamedNodeRef<'_>) -> Vec<NamedNode> {
    let mut nodes: Vec<NamedNode> = graph
        .subjects_for_predicate_object(rdf::TYPE, class)
        .filter_map(|s| match s {
            SubjectRef::NamedNode(node) => Some(node.into_owned()),
            _ => None,
        })
        .collect();
    nodes.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    nodes
}

/// `(subject, object)` IRIs of every triple with `predicate` linking two
/// named resources.
fn named_pairs(graph: &Graph, predicate: NamedNodeRef<'_>) -> Vec<(String, String)> {
    graph
        .triples_for_predicate(predicate)
        .filter_map(|t| match (t.subject, t.object) {
            (SubjectRef::NamedNode(s), TermRef::NamedNode(o)) => {
                Some((s.as_str().to_string(), o.as_str().to_string()))
            }
            _ => None,
        })
        .collect()
}
