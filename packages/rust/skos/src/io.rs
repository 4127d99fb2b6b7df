//! Graph Store facade: parse the ledger's RDF formats into an in-memory
//! [`Graph`] and serialize graphs back to Turtle.

use std::io::Read;
use std::path::Path;

use oxigraph::io::{RdfFormat, RdfParser, RdfSerializer};
use oxigraph::model::{Graph, Triple};
use tracing::debug;

use vocabsync_shared::{Result, VocabError, VocabFormat};

use crate::vocab::PREFIXES;

/// Map a ledger format onto the parser's format.
pub fn rdf_format(format: VocabFormat) -> RdfFormat {
    match format {
        VocabFormat::RdfXml => RdfFormat::RdfXml,
        VocabFormat::Turtle => RdfFormat::Turtle,
        VocabFormat::N3 => RdfFormat::N3,
        VocabFormat::NTriples => RdfFormat::NTriples,
    }
}

/// Parse serialized RDF text. Named-graph components are dropped.
pub fn parse_str(text: &str, format: VocabFormat, base_iri: Option<&str>) -> Result<Graph> {
    parse_reader(text.as_bytes(), format, base_iri)
}

/// Parse an RDF file from disk.
pub fn parse_file(path: &Path, format: VocabFormat, base_iri: Option<&str>) -> Result<Graph> {
    let file = std::fs::File::open(path).map_err(|e| VocabError::io(path, e))?;
    let graph = parse_reader(std::io::BufReader::new(file), format, base_iri)?;
    debug!(path = %path.display(), triples = graph.len(), "parsed graph file");
    Ok(graph)
}

fn parse_reader(reader: impl Read, format: VocabFormat, base_iri: Option<&str>) -> Result<Graph> {
    let mut parser = RdfParser::from_format(rdf_format(format));
    if let Some(base) = base_iri {
        parser = parser
            .with_base_iri(base)
            .map_err(|e| VocabError::parse(format!("invalid base IRI '{base}': {e}")))?;
    }

    let mut graph = Graph::new();
    for quad in parser.for_reader(reader) {
        let quad = quad.map_err(|e| VocabError::parse(format!("{format}: {e}")))?;
        graph.insert(&Triple::from(quad));
    }
    Ok(graph)
}

/// Serialize a graph as Turtle with the usual SKOS prefixes.
pub fn to_turtle(graph: &Graph) -> Result<String> {
    let mut serializer = RdfSerializer::from_format(RdfFormat::Turtle);
    for (name, iri) in PREFIXES {
        serializer = serializer
            .with_prefix(name, iri)
            .map_err(|e| VocabError::parse(format!("invalid prefix {name}: {e}")))?;
    }

    let mut writer = serializer.for_writer(Vec::new());
    for triple in graph {
        writer
            .serialize_triple(triple)
            .map_err(|e| VocabError::parse(format!("turtle serialization failed: {e}")))?;
    }
    let bytes = writer
        .finish()
        .map_err(|e| VocabError::parse(format!("turtle serialization failed: {e}")))?;

    String::from_utf8(bytes).map_err(|e| VocabError::parse(e.to_string()))
}

/// Serialize a graph as Turtle into `path`, returning the written text.
pub fn write_turtle(graph: &Graph, path: &Path) -> Result<String> {
    let text = to_turtle(graph)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| VocabError::io(parent, e))?;
    }
    std::fs::write(path, &text).map_err(|e| VocabError::io(path, e))?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::skos;
    use oxigraph::model::{NamedNodeRef, vocab::rdf};

    const NT: &str = "<http://ex.org/v/1> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://www.w3.org/2004/02/skos/core#Concept> .\n\
                      <http://ex.org/v/1> <http://www.w3.org/2004/02/skos/core#prefLabel> \"one\"@en .\n";

    #[test]
    fn parses_ntriples() {
        let graph = parse_str(NT, VocabFormat::NTriples, None).unwrap();
        assert_eq!(graph.len(), 2);
        let concept = NamedNodeRef::new_unchecked("http://ex.org/v/1");
        assert!(graph.contains(oxigraph::model::TripleRef::new(concept, rdf::TYPE, skos::CONCEPT)));
    }

    #[test]
    fn parses_rdfxml_with_relative_iris() {
        let xml = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:skos="http://www.w3.org/2004/02/skos/core#">
  <skos:Concept rdf:about="c1">
    <skos:prefLabel xml:lang="de">Eins</skos:prefLabel>
  </skos:Concept>
</rdf:RDF>"#;
        let graph = parse_str(xml, VocabFormat::RdfXml, Some("http://ex.org/x/")).unwrap();
        let concept = NamedNodeRef::new_unchecked("http://ex.org/x/c1");
        assert_eq!(graph.triples_for_subject(concept).count(), 2);
    }

    #[test]
    fn malformed_input_is_parse_error() {
        let err = parse_str("<http://ex.org/a> <http://ex.org/b>", VocabFormat::NTriples, None)
            .unwrap_err();
        assert!(matches!(err, VocabError::Parse { .. }));
    }

    #[test]
    fn turtle_output_reparses_to_same_graph() {
        let graph = parse_str(NT, VocabFormat::NTriples, None).unwrap();
        let turtle = to_turtle(&graph).unwrap();
        assert!(turtle.contains("@prefix skos:"));
        let back = parse_str(&turtle, VocabFormat::Turtle, None).unwrap();
        assert_eq!(back.len(), graph.len());
        assert!(graph.iter().all(|t| back.contains(t)));
    }

    #[test]
    fn write_turtle_creates_parent_dirs() {
        let dir = std::env::temp_dir().join(format!("vocabsync_io_{}", uuid::Uuid::now_v7()));
        let path = dir.join("nested").join("out.ttl");
        let graph = parse_str(NT, VocabFormat::NTriples, None).unwrap();
        write_turtle(&graph, &path).unwrap();
        let reread = parse_file(&path, VocabFormat::Turtle, None).unwrap();
        assert_eq!(reread.len(), 2);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
