//! Pull `owl:imports` targets into the graph that declares them.

use tracing::{debug, info, instrument};

use vocabsync_fetch::Fetcher;
use vocabsync_shared::{Result, VocabError, VocabFormat};
use vocabsync_skos::{Graph, merge_graph, owl_imports, parse_str};

/// What [`explicit_import`] merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: Vec<String>,
    pub triples_added: usize,
}

/// Serialization of an imported document, from its URL suffix.
/// Ontologies published without a known suffix are read as RDF/XML.
pub fn import_format(url: &str) -> VocabFormat {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "owl" | "xml" => VocabFormat::RdfXml,
        other => VocabFormat::from_token(other).unwrap_or(VocabFormat::RdfXml),
    }
}

/// Download every document `graph` imports and merge it in.
///
/// Only the imports declared by `graph` itself are followed. The first
/// download or parse failure aborts the merge.
#[instrument(skip_all)]
pub async fn explicit_import(fetcher: &Fetcher, graph: &mut Graph) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    for target in owl_imports(graph) {
        let download = fetcher.download(&target).await?;
        let format = import_format(&target);
        let base = target.clone();
        let imported = tokio::task::spawn_blocking(move || {
            parse_str(&download.text, format, Some(&base))
        })
        .await
        .map_err(|e| VocabError::Parse {
            message: format!("import parser aborted: {e}"),
        })??;

        let added = merge_graph(graph, &imported);
        debug!(url = %target, %format, added, "import merged");
        report.triples_added += added;
        report.imported.push(target);
    }
    if !report.imported.is_empty() {
        info!(
            imports = report.imported.len(),
            triples_added = report.triples_added,
            "owl:imports merged"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vocabsync_fetch::FetchOptions;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const IMPORTED: &str = "<http://ex.org/base#A> <http://www.w3.org/2004/02/skos/core#prefLabel> \"A\" .\n";

    fn importing(server: &MockServer, file: &str) -> Graph {
        let nt = format!(
            "<http://ex.org/onto> <http://www.w3.org/2002/07/owl#imports> <{}/{file}> .\n",
            server.uri()
        );
        parse_str(&nt, VocabFormat::NTriples, None).unwrap()
    }

    #[test]
    fn formats_follow_url_suffix() {
        assert_eq!(import_format("http://ex.org/a.ttl"), VocabFormat::Turtle);
        assert_eq!(import_format("http://ex.org/a.NT?x=1"), VocabFormat::NTriples);
        assert_eq!(import_format("http://ex.org/a.owl"), VocabFormat::RdfXml);
        assert_eq!(import_format("http://ex.org/core#"), VocabFormat::RdfXml);
    }

    #[tokio::test]
    async fn imported_triples_are_merged() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/base.nt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(IMPORTED))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(FetchOptions::default()).unwrap();
        let mut graph = importing(&server, "base.nt");
        let report = explicit_import(&fetcher, &mut graph).await.unwrap();

        assert_eq!(report.imported, [format!("{}/base.nt", server.uri())]);
        assert_eq!(report.triples_added, 1);
        assert_eq!(graph.len(), 2);
    }

    #[tokio::test]
    async fn missing_import_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.ttl"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(FetchOptions::default()).unwrap();
        let mut graph = importing(&server, "gone.ttl");
        let err = explicit_import(&fetcher, &mut graph).await.unwrap_err();
        assert!(matches!(err, VocabError::HttpStatus { status: 404, .. }));
        assert_eq!(graph.len(), 1);
    }

    #[tokio::test]
    async fn graph_without_imports_is_untouched() {
        let fetcher = Fetcher::new(FetchOptions::default()).unwrap();
        let mut graph = parse_str(IMPORTED, VocabFormat::NTriples, None).unwrap();
        let report = explicit_import(&fetcher, &mut graph).await.unwrap();
        assert_eq!(report, ImportReport::default());
        assert_eq!(graph.len(), 1);
    }
}
