//! Triple store client for vocabsync.
//!
//! Speaks the graph store HTTP protocol of a Fuseki-style dataset endpoint:
//! `{endpoint}/data?graph=<uri>` for graph management and
//! `{endpoint}/query` for SPARQL.

use std::time::Duration;

use reqwest::{Client, Method, Response};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use vocabsync_shared::{Result, StoreConfig, UploadMethod, VocabError};

/// Query listing every named graph in the dataset.
pub const LIST_GRAPHS_QUERY: &str = "SELECT ?g WHERE { GRAPH ?g { } }";

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// What a graph delete found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The graph did not exist. Not an error.
    NotFound,
}

/// Counts reported by the store after an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReceipt {
    pub triple_count: u64,
    pub quad_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    results: SparqlBindings,
}

#[derive(Debug, Deserialize)]
struct SparqlBindings {
    bindings: Vec<GraphBinding>,
}

#[derive(Debug, Deserialize)]
struct GraphBinding {
    g: BoundValue,
}

#[derive(Debug, Deserialize)]
struct BoundValue {
    value: String,
}

// ---------------------------------------------------------------------------
// StoreClient
// ---------------------------------------------------------------------------

/// HTTP client bound to one dataset endpoint.
pub struct StoreClient {
    client: Client,
    endpoint: Url,
    method: UploadMethod,
}

impl StoreClient {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let mut endpoint = Url::parse(&config.endpoint).map_err(|e| {
            VocabError::config(format!("invalid store endpoint '{}': {e}", config.endpoint))
        })?;
        // Keep the last path segment when joining `data` / `query`.
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VocabError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            method: config.upload_method,
        })
    }

    fn service_url(&self, service: &str) -> Result<Url> {
        self.endpoint
            .join(service)
            .map_err(|e| VocabError::config(format!("invalid store endpoint: {e}")))
    }

    fn data_url(&self, graph: &str) -> Result<Url> {
        let mut url = self.service_url("data")?;
        url.query_pairs_mut().append_pair("graph", graph);
        Ok(url)
    }

    /// Delete a named graph. A missing graph is reported, not an error.
    #[instrument(skip_all, fields(graph = %graph))]
    pub async fn delete_graph(&self, graph: &str) -> Result<DeleteOutcome> {
        let url = self.data_url(graph)?;
        let response = self.send(self.client.delete(url.clone())).await?;

        match response.status().as_u16() {
            404 => {
                debug!("graph did not exist");
                Ok(DeleteOutcome::NotFound)
            }
            s if (200..300).contains(&s) => {
                debug!("graph deleted");
                Ok(DeleteOutcome::Deleted)
            }
            _ => Err(status_error(&url, response).await),
        }
    }

    /// Upload `payload` into a named graph with the configured verb.
    ///
    /// The store adds to whatever the graph already holds.
    #[instrument(skip_all, fields(graph = %graph, mime = %mime))]
    pub async fn upload_graph(&self, graph: &str, payload: Vec<u8>, mime: &str) -> Result<UploadReceipt> {
        let url = self.data_url(graph)?;
        let size = payload.len();
        let part = reqwest::multipart::Part::bytes(payload)
            .file_name(upload_file_name(mime))
            .mime_str(mime)
            .map_err(|e| VocabError::validation(format!("invalid MIME type '{mime}': {e}")))?;
        let form = reqwest::multipart::Form::new().part("name", part);

        let method = match self.method {
            UploadMethod::Put => Method::PUT,
            UploadMethod::Post => Method::POST,
        };
        let response = self
            .send(self.client.request(method, url.clone()).multipart(form))
            .await?;

        if !response.status().is_success() {
            return Err(status_error(&url, response).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| VocabError::Network(format!("{url}: body read failed: {e}")))?;
        let receipt = parse_receipt(&body)?;
        info!(bytes = size, triple_count = receipt.triple_count, "graph uploaded");
        Ok(receipt)
    }

    /// Replace a named graph: delete it, then upload the new content.
    ///
    /// Only a missing graph is tolerated on delete; any other delete failure
    /// aborts before uploading so triples are never duplicated.
    pub async fn replace(&self, graph: &str, payload: Vec<u8>, mime: &str) -> Result<UploadReceipt> {
        if self.delete_graph(graph).await? == DeleteOutcome::NotFound {
            debug!(graph, "uploading into a new graph");
        }
        self.upload_graph(graph, payload, mime).await
    }

    /// Download a named graph as Turtle.
    #[instrument(skip_all, fields(graph = %graph))]
    pub async fn get_graph(&self, graph: &str) -> Result<String> {
        let url = self.data_url(graph)?;
        let response = self
            .send(self.client.get(url.clone()).header("Accept", "text/turtle"))
            .await?;
        if !response.status().is_success() {
            return Err(status_error(&url, response).await);
        }
        response
            .text()
            .await
            .map_err(|e| VocabError::Network(format!("{url}: body read failed: {e}")))
    }

    /// URIs of every named graph in the dataset.
    #[instrument(skip_all)]
    pub async fn list_graphs(&self) -> Result<Vec<String>> {
        let url = self.service_url("query")?;
        let request = self
            .client
            .get(url.clone())
            .query(&[("query", LIST_GRAPHS_QUERY)])
            .header("Accept", "application/sparql-results+json");
        let response = self.send(request).await?;
        if !response.status().is_success() {
            return Err(status_error(&url, response).await);
        }

        let results: SparqlResults = response
            .json()
            .await
            .map_err(|e| VocabError::parse(format!("invalid SPARQL results: {e}")))?;
        let graphs: Vec<String> = results
            .results
            .bindings
            .into_iter()
            .map(|b| b.g.value)
            .collect();
        info!(count = graphs.len(), "listed store graphs");
        Ok(graphs)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        request
            .send()
            .await
            .map_err(|e| VocabError::Network(e.to_string()))
    }
}

async fn status_error(url: &Url, response: Response) -> VocabError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    warn!(%url, status, body = %body, "store request rejected");
    VocabError::HttpStatus {
        url: url.to_string(),
        status,
        body,
    }
}

/// Read the counts from an upload response. A missing `tripleCount` means
/// the store broke its contract.
fn parse_receipt(body: &str) -> Result<UploadReceipt> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| VocabError::validation(format!("store response is not JSON: {e}: {body}")))?;

    let triple_count = value
        .get("tripleCount")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| VocabError::validation(format!("store response has no tripleCount: {body}")))?;

    Ok(UploadReceipt {
        triple_count,
        quad_count: value.get("quadCount").and_then(serde_json::Value::as_u64),
    })
}

fn upload_file_name(mime: &str) -> &'static str {
    match mime.split(';').next().map(str::trim) {
        Some("application/rdf-xml") | Some("application/rdf+xml") => "upload.rdf",
        Some("text/n3") => "upload.n3",
        Some("application/n-triples") => "upload.nt",
        _ => "upload.ttl",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GRAPH: &str = "http://ex.org/v/";
    const TURTLE: &str = "<http://ex.org/v/1> a <http://www.w3.org/2004/02/skos/core#Concept> .\n";

    fn client(server: &MockServer, method: UploadMethod) -> StoreClient {
        StoreClient::new(&StoreConfig {
            endpoint: format!("{}/skosmos", server.uri()),
            upload_method: method,
            timeout_secs: 5,
            sparql_endpoint: None,
        })
        .unwrap()
    }

    fn upload_ok() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_string(r#"{"count":1,"tripleCount":1,"quadCount":0}"#)
    }

    #[tokio::test]
    async fn replace_deletes_before_putting() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/skosmos/data"))
            .and(query_param("graph", GRAPH))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/skosmos/data"))
            .and(query_param("graph", GRAPH))
            .and(body_string_contains("filename=\"upload.ttl\""))
            .and(body_string_contains("application/x-turtle"))
            .respond_with(upload_ok())
            .expect(1)
            .mount(&server)
            .await;

        let receipt = client(&server, UploadMethod::Put)
            .replace(GRAPH, TURTLE.as_bytes().to_vec(), "application/x-turtle")
            .await
            .unwrap();
        assert_eq!(receipt.triple_count, 1);
        assert_eq!(receipt.quad_count, Some(0));

        let requests = server.received_requests().await.unwrap();
        let methods: Vec<String> = requests.iter().map(|r| r.method.to_string()).collect();
        assert_eq!(methods, ["DELETE", "PUT"]);
    }

    #[tokio::test]
    async fn missing_graph_on_delete_is_fine() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404).set_body_string("No such graph"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(upload_ok())
            .expect(1)
            .mount(&server)
            .await;

        let store = client(&server, UploadMethod::Post);
        assert_eq!(store.delete_graph(GRAPH).await.unwrap(), DeleteOutcome::NotFound);
        let receipt = store
            .replace(GRAPH, TURTLE.as_bytes().to_vec(), "application/x-turtle")
            .await
            .unwrap();
        assert_eq!(receipt.triple_count, 1);
    }

    #[tokio::test]
    async fn failed_delete_skips_upload() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(500).set_body_string("locked"))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(upload_ok())
            .expect(0)
            .mount(&server)
            .await;

        let err = client(&server, UploadMethod::Put)
            .replace(GRAPH, TURTLE.as_bytes().to_vec(), "application/x-turtle")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn rejected_upload_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Parse error: line 1"))
            .mount(&server)
            .await;

        let err = client(&server, UploadMethod::Put)
            .replace(GRAPH, b"garbage".to_vec(), "application/x-turtle")
            .await
            .unwrap_err();
        match err {
            VocabError::HttpStatus { status, body, .. } => {
                assert_eq!(status, 400);
                assert!(body.contains("Parse error"));
            }
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_triple_count_fails_loudly() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"count":3}"#))
            .mount(&server)
            .await;

        let err = client(&server, UploadMethod::Put)
            .upload_graph(GRAPH, TURTLE.as_bytes().to_vec(), "application/x-turtle")
            .await
            .unwrap_err();
        assert!(matches!(err, VocabError::Validation { .. }));
        assert!(err.to_string().contains("tripleCount"));
    }

    #[tokio::test]
    async fn lists_graphs_from_sparql_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/skosmos/query"))
            .and(query_param("query", LIST_GRAPHS_QUERY))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"head":{"vars":["g"]},"results":{"bindings":[
                    {"g":{"type":"uri","value":"http://ex.org/a/"}},
                    {"g":{"type":"uri","value":"http://ex.org/b/"}}]}}"#,
            ))
            .mount(&server)
            .await;

        let graphs = client(&server, UploadMethod::Put).list_graphs().await.unwrap();
        assert_eq!(graphs, ["http://ex.org/a/", "http://ex.org/b/"]);
    }

    #[tokio::test]
    async fn gets_graph_as_turtle() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/skosmos/data"))
            .and(query_param("graph", GRAPH))
            .respond_with(ResponseTemplate::new(200).set_body_string(TURTLE))
            .mount(&server)
            .await;

        let body = client(&server, UploadMethod::Put).get_graph(GRAPH).await.unwrap();
        assert_eq!(body, TURTLE);
    }

    #[test]
    fn file_names_follow_mime() {
        assert_eq!(upload_file_name("application/x-turtle"), "upload.ttl");
        assert_eq!(upload_file_name("text/n3; charset=utf-8"), "upload.n3");
        assert_eq!(upload_file_name("application/n-triples"), "upload.nt");
        assert_eq!(upload_file_name("application/rdf-xml"), "upload.rdf");
    }
}
