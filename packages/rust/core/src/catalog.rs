//! Catalog entries for the browsing interface's vocabulary configuration.

/// Fields embedded in one generated entry.
#[derive(Debug, Clone)]
pub struct CatalogEntry<'a> {
    pub short_name: &'a str,
    pub title: &'a str,
    pub namespace: &'a str,
    pub sparql_endpoint: &'a str,
}

impl CatalogEntry<'_> {
    /// Render the descriptor block. Every statement line but the last ends
    /// with ` ;` and the block ends with ` .`.
    pub fn render(&self) -> String {
        format!(
            ":{short} a skosmos:Vocabulary, void:Dataset ;\n    \
             dc:title \"{title}\" ;\n    \
             skosmos:shortName \"{short}\" ;\n    \
             void:uriSpace \"{ns}\" ;\n    \
             skosmos:sparqlGraph <{ns}> ;\n    \
             void:sparqlEndpoint <{endpoint}> .\n",
            short = self.short_name,
            title = escape_literal(self.title),
            ns = self.namespace,
            endpoint = self.sparql_endpoint,
        )
    }
}

fn escape_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}
