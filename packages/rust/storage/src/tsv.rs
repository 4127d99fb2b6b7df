//! Tab-separated sheet exchange.
//!
//! Rows are written in ledger order under a header line. Cells keep their
//! length: a short row stays short so it can still be flagged on import.
//! Tabs, newlines and backslashes inside cells are backslash-escaped, which
//! keeps multi-line catalog entries on one line.

use vocabsync_shared::{LEDGER_HEADER, LedgerRow, Result, VocabError, column};

/// Render rows as TSV with the header line first.
pub fn export_tsv(rows: &[LedgerRow]) -> String {
    let mut out = LEDGER_HEADER.join("\t");
    out.push('\n');
    for row in rows {
        let line: Vec<String> = row.cells.iter().map(|c| escape(c)).collect();
        out.push_str(&line.join("\t"));
        out.push('\n');
    }
    out
}

/// Parse TSV text into rows numbered from 0. A leading header line is
/// skipped and blank lines are ignored.
pub fn import_tsv(text: &str) -> Result<Vec<LedgerRow>> {
    let mut rows = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            continue;
        }
        if index == 0 && is_header(line) {
            continue;
        }
        let cells = line
            .split('\t')
            .map(unescape)
            .collect::<Result<Vec<_>>>()
            .map_err(|e| VocabError::parse(format!("line {}: {e}", index + 1)))?;
        rows.push(LedgerRow::new(rows.len(), cells));
    }
    Ok(rows)
}

fn is_header(line: &str) -> bool {
    line.split('\t')
        .next()
        .is_some_and(|first| first.trim().eq_ignore_ascii_case(LEDGER_HEADER[column::TITLE]))
}

fn escape(cell: &str) -> String {
    let mut out = String::with_capacity(cell.len());
    for c in cell.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(cell: &str) -> Result<String> {
    let mut out = String::with_capacity(cell.len());
    let mut chars = cell.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => return Err(VocabError::parse("dangling escape at end of cell")),
        }
    }
    Ok(out)
}
