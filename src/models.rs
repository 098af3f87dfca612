//! Core data types that flow through the ingestion and answer pipeline.

/// Where inside its source file a piece of text came from.
///
/// Paginated formats (PDF) carry a 1-based page number; tabular formats
/// (XLSX) carry a worksheet name; everything else is the whole file.
/// Presence of page/sheet is explicit here rather than probed out of a
/// metadata map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locus {
    Whole,
    Page(u32),
    Sheet(String),
}

/// One loaded unit of text produced by a format loader.
///
/// Immutable after creation; discarded once chunked.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub text: String,
    pub source_name: String,
    pub locus: Locus,
}

/// A contiguous slice of a source document's text — the atomic unit of
/// retrieval.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub text: String,
    pub source_name: String,
    pub locus: Locus,
    /// Position within the source document, preserved for ordering.
    pub seq: i64,
}

impl Chunk {
    /// Human-readable source label, e.g. `report.pdf (page 3)` or
    /// `budget.xlsx (sheet: Q1)`.
    pub fn source_label(&self) -> String {
        match &self.locus {
            Locus::Whole => self.source_name.clone(),
            Locus::Page(n) => format!("{} (page {})", self.source_name, n),
            Locus::Sheet(s) => format!("{} (sheet: {})", self.source_name, s),
        }
    }
}

/// A chunk returned from a similarity search, with its score.
#[derive(Debug, Clone)]
pub struct Retrieved {
    pub chunk: Chunk,
    pub similarity: f32,
}

/// Structured result of one `ask` call, returned to the CLI/UI.
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// The answer text (or a description of what went wrong).
    pub answer: String,
    /// De-duplicated source labels in first-occurrence order.
    pub sources: Vec<String>,
    /// Raw texts of the chunks the prompt was grounded in.
    pub context: Vec<String>,
    /// Extracted deliberation trace, when the reasoning backend emitted
    /// a well-formed one.
    pub reasoning: Option<String>,
}

/// Aggregate counts from one ingestion run.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestStats {
    pub files_processed: u64,
    pub files_failed: u64,
    pub total_chunks: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_label_variants() {
        let base = Chunk {
            text: String::new(),
            source_name: "a.pdf".to_string(),
            locus: Locus::Whole,
            seq: 0,
        };
        assert_eq!(base.source_label(), "a.pdf");

        let paged = Chunk {
            locus: Locus::Page(3),
            ..base.clone()
        };
        assert_eq!(paged.source_label(), "a.pdf (page 3)");

        let sheeted = Chunk {
            source_name: "b.xlsx".to_string(),
            locus: Locus::Sheet("Q1".to_string()),
            ..base
        };
        assert_eq!(sheeted.source_label(), "b.xlsx (sheet: Q1)");
    }
}
