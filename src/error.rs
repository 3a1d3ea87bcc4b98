use thiserror::Error;

/// Failures raised by the chunking core. All of them are fatal for the batch.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// A detector reported a heading span that does not line up with the text.
    #[error("section offsets {start}..{end} do not match the {len}-byte text (heading `{heading}`)")]
    StructuralMismatch {
        start: usize,
        end: usize,
        len: usize,
        heading: String,
    },

    #[error("{field} not found for url: {url}")]
    MissingField { field: &'static str, url: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
