pub mod glyph;
pub mod highlight;
pub mod interpolate;
pub mod locate;
pub mod mapper;
pub mod writer;

pub mod errors {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("selected snippet could not be located in the page transcript")]
        SnippetNotLocated,
        #[error("no geometry overlaps entity {text:?} at [{start}, {end})")]
        NoGeometryOverlap {
            text: String,
            start: usize,
            end: usize,
        },
    }
}

pub use highlight::{GeometrySource, HighlightPlan, Highlighter, Selection};
pub use writer::{AnnotationWriter, WriteReport, WriterChain};
