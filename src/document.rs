//! The document capabilities the collector and annotator rely on.

use crate::error::Result;
use crate::model::ContainerKey;

/// One run of text as it appears in a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunText {
    pub text: String,
    pub superscript: bool,
}

#[cfg(test)]
impl RunText {
    pub fn plain(text: &str) -> RunText {
        RunText {
            text: text.to_string(),
            superscript: false,
        }
    }

    pub fn superscript(text: &str) -> RunText {
        RunText {
            text: text.to_string(),
            superscript: true,
        }
    }
}

/// Formatting applied on top of the run a replacement is inserted into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStyle {
    pub bold: bool,
    pub strike: bool,
    /// Hex RGB, e.g. `C00000`.
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledText {
    pub text: String,
    pub style: RunStyle,
}

/// Replace the bytes `start..end` of a container's text with styled runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanEdit {
    pub start: usize,
    pub end: usize,
    pub replacement: Vec<StyledText>,
}

/// A document seen as an ordered list of text containers.
pub trait TextContainers {
    /// All containers in renumbering order.
    fn containers(&self) -> Vec<ContainerKey>;

    /// The runs of one container, or `None` if the key does not exist.
    fn read_runs(&self, key: &ContainerKey) -> Result<Option<Vec<RunText>>>;

    fn read_text(&self, key: &ContainerKey) -> Result<Option<String>> {
        Ok(self
            .read_runs(key)?
            .map(|runs| runs.iter().map(|r| r.text.as_str()).collect()))
    }

    /// Apply non-overlapping edits, given in ascending order, to one container.
    /// Offsets refer to the container text before any edit.
    fn replace_spans(&mut self, key: &ContainerKey, edits: &[SpanEdit]) -> Result<()>;
}
