use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one text container in renumbering order.
///
/// The derived ordering is the document order used for "first appearance":
/// every body paragraph sorts before every table cell, tables sort by index,
/// cells row-major, then by paragraph within the cell.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContainerKey {
    Paragraph {
        index: usize,
    },
    TableCell {
        table: usize,
        row: usize,
        col: usize,
        paragraph: usize,
    },
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    Paragraph,
    TableCell,
}

impl ContainerKey {
    pub fn kind(&self) -> ContainerKind {
        match self {
            ContainerKey::Paragraph { .. } => ContainerKind::Paragraph,
            ContainerKey::TableCell { .. } => ContainerKind::TableCell,
        }
    }

    pub fn table(&self) -> Option<usize> {
        match self {
            ContainerKey::TableCell { table, .. } => Some(*table),
            ContainerKey::Paragraph { .. } => None,
        }
    }
}

impl fmt::Display for ContainerKey {
    // 1-based, as a reader of the document would count.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerKey::Paragraph { index } => write!(f, "paragraph {}", index + 1),
            ContainerKey::TableCell {
                table,
                row,
                col,
                paragraph,
            } => {
                write!(f, "table {}, row {}, col {}", table + 1, row + 1, col + 1)?;
                if *paragraph > 0 {
                    write!(f, ", paragraph {}", paragraph + 1)?;
                }
                Ok(())
            }
        }
    }
}

/// Stable position of an occurrence: its container, then the marker's
/// ordinal within that container.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub container: ContainerKey,
    pub ordinal: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MarkerStyle {
    /// `[12]`
    Bracket,
    /// A superscript run holding only digits.
    Superscript,
}

impl MarkerStyle {
    pub fn render(&self, number: u32) -> String {
        match self {
            MarkerStyle::Bracket => format!("[{}]", number),
            MarkerStyle::Superscript => number.to_string(),
        }
    }
}

/// One citation marker found in the source document.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CitationOccurrence {
    pub old_number: u32,
    pub style: MarkerStyle,
    pub position: Position,
    /// Byte range of the marker within the container text.
    pub start: usize,
    pub end: usize,
    pub context_text: String,
}

impl CitationOccurrence {
    pub fn marker(&self) -> String {
        self.style.render(self.old_number)
    }
}

/// A mention such as "Table II" in running text. Listed in the report next
/// to the citations of its container; never clustered or renumbered.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TableReference {
    /// Roman numeral, uppercased.
    pub numeral: String,
    pub container: ContainerKey,
    pub start: usize,
    pub end: usize,
}

impl TableReference {
    pub fn label(&self) -> String {
        format!("Table {}", self.numeral)
    }
}

/// A container that holds at least one citation or table reference.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ContainerSummary {
    pub key: ContainerKey,
    /// First three words of the container text, markers removed.
    pub excerpt: String,
}

/// Result of a collection pass, in document order.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct Collection {
    pub containers: Vec<ContainerSummary>,
    pub occurrences: Vec<CitationOccurrence>,
    pub table_refs: Vec<TableReference>,
}

impl Collection {
    pub fn is_empty(&self) -> bool {
        self.occurrences.is_empty()
    }

    pub fn in_container(&self, key: &ContainerKey) -> impl Iterator<Item = &CitationOccurrence> + '_ {
        let key = *key;
        self.occurrences
            .iter()
            .filter(move |o| o.position.container == key)
    }

    pub fn table_refs_in(&self, key: &ContainerKey) -> impl Iterator<Item = &TableReference> + '_ {
        let key = *key;
        self.table_refs.iter().filter(move |t| t.container == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraphs_sort_before_tables() {
        let para = ContainerKey::Paragraph { index: 40 };
        let cell = ContainerKey::TableCell {
            table: 0,
            row: 0,
            col: 0,
            paragraph: 0,
        };
        assert!(para < cell);
    }

    #[test]
    fn test_cells_sort_row_major() {
        let cell = |row, col| ContainerKey::TableCell {
            table: 1,
            row,
            col,
            paragraph: 0,
        };
        let mut keys = vec![cell(1, 0), cell(0, 2), cell(0, 1)];
        keys.sort();
        assert_eq!(keys, vec![cell(0, 1), cell(0, 2), cell(1, 0)]);
    }

    #[test]
    fn test_container_display_is_one_based() {
        assert_eq!(ContainerKey::Paragraph { index: 0 }.to_string(), "paragraph 1");
        let cell = ContainerKey::TableCell {
            table: 0,
            row: 2,
            col: 1,
            paragraph: 1,
        };
        assert_eq!(cell.to_string(), "table 1, row 3, col 2, paragraph 2");
    }

    #[test]
    fn test_marker_render() {
        assert_eq!(MarkerStyle::Bracket.render(7), "[7]");
        assert_eq!(MarkerStyle::Superscript.render(7), "7");
    }
}
