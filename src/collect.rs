//! Citation collection: a read-only scan of every container in order.

use crate::config::Config;
use crate::document::{RunText, TextContainers};
use crate::error::Result;
use crate::model::{
    CitationOccurrence, Collection, ContainerKey, ContainerSummary, MarkerStyle, Position,
    TableReference,
};
use regex::Regex;

#[derive(Debug, Clone, PartialEq)]
struct Marker {
    start: usize,
    end: usize,
    number: u32,
    style: MarkerStyle,
}

pub struct Collector {
    bracket: Option<Regex>,
    superscript: Option<Regex>,
    table: Regex,
}

impl Collector {
    pub fn new(config: &Config) -> Collector {
        Collector {
            bracket: config
                .uses(MarkerStyle::Bracket)
                .then(|| static_regex(r"\[\s*(\d+)\s*\]")),
            superscript: config
                .uses(MarkerStyle::Superscript)
                .then(|| static_regex(r"\d+")),
            table: static_regex(r"\b[Tt]ables?\s+([IVXivx]+)\b"),
        }
    }

    pub fn collect<D: TextContainers + ?Sized>(&self, doc: &D) -> Result<Collection> {
        let mut collection = Collection::default();

        for key in doc.containers() {
            let Some(runs) = doc.read_runs(&key)? else {
                continue;
            };
            let text: String = runs.iter().map(|r| r.text.as_str()).collect();
            let markers = self.find_markers(&text, &runs);
            let tables = self.find_table_refs(key, &text, &runs);
            if markers.is_empty() && tables.is_empty() {
                continue;
            }
            collection.table_refs.extend(tables);

            collection.containers.push(ContainerSummary {
                key,
                excerpt: excerpt(&text, &markers),
            });
            for (ordinal, marker) in markers.iter().enumerate() {
                collection.occurrences.push(CitationOccurrence {
                    old_number: marker.number,
                    style: marker.style,
                    position: Position {
                        container: key,
                        ordinal,
                    },
                    start: marker.start,
                    end: marker.end,
                    context_text: context_window(&text, &markers, ordinal),
                });
            }
        }

        Ok(collection)
    }

    fn find_markers(&self, text: &str, runs: &[RunText]) -> Vec<Marker> {
        let mut markers = Vec::new();

        if let Some(re) = &self.bracket {
            for caps in re.captures_iter(text) {
                let (Some(whole), Some(digits)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                // Too large for u32 is as malformed as `[a]`.
                let Ok(number) = digits.as_str().parse::<u32>() else {
                    continue;
                };
                markers.push(Marker {
                    start: whole.start(),
                    end: whole.end(),
                    number,
                    style: MarkerStyle::Bracket,
                });
            }
        }

        if let Some(re) = &self.superscript {
            let bracketed = markers.len();
            for (offset, run) in run_offsets(runs) {
                if !run.superscript {
                    continue;
                }
                // `1,2` and `3-5` give one marker per number; a range keeps
                // only its printed endpoints.
                for digits in re.find_iter(&run.text) {
                    let Ok(number) = digits.as_str().parse::<u32>() else {
                        continue;
                    };
                    let (start, end) = (offset + digits.start(), offset + digits.end());
                    if markers[..bracketed]
                        .iter()
                        .any(|m| m.start < end && start < m.end)
                    {
                        continue;
                    }
                    markers.push(Marker {
                        start,
                        end,
                        number,
                        style: MarkerStyle::Superscript,
                    });
                }
            }
        }

        markers.sort_by_key(|m| m.start);
        markers
    }

    /// Table mentions in the container's regular (non-superscript) text.
    fn find_table_refs(&self, key: ContainerKey, text: &str, runs: &[RunText]) -> Vec<TableReference> {
        let raised: Vec<(usize, usize)> = run_offsets(runs)
            .filter(|(_, run)| run.superscript)
            .map(|(offset, run)| (offset, offset + run.text.len()))
            .collect();

        self.table
            .captures_iter(text)
            .filter_map(|caps| {
                let (whole, numeral) = (caps.get(0)?, caps.get(1)?);
                if raised
                    .iter()
                    .any(|&(s, e)| whole.start() < e && s < whole.end())
                {
                    return None;
                }
                Some(TableReference {
                    numeral: numeral.as_str().to_uppercase(),
                    container: key,
                    start: whole.start(),
                    end: whole.end(),
                })
            })
            .collect()
    }
}

fn static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static citation pattern")
}

/// Each run with the byte offset where it starts in the container text.
fn run_offsets<'a>(runs: &'a [RunText]) -> impl Iterator<Item = (usize, &'a RunText)> + 'a {
    runs.iter().scan(0, |offset, run| {
        let start = *offset;
        *offset += run.text.len();
        Some((start, run))
    })
}

/// The text a citation is compared by: what precedes it back to the previous
/// marker, or, when that is empty, what follows it up to the next marker.
fn context_window(text: &str, markers: &[Marker], i: usize) -> String {
    let before_start = if i == 0 { 0 } else { markers[i - 1].end };
    let before = clean(&text[before_start..markers[i].start]);
    if !before.is_empty() {
        return before;
    }
    let after_end = markers.get(i + 1).map(|m| m.start).unwrap_or(text.len());
    clean(&text[markers[i].end..after_end])
}

fn clean(segment: &str) -> String {
    collapse_whitespace(segment)
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '.' | ',' | ';' | ':'))
        .to_string()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First three words of the container text with the markers cut out.
fn excerpt(text: &str, markers: &[Marker]) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut last = 0;
    for m in markers {
        stripped.push_str(&text[last..m.start]);
        stripped.push(' ');
        last = m.end;
    }
    stripped.push_str(&text[last..]);
    stripped.split_whitespace().take(3).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::memory::MemoryDocument;
    use crate::model::ContainerKind;

    fn collector() -> Collector {
        Collector::new(&Config::default())
    }

    fn numbers(collection: &Collection) -> Vec<u32> {
        collection.occurrences.iter().map(|o| o.old_number).collect()
    }

    #[test]
    fn test_bracket_markers_in_order() {
        let doc = MemoryDocument::paragraphs(&[
            "Aspirin lowers risk [1]. Statins also help [2].",
            "Nothing cited here.",
            "Repeated claim [ 1 ].",
        ]);
        let collection = collector().collect(&doc).unwrap();
        assert_eq!(numbers(&collection), vec![1, 2, 1]);
        let occ = &collection.occurrences[1];
        assert_eq!(occ.context_text, "Statins also help");
        assert_eq!(occ.position.ordinal, 1);
        assert_eq!((occ.start, occ.end), (43, 46));
        assert_eq!(collection.occurrences[2].context_text, "Repeated claim");
        assert_eq!(collection.containers.len(), 2);
        assert_eq!(collection.containers[0].excerpt, "Aspirin lowers risk");
    }

    #[test]
    fn test_malformed_markers_are_skipped() {
        let doc = MemoryDocument::paragraphs(&[
            "Not citations: [a] [1a] [1-3] [1, 2] [] [99999999999].",
        ]);
        let collection = collector().collect(&doc).unwrap();
        assert!(collection.is_empty());
        assert!(collection.containers.is_empty());
    }

    #[test]
    fn test_leading_marker_uses_following_text() {
        let doc = MemoryDocument::paragraphs(&[
            "[4] Smith J. Deep learning for citations. J Inf Sci. 2020.",
        ]);
        let collection = collector().collect(&doc).unwrap();
        assert_eq!(
            collection.occurrences[0].context_text,
            "Smith J. Deep learning for citations. J Inf Sci. 2020"
        );
    }

    #[test]
    fn test_adjacent_markers() {
        let doc = MemoryDocument::paragraphs(&["Shown twice [1][2] in trials."]);
        let collection = collector().collect(&doc).unwrap();
        assert_eq!(collection.occurrences[0].context_text, "Shown twice");
        // Nothing between [1] and [2], so [2] looks forward.
        assert_eq!(collection.occurrences[1].context_text, "in trials");
    }

    #[test]
    fn test_superscript_markers_when_enabled() {
        let mut doc = MemoryDocument::default();
        doc.insert(
            ContainerKey::Paragraph { index: 0 },
            vec![
                RunText::plain("Mortality fell sharply"),
                RunText::superscript("12"),
                RunText::plain(" after screening"),
                RunText::superscript("a"),
            ],
        );

        assert!(collector().collect(&doc).unwrap().is_empty());

        let config = Config {
            markers: vec![MarkerStyle::Bracket, MarkerStyle::Superscript],
            ..Config::default()
        };
        let collection = Collector::new(&config).collect(&doc).unwrap();
        assert_eq!(numbers(&collection), vec![12]);
        let occ = &collection.occurrences[0];
        assert_eq!(occ.style, MarkerStyle::Superscript);
        assert_eq!((occ.start, occ.end), (22, 24));
        assert_eq!(occ.context_text, "Mortality fell sharply");
    }

    fn with_superscript() -> Collector {
        Collector::new(&Config {
            markers: vec![MarkerStyle::Bracket, MarkerStyle::Superscript],
            ..Config::default()
        })
    }

    #[test]
    fn test_superscript_lists_and_ranges() {
        let mut doc = MemoryDocument::default();
        doc.insert(
            ContainerKey::Paragraph { index: 0 },
            vec![
                RunText::plain("Mortality fell"),
                RunText::superscript("1,2"),
                RunText::plain(" after screening"),
                RunText::superscript("3-5"),
                RunText::plain(" and in cohorts"),
                RunText::superscript("6\u{2013}8"),
            ],
        );
        let collection = with_superscript().collect(&doc).unwrap();
        assert_eq!(numbers(&collection), vec![1, 2, 3, 5, 6, 8]);

        let spans: Vec<(usize, usize)> = collection
            .occurrences
            .iter()
            .map(|o| (o.start, o.end))
            .collect();
        // en dash is three bytes
        assert_eq!(
            spans,
            vec![(14, 15), (16, 17), (33, 34), (35, 36), (51, 52), (55, 56)]
        );
        assert_eq!(collection.occurrences[0].context_text, "Mortality fell");
        assert_eq!(collection.occurrences[2].context_text, "after screening");
    }

    #[test]
    fn test_superscript_bracket_not_counted_twice() {
        let mut doc = MemoryDocument::default();
        doc.insert(
            ContainerKey::Paragraph { index: 0 },
            vec![RunText::plain("Shown"), RunText::superscript("[4]")],
        );
        let collection = with_superscript().collect(&doc).unwrap();
        assert_eq!(numbers(&collection), vec![4]);
        assert_eq!(collection.occurrences[0].style, MarkerStyle::Bracket);
    }

    #[test]
    fn test_table_references_collected_in_order() {
        let mut doc = MemoryDocument::paragraphs(&[
            "Baseline data are in Table I and outcomes in tables iv [2].",
            "No references to a timetable III here.",
        ]);
        doc.insert(
            ContainerKey::Paragraph { index: 2 },
            vec![RunText::plain("See Table"), RunText::superscript(" II")],
        );
        let collection = collector().collect(&doc).unwrap();

        let labels: Vec<String> = collection.table_refs.iter().map(|t| t.label()).collect();
        assert_eq!(labels, vec!["Table I", "Table IV"]);
        assert_eq!(
            (collection.table_refs[0].start, collection.table_refs[0].end),
            (21, 28)
        );
        assert_eq!(numbers(&collection), vec![2]);
        assert_eq!(collection.containers.len(), 1);
    }

    #[test]
    fn test_container_with_only_table_reference_is_listed() {
        let doc = MemoryDocument::paragraphs(&["Results appear in Table III."]);
        let collection = collector().collect(&doc).unwrap();
        assert!(collection.is_empty());
        assert_eq!(collection.containers.len(), 1);
        assert_eq!(collection.containers[0].excerpt, "Results appear in");
        assert_eq!(
            collection
                .table_refs_in(&ContainerKey::Paragraph { index: 0 })
                .count(),
            1
        );
    }

    #[test]
    fn test_marker_split_across_runs() {

        let mut doc = MemoryDocument::default();
        doc.insert(
            ContainerKey::Paragraph { index: 0 },
            vec![
                RunText::plain("Known ["),
                RunText::plain("3"),
                RunText::plain("] fact"),
            ],
        );
        let collection = collector().collect(&doc).unwrap();
        assert_eq!(numbers(&collection), vec![3]);
        assert_eq!((collection.occurrences[0].start, collection.occurrences[0].end), (6, 9));
    }

    #[test]
    fn test_paragraphs_before_table_cells() {
        let mut doc = MemoryDocument::paragraphs(&["Body text [2]."]);
        doc.insert(
            ContainerKey::TableCell {
                table: 0,
                row: 0,
                col: 0,
                paragraph: 0,
            },
            vec![RunText::plain("Cell text [1].")],
        );
        let collection = collector().collect(&doc).unwrap();
        assert_eq!(numbers(&collection), vec![2, 1]);
        assert_eq!(
            collection
                .containers
                .iter()
                .map(|c| c.key.kind())
                .collect::<Vec<_>>(),
            vec![ContainerKind::Paragraph, ContainerKind::TableCell]
        );
    }

    #[test]
    fn test_collection_is_idempotent() {
        let doc = MemoryDocument::paragraphs(&["One [1].", "Two [2] and [3].", "Again [1]."]);
        let c = collector();
        assert_eq!(c.collect(&doc).unwrap(), c.collect(&doc).unwrap());
    }
}
