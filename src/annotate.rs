//! Applies an annotation plan to a document.

use crate::config::Colors;
use crate::document::{RunStyle, SpanEdit, StyledText, TextContainers};
use crate::error::{CitedupError, Result};
use crate::model::{CitationOccurrence, ContainerKey};
use crate::resolve::{AnnotationAction, AnnotationPlan};
use std::collections::BTreeMap;

pub struct Annotator<'a> {
    colors: &'a Colors,
}

impl<'a> Annotator<'a> {
    pub fn new(colors: &'a Colors) -> Annotator<'a> {
        Annotator { colors }
    }

    /// Rewrite every planned marker in place. Returns the number of markers
    /// touched.
    pub fn apply<D: TextContainers + ?Sized>(
        &self,
        doc: &mut D,
        occurrences: &[CitationOccurrence],
        plan: &AnnotationPlan,
    ) -> Result<usize> {
        let edits = self.edits(occurrences, plan)?;
        let mut applied = 0;
        for (key, container_edits) in &edits {
            doc.replace_spans(key, container_edits)?;
            applied += container_edits.len();
        }
        Ok(applied)
    }

    /// Span edits grouped by container, each group in ascending order.
    pub fn edits(
        &self,
        occurrences: &[CitationOccurrence],
        plan: &AnnotationPlan,
    ) -> Result<BTreeMap<ContainerKey, Vec<SpanEdit>>> {
        let mut out: BTreeMap<ContainerKey, Vec<SpanEdit>> = BTreeMap::new();
        for step in &plan.steps {
            let occ = occurrences
                .get(step.occurrence)
                .ok_or(CitedupError::UnknownOccurrence(step.occurrence))?;
            out.entry(occ.position.container)
                .or_default()
                .push(SpanEdit {
                    start: occ.start,
                    end: occ.end,
                    replacement: self.replacement(occ, step.action),
                });
        }
        for container_edits in out.values_mut() {
            container_edits.sort_by_key(|e| e.start);
        }
        Ok(out)
    }

    fn replacement(&self, occ: &CitationOccurrence, action: AnnotationAction) -> Vec<StyledText> {
        match action {
            AnnotationAction::Renumber { old, new } => vec![
                StyledText {
                    text: occ.style.render(old),
                    style: RunStyle {
                        strike: true,
                        color: Some(self.colors.old.clone()),
                        ..Default::default()
                    },
                },
                StyledText {
                    text: occ.style.render(new),
                    style: RunStyle {
                        bold: true,
                        color: Some(self.colors.new.clone()),
                        ..Default::default()
                    },
                },
            ],
            AnnotationAction::Strike { old, .. } => vec![StyledText {
                text: occ.style.render(old),
                style: RunStyle {
                    strike: true,
                    color: Some(self.colors.removed.clone()),
                    ..Default::default()
                },
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::Collector;
    use crate::config::Config;
    use crate::docx::fixtures::*;
    use crate::docx::DOCUMENT_PART;
    use crate::document::memory::MemoryDocument;
    use crate::resolve::Resolver;

    fn run_pipeline<D: TextContainers>(doc: &mut D, config: &Config) -> usize {
        let collection = Collector::new(config).collect(doc).unwrap();
        let resolution = Resolver::new(config.threshold).resolve(&collection.occurrences);
        Annotator::new(&config.colors)
            .apply(doc, &collection.occurrences, &resolution.plan())
            .unwrap()
    }

    #[test]
    fn test_kept_and_duplicate_markers() {
        let mut doc = MemoryDocument::paragraphs(&[
            "Aspirin reduces stroke risk [3].",
            "Statins lower cholesterol [1].",
            "Aspirin reduces stroke risk [3].",
        ]);
        let applied = run_pipeline(&mut doc, &Config::default());
        assert_eq!(applied, 3);
        assert_eq!(
            doc.text(&ContainerKey::Paragraph { index: 0 }),
            "Aspirin reduces stroke risk ~[3]~*[1]*."
        );
        assert_eq!(
            doc.text(&ContainerKey::Paragraph { index: 1 }),
            "Statins lower cholesterol ~[1]~*[2]*."
        );
        assert_eq!(
            doc.text(&ContainerKey::Paragraph { index: 2 }),
            "Aspirin reduces stroke risk ~[3]~."
        );
    }

    #[test]
    fn test_edits_sorted_within_container() {
        let doc = MemoryDocument::paragraphs(&["First [1] then [2] and [3]."]);
        let collection = Collector::new(&Config::default()).collect(&doc).unwrap();
        let mut plan = Resolver::new(0.9).resolve(&collection.occurrences).plan();
        plan.steps.reverse();

        let colors = Colors::default();
        let edits = Annotator::new(&colors)
            .edits(&collection.occurrences, &plan)
            .unwrap();
        let starts: Vec<usize> = edits[&ContainerKey::Paragraph { index: 0 }]
            .iter()
            .map(|e| e.start)
            .collect();
        assert_eq!(starts, vec![6, 15, 23]);
    }

    #[test]
    fn test_unknown_occurrence_is_an_error() {
        let colors = Colors::default();
        let plan = AnnotationPlan {
            steps: vec![crate::resolve::AnnotationStep {
                occurrence: 4,
                action: AnnotationAction::Renumber { old: 1, new: 1 },
            }],
        };
        assert!(matches!(
            Annotator::new(&colors).edits(&[], &plan),
            Err(CitedupError::UnknownOccurrence(4))
        ));
    }

    #[test]
    fn test_docx_renumber_styles() {
        let body = format!(
            "{}{}",
            para(&run("Screening lowers mortality [2].")),
            table(&[&["Outcome", "Screening lowers mortality [2]"]])
        );
        let mut doc = open(&body);
        let config = Config::default();
        assert_eq!(run_pipeline(&mut doc, &config), 2);
        assert!(doc.is_modified());

        let xml = part(&doc.to_bytes().unwrap(), DOCUMENT_PART);
        assert!(xml.contains(
            r#"<w:r><w:rPr><w:strike/><w:color w:val="C00000"/></w:rPr><w:t xml:space="preserve">[2]</w:t></w:r>"#
        ));
        assert!(xml.contains(
            r#"<w:r><w:rPr><w:b/><w:color w:val="0070C0"/></w:rPr><w:t xml:space="preserve">[1]</w:t></w:r>"#
        ));
        assert!(xml.contains(
            r#"<w:r><w:rPr><w:strike/><w:color w:val="808080"/></w:rPr><w:t xml:space="preserve">[2]</w:t></w:r>"#
        ));
    }

    #[test]
    fn test_docx_superscript_keeps_vert_align() {
        let body = para(&format!("{}{}", run("Mortality fell"), sup("7")));
        let mut doc = open(&body);
        let config = Config {
            markers: vec![crate::model::MarkerStyle::Superscript],
            ..Config::default()
        };
        run_pipeline(&mut doc, &config);
        let key = ContainerKey::Paragraph { index: 0 };
        assert_eq!(doc.read_text(&key).unwrap().as_deref(), Some("Mortality fell71"));
        let xml = part(&doc.to_bytes().unwrap(), DOCUMENT_PART);
        assert!(xml.contains(
            r#"<w:rPr><w:b/><w:color w:val="0070C0"/><w:vertAlign w:val="superscript"/></w:rPr>"#
        ));
    }

    #[test]
    fn test_docx_superscript_list_annotates_each_number() {
        let body = para(&format!(
            "{}{}{}{}",
            run("Screening cut deaths"),
            sup("1,2"),
            run(" in two trials"),
            sup("1")
        ));
        let mut doc = open(&body);
        let config = Config {
            markers: vec![crate::model::MarkerStyle::Superscript],
            ..Config::default()
        };
        assert_eq!(run_pipeline(&mut doc, &config), 3);

        // The trailing 1 shares its context with 2 and is struck as its duplicate.
        let key = ContainerKey::Paragraph { index: 0 };
        assert_eq!(
            doc.read_text(&key).unwrap().as_deref(),
            Some("Screening cut deaths11,22 in two trials1")
        );
        let xml = part(&doc.to_bytes().unwrap(), DOCUMENT_PART);
        assert!(xml.contains(
            r#"<w:r><w:rPr><w:vertAlign w:val="superscript"/></w:rPr><w:t xml:space="preserve">,</w:t></w:r>"#
        ));
        assert_eq!(xml.matches(r#"<w:b/><w:color w:val="0070C0"/>"#).count(), 2);
        assert!(xml.contains(
            r#"<w:rPr><w:strike/><w:color w:val="808080"/><w:vertAlign w:val="superscript"/></w:rPr><w:t xml:space="preserve">1</w:t>"#
        ));
    }

    #[test]
    fn test_no_citations_leaves_package_unchanged() {
        let bytes = docx_bytes(&format!(
            "{}{}",
            para(&run("Nothing to renumber [a].")),
            table(&[&["plain", "cells"]])
        ));
        let mut doc =
            crate::docx::Docx::from_bytes(std::path::Path::new("c.docx"), bytes.clone()).unwrap();
        assert_eq!(run_pipeline(&mut doc, &Config::default()), 0);
        assert!(!doc.is_modified());
        assert_eq!(doc.to_bytes().unwrap(), bytes);
    }
}
