//! Markdown report of what was found and what will change.

use crate::model::{CitationOccurrence, Collection, ContainerKey, ContainerKind};
use crate::resolve::{AnnotationAction, Disposition, Resolution};
use std::collections::BTreeMap;

/// Render the full report for one document.
pub fn render_report(
    source: &str,
    threshold: f64,
    collection: &Collection,
    resolution: &Resolution,
) -> String {
    let mut output = String::new();
    let duplicates = resolution.mapping.duplicates().count();

    let header = format!(
        "# Citation Report: {}\n\n\
         **Citations found:** {}\n\
         **Distinct references:** {}\n\
         **Duplicates removed:** {}\n\
         **Similarity threshold:** {:.2}\n\
         **Table references:** {}\n\n\
         ---\n\n",
        source,
        collection.occurrences.len(),
        resolution.mapping.kept().count(),
        duplicates,
        threshold,
        collection.table_refs.len()
    );
    output.push_str(&header);

    output.push_str(&by_table(collection));
    output.push_str(&by_paragraph(collection));
    output.push_str(&duplicate_mappings(collection, resolution));
    output.push_str(&modification_plan(collection, resolution));
    output
}

fn by_table(collection: &Collection) -> String {
    let mut output = String::from("## Citations by Table\n\n");

    let mut tables: BTreeMap<usize, Vec<&CitationOccurrence>> = BTreeMap::new();
    for occ in &collection.occurrences {
        if let Some(table) = occ.position.container.table() {
            tables.entry(table).or_default().push(occ);
        }
    }
    if tables.is_empty() {
        output.push_str("_No citations in tables._\n\n");
        return output;
    }

    for (table, occurrences) in &tables {
        output.push_str(&format!("### Table {}\n\n", table + 1));
        output.push_str("| Row | Col | Citation | Context |\n");
        output.push_str("|-----|-----|----------|---------|\n");
        for occ in occurrences {
            if let ContainerKey::TableCell { row, col, .. } = occ.position.container {
                output.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    row + 1,
                    col + 1,
                    occ.marker(),
                    cell(&occ.context_text)
                ));
            }
        }
        output.push('\n');
    }
    output
}

fn by_paragraph(collection: &Collection) -> String {
    let mut output = String::from("## Citations by Paragraph\n\n");

    let paragraphs: Vec<_> = collection
        .containers
        .iter()
        .filter(|c| c.key.kind() == ContainerKind::Paragraph)
        .collect();
    if paragraphs.is_empty() {
        output.push_str("_No citations in paragraphs._\n\n");
        return output;
    }

    for (i, summary) in paragraphs.iter().enumerate() {
        output.push_str(&format!(
            "### {}. {}...\n\n_{}_\n\n",
            i + 1,
            summary.excerpt,
            summary.key
        ));
        for (j, (_, entry)) in paragraph_entries(collection, &summary.key).iter().enumerate() {
            output.push_str(&format!("{}. {}\n", j + 1, entry));
        }
        output.push('\n');
    }
    output
}

/// Citations and table mentions of one paragraph by position. A table is
/// listed once however often it is mentioned; every citation is listed
/// because each one is annotated on its own.
fn paragraph_entries(collection: &Collection, key: &ContainerKey) -> Vec<(usize, String)> {
    let mut entries: Vec<(usize, String)> = collection
        .in_container(key)
        .map(|occ| {
            let mut line = format!("Citation {}", occ.old_number);
            if !occ.context_text.is_empty() {
                line.push_str(&format!(": {}", occ.context_text));
            }
            (occ.start, line)
        })
        .collect();

    let mut seen = Vec::new();
    for table in collection.table_refs_in(key) {
        if !seen.contains(&table.numeral) {
            seen.push(table.numeral.clone());
            entries.push((table.start, table.label()));
        }
    }
    entries.sort_by_key(|(start, _)| *start);
    entries
}

fn duplicate_mappings(collection: &Collection, resolution: &Resolution) -> String {
    let mut output = String::from("## Duplicate Mappings\n\n");

    if resolution.mapping.duplicates().next().is_none() {
        output.push_str("_No duplicate references._\n\n");
    } else {
        output.push_str("| Old | Maps to | Similarity | Location | Context |\n");
        output.push_str("|-----|---------|------------|----------|---------|\n");
        for entry in resolution.mapping.duplicates() {
            let Disposition::Duplicate {
                duplicate_of,
                similarity,
            } = entry.disposition
            else {
                continue;
            };
            let occ = &collection.occurrences[entry.occurrence];
            output.push_str(&format!(
                "| {} | removed (duplicate of {}) | {:.2} | {} | {} |\n",
                occ.marker(),
                occ.style.render(duplicate_of),
                similarity,
                occ.position.container,
                cell(&occ.context_text)
            ));
        }
        output.push('\n');
    }

    if !resolution.mapping.is_empty() {
        let by_old = resolution.mapping.by_old_number();
        output.push_str("### Old to New\n\n");
        output.push_str("| Old | New |\n");
        output.push_str("|-----|-----|\n");
        for (old, dispositions) in &by_old {
            let targets: Vec<String> = dispositions
                .iter()
                .map(|d| match d {
                    Disposition::Kept { new_number } => new_number.to_string(),
                    Disposition::Duplicate { duplicate_of, .. } => {
                        format!("removed (dup of {})", duplicate_of)
                    }
                })
                .collect();
            output.push_str(&format!("| {} | {} |\n", old, targets.join(", ")));
        }
        output.push('\n');
    }
    output
}

fn modification_plan(collection: &Collection, resolution: &Resolution) -> String {
    let mut output = String::from("## Modification Plan\n\n");

    let plan = resolution.plan();
    if plan.is_empty() {
        output.push_str("_No changes; the document is copied unmodified._\n");
        return output;
    }

    for (i, step) in plan.steps.iter().enumerate() {
        let occ = &collection.occurrences[step.occurrence];
        let line = match step.action {
            AnnotationAction::Renumber { old, new } if old == new => format!(
                "{}. {}: keep {}",
                i + 1,
                occ.position.container,
                occ.style.render(old)
            ),
            AnnotationAction::Renumber { old, new } => format!(
                "{}. {}: {} -> {}",
                i + 1,
                occ.position.container,
                occ.style.render(old),
                occ.style.render(new)
            ),
            AnnotationAction::Strike { old, duplicate_of } => format!(
                "{}. {}: strike {} (duplicate of {})",
                i + 1,
                occ.position.container,
                occ.style.render(old),
                occ.style.render(duplicate_of)
            ),
        };
        output.push_str(&line);
        output.push('\n');
    }
    output
}

/// Make text safe inside a markdown table cell.
fn cell(text: &str) -> String {
    text.replace('|', "\\|")
}
