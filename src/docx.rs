//! WordprocessingML packages.
//!
//! Only `word/document.xml` is parsed. Every other part is carried as raw
//! zip entries and copied back untouched when the package is saved.

use crate::document::{RunStyle, RunText, SpanEdit, StyledText, TextContainers};
use crate::error::{CitedupError, Result};
use crate::model::ContainerKey;
use crate::xml::{Document, Element, Node};
use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const DOCUMENT_PART: &str = "word/document.xml";

// CT_RPr child order from ECMA-376; Word rejects run properties out of order.
const RPR_ORDER: &[&str] = &[
    "rStyle", "rFonts", "b", "bCs", "i", "iCs", "caps", "smallCaps", "strike", "dstrike",
    "outline", "shadow", "emboss", "imprint", "noProof", "snapToGrid", "vanish", "webHidden",
    "color", "spacing", "w", "kern", "position", "sz", "szCs", "highlight", "u", "effect",
    "bdr", "shd", "fitText", "vertAlign", "rtl", "cs", "em", "lang", "eastAsianLayout",
    "specVanish", "oMath", "rPrChange",
];

/// An opened .docx package.
pub struct Docx {
    path: PathBuf,
    bytes: Vec<u8>,
    document: Document,
    /// Container key -> child-index path from the root element to its `w:p`.
    paragraphs: BTreeMap<ContainerKey, Vec<usize>>,
    modified: bool,
}

impl Docx {
    pub fn open(path: &Path) -> Result<Docx> {
        let bytes = fs::read(path).map_err(|source| CitedupError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Docx::from_bytes(path, bytes)
    }

    pub fn from_bytes(path: &Path, bytes: Vec<u8>) -> Result<Docx> {
        let mut archive = ZipArchive::new(Cursor::new(bytes.as_slice()))?;
        let mut xml = String::new();
        match archive.by_name(DOCUMENT_PART) {
            Ok(mut part) => {
                part.read_to_string(&mut xml)
                    .map_err(|e| CitedupError::Xml(format!("{}: {}", DOCUMENT_PART, e)))?;
            }
            Err(ZipError::FileNotFound) => return Err(CitedupError::MissingPart(DOCUMENT_PART)),
            Err(e) => return Err(e.into()),
        }

        let document = Document::parse(&xml)?;
        let paragraphs = index_paragraphs(&document.root);
        Ok(Docx {
            path: path.to_path_buf(),
            bytes,
            document,
            paragraphs,
            modified: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Serialize the package. An unmodified package comes back byte for byte.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if !self.modified {
            return Ok(self.bytes.clone());
        }

        let xml = self.document.to_bytes()?;
        let mut archive = ZipArchive::new(Cursor::new(self.bytes.as_slice()))?;
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for i in 0..archive.len() {
            let file = archive.by_index_raw(i)?;
            if file.name() == DOCUMENT_PART {
                drop(file);
                zip.start_file(DOCUMENT_PART, options)?;
                zip.write_all(&xml).map_err(ZipError::from)?;
            } else {
                zip.raw_copy_file(file)?;
            }
        }

        Ok(zip.finish()?.into_inner())
    }

    fn paragraph(&self, key: &ContainerKey) -> Option<&Element> {
        let path = self.paragraphs.get(key)?;
        self.document.root.at_path(path)
    }
}

impl TextContainers for Docx {
    fn containers(&self) -> Vec<ContainerKey> {
        self.paragraphs.keys().copied().collect()
    }

    fn read_runs(&self, key: &ContainerKey) -> Result<Option<Vec<RunText>>> {
        let Some(paragraph) = self.paragraph(key) else {
            return Ok(None);
        };
        let mut runs = Vec::new();
        for path in run_paths(paragraph) {
            if let Some(run) = paragraph.at_path(&path) {
                runs.push(RunText {
                    text: run_text(run)?,
                    superscript: is_superscript(run),
                });
            }
        }
        Ok(Some(runs))
    }

    fn replace_spans(&mut self, key: &ContainerKey, edits: &[SpanEdit]) -> Result<()> {
        if edits.is_empty() {
            return Ok(());
        }
        let path = self
            .paragraphs
            .get(key)
            .cloned()
            .ok_or_else(|| CitedupError::Xml(format!("no {} in document", key)))?;
        let paragraph = self
            .document
            .root
            .at_path_mut(&path)
            .ok_or_else(|| CitedupError::Xml(format!("{} moved during editing", key)))?;

        let runs = run_paths(paragraph);
        let mut ranges = Vec::with_capacity(runs.len());
        let mut offset = 0;
        for path in &runs {
            let len = match paragraph.at_path(path) {
                Some(run) => run_text(run)?.len(),
                None => 0,
            };
            ranges.push((offset, offset + len));
            offset += len;
        }

        // Last run first: splicing a run only shifts siblings that come after it.
        for (run_path, &(start, end)) in runs.iter().zip(ranges.iter()).rev() {
            let touched = edits
                .iter()
                .any(|e| (e.start < end && e.end > start) || (e.start >= start && e.start < end));
            if !touched {
                continue;
            }
            let Some(run) = paragraph.at_path(run_path) else {
                continue;
            };
            let rebuilt = rebuild_run(run, start, edits)?;

            let (parent_path, index) = run_path.split_at(run_path.len() - 1);
            let index = index[0];
            if let Some(parent) = paragraph.at_path_mut(parent_path) {
                parent
                    .children
                    .splice(index..=index, rebuilt.into_iter().map(Node::Element));
            }
        }

        self.modified = true;
        Ok(())
    }
}

/// Walk `w:body` and assign container keys: body paragraphs first, then
/// table cell paragraphs, row-major. Content controls and custom XML
/// wrappers are looked through; nested tables are not containers.
fn index_paragraphs(root: &Element) -> BTreeMap<ContainerKey, Vec<usize>> {
    let mut out = BTreeMap::new();
    let Some((body_index, body)) = root
        .children
        .iter()
        .enumerate()
        .find_map(|(i, n)| match n {
            Node::Element(e) if e.is("w:body") => Some((i, e)),
            _ => None,
        })
    else {
        return out;
    };

    let mut paragraph = 0;
    let mut table = 0;
    for (path, e) in blocks(body) {
        let path = [&[body_index][..], path.as_slice()].concat();
        if e.is("w:p") {
            out.insert(ContainerKey::Paragraph { index: paragraph }, path);
            paragraph += 1;
        } else if e.is("w:tbl") {
            for (row, (tr_path, tr)) in named_blocks(e, "w:tr").into_iter().enumerate() {
                for (col, (tc_path, tc)) in named_blocks(tr, "w:tc").into_iter().enumerate() {
                    for (p, (p_path, _)) in named_blocks(tc, "w:p").into_iter().enumerate() {
                        out.insert(
                            ContainerKey::TableCell {
                                table,
                                row,
                                col,
                                paragraph: p,
                            },
                            [path.as_slice(), tr_path.as_slice(), tc_path.as_slice(), p_path.as_slice()]
                                .concat(),
                        );
                    }
                }
            }
            table += 1;
        }
    }
    out
}

/// Element children of `parent` in order, with `w:sdt` and `w:customXml`
/// wrappers replaced by their content. Paths are relative to `parent`.
fn blocks(parent: &Element) -> Vec<(Vec<usize>, &Element)> {
    fn walk<'a>(el: &'a Element, prefix: &mut Vec<usize>, out: &mut Vec<(Vec<usize>, &'a Element)>) {
        for (i, node) in el.children.iter().enumerate() {
            let Node::Element(child) = node else { continue };
            prefix.push(i);
            if child.is("w:sdt") {
                let content = child.children.iter().enumerate().find_map(|(j, n)| match n {
                    Node::Element(e) if e.is("w:sdtContent") => Some((j, e)),
                    _ => None,
                });
                if let Some((j, content)) = content {
                    prefix.push(j);
                    walk(content, prefix, out);
                    prefix.pop();
                }
            } else if child.is("w:customXml") {
                walk(child, prefix, out);
            } else {
                out.push((prefix.clone(), child));
            }
            prefix.pop();
        }
    }

    let mut out = Vec::new();
    walk(parent, &mut Vec::new(), &mut out);
    out
}

fn named_blocks<'a>(parent: &'a Element, name: &str) -> Vec<(Vec<usize>, &'a Element)> {
    blocks(parent).into_iter().filter(|(_, e)| e.is(name)).collect()
}

/// Paths (relative to the paragraph) of every `w:r` that contributes text,
/// in document order. Runs inside hyperlinks, insertions and content
/// controls count; nested paragraphs and deletions do not.
fn run_paths(paragraph: &Element) -> Vec<Vec<usize>> {
    fn walk(el: &Element, prefix: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        for (i, node) in el.children.iter().enumerate() {
            let Node::Element(child) = node else { continue };
            prefix.push(i);
            if child.is("w:r") {
                out.push(prefix.clone());
            } else if !(child.is("w:pPr")
                || child.is("w:p")
                || child.is("w:tbl")
                || child.is("w:del")
                || child.is("w:moveFrom"))
            {
                walk(child, prefix, out);
            }
            prefix.pop();
        }
    }

    let mut out = Vec::new();
    walk(paragraph, &mut Vec::new(), &mut out);
    out
}

fn run_text(run: &Element) -> Result<String> {
    let mut text = String::new();
    for t in run.child_elements().filter(|e| e.is("w:t")) {
        text.push_str(&t.text()?);
    }
    Ok(text)
}

fn is_superscript(run: &Element) -> bool {
    run.child("w:rPr")
        .and_then(|rpr| rpr.child("w:vertAlign"))
        .and_then(|v| v.attr("w:val"))
        .map(|v| v == "superscript")
        .unwrap_or(false)
}

/// Split one run around the edits that touch it. Text outside the edits and
/// non-text children stay in copies of the original run; replacements go
/// where an edit starts; text covered by an edit is dropped.
fn rebuild_run(run: &Element, run_start: usize, edits: &[SpanEdit]) -> Result<Vec<Element>> {
    let base_rpr = run.child("w:rPr");
    let mut out = Vec::new();
    let mut pending: Vec<Node> = Vec::new();
    let mut offset = run_start;

    let flush = |pending: &mut Vec<Node>, out: &mut Vec<Element>| {
        if pending.iter().any(|n| matches!(n, Node::Element(_))) {
            let mut piece = Element {
                start: run.start.clone(),
                children: Vec::new(),
            };
            if let Some(rpr) = base_rpr {
                piece.children.push(Node::Element(rpr.clone()));
            }
            piece.children.append(pending);
            out.push(piece);
        }
        pending.clear();
    };

    for node in &run.children {
        match node {
            Node::Element(e) if e.is("w:rPr") => {}
            Node::Element(e) if e.is("w:t") => {
                let text = e.text()?;
                let end = offset + text.len();
                let mut cursor = offset;

                for edit in edits {
                    let starts_here = edit.start >= offset && edit.start < end;
                    let overlaps = edit.start < end && edit.end > cursor;
                    if !starts_here && !overlaps {
                        continue;
                    }
                    if edit.start > cursor {
                        pending.push(text_node(&text[cursor - offset..edit.start - offset]));
                    }
                    if starts_here {
                        flush(&mut pending, &mut out);
                        for piece in &edit.replacement {
                            out.push(styled_run(base_rpr, piece));
                        }
                    }
                    cursor = cursor.max(edit.end.min(end));
                }

                if cursor < end {
                    pending.push(text_node(&text[cursor - offset..]));
                }
                offset = end;
            }
            other => pending.push(other.clone()),
        }
    }
    flush(&mut pending, &mut out);
    Ok(out)
}

fn text_node(text: &str) -> Node {
    Node::Element(Element::with_text("w:t", &[("xml:space", "preserve")], text))
}

fn styled_run(base_rpr: Option<&Element>, piece: &StyledText) -> Element {
    let mut rpr = base_rpr.cloned().unwrap_or_else(|| Element::new("w:rPr"));
    apply_style(&mut rpr, &piece.style);

    let mut run = Element::new("w:r");
    if !rpr.children.is_empty() {
        run.children.push(Node::Element(rpr));
    }
    run.children.push(text_node(&piece.text));
    run
}

fn apply_style(rpr: &mut Element, style: &RunStyle) {
    remove_prop(rpr, "w:dstrike");
    if style.strike {
        set_prop(rpr, Element::new("w:strike"));
    } else {
        remove_prop(rpr, "w:strike");
    }
    if style.bold {
        set_prop(rpr, Element::new("w:b"));
    }
    if let Some(color) = &style.color {
        set_prop(rpr, Element::with_attr("w:color", "w:val", color));
    }
}

fn rpr_rank(name: &[u8]) -> usize {
    let local = name.strip_prefix(b"w:").unwrap_or(name);
    RPR_ORDER
        .iter()
        .position(|n| n.as_bytes() == local)
        .unwrap_or(RPR_ORDER.len())
}

fn remove_prop(rpr: &mut Element, name: &str) {
    rpr.children
        .retain(|n| !matches!(n, Node::Element(e) if e.is(name)));
}

/// Replace or insert a run property, keeping schema order.
fn set_prop(rpr: &mut Element, prop: Element) {
    let name = String::from_utf8_lossy(prop.name()).into_owned();
    remove_prop(rpr, &name);
    let rank = rpr_rank(prop.name());
    let at = rpr
        .children
        .iter()
        .position(|n| matches!(n, Node::Element(e) if rpr_rank(e.name()) > rank))
        .unwrap_or(rpr.children.len());
    rpr.children.insert(at, Node::Element(prop));
}
