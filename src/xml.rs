//! Owned XML tree over quick-xml events.
//!
//! Text is kept in its escaped form and unknown events are stored verbatim,
//! so parts of the tree that are never touched serialize back as they came in.

use crate::error::{CitedupError, Result};
use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    /// Escaped character data.
    Text(String),
    /// Declarations, comments, processing instructions, CDATA, doctypes.
    Other(Event<'static>),
}

#[derive(Debug, Clone)]
pub struct Element {
    pub start: BytesStart<'static>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: &'static str) -> Element {
        Element {
            start: BytesStart::new(name),
            children: Vec::new(),
        }
    }

    pub fn with_attr(name: &'static str, key: &str, value: &str) -> Element {
        Element {
            start: BytesStart::new(name).with_attributes([(key, value)]),
            children: Vec::new(),
        }
    }

    /// An element holding a single text node.
    pub fn with_text(name: &'static str, attrs: &[(&str, &str)], text: &str) -> Element {
        let mut start = BytesStart::new(name);
        for attr in attrs {
            start.push_attribute(*attr);
        }
        Element {
            start,
            children: vec![Node::Text(escape(text).into_owned())],
        }
    }

    pub fn name(&self) -> &[u8] {
        self.start.name().into_inner()
    }

    pub fn is(&self, name: &str) -> bool {
        self.name() == name.as_bytes()
    }

    pub fn attr(&self, key: &str) -> Option<String> {
        self.start
            .attributes()
            .flatten()
            .find(|a| a.key.as_ref() == key.as_bytes())
            .map(|a| String::from_utf8_lossy(&a.value).into_owned())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.is(name))
    }

    /// Unescaped concatenation of the direct text children.
    pub fn text(&self) -> Result<String> {
        let mut out = String::new();
        for node in &self.children {
            if let Node::Text(raw) = node {
                out.push_str(&unescape(raw).map_err(|e| CitedupError::Xml(e.to_string()))?);
            }
        }
        Ok(out)
    }

    /// Follows a path of child indices.
    pub fn at_path(&self, path: &[usize]) -> Option<&Element> {
        let mut cur = self;
        for &i in path {
            cur = match cur.children.get(i)? {
                Node::Element(e) => e,
                _ => return None,
            };
        }
        Some(cur)
    }

    pub fn at_path_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        let mut cur = self;
        for &i in path {
            cur = match cur.children.get_mut(i)? {
                Node::Element(e) => e,
                _ => return None,
            };
        }
        Some(cur)
    }
}

/// A parsed XML part: prolog nodes plus the root element.
#[derive(Debug, Clone)]
pub struct Document {
    pub prolog: Vec<Node>,
    pub root: Element,
}

impl Document {
    pub fn parse(xml: &str) -> Result<Document> {
        let mut reader = Reader::from_str(xml);
        let mut prolog = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let node = match reader.read_event()? {
                Event::Start(start) => {
                    stack.push(Element {
                        start: start.into_owned(),
                        children: Vec::new(),
                    });
                    continue;
                }
                Event::End(_) => {
                    let finished = stack
                        .pop()
                        .ok_or_else(|| CitedupError::Xml("unbalanced end tag".to_string()))?;
                    Node::Element(finished)
                }
                Event::Empty(start) => Node::Element(Element {
                    start: start.into_owned(),
                    children: Vec::new(),
                }),
                Event::Text(text) => {
                    Node::Text(String::from_utf8_lossy(&text).into_owned())
                }
                Event::Eof => break,
                other => Node::Other(other.into_owned()),
            };

            match stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None => match node {
                    Node::Element(e) if root.is_none() => root = Some(e),
                    Node::Element(_) => {
                        return Err(CitedupError::Xml("more than one root element".to_string()))
                    }
                    other => {
                        if root.is_none() {
                            prolog.push(other);
                        }
                    }
                },
            }
        }

        if !stack.is_empty() {
            return Err(CitedupError::Xml("unclosed element at end of input".to_string()));
        }
        let root = root.ok_or_else(|| CitedupError::Xml("no root element".to_string()))?;
        Ok(Document { prolog, root })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        for node in &self.prolog {
            write_node(&mut writer, node)?;
        }
        write_element(&mut writer, &self.root)?;
        Ok(writer.into_inner())
    }
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &Node) -> Result<()> {
    match node {
        Node::Element(e) => write_element(writer, e)?,
        Node::Text(raw) => writer.write_event(Event::Text(BytesText::from_escaped(raw.as_str())))?,
        Node::Other(event) => writer.write_event(event.clone())?,
    }
    Ok(())
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<()> {
    if element.children.is_empty() {
        writer.write_event(Event::Empty(element.start.borrow()))?;
        return Ok(());
    }
    writer.write_event(Event::Start(element.start.borrow()))?;
    for child in &element.children {
        write_node(writer, child)?;
    }
    writer.write_event(Event::End(element.start.to_end()))?;
    Ok(())
}
