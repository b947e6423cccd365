//! Tolerant XML tree for catalog detail pages
//!
//! FooDB and HMDB detail documents are large, flat XML files with many
//! optional fields. This module builds a navigable element tree from
//! quick-xml events without failing on the markup quirks those pages carry
//! (mismatched close tags, entities that do not unescape cleanly).

use crate::error::Result;
use quick_xml::events::Event;
use quick_xml::Reader;

/// A child of an element: either a nested element or a run of text
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Element(Node),
    Text(String),
}

/// One element in the parsed tree
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    pub name: String,
    pub children: Vec<Content>,
}

impl Node {
    fn new(name: String) -> Self {
        Self {
            name,
            children: Vec::new(),
        }
    }

    /// Immediate element children, in document order
    pub fn child_elements(&self) -> impl Iterator<Item = &Node> {
        self.children.iter().filter_map(|c| match c {
            Content::Element(n) => Some(n),
            Content::Text(_) => None,
        })
    }

    /// Immediate element children with the given tag name (non-recursive)
    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Node> {
        self.child_elements().filter(move |n| n.name == tag)
    }

    /// First element with the given tag name, depth-first
    pub fn find(&self, tag: &str) -> Option<&Node> {
        for child in self.child_elements() {
            if child.name == tag {
                return Some(child);
            }
            if let Some(found) = child.find(tag) {
                return Some(found);
            }
        }
        None
    }

    /// All elements with the given tag name, depth-first
    pub fn find_all<'a>(&'a self, tag: &str) -> Vec<&'a Node> {
        let mut out = Vec::new();
        self.collect_named(tag, &mut out);
        out
    }

    fn collect_named<'a>(&'a self, tag: &str, out: &mut Vec<&'a Node>) {
        for child in self.child_elements() {
            if child.name == tag {
                out.push(child);
            }
            child.collect_named(tag, out);
        }
    }

    /// All descendant text, concatenated in document order
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.append_text(&mut out);
        out
    }

    fn append_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Content::Text(t) => out.push_str(t),
                Content::Element(n) => n.append_text(out),
            }
        }
    }

    /// Direct scalar content of this element.
    ///
    /// Returns `None` when the element has element children or holds no
    /// text at all, which distinguishes "field present but empty/complex"
    /// from "field has scalar content".
    pub fn string_content(&self) -> Option<&str> {
        let mut text: Option<&str> = None;
        for child in &self.children {
            match child {
                Content::Element(_) => return None,
                Content::Text(t) => {
                    if text.is_some() {
                        return None;
                    }
                    text = Some(t.as_str());
                }
            }
        }
        text
    }
}

/// Parse an XML document into its root node.
///
/// Unclosed elements at EOF are closed implicitly; stray close tags are
/// ignored. The returned node is a synthetic document root whose children
/// are the top-level elements.
pub fn parse(text: &str) -> Result<Node> {
    let mut reader = Reader::from_str(text);
    let config = reader.config_mut();
    config.trim_text_start = true;
    config.trim_text_end = true;
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut stack: Vec<Node> = vec![Node::new(String::new())];

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                stack.push(Node::new(name));
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                push_child(&mut stack, Content::Element(Node::new(name)));
            }
            Event::Text(e) => {
                let text = match e.unescape() {
                    Ok(t) => t.into_owned(),
                    Err(_) => String::from_utf8_lossy(&e.into_inner()).into_owned(),
                };
                if !text.is_empty() {
                    push_child(&mut stack, Content::Text(text));
                }
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                if !text.is_empty() {
                    push_child(&mut stack, Content::Text(text));
                }
            }
            Event::End(_) => {
                if stack.len() > 1 {
                    let node = stack.pop().unwrap_or_default();
                    push_child(&mut stack, Content::Element(node));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    // Close anything left open at EOF
    while stack.len() > 1 {
        let node = stack.pop().unwrap_or_default();
        push_child(&mut stack, Content::Element(node));
    }

    Ok(stack.pop().unwrap_or_default())
}

fn push_child(stack: &mut [Node], child: Content) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(child);
    }
}
