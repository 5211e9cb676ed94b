//! Minimal element tree over quick-xml events
//!
//! Profile documents are small, so the decoders work on a fully built tree
//! instead of streaming. Namespace prefixes are dropped: elements are keyed
//! by their local name.

use crate::decode::normalize::{clean_text, looks_like_thumbprint, normalize_thumbprint};
use crate::error::DecodeError;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeSet;
use std::str;

#[derive(Debug, Clone, Default)]
pub struct XmlElement {
    pub name: String,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// First direct child with this local name (case-insensitive)
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Every direct child with this local name (case-insensitive)
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name.eq_ignore_ascii_case(name))
    }

    /// Text of a direct child, `None` when the child is absent
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// Normalized `path=value` leaves of this subtree
    pub fn leaves(&self) -> BTreeSet<String> {
        let mut leaves = BTreeSet::new();
        collect_leaves(self, "", &mut leaves);
        leaves
    }

    /// Serialize the subtree back to compact XML
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        if self.children.is_empty() && self.text.is_empty() {
            out.push_str(&format!("<{}/>", self.name));
            return;
        }
        out.push_str(&format!("<{}>", self.name));
        out.push_str(&escape(self.text.as_str()));
        for child in &self.children {
            child.render_into(out);
        }
        out.push_str(&format!("</{}>", self.name));
    }
}

fn local_name(start: &BytesStart) -> Result<String, DecodeError> {
    let local = start.local_name();
    str::from_utf8(local.as_ref())
        .map(str::to_string)
        .map_err(|_| DecodeError::Malformed("Invalid UTF-8 in tag name".into()))
}

/// Parse a document into its root element
pub fn parse_document(raw: &str) -> Result<XmlElement, DecodeError> {
    let mut reader = Reader::from_str(raw);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            DecodeError::Malformed(format!(
                "XML error at position {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Start(ref e) => {
                stack.push(XmlElement {
                    name: local_name(e)?,
                    ..Default::default()
                });
            }
            Event::Empty(ref e) => {
                let element = XmlElement {
                    name: local_name(e)?,
                    ..Default::default()
                };
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(ref t) => {
                let text = t
                    .unescape()
                    .map_err(|e| DecodeError::Malformed(e.to_string()))?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                let bytes = c.into_inner();
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&bytes));
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| DecodeError::Malformed("Unbalanced end tag".into()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(DecodeError::Malformed(format!("Element <{}> is never closed", open.name)));
    }
    root.ok_or_else(|| DecodeError::Malformed("Document has no root element".into()))
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), DecodeError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(DecodeError::Malformed("Document has more than one root element".into())),
    }
}

/// Flatten an EAP configuration blob into normalized `path=value` leaves
///
/// Paths use local names so namespace prefix choices do not matter; values
/// are whitespace-cleaned and thumbprints normalized.
pub fn eap_leaves(raw: &str) -> Result<BTreeSet<String>, DecodeError> {
    Ok(parse_document(raw)?.leaves())
}

fn collect_leaves(element: &XmlElement, prefix: &str, leaves: &mut BTreeSet<String>) {
    let path = if prefix.is_empty() {
        element.name.clone()
    } else {
        format!("{}/{}", prefix, element.name)
    };

    if element.children.is_empty() {
        let value = if looks_like_thumbprint(&element.text) {
            normalize_thumbprint(&element.text)
        } else {
            clean_text(&element.text)
        };
        leaves.insert(format!("{}={}", path, value));
        return;
    }

    for child in &element.children {
        collect_leaves(child, &path, leaves);
    }
}
