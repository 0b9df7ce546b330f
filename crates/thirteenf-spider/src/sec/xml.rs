//! A minimal element tree over `quick-xml` events.
//!
//! Names are stored as local names, so `<ns1:infoTable>` and `<infoTable>` are the same element
//! regardless of which namespace a filer declared. Attributes are not kept; the 13F schemas carry
//! everything in element text.

use crate::{Error, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    fn named(name: &[u8]) -> Self {
        Self {
            name: String::from_utf8_lossy(name).into_owned(),
            ..Self::default()
        }
    }

    /// Parse a complete XML document into its root element.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml.trim_start());
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => stack.push(Element::named(e.local_name().as_ref())),
                Event::Empty(e) => {
                    attach(&mut stack, &mut root, Element::named(e.local_name().as_ref()))?
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(|| {
                        Error::MalformedXml("closing tag without an opening tag".to_string())
                    })?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(e) => {
                    if let Some(top) = stack.last_mut() {
                        let text = e
                            .unescape()
                            .map_err(|err| Error::MalformedXml(err.to_string()))?;
                        top.text.push_str(&text);
                    }
                }
                Event::CData(e) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&e));
                    }
                }
                Event::Eof => break,
                // declarations, comments, processing instructions
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(Error::MalformedXml(format!("unclosed element <{}>", open.name)));
        }
        root.ok_or_else(|| Error::MalformedXml("no root element".to_string()))
    }

    /// First child named `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Every child named `name`, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Follow a path of child names, e.g. `["headerData", "filerInfo", "periodOfReport"]`.
    pub fn find(&self, path: &[&str]) -> Option<&Element> {
        path.iter()
            .try_fold(self, |element, name| element.child(name))
    }

    /// Trimmed text at `path`; `None` when the element is absent or blank.
    pub fn text_at(&self, path: &[&str]) -> Option<&str> {
        self.find(path)
            .map(|element| element.text.trim())
            .filter(|text| !text.is_empty())
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => {
            return Err(Error::MalformedXml(format!(
                "second root element <{}>",
                element.name
            )))
        }
    }
    Ok(())
}

//////////////////////////////////////////////////////////////
// -- TESTS --
//////////////////////////////////////////////////////////////

#[test]
fn strips_namespace_prefixes() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <ns1:informationTable xmlns:ns1="http://www.sec.gov/edgar/document/thirteenf/informationtable">
            <ns1:infoTable>
                <ns1:nameOfIssuer>AT&amp;T INC</ns1:nameOfIssuer>
            </ns1:infoTable>
        </ns1:informationTable>"#;
    let root = Element::parse(xml).unwrap();
    assert_eq!(root.name, "informationTable");
    assert_eq!(
        root.text_at(&["infoTable", "nameOfIssuer"]),
        Some("AT&T INC")
    );
}

#[test]
fn empty_and_blank_elements_have_no_text() {
    let root = Element::parse("<a><b/><c>   </c><d><![CDATA[x < y]]></d></a>").unwrap();
    assert_eq!(root.children.len(), 3);
    assert_eq!(root.text_at(&["b"]), None);
    assert_eq!(root.text_at(&["c"]), None);
    assert_eq!(root.text_at(&["d"]), Some("x < y"));
    assert_eq!(root.find(&["missing", "deeper"]), None);
}

#[test]
fn repeated_children_keep_document_order() {
    let root = Element::parse("<t><e>1</e><x/><e>2</e><e>3</e></t>").unwrap();
    let texts: Vec<&str> = root.children_named("e").map(|e| e.text.as_str()).collect();
    assert_eq!(texts, vec!["1", "2", "3"]);
}

#[test]
fn rejects_malformed_documents() {
    assert!(Element::parse("<a><b></a>").is_err());
    assert!(Element::parse("<a><b>").is_err());
    assert!(Element::parse("").is_err());
    assert!(Element::parse("<a/><b/>").is_err());
}
