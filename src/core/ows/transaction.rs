//! WFS transaction decoding.
//!
//! Extracts the insert/update/replace/delete operations of a WFS-T payload and the
//! layers they target. Everything else in the document is skipped, so newer
//! protocol versions and vendor extensions parse fine. The document itself must
//! be well formed: a payload whose shape cannot be determined is rejected.

use crate::config::OwsError;
use quick_xml::Reader;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed XML attribute: {0}")]
    Attribute(#[from] AttrError),

    #[error("element name is not valid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("malformed document: {0}")]
    Structure(&'static str),
}

impl From<TransactionError> for OwsError {
    fn from(err: TransactionError) -> Self {
        Self::BadRequest(format!("Invalid WFS transaction: {err}"))
    }
}

/// A single transaction operation and the layer reference(s) it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Feature element names, one per inserted feature.
    Insert { features: Vec<String> },
    Update { type_name: String },
    /// Feature element names of a WFS 2.0 replace, one per replaced feature.
    Replace { features: Vec<String> },
    Delete { type_name: String },
}

/// Decoded WFS transaction, operations in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WfsTransaction {
    pub operations: Vec<Operation>,
}

impl WfsTransaction {
    /// Layers modified in place: `typeName` of every update and the feature
    /// element names of every replace.
    pub fn updates(&self) -> impl Iterator<Item = &str> {
        self.operations.iter().flat_map(|op| {
            let names: &[String] = match op {
                Operation::Update { type_name } => std::slice::from_ref(type_name),
                Operation::Replace { features } => features,
                _ => &[],
            };
            names.iter().map(String::as_str)
        })
    }

    /// Element name of every inserted feature, across all inserts.
    pub fn inserts(&self) -> impl Iterator<Item = &str> {
        self.operations
            .iter()
            .filter_map(|op| match op {
                Operation::Insert { features } => Some(features),
                _ => None,
            })
            .flatten()
            .map(String::as_str)
    }

    /// `typeName` of every delete.
    pub fn deletes(&self) -> impl Iterator<Item = &str> {
        self.operations.iter().filter_map(|op| match op {
            Operation::Delete { type_name } => Some(type_name.as_str()),
            _ => None,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Local part of a possibly namespace-qualified name: `ns:Parcels` -> `Parcels`.
#[must_use]
pub fn layer_local_name(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

/// Reads the unprefixed, exact-case `typeName` attribute. Any other spelling
/// (`typename`, `wfs:typeName`) makes the target layer ambiguous.
fn type_name_attr(element: &BytesStart<'_>) -> Result<String, TransactionError> {
    let mut type_name = None;
    for attr in element.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"typeName" {
            type_name = Some(attr.unescape_value()?.trim().to_string());
        } else if attr
            .key
            .local_name()
            .as_ref()
            .eq_ignore_ascii_case(b"typeName")
        {
            return Err(TransactionError::Structure("ambiguous typeName attribute"));
        }
    }
    // Missing reference: resolves to no layer, which denies.
    Ok(type_name.unwrap_or_default())
}

/// Operation whose child elements name the features it writes.
#[derive(Clone, Copy, PartialEq, Eq)]
enum FeatureOp {
    Insert,
    Replace,
}

impl FeatureOp {
    fn operation(self, features: Vec<String>) -> Operation {
        match self {
            Self::Insert => Operation::Insert { features },
            Self::Replace => Operation::Replace { features },
        }
    }
}

#[derive(Default)]
struct Decoder {
    operations: Vec<Operation>,
    depth: usize,
    seen_root: bool,
    open_features: Option<(FeatureOp, Vec<String>)>,
}

impl Decoder {
    fn open(&mut self, element: &BytesStart<'_>, empty: bool) -> Result<(), TransactionError> {
        match self.depth {
            0 => {
                if self.seen_root {
                    return Err(TransactionError::Structure("multiple root elements"));
                }
                self.seen_root = true;
            }
            1 => {
                let local = element.local_name();
                match local.as_ref() {
                    b"Insert" | b"Replace" => {
                        let op = if local.as_ref() == b"Insert" {
                            FeatureOp::Insert
                        } else {
                            FeatureOp::Replace
                        };
                        if empty {
                            self.operations.push(op.operation(Vec::new()));
                        } else {
                            self.open_features = Some((op, Vec::new()));
                        }
                    }
                    b"Update" => self.operations.push(Operation::Update {
                        type_name: type_name_attr(element)?,
                    }),
                    b"Delete" => self.operations.push(Operation::Delete {
                        type_name: type_name_attr(element)?,
                    }),
                    _ => {}
                }
            }
            2 => {
                if let Some((op, features)) = self.open_features.as_mut() {
                    // A replace carries its selection filter next to the feature.
                    let is_filter = element.local_name().as_ref() == b"Filter";
                    if *op == FeatureOp::Insert || !is_filter {
                        let name = std::str::from_utf8(element.name().as_ref())?.to_string();
                        features.push(name);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransactionError> {
        self.depth = self
            .depth
            .checked_sub(1)
            .ok_or(TransactionError::Structure("unmatched end tag"))?;
        if self.depth == 1
            && let Some((op, features)) = self.open_features.take()
        {
            self.operations.push(op.operation(features));
        }
        Ok(())
    }
}

/// Whether `body` is an XML document rooted at a `Transaction` element.
///
/// Form-encoded bodies are not. A body that starts out as markup but breaks
/// before its root element counts as one, so it goes through [`parse`] and is
/// rejected there.
#[must_use]
pub fn is_transaction(body: &[u8]) -> bool {
    let body = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body);
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(root) | Event::Empty(root)) => {
                return root.local_name().as_ref().eq_ignore_ascii_case(b"Transaction");
            }
            Ok(Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_)) => {}
            Ok(_) => return false,
            Err(_) => return true,
        }
    }
}

/// Decodes a WFS transaction body.
///
/// # Errors
///
/// Returns `TransactionError` if the body is not a single well-formed XML document.
pub fn parse(body: &[u8]) -> Result<WfsTransaction, TransactionError> {
    let body = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body);
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);

    let mut decoder = Decoder::default();
    loop {
        match reader.read_event()? {
            Event::Start(element) => {
                decoder.open(&element, false)?;
                decoder.depth += 1;
            }
            Event::Empty(element) => decoder.open(&element, true)?,
            Event::End(_) => decoder.close()?,
            Event::Text(_) | Event::CData(_) if decoder.depth == 0 => {
                return Err(TransactionError::Structure("content outside the root element"));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !decoder.seen_root {
        return Err(TransactionError::Structure("missing root element"));
    }
    if decoder.depth != 0 {
        return Err(TransactionError::Structure("unexpected end of document"));
    }

    Ok(WfsTransaction {
        operations: decoder.operations,
    })
}
