//! Reading named blocks out of an algorithm configuration document.
//!
//! ```xml
//! <filter-params>
//!   <filter name="Basic Threshold-Fraction Filter" type="THRESH_FRAC">
//!     <threshold>50</threshold>
//!     <fraction>0.5</fraction>
//!   </filter>
//! </filter-params>
//! ```

use roxmltree::{Document, Node};

use super::ParamError;
use crate::DiagnosticSink;

const ROOT_TAG: &str = "filter-params";
const BLOCK_TAG: &str = "filter";
const NAME_ATTR: &str = "name";
const KIND_ATTR: &str = "type";

/// One named block, still stringly typed.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct RawBlock {
    pub name: String,
    pub kind: Option<String>,
    pub entries: Vec<(String, String)>,
}

fn parse_root<'a>(doc: &'a Document<'a>) -> Result<Node<'a, 'a>, ParamError> {
    let root = doc.root_element();
    if root.tag_name().name() != ROOT_TAG {
        return Err(ParamError::Parse {
            reason: format!(
                "root element is <{}>, expected <{ROOT_TAG}>",
                root.tag_name().name()
            ),
        });
    }
    Ok(root)
}

/// Every block with a `name` attribute, in document order. Nameless blocks
/// are skipped with a warning.
fn named_blocks<'a>(
    root: Node<'a, 'a>,
    sink: &'a dyn DiagnosticSink,
) -> impl Iterator<Item = (&'a str, Node<'a, 'a>)> + 'a {
    root.children()
        .filter(|n| n.is_element() && n.has_tag_name(BLOCK_TAG))
        .filter_map(move |node| match node.attribute(NAME_ATTR) {
            Some(name) => Some((name, node)),
            None => {
                sink.warning(format!(
                    "skipping <{BLOCK_TAG}> without a {NAME_ATTR} attribute at byte {}",
                    node.range().start
                ));
                None
            }
        })
}

fn parse_document(source: &str) -> Result<Document<'_>, ParamError> {
    Document::parse(source).map_err(|e| ParamError::Parse {
        reason: e.to_string(),
    })
}

/// Locate the block called `name`.
pub(crate) fn find_block(
    source: &str,
    name: &str,
    sink: &dyn DiagnosticSink,
) -> Result<RawBlock, ParamError> {
    let doc = parse_document(source)?;
    let root = parse_root(&doc)?;
    sink.debug("parsed configuration document");

    let (_, node) = named_blocks(root, sink)
        .find(|(block_name, _)| *block_name == name)
        .ok_or_else(|| ParamError::NotFound {
            name: name.to_string(),
        })?;
    sink.debug(format!("found configuration \"{name}\""));

    let entries = node
        .children()
        .filter(|child| child.is_element())
        .map(|child| {
            (
                child.tag_name().name().to_string(),
                child.text().unwrap_or_default().to_string(),
            )
        })
        .collect();

    Ok(RawBlock {
        name: name.to_string(),
        kind: node.attribute(KIND_ATTR).map(str::to_string),
        entries,
    })
}

/// Names of every block in the document.
pub(crate) fn block_names(
    source: &str,
    sink: &dyn DiagnosticSink,
) -> Result<Vec<String>, ParamError> {
    let doc = parse_document(source)?;
    let root = parse_root(&doc)?;
    let names = named_blocks(root, sink)
        .map(|(name, _)| name.to_string())
        .collect();
    Ok(names)
}
