//! XML document rendering shared by every S3-facing response

use serde::Serialize;
use thiserror::Error;

/// Namespace carried by the S3 list documents
pub const S3_XMLNS: &str = "http://s3.amazonaws.com/doc/2006-03-01";

/// Fixed declaration prepended to every rendered document
pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Errors while marshalling a document
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML marshal error: {0}")]
    Marshal(String),
}

/// Render `value` as an XML document with the given root element.
///
/// Output starts with [`XML_DECLARATION`] and is indented with two spaces.
pub fn render_document<T: Serialize>(root: &str, value: &T) -> Result<String, XmlError> {
    let mut body = String::new();
    let mut serializer = quick_xml::se::Serializer::with_root(&mut body, Some(root))
        .map_err(|e| XmlError::Marshal(e.to_string()))?;
    serializer.indent(' ', 2);
    value
        .serialize(serializer)
        .map_err(|e| XmlError::Marshal(e.to_string()))?;

    Ok(format!("{XML_DECLARATION}{body}"))
}
