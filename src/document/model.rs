//! Document, request and response shapes for the document-creation API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ClientError, Result};

/// A document as supplied by the caller.
///
/// Format and type are optional here so that a missing value surfaces as
/// [`ClientError::InvalidDocument`] instead of a deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// The document body, usually base64 encoded
    #[serde(default)]
    pub product_document: String,
    /// Product group the goods belong to
    #[serde(default)]
    pub product_group: String,
    /// Input format: `json`, `csv` or `xml`
    #[serde(default)]
    pub document_format: Option<String>,
    /// Document type, e.g. `LP_INTRODUCE_GOODS`
    #[serde(default, rename = "type")]
    pub document_type: Option<String>,
}

impl Document {
    /// Create a document with every field set.
    pub fn new(
        product_document: impl Into<String>,
        product_group: impl Into<String>,
        document_format: impl Into<String>,
        document_type: impl Into<String>,
    ) -> Self {
        Self {
            product_document: product_document.into(),
            product_group: product_group.into(),
            document_format: Some(document_format.into()),
            document_type: Some(document_type.into()),
        }
    }
}

/// Wire value of `document_format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentFormat {
    /// Documents entered as JSON
    Manual,
    Csv,
    Xml,
}

impl FromStr for DocumentFormat {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("json") {
            Ok(DocumentFormat::Manual)
        } else if s.eq_ignore_ascii_case("csv") {
            Ok(DocumentFormat::Csv)
        } else if s.eq_ignore_ascii_case("xml") {
            Ok(DocumentFormat::Xml)
        } else {
            Err(ClientError::InvalidDocument(format!(
                "Unsupported document format: {}",
                s
            )))
        }
    }
}

/// Wire value of `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    /// Introduction of domestically produced goods into circulation
    LpIntroduceGoods,
}

impl FromStr for DocumentType {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("LP_INTRODUCE_GOODS") {
            Ok(DocumentType::LpIntroduceGoods)
        } else {
            Err(ClientError::InvalidDocument(format!(
                "Unsupported document type: {}",
                s
            )))
        }
    }
}

/// A validated document plus signature, ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionRequest {
    pub product_document: String,
    pub product_group: String,
    pub document_format: DocumentFormat,
    #[serde(rename = "type")]
    pub document_type: DocumentType,
    pub signature: String,
}

impl SubmissionRequest {
    /// Validate `document` and pair it with its signature.
    ///
    /// Fails with [`ClientError::InvalidDocument`] when the format or type is
    /// missing or not recognized.
    pub fn new(document: &Document, signature: impl Into<String>) -> Result<Self> {
        let document_format = document
            .document_format
            .as_deref()
            .ok_or_else(|| ClientError::InvalidDocument("Document format is required".to_string()))?
            .parse::<DocumentFormat>()?;

        let document_type = document
            .document_type
            .as_deref()
            .ok_or_else(|| ClientError::InvalidDocument("Document type is required".to_string()))?
            .parse::<DocumentType>()?;

        Ok(Self {
            product_document: document.product_document.clone(),
            product_group: document.product_group.clone(),
            document_format,
            document_type,
            signature: signature.into(),
        })
    }
}

/// Identifier the service assigns to a created document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body returned by the document-creation endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DocumentResponse {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl DocumentResponse {
    /// Interpret the body received with HTTP `status`.
    ///
    /// A body carrying `value` is a created document; anything else is an
    /// API error built from the error fields.
    pub fn into_result(self, status: u16) -> Result<DocumentId> {
        match self.value {
            Some(value) if status == 200 => Ok(DocumentId(value)),
            _ => Err(ClientError::Api {
                status,
                code: self.error_code,
                message: self
                    .error_message
                    .unwrap_or_else(|| "Error creating document".to_string()),
                description: self.error_description,
            }),
        }
    }
}
