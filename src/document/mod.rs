//! Documents and their delivery to the remote service.

mod model;
mod submitter;

pub use model::{
    Document, DocumentFormat, DocumentId, DocumentResponse, DocumentType, SubmissionRequest,
};
pub use submitter::{DocumentSubmitter, HttpSubmitter, CREATE_DOCUMENT_PATH};
