//! Document checklist: which document types a contract must carry.

use std::collections::BTreeSet;

use serde::Serialize;

use super::models::{Document, DocumentType};

/// Document types every contract needs before it is considered complete.
pub const REQUIRED_DOCUMENT_TYPES: [DocumentType; 5] = [
    DocumentType::OriginalContract,
    DocumentType::Redline,
    DocumentType::FinalAgreement,
    DocumentType::SignedContract,
    DocumentType::InsuranceCertificate,
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completeness {
    pub present: Vec<DocumentType>,
    pub missing: Vec<DocumentType>,
    pub required: Vec<DocumentType>,
    pub percentage: u8,
}

/// Score a document set against `required`. Only current versions count.
pub fn completeness(documents: &[Document], required: &[DocumentType]) -> Completeness {
    let available: BTreeSet<DocumentType> = documents
        .iter()
        .filter(|d| d.is_current_version)
        .map(|d| d.doc_type)
        .collect();

    let (present, missing): (Vec<DocumentType>, Vec<DocumentType>) =
        required.iter().copied().partition(|t| available.contains(t));

    let percentage = if required.is_empty() {
        100.0
    } else {
        present.len() as f64 / required.len() as f64 * 100.0
    };

    Completeness {
        present,
        missing,
        required: required.to_vec(),
        percentage: percentage.round().clamp(0.0, 100.0) as u8,
    }
}
