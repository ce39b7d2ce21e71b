//! Index-level properties stored as ordinary documents with a reserved
//! id prefix. They ride along with commits, so a reader always sees
//! properties consistent with the documents of its generation.

use super::{Document, EngineReader, EngineWriter};

pub const PROP_ID_PREFIX: &str = "$prop@";
pub const VALUE_FIELD: &str = "$value";

/// Well-known property names.
pub mod keys {
    pub const REVISION: &str = "revision";
    pub const REPOSITORY_NAME: &str = "repository_name";
    pub const REPOSITORY_LOCAL_URI: &str = "repository_local_uri";
    pub const REPOSITORY_EXTERNAL_URI: &str = "repository_external_uri";
    pub const CREDENTIALS: &str = "credentials";
    pub const SINGLE_REVISION: &str = "single_revision";
}

pub fn get(reader: &EngineReader, name: &str) -> Option<String> {
    reader
        .doc_by_id(&format!("{PROP_ID_PREFIX}{name}"))
        .and_then(|doc| doc.stored.get(VALUE_FIELD))
        .cloned()
}

pub fn set(writer: &EngineWriter, name: &str, value: &str) {
    let id = format!("{PROP_ID_PREFIX}{name}");
    writer.delete(&id);
    let mut doc = Document::new(id.clone());
    doc.index_keyword(crate::types::field::ID, id);
    doc.store(VALUE_FIELD, value);
    writer.add(doc);
}
