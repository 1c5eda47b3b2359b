//! Importer module for bringing downloaded files into the library.
//!
//! Sources are walked with an explicit worklist. Each directory becomes a
//! library folder (found or created by parent and name) before its children
//! are visited. Each file is deduplicated by name and type, then by md5,
//! before being hard-linked (or copied) into the upload area and recorded.

mod error;
mod fs_importer;
mod types;

pub use error::ImportError;
pub use fs_importer::{file_md5, FileImporter};
pub use types::{FileOutcome, ImportReport};
