#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod image;
pub mod index;
pub mod merge;
pub mod retention;
pub mod timestamp;

pub use image::{parse_image_name, ImageEntry};
pub use index::{
    nested_record, parse_index, render_index, ArtifactPath, ArtifactRecord, IndexDocument,
    IndexFormatError, EMPTY_INDEX_BODY,
};
pub use merge::{merge_documents, MergeConflict};
pub use retention::{build_deletion_list, cleanup_index, RetentionPolicy};
pub use timestamp::{BuildTimestamp, TimestampError, VERSION_FORMAT};
