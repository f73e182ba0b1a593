pub mod album;
pub mod classifier;
pub mod conflict;
pub mod handler;
pub mod identity;
pub mod record;

pub use album::AlbumBinder;
pub use classifier::{classify_media_kind, extract_file_extension};
pub use conflict::{extract_conflict_fields, ConflictFields, ConflictReconciler, Resolution};
pub use handler::{FileDataHandler, PullOutcome, PullReport};
pub use identity::{
    compute_bucket, AssetIdentity, AssetIdentityAllocator, IdAllocator, SequenceAllocator,
    SqliteIdAllocator,
};
pub use record::{CloudRecord, FieldMap, FieldValue};
