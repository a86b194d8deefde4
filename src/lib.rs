pub mod config;
pub mod consensus;
pub mod error;
pub mod ledger;
pub mod metadata;
pub mod pose;
pub mod session;
pub mod store;
pub mod video;

pub use consensus::{FillMode, SourceMode};
pub use error::{AnnotationError, Result};
pub use ledger::AnnotationLedger;
pub use metadata::MetadataIndex;
pub use pose::{HandSide, Landmark, Skeleton};
pub use session::{Progress, Session};
pub use store::SkeletonStore;
