pub mod events;
pub mod fallback;
pub mod gallery;
pub mod label;
pub mod models;
pub mod sounds;
pub mod validation;

pub use fallback::FallbackImageTable;
pub use gallery::{GalleryRecord, GalleryStore};
pub use label::{ObjectLabel, FALLBACK_VOCABULARY, UNRECOGNIZED_LABEL};
pub use sounds::{SoundCue, SoundResolver};
pub use validation::{FieldError, GenerateRequest, ValidationError};
