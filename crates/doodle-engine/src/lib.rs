pub mod classifier;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod preprocess;
pub mod providers;
pub mod synthesizer;

pub use classifier::{LabelClassifier, ObjectClassifier};
pub use config::EngineConfig;
pub use error::{InferenceError, PipelineError};
pub use pipeline::GenerationPipeline;
pub use preprocess::{DrawingImage, ImagePreprocessor};
pub use providers::{DryrunProvider, GeminiProvider, InferenceProvider, ProviderRegistry};
pub use synthesizer::{GeneratedImage, ImageOrigin, ImageSynthesizer, StudioSynthesizer};
