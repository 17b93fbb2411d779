pub mod cancel;
pub mod changes;
pub mod cleanup;
pub mod engine;
pub mod error;
pub mod flatten;
pub mod inspect;
pub mod notifier;

// Re-exports for easy access
pub use cancel::CancelToken;
pub use changes::{translate, ChangeDirective, UnsupportedFields};
pub use engine::{CliEngine, ContainerEngine, EngineKind, Operation};
pub use error::FlattenError;
pub use flatten::{FlattenOutcome, FlattenRequest, Flattener};
pub use inspect::{ImageConfig, ImageInspect, InspectOutputError};
pub use notifier::{Notifier, VerbosityLevel};
