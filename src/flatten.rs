//! Image flattening workflow.
//!
//! [`Flattener`] drives a [`ContainerEngine`] through one linear sequence:
//! inspect → create container → export filesystem → import with change
//! directives → tag. Every temporary resource (the container and the private
//! temp directory holding the export archive) registers its cleanup action in a
//! [`CleanupStack`] as soon as it exists, and the stack runs on every exit path
//! before [`Flattener::flatten`] returns.
//!
//! The source image is never modified. On success the only lasting side effects
//! are the new image and, if requested, its tag.

use crate::cancel::CancelToken;
use crate::changes::{self, ChangeDirective};
use crate::cleanup::CleanupStack;
use crate::engine::{ContainerEngine, Operation};
use crate::error::FlattenError;
use crate::inspect::InspectOutputError;
use crate::notifier::Notifier;
use anyhow::Context;
use indicatif::HumanDuration;
use std::path::{Path, PathBuf};
use std::time::Instant;

const TEMP_DIR_PREFIX: &str = "flatten-image-";
const EXPORT_FILE_NAME: &str = "export.tar";
/// Recorded on the temporary container when the image defines no command. The
/// container is never started.
const PLACEHOLDER_COMMAND: &str = "true";

/// What to flatten and where the result goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenRequest {
    pub image: String,
    pub tag: Option<String>,
    /// Parent of the private temp directory; the system temp root when unset.
    pub temp_root: Option<PathBuf>,
}

impl FlattenRequest {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            tag: None,
            temp_root: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_temp_root(mut self, temp_root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(temp_root.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenOutcome {
    /// Id of the new single-layer image.
    pub image_id: String,
    pub source_image_id: String,
    pub source_layers: usize,
    pub directives: Vec<ChangeDirective>,
    pub tag: Option<String>,
}

pub struct Flattener<E: ContainerEngine> {
    engine: E,
    notifier: Notifier,
    cancel: CancelToken,
}

impl<E: ContainerEngine> Flattener<E> {
    pub fn new(engine: E, notifier: Notifier) -> Self {
        Self {
            engine,
            notifier,
            cancel: CancelToken::new(),
        }
    }

    /// Stops the run at the next step boundary once `cancel` fires.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Flattens `request.image` into a new single-layer image.
    ///
    /// Cleanup actions have all run by the time this returns, whatever the
    /// outcome. A cleanup failure is logged and never replaces the result.
    ///
    /// # Errors
    /// - [`FlattenError::ImageNotFound`] when the engine cannot inspect the image.
    ///   Nothing is created. Unreadable inspect output is an
    ///   [`FlattenError::ExternalCall`] instead.
    /// - [`FlattenError::UnsupportedFields`] when the image sets `Volumes` or
    ///   `OnBuild`. Nothing is created.
    /// - [`FlattenError::ExternalCall`] when container creation, export or import fails.
    /// - [`FlattenError::TagFailed`] when tagging fails; the imported image remains.
    /// - [`FlattenError::TempDir`] when the temp directory cannot be created.
    /// - [`FlattenError::Interrupted`] when the cancel token fired, including when it
    ///   fired while an engine call was running and that call failed.
    pub fn flatten(&self, request: &FlattenRequest) -> Result<FlattenOutcome, FlattenError> {
        let started = Instant::now();
        let mut cleanup = CleanupStack::new();

        let result = self.run_steps(request, &mut cleanup);

        let failures = cleanup.run();
        if !failures.is_empty() {
            self.notifier.warn(&format!(
                "{} cleanup step(s) failed; temporary resources may need manual removal",
                failures.len()
            ));
        }

        if result.is_ok() {
            self.notifier.info(&format!(
                "Flattened {} in {}",
                request.image,
                HumanDuration(started.elapsed())
            ));
        }
        self.notifier.finish();
        result
    }

    fn checkpoint(&self) -> Result<(), FlattenError> {
        if self.cancel.is_cancelled() {
            return Err(FlattenError::Interrupted);
        }
        Ok(())
    }

    /// Engine failures seen after Ctrl-C report as an interrupt.
    fn step_error(&self, operation: Operation, error: anyhow::Error) -> FlattenError {
        if self.cancel.is_cancelled() {
            return FlattenError::Interrupted;
        }
        FlattenError::external(operation, error)
    }

    fn run_steps<'a>(
        &'a self,
        request: &FlattenRequest,
        cleanup: &mut CleanupStack<'a>,
    ) -> Result<FlattenOutcome, FlattenError> {
        let engine = &self.engine;
        let notifier = &self.notifier;

        self.checkpoint()?;
        notifier.info(&format!(
            "Inspecting {} image {}...",
            engine.name(),
            request.image
        ));
        let source = engine.inspect_image(&request.image).map_err(|e| {
            if self.cancel.is_cancelled() || e.is::<InspectOutputError>() {
                self.step_error(Operation::Inspect, e)
            } else {
                FlattenError::ImageNotFound {
                    image: request.image.clone(),
                    message: format!("{:#}", e),
                }
            }
        })?;
        notifier.info(&format!("Image has {} layers.", source.layer_count()));
        notifier.debug(&format!("Source image id: {}", source.id));

        let directives = changes::translate(&source.config)?;
        let ports = source.config.exposed_port_names();
        if !ports.is_empty() {
            notifier.notice(&format!(
                "Exposed ports are not carried over to the flattened image: {}",
                ports.join(", ")
            ));
        }

        self.checkpoint()?;
        notifier.info("Creating temporary container...");
        let placeholder = (!source.config.has_command()).then_some(PLACEHOLDER_COMMAND);
        let container_id = engine
            .create_container(&source.id, placeholder)
            .map_err(|e| self.step_error(Operation::Create, e))?;
        notifier.info(&format!("Created temporary container {}", container_id));
        {
            let container_id = container_id.clone();
            cleanup.push(format!("remove container {}", container_id), move || {
                notifier.info("Deleting temporary container...");
                engine.remove_container(&container_id)
            });
        }

        self.checkpoint()?;
        let temp_dir = create_temp_dir(request.temp_root.as_deref())?;
        let archive = temp_dir.path().join(EXPORT_FILE_NAME);
        {
            let archive = archive.clone();
            cleanup.push(format!("remove {}", temp_dir.path().display()), move || {
                notifier.info(&format!("Deleting temporary file {}...", archive.display()));
                let path = temp_dir.path().to_path_buf();
                temp_dir
                    .close()
                    .with_context(|| format!("Failed to remove {}", path.display()))
            });
        }

        self.checkpoint()?;
        notifier.info(&format!(
            "Exporting container filesystem to temporary file {}...",
            archive.display()
        ));
        engine
            .export_container(&container_id, &archive)
            .map_err(|e| self.step_error(Operation::Export, e))?;
        if let Ok(meta) = std::fs::metadata(&archive) {
            notifier.debug(&format!("Exported archive is {} bytes", meta.len()));
        }

        notifier.info(&format!(
            "Computed set of Dockerfile changes to apply to imported image: {}",
            changes::describe(&directives)
        ));

        self.checkpoint()?;
        notifier.info("Importing exported filesystem into new image...");
        let image_id = engine
            .import_image(&archive, &directives)
            .map_err(|e| self.step_error(Operation::Import, e))?;
        notifier.info(&format!("Created image {}", image_id));

        if let Some(tag) = &request.tag {
            self.checkpoint()?;
            engine
                .tag_image(&image_id, tag)
                .map_err(|e| match self.step_error(Operation::Tag, e) {
                    FlattenError::ExternalCall { message, .. } => FlattenError::TagFailed {
                        image_id: image_id.clone(),
                        tag: tag.clone(),
                        message,
                    },
                    other => other,
                })?;
            notifier.info(&format!("Tagged image as {}", tag));
        }

        Ok(FlattenOutcome {
            image_id,
            source_image_id: source.id,
            source_layers: source.root_fs.layers.len(),
            directives,
            tag: request.tag.clone(),
        })
    }
}

fn create_temp_dir(root: Option<&Path>) -> Result<tempfile::TempDir, FlattenError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(TEMP_DIR_PREFIX);
    match root {
        Some(root) => builder.tempdir_in(root),
        None => builder.tempdir(),
    }
    .map_err(FlattenError::TempDir)
}
