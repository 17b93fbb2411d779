use crate::changes::{self, ChangeDirective};
use crate::inspect::{self, ImageInspect};
use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use log::{debug, trace};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// The engine operations a flatten run depends on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operation {
    Inspect,
    Create,
    Export,
    Import,
    Tag,
    Remove,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Inspect => "inspect image",
            Operation::Create => "create temporary container",
            Operation::Export => "export container filesystem",
            Operation::Import => "import flattened image",
            Operation::Tag => "tag image",
            Operation::Remove => "remove temporary container",
        })
    }
}

/// Blocking access to a container engine.
///
/// Every call returns once the engine has finished; a failed call carries the
/// engine's diagnostic output in its error.
pub trait ContainerEngine {
    fn name(&self) -> &str;

    fn inspect_image(&self, reference: &str) -> Result<ImageInspect>;

    /// Creates a stopped container and returns its id. `command` is only needed
    /// for images that define neither `Cmd` nor `Entrypoint`.
    fn create_container(&self, image_id: &str, command: Option<&str>) -> Result<String>;

    fn export_container(&self, container_id: &str, archive: &Path) -> Result<()>;

    /// Imports a filesystem archive as a new image and returns the image id.
    fn import_image(&self, archive: &Path, directives: &[ChangeDirective]) -> Result<String>;

    fn tag_image(&self, image_id: &str, tag: &str) -> Result<()>;

    fn remove_container(&self, container_id: &str) -> Result<()>;
}

/// Engines with a docker-compatible command line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum EngineKind {
    Docker,
    Podman,
}

impl EngineKind {
    pub fn binary(self) -> &'static str {
        match self {
            EngineKind::Docker => "docker",
            EngineKind::Podman => "podman",
        }
    }
}

/// [`ContainerEngine`] that shells out to the engine's command line.
pub struct CliEngine {
    kind: EngineKind,
    program: PathBuf,
}

impl CliEngine {
    pub fn new(kind: EngineKind) -> Self {
        Self {
            kind,
            program: PathBuf::from(kind.binary()),
        }
    }

    /// Runs `program` instead of the engine's default binary.
    pub fn with_program(kind: EngineKind, program: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            program: program.into(),
        }
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    fn run_command<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        let command_line = shell_words::join(
            std::iter::once(self.program.as_os_str())
                .chain(args.iter().map(OsString::as_os_str))
                .map(|a| a.to_string_lossy()),
        );
        debug!("Running: {}", command_line);

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .with_context(|| {
                format!(
                    "Failed to execute {}. Is {} installed and on PATH?",
                    self.program.display(),
                    self.kind.binary()
                )
            })?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "`{}` failed ({}): {}",
                command_line,
                output.status,
                error.trim()
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        trace!("{} bytes of output from {}", stdout.len(), command_line);
        Ok(stdout)
    }
}

/// Ids are printed on the last line; some engines emit progress lines before it.
fn last_line(stdout: &str, what: &str) -> Result<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Engine printed no {}", what))
}

impl ContainerEngine for CliEngine {
    fn name(&self) -> &str {
        self.kind.binary()
    }

    fn inspect_image(&self, reference: &str) -> Result<ImageInspect> {
        let stdout = self.run_command(["image", "inspect", reference])?;
        Ok(inspect::parse_inspect_output(&stdout)?)
    }

    fn create_container(&self, image_id: &str, command: Option<&str>) -> Result<String> {
        let mut args = vec!["container", "create", image_id];
        args.extend(command);
        let stdout = self.run_command(args)?;
        last_line(&stdout, "container id")
    }

    fn export_container(&self, container_id: &str, archive: &Path) -> Result<()> {
        self.run_command([
            OsStr::new("container"),
            OsStr::new("export"),
            OsStr::new("-o"),
            archive.as_os_str(),
            OsStr::new(container_id),
        ])?;
        Ok(())
    }

    fn import_image(&self, archive: &Path, directives: &[ChangeDirective]) -> Result<String> {
        let mut args: Vec<OsString> = vec!["image".into(), "import".into()];
        args.extend(changes::import_flags(directives).into_iter().map(OsString::from));
        args.push(archive.as_os_str().to_owned());

        let stdout = self.run_command(args)?;
        last_line(&stdout, "image id")
    }

    fn tag_image(&self, image_id: &str, tag: &str) -> Result<()> {
        self.run_command(["image", "tag", image_id, tag])?;
        Ok(())
    }

    fn remove_container(&self, container_id: &str) -> Result<()> {
        self.run_command(["container", "rm", container_id])?;
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use std::cell::RefCell;
    use std::fs;

    /// In-memory engine that records every call.
    pub struct MockEngine {
        pub image: ImageInspect,
        pub fail_on: Vec<Operation>,
        pub cancel_on: Option<(Operation, CancelToken)>,
        pub calls: RefCell<Vec<Operation>>,
        pub created_with: RefCell<Option<Option<String>>>,
        pub imported: RefCell<Vec<ChangeDirective>>,
        pub exported_to: RefCell<Option<PathBuf>>,
        /// Raw `image inspect` output to parse instead of returning `image`.
        pub inspect_output: Option<String>,
        /// Whether the exported archive still existed when the container was removed.
        pub archive_at_remove: RefCell<Option<bool>>,
    }

    impl MockEngine {
        pub fn new(image: ImageInspect) -> Self {
            Self {
                image,
                fail_on: Vec::new(),
                cancel_on: None,
                calls: RefCell::new(Vec::new()),
                created_with: RefCell::new(None),
                imported: RefCell::new(Vec::new()),
                exported_to: RefCell::new(None),
                inspect_output: None,
                archive_at_remove: RefCell::new(None),
            }
        }

        pub fn with_inspect_output(mut self, raw: impl Into<String>) -> Self {
            self.inspect_output = Some(raw.into());
            self
        }

        pub fn failing_on(mut self, operation: Operation) -> Self {
            self.fail_on.push(operation);
            self
        }

        pub fn cancelling_on(mut self, operation: Operation, token: CancelToken) -> Self {
            self.cancel_on = Some((operation, token));
            self
        }

        pub fn calls(&self) -> Vec<Operation> {
            self.calls.borrow().clone()
        }

        fn record(&self, operation: Operation) -> Result<()> {
            self.calls.borrow_mut().push(operation);
            if let Some((on, token)) = &self.cancel_on {
                if *on == operation {
                    token.cancel();
                }
            }
            if self.fail_on.contains(&operation) {
                return Err(anyhow!("mock engine refused to {}", operation));
            }
            Ok(())
        }
    }

    impl ContainerEngine for MockEngine {
        fn name(&self) -> &str {
            "mock"
        }

        fn inspect_image(&self, _reference: &str) -> Result<ImageInspect> {
            self.record(Operation::Inspect)?;
            match &self.inspect_output {
                Some(raw) => Ok(inspect::parse_inspect_output(raw)?),
                None => Ok(self.image.clone()),
            }
        }

        fn create_container(&self, _image_id: &str, command: Option<&str>) -> Result<String> {
            self.record(Operation::Create)?;
            *self.created_with.borrow_mut() = Some(command.map(str::to_string));
            Ok("mock-container".to_string())
        }

        fn export_container(&self, _container_id: &str, archive: &Path) -> Result<()> {
            self.record(Operation::Export)?;
            fs::write(archive, b"rootfs").context("Failed to write mock archive")?;
            *self.exported_to.borrow_mut() = Some(archive.to_path_buf());
            Ok(())
        }

        fn import_image(&self, archive: &Path, directives: &[ChangeDirective]) -> Result<String> {
            self.record(Operation::Import)?;
            if !archive.exists() {
                return Err(anyhow!("archive {} does not exist", archive.display()));
            }
            *self.imported.borrow_mut() = directives.to_vec();
            Ok("sha256:flattened".to_string())
        }

        fn tag_image(&self, _image_id: &str, _tag: &str) -> Result<()> {
            self.record(Operation::Tag)
        }

        fn remove_container(&self, _container_id: &str) -> Result<()> {
            let archive = self.exported_to.borrow();
            *self.archive_at_remove.borrow_mut() = archive.as_deref().map(Path::exists);
            self.record(Operation::Remove)
        }
    }

    #[test]
    fn test_mock_engine_records_calls() {
        let engine = MockEngine::new(ImageInspect {
            id: "sha256:source".to_string(),
            ..Default::default()
        })
        .failing_on(Operation::Tag);

        assert_eq!(engine.inspect_image("any").unwrap().id, "sha256:source");
        assert!(engine.tag_image("sha256:source", "x:y").is_err());
        assert_eq!(engine.calls(), vec![Operation::Inspect, Operation::Tag]);
    }

    #[test]
    fn test_last_line() {
        assert_eq!(
            last_line("Getting image source signatures\nabc123\n\n", "image id").unwrap(),
            "abc123"
        );
        assert!(last_line("  \n", "image id").is_err());
    }

    #[test]
    fn test_engine_kind_binary() {
        assert_eq!(CliEngine::new(EngineKind::Docker).name(), "docker");
        assert_eq!(CliEngine::new(EngineKind::Podman).name(), "podman");
        let engine = CliEngine::with_program(EngineKind::Podman, "/opt/bin/podman-remote");
        assert_eq!(engine.kind(), EngineKind::Podman);
    }

    #[test]
    fn test_missing_binary_reports_context() {
        let engine =
            CliEngine::with_program(EngineKind::Docker, "/nonexistent/flatten-image-engine");
        let err = engine.inspect_image("alpine:latest").unwrap_err();
        assert!(format!("{:#}", err).contains("Is docker installed and on PATH?"));
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::Export.to_string(), "export container filesystem");
        assert_eq!(Operation::Remove.to_string(), "remove temporary container");
    }
}
