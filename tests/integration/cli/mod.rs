//! Command-line surface tests
//!
//! Exit status and stream discipline: stdout carries exactly the new image id on
//! success and nothing on failure; all diagnostics go to stderr.

#[cfg(test)]
mod tests {
    use crate::integration::common::*;

    #[test]
    fn test_help_lists_options() {
        let assert = flatten_cmd().arg("--help").assert().success();
        let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();

        for option in ["--tag", "--quiet", "--engine", "--engine-bin", "--tmp-dir"] {
            assert!(stdout.contains(option), "help should mention {option}");
        }
    }

    #[test]
    fn test_missing_image_argument_is_usage_error() {
        flatten_cmd().assert().failure().code(2);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        flatten_cmd()
            .args(["-q", "-v", "alpine:latest"])
            .assert()
            .failure()
            .code(2);
    }

    #[test]
    fn test_unavailable_engine_fails_cleanly() {
        let assert = flatten_cmd()
            .args(["--engine-bin", "/nonexistent/flatten-image-engine"])
            .arg(NONEXISTENT_IMAGE)
            .assert()
            .failure()
            .code(1);
        let output = assert.get_output();
        let stderr = String::from_utf8_lossy(&output.stderr);

        assert!(output.stdout.is_empty(), "stdout must stay empty on failure");
        assert!(stderr.contains("not found"), "stderr: {stderr}");
        assert!(stderr.contains("Did you forget to `docker pull`?"), "stderr: {stderr}");
    }

    #[cfg(unix)]
    mod scripted_engine {
        use crate::integration::common::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::path::{Path, PathBuf};
        use tempfile::TempDir;

        /// Stand-in for the engine CLI: answers the six subcommands a run uses and
        /// appends every invocation to `calls.log` next to itself.
        const ENGINE_SCRIPT: &str = r#"#!/bin/sh
log="$(dirname "$0")/calls.log"
echo "$*" >> "$log"
case "$1 $2" in
    "image inspect")
        if [ "$3" = "missing:latest" ]; then
            echo "Error response from daemon: No such image: $3" >&2
            exit 1
        fi
        if [ "$3" = "web:latest" ]; then
            cat <<'JSON'
[{"Id":"sha256:web","Config":{"Cmd":["nginx"],"ExposedPorts":{"80/tcp":{}}},"RootFS":{"Type":"layers","Layers":["l1","l2"]}}]
JSON
            exit 0
        fi
        cat <<'JSON'
[{"Id":"sha256:source","Config":{"Cmd":["/bin/sh"],"User":"app","Env":["A=1","B=2=x"]},"RootFS":{"Type":"layers","Layers":["l1","l2","l3"]}}]
JSON
        ;;
    "container create")
        echo "cid123"
        ;;
    "container export")
        echo "rootfs" > "$4"
        ;;
    "image import")
        echo "sha256:flat"
        ;;
    "image tag")
        if [ "$4" = "bad:tag" ]; then
            echo "Error response from daemon: tag refused" >&2
            exit 1
        fi
        ;;
    "container rm")
        echo "$3"
        ;;
    *)
        echo "unexpected invocation: $*" >&2
        exit 1
        ;;
esac
exit 0
"#;

        struct Sandbox {
            dir: TempDir,
            tmp: TempDir,
        }

        impl Sandbox {
            fn new() -> Self {
                let dir = TempDir::new().unwrap();
                let engine = dir.path().join("engine");
                fs::write(&engine, ENGINE_SCRIPT).unwrap();
                fs::set_permissions(&engine, fs::Permissions::from_mode(0o755)).unwrap();
                Self {
                    dir,
                    tmp: TempDir::new().unwrap(),
                }
            }

            fn engine(&self) -> PathBuf {
                self.dir.path().join("engine")
            }

            fn calls(&self) -> Vec<String> {
                fs::read_to_string(self.dir.path().join("calls.log"))
                    .unwrap_or_default()
                    .lines()
                    .map(str::to_string)
                    .collect()
            }

            fn tmp(&self) -> &Path {
                self.tmp.path()
            }

            fn tmp_is_empty(&self) -> bool {
                fs::read_dir(self.tmp()).unwrap().next().is_none()
            }
        }

        #[test]
        fn test_flatten_prints_only_image_id() {
            let sandbox = Sandbox::new();
            let assert = flatten_cmd()
                .arg("--engine-bin")
                .arg(sandbox.engine())
                .arg("--tmp-dir")
                .arg(sandbox.tmp())
                .args(["--tag", "app:flat", "app:latest"])
                .assert()
                .success();

            let output = assert.get_output();
            assert_eq!(String::from_utf8_lossy(&output.stdout), "sha256:flat\n");
            let stderr = String::from_utf8_lossy(&output.stderr);
            assert!(stderr.contains("Image has 3 layers."), "stderr: {stderr}");

            let calls = sandbox.calls();
            assert_eq!(calls.len(), 6, "calls: {calls:?}");
            assert_eq!(calls[0], "image inspect app:latest");
            assert_eq!(calls[1], "container create sha256:source");
            assert!(calls[2].starts_with("container export -o "));
            assert!(calls[2].ends_with("export.tar cid123"));
            assert!(calls[3].starts_with(
                r#"image import --change CMD ["/bin/sh"] --change ENV A="1" --change ENV B="2=x" --change USER app "#
            ));
            assert_eq!(calls[4], "image tag sha256:flat app:flat");
            assert_eq!(calls[5], "container rm cid123");
            assert!(sandbox.tmp_is_empty());
        }

        #[test]
        fn test_quiet_run_writes_nothing_to_stderr() {
            let sandbox = Sandbox::new();
            let assert = flatten_cmd()
                .arg("--engine-bin")
                .arg(sandbox.engine())
                .arg("--tmp-dir")
                .arg(sandbox.tmp())
                .args(["--quiet", "app:latest"])
                .assert()
                .success();

            let output = assert.get_output();
            assert_eq!(String::from_utf8_lossy(&output.stdout), "sha256:flat\n");
            assert!(output.stderr.is_empty(), "{}", String::from_utf8_lossy(&output.stderr));
        }

        #[test]
        fn test_exposed_ports_notice_respects_quiet() {
            let sandbox = Sandbox::new();
            let assert = flatten_cmd()
                .arg("--engine-bin")
                .arg(sandbox.engine())
                .arg("--tmp-dir")
                .arg(sandbox.tmp())
                .args(["web:latest"])
                .assert()
                .success();
            let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
            assert!(stderr.contains("80/tcp"), "stderr: {stderr}");

            let assert = flatten_cmd()
                .arg("--engine-bin")
                .arg(sandbox.engine())
                .arg("--tmp-dir")
                .arg(sandbox.tmp())
                .args(["-q", "web:latest"])
                .assert()
                .success();

            let output = assert.get_output();
            assert_eq!(String::from_utf8_lossy(&output.stdout), "sha256:flat\n");
            assert!(output.stderr.is_empty(), "{}", String::from_utf8_lossy(&output.stderr));
            assert!(sandbox.tmp_is_empty());
        }

        #[test]
        fn test_missing_image_creates_nothing() {
            let sandbox = Sandbox::new();
            let assert = flatten_cmd()
                .arg("--engine-bin")
                .arg(sandbox.engine())
                .arg("--tmp-dir")
                .arg(sandbox.tmp())
                .arg("missing:latest")
                .assert()
                .failure()
                .code(1);

            let output = assert.get_output();
            assert!(output.stdout.is_empty());
            assert!(String::from_utf8_lossy(&output.stderr).contains("No such image"));
            assert_eq!(sandbox.calls(), vec!["image inspect missing:latest"]);
            assert!(sandbox.tmp_is_empty());
        }

        #[test]
        fn test_tag_failure_still_removes_container() {
            let sandbox = Sandbox::new();
            let assert = flatten_cmd()
                .arg("--engine-bin")
                .arg(sandbox.engine())
                .arg("--tmp-dir")
                .arg(sandbox.tmp())
                .args(["-t", "bad:tag", "app:latest"])
                .assert()
                .failure()
                .code(1);

            let output = assert.get_output();
            assert!(output.stdout.is_empty());
            let stderr = String::from_utf8_lossy(&output.stderr);
            assert!(
                stderr.contains("image sha256:flat was imported but could not be tagged"),
                "stderr: {stderr}"
            );

            let calls = sandbox.calls();
            assert_eq!(calls.last().map(String::as_str), Some("container rm cid123"));
            assert!(sandbox.tmp_is_empty());
        }
    }
}
