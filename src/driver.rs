//! Narrow driver interface (SPEC_FULL.md §4.8): temporary file placement,
//! spawning the external assembler, and writing the `-M`/`-MD` dependency
//! file. Never reimplements a pipeline stage, so the core can be exercised
//! in tests without shelling out.

use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use tempfile::Builder as TempFileBuilder;

/// How an external process ended: a clean exit (possibly non-zero) or
/// termination by signal, reported distinctly per SPEC_FULL.md §5.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    Exited(i32),
    Signaled(i32),
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        matches!(self, ExitOutcome::Exited(0))
    }

    fn from_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => ExitOutcome::Exited(code),
            None => {
                #[cfg(unix)]
                {
                    use std::os::unix::process::ExitStatusExt;
                    ExitOutcome::Signaled(status.signal().unwrap_or(-1))
                }
                #[cfg(not(unix))]
                {
                    ExitOutcome::Exited(-1)
                }
            }
        }
    }
}

/// Resolves the directory new temp files should be created in: `--obj-dir`
/// if given, else `TMPDIR`, else `/tmp`.
pub fn temp_dir(obj_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = obj_dir {
        return dir.to_path_buf();
    }
    if let Ok(dir) = std::env::var("TMPDIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    PathBuf::from("/tmp")
}

/// Creates a close-on-exec temporary file for assembly output, named
/// `<prefix>XXXXXX` under the resolved temp directory.
pub fn create_temp_asm(obj_dir: Option<&Path>, prefix: &str) -> io::Result<(PathBuf, tempfile::NamedTempFile)> {
    let dir = temp_dir(obj_dir);
    let file = TempFileBuilder::new().prefix(prefix).suffix(".s").tempfile_in(&dir)?;
    let path = file.path().to_path_buf();
    Ok((path, file))
}

/// Writes `path`'s contents to the given temp file handle.
pub fn write_temp(file: &mut tempfile::NamedTempFile, contents: &str) -> io::Result<()> {
    file.write_all(contents.as_bytes())
}

/// Spawns `assembler` on `asm_path`, producing `obj_path`, and waits for it
/// to finish. Never inspects stdout/stderr beyond forwarding the captured
/// text on failure; the child inherits the parent's environment.
pub fn run_assembler(assembler: &str, asm_path: &Path, obj_path: &Path, extra_args: &[String]) -> io::Result<(ExitOutcome, String)> {
    let mut cmd = Command::new(assembler);
    cmd.arg(asm_path).arg("-o").arg(obj_path);
    for arg in extra_args {
        cmd.arg(arg);
    }
    let output = cmd.output()?;
    let outcome = ExitOutcome::from_status(output.status);
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    Ok((outcome, stderr))
}

/// Renders a `-M`/`-MD` dependency file: `<target>: <dep> <dep> ...\n`.
/// Dependencies are sorted for deterministic output across runs on the same
/// filesystem (`HashSet` iteration order is not stable).
pub fn render_dependency_file(target: &Path, deps: &HashSet<PathBuf>) -> String {
    let mut sorted: Vec<&PathBuf> = deps.iter().collect();
    sorted.sort();
    let deps_text = sorted.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(" ");
    format!("{}: {}\n", target.display(), deps_text)
}

pub fn write_dependency_file(dep_path: &Path, target: &Path, deps: &HashSet<PathBuf>) -> io::Result<()> {
    std::fs::write(dep_path, render_dependency_file(target, deps))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_dir_prefers_obj_dir_over_everything() {
        let dir = temp_dir(Some(Path::new("/custom/objs")));
        assert_eq!(dir, PathBuf::from("/custom/objs"));
    }

    #[test]
    fn dependency_file_lists_targets_sorted() {
        let mut deps = HashSet::new();
        deps.insert(PathBuf::from("b.h"));
        deps.insert(PathBuf::from("a.h"));
        let text = render_dependency_file(Path::new("out.o"), &deps);
        assert_eq!(text, "out.o: a.h b.h\n");
    }

    #[test]
    fn dependency_file_with_no_deps_still_names_the_target() {
        let deps = HashSet::new();
        let text = render_dependency_file(Path::new("out.o"), &deps);
        assert_eq!(text, "out.o: \n");
    }

    #[test]
    fn create_temp_asm_places_a_file_under_the_given_dir() {
        let dir = std::env::temp_dir();
        let (path, _file) = create_temp_asm(Some(&dir), "vc").unwrap();
        assert!(path.starts_with(&dir));
        assert!(path.exists());
    }

    #[test]
    fn exit_outcome_distinguishes_clean_exit_from_nonzero() {
        assert!(ExitOutcome::Exited(0).success());
        assert!(!ExitOutcome::Exited(1).success());
        assert!(!ExitOutcome::Signaled(11).success());
    }
}
