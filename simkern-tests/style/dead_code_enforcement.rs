//! Dead Code Enforcement
//!
//! Production code of the workspace crates must not silence the `dead_code`
//! lint, through `allow` or `expect`, at item or crate level. Unused kernel
//! code is removed, not hidden. Test code is exempt.

use std::fs;
use std::path::{Path, PathBuf};

/// Directories never scanned: build output and the read-only reference material.
const SKIPPED_DIRS: &[&str] = &["target", "examples"];

/// One silenced `dead_code` lint found in production code.
#[derive(Debug)]
struct Violation {
    path: PathBuf,
    line_number: usize,
    line: String,
}

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".."))
}

fn collect_rust_files(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.starts_with('.') {
            continue;
        }

        if path.is_dir() {
            if !SKIPPED_DIRS.contains(&name.as_str()) {
                collect_rust_files(&path, files)?;
            }
        } else if path.extension().is_some_and(|extension| extension == "rs") {
            files.push(path);
        }
    }
    Ok(())
}

/// Test modules, benchmarks and the integration test crate itself.
fn is_test_code(path: &Path) -> bool {
    let normalized = path.to_string_lossy().replace('\\', "/");
    normalized.contains("/simkern-tests/")
        || normalized.contains("/tests/")
        || normalized.contains("/benches/")
        || normalized.ends_with("/tests.rs")
}

fn silences_dead_code(line: &str) -> bool {
    let trimmed = line.trim_start();
    let is_lint_attribute = ["#[allow(", "#![allow(", "#[expect(", "#![expect("]
        .iter()
        .any(|prefix| trimmed.starts_with(prefix));
    is_lint_attribute && trimmed.contains("dead_code")
}

fn scan(path: &Path, content: &str) -> Vec<Violation> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| silences_dead_code(line))
        .map(|(index, line)| Violation {
            path: path.to_path_buf(),
            line_number: index + 1,
            line: line.trim().to_string(),
        })
        .collect()
}
