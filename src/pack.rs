//! Build an uploadable module archive from a source directory.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use zip::write::SimpleFileOptions;

use crate::store::ModulePath;
use crate::version;

const SKIPPED_DIRS: &[&str] = &[".git", ".hg", ".svn", ".bzr", "vendor"];

/// Extract the module path from the `module` directive of a `go.mod` file.
pub fn module_directive(contents: &str) -> Option<String> {
    contents.lines().find_map(|line| {
        let line = line.split("//").next().unwrap_or("").trim();
        let rest = line.strip_prefix("module")?;
        if !rest.starts_with(char::is_whitespace) && !rest.starts_with('"') {
            return None;
        }
        let path = rest.trim().trim_matches('"');
        (!path.is_empty()).then(|| path.to_owned())
    })
}

/// Modules at major version 2 and above carry a `/vN` suffix.
fn check_major_suffix(module: &ModulePath, version: &semver::Version) -> anyhow::Result<()> {
    let suffix = module
        .basename()
        .strip_prefix('v')
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|n| *n >= 2);
    match (version.major, suffix) {
        (0 | 1, None) => Ok(()),
        (major, Some(n)) if major == n => Ok(()),
        (0 | 1, Some(n)) => bail!("module path {module} has /v{n} suffix but version is v{}", version.major),
        (major, _) => bail!("version v{major} requires module path ending in /v{major}, got {module}"),
    }
}

/// Package `dir` as `{module}@{version}` and write it to `output` (default
/// `{basename}@{version}.zip` in the working directory). Returns the path
/// written. Refuses to overwrite an existing file.
pub fn pack(dir: &Path, version_token: &str, output: Option<&Path>) -> anyhow::Result<PathBuf> {
    let modfile = dir.join("go.mod");
    let contents = fs::read_to_string(&modfile)
        .with_context(|| format!("unable to read modfile {}", modfile.display()))?;
    let raw = module_directive(&contents)
        .with_context(|| format!("no module directive in {}", modfile.display()))?;
    let module = ModulePath::parse(&raw).with_context(|| format!("invalid module path {raw:?}"))?;
    let parsed = version::parse(version_token)
        .with_context(|| format!("invalid version {version_token:?}"))?;
    check_major_suffix(&module, &parsed)?;
    tracing::info!(%module, version = version_token, "packing module");

    let output = output.map_or_else(
        || PathBuf::from(format!("{}@{version_token}.zip", module.basename())),
        Path::to_path_buf,
    );

    let mut files = Vec::new();
    collect_files(dir, dir, &mut files)?;
    files.sort();

    let out = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&output)
        .with_context(|| format!("unable to create {}", output.display()))?;

    let prefix = module.archive_prefix(version_token);
    if let Err(e) = write_archive(out, dir, &prefix, &files) {
        let _ = fs::remove_file(&output);
        return Err(e);
    }
    tracing::info!(path = %output.display(), files = files.len(), "wrote archive");
    Ok(output)
}

/// Regular files under `dir`, relative to `root`, skipping VCS metadata,
/// vendored code and nested modules.
fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            let name = entry.file_name();
            if SKIPPED_DIRS.iter().any(|s| name == *s) || path.join("go.mod").is_file() {
                continue;
            }
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            if let Ok(rel) = path.strip_prefix(root) {
                out.push(rel.to_path_buf());
            }
        }
    }
    Ok(())
}

fn write_archive(out: fs::File, root: &Path, prefix: &str, files: &[PathBuf]) -> anyhow::Result<()> {
    let mut zip = zip::ZipWriter::new(out);
    let options = SimpleFileOptions::default();
    for rel in files {
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        zip.start_file(format!("{prefix}{name}"), options)?;
        let data = fs::read(root.join(rel)).with_context(|| format!("read {}", rel.display()))?;
        zip.write_all(&data)?;
    }
    zip.finish()?.sync_all()?;
    Ok(())
}
