use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::KnowledgeConfig;
use crate::models::KnowledgeFile;

/// Walk the knowledge root and read every file matching the include globs.
///
/// Files are returned sorted by relative path. Non-UTF-8 files are skipped
/// with a warning.
pub fn scan_knowledge(config: &KnowledgeConfig) -> Result<Vec<KnowledgeFile>> {
    let root = &config.root;
    if !root.exists() {
        bail!("Knowledge root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        match read_file(path) {
            Ok(body) => files.push(KnowledgeFile {
                filename: rel_str,
                body,
            }),
            Err(e) => tracing::warn!(file = %rel_str, error = %e, "skipping unreadable file"),
        }
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.filename.cmp(&b.filename));

    Ok(files)
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn knowledge(root: &Path) -> KnowledgeConfig {
        KnowledgeConfig {
            root: root.to_path_buf(),
            include_globs: vec!["**/*.md".to_string(), "**/*.txt".to_string()],
            exclude_globs: vec!["drafts/**".to_string()],
            follow_symlinks: false,
        }
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("guides")).unwrap();
        fs::create_dir_all(root.join("drafts")).unwrap();
        fs::write(root.join("zeta.md"), "zeta").unwrap();
        fs::write(root.join("guides/alpha.txt"), "alpha").unwrap();
        fs::write(root.join("drafts/wip.md"), "wip").unwrap();
        fs::write(root.join("image.png"), [0u8, 1, 2]).unwrap();

        let files = scan_knowledge(&knowledge(root)).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["guides/alpha.txt", "zeta.md"]);
        assert_eq!(files[0].body, "alpha");
    }

    #[test]
    fn test_missing_root_errors() {
        let tmp = TempDir::new().unwrap();
        let err = scan_knowledge(&knowledge(&tmp.path().join("nope"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
