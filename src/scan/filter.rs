//! Pure filtering predicate and input normalisation helpers.

use std::collections::HashSet;

use thiserror::Error;

use crate::remote::FileDescriptor;

/// Dependency, build, IDE, VCS and temp folder names skipped by default.
pub const DEFAULT_SKIP_DIRS: &[&str] = &[
    // JavaScript/Node
    "node_modules",
    ".npm",
    ".yarn",
    ".pnpm-store",
    ".bower_components",
    // Python
    "venv",
    ".venv",
    "env",
    ".env",
    "__pycache__",
    ".mypy_cache",
    ".pytest_cache",
    ".tox",
    ".nox",
    "site-packages",
    ".eggs",
    // Build outputs
    "build",
    "dist",
    "out",
    "target",
    "_build",
    ".build",
    // Frontend frameworks
    ".next",
    ".nuxt",
    ".svelte-kit",
    ".turbo",
    ".parcel-cache",
    ".cache",
    ".webpack",
    ".angular",
    ".expo",
    // IDEs
    ".idea",
    ".vscode",
    ".vs",
    ".eclipse",
    ".settings",
    // Version control
    ".git",
    ".hg",
    ".svn",
    // Other package managers
    "vendor",
    "bower_components",
    ".gradle",
    ".maven",
    "Pods",
    "DerivedData",
    "cmake-build-debug",
    "cmake-build-release",
    // Temp/logs
    "logs",
    ".logs",
    "tmp",
    ".tmp",
    "temp",
    ".temp",
];

/// Builds the default skip-dir set, lower-cased.
#[must_use]
pub fn default_skip_dirs() -> HashSet<String> {
    DEFAULT_SKIP_DIRS.iter().map(|d| d.to_lowercase()).collect()
}

/// Which files a scan keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOptions {
    /// Skip files inside dependency/build folders.
    pub skip_dependencies: bool,
    /// If non-empty, only these extensions are kept.
    pub include_extensions: HashSet<String>,
    /// Extensions always skipped.
    pub exclude_extensions: HashSet<String>,
    /// Files smaller than this are skipped.
    pub min_size_bytes: u64,
    /// Files larger than this are skipped (0 = no limit).
    pub max_size_bytes: u64,
    /// Count files without downloading them.
    pub dry_run: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            skip_dependencies: true,
            include_extensions: HashSet::new(),
            exclude_extensions: HashSet::new(),
            min_size_bytes: 0,
            max_size_bytes: 0,
            dry_run: false,
        }
    }
}

impl FilterOptions {
    /// Sets the include list, normalising each extension.
    #[must_use]
    pub fn with_include<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.include_extensions = normalize_extensions(extensions);
        self
    }

    /// Sets the exclude list, normalising each extension.
    #[must_use]
    pub fn with_exclude<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.exclude_extensions = normalize_extensions(extensions);
        self
    }
}

fn normalize_extensions<I, S>(extensions: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    extensions
        .into_iter()
        .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

/// Why a file was filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Inside a dependency/build folder.
    Dependency,
    /// Extension not included, or explicitly excluded.
    Extension,
    /// Outside the configured size range.
    Size,
}

/// Decides whether `file` is skipped, and why.
///
/// Checks run in order: dependency folder, include list, exclude list,
/// minimum size, maximum size. `skip_dirs` must be lower-cased.
#[must_use]
pub fn should_skip(
    file: &FileDescriptor,
    filters: &FilterOptions,
    skip_dirs: &HashSet<String>,
) -> Option<SkipReason> {
    if filters.skip_dependencies
        && file
            .path
            .split('/')
            .any(|part| !part.is_empty() && skip_dirs.contains(&part.to_lowercase()))
    {
        return Some(SkipReason::Dependency);
    }

    let ext = extension_of(&file.path);

    if !filters.include_extensions.is_empty() && !filters.include_extensions.contains(&ext) {
        return Some(SkipReason::Extension);
    }
    if filters.exclude_extensions.contains(&ext) {
        return Some(SkipReason::Extension);
    }

    if filters.min_size_bytes > 0 && file.size < filters.min_size_bytes {
        return Some(SkipReason::Size);
    }
    if filters.max_size_bytes > 0 && file.size > filters.max_size_bytes {
        return Some(SkipReason::Size);
    }

    None
}

/// Lower-cased extension of the last path component, without the dot.
///
/// Dotfiles such as `.bashrc` have no extension.
fn extension_of(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(idx) if idx > 0 => name[idx + 1..].to_lowercase(),
        _ => String::new(),
    }
}

/// Parses `"jpg, .PNG,gif"` into `{"jpg", "png", "gif"}`.
#[must_use]
pub fn parse_extensions(input: &str) -> HashSet<String> {
    normalize_extensions(input.split(','))
}

/// Error returned by [`parse_size`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid size '{input}': expected a number with an optional B/KB/MB/GB/TB suffix")]
pub struct ParseSizeError {
    /// The rejected input.
    pub input: String,
}

/// Parses a human size such as `100`, `1KB` or `1.5MB` into bytes.
///
/// Multipliers are binary (`1KB` = 1024) and case-insensitive.
///
/// # Errors
///
/// Returns [`ParseSizeError`] for empty, negative or non-numeric input.
pub fn parse_size(input: &str) -> Result<u64, ParseSizeError> {
    const MULTIPLIERS: &[(&str, u64)] = &[
        ("KB", 1 << 10),
        ("MB", 1 << 20),
        ("GB", 1 << 30),
        ("TB", 1 << 40),
        ("K", 1 << 10),
        ("M", 1 << 20),
        ("G", 1 << 30),
        ("T", 1 << 40),
        ("B", 1),
    ];

    let err = || ParseSizeError {
        input: input.to_string(),
    };
    let normalized = input.trim().to_uppercase();

    let (number, multiplier) = MULTIPLIERS
        .iter()
        .find_map(|(suffix, mult)| normalized.strip_suffix(suffix).map(|n| (n.trim(), *mult)))
        .unwrap_or((normalized.as_str(), 1));

    let value: f64 = number.parse().map_err(|_| err())?;
    if !value.is_finite() || value < 0.0 {
        return Err(err());
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let bytes = (value * multiplier as f64) as u64;
    Ok(bytes)
}

/// Normalises a remote folder path: `""`/`"/"` mean the whole account,
/// anything else gets a leading `/` and no trailing `/`.
#[must_use]
pub fn normalize_remote_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        return String::new();
    }
    let with_slash = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };
    with_slash.trim_end_matches('/').to_string()
}
