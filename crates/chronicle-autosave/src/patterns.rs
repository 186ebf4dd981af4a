use chronicle_core::{ChronicleError, ChronicleResult};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

/// Compiled set of glob-style watch patterns.
///
/// Patterns without a `/` are matched against the file name only. Patterns
/// containing a `/` are matched against the full path. An empty pattern list
/// matches nothing.
#[derive(Debug, Clone)]
pub struct WatchPatterns {
    names: GlobSet,
    paths: GlobSet,
    patterns: Vec<String>,
}

impl WatchPatterns {
    /// Compile `patterns`, failing with [`ChronicleError::Config`] on the first
    /// invalid one.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> ChronicleResult<Self> {
        let mut names = GlobSetBuilder::new();
        let mut paths = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = Glob::new(pattern).map_err(|e| {
                ChronicleError::Config(format!("Invalid file pattern '{pattern}': {e}"))
            })?;
            if pattern.contains('/') {
                paths.add(glob);
            } else {
                names.add(glob);
            }
        }
        let build = |builder: GlobSetBuilder| {
            builder
                .build()
                .map_err(|e| ChronicleError::Config(format!("Invalid file patterns: {e}")))
        };
        Ok(Self {
            names: build(names)?,
            paths: build(paths)?,
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
        })
    }

    /// Whether `path` matches at least one pattern.
    pub fn matches(&self, path: &Path) -> bool {
        let by_name = path
            .file_name()
            .is_some_and(|name| self.names.is_match(Path::new(name)));
        by_name || self.paths.is_match(path)
    }

    /// The source patterns, in configuration order.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}
