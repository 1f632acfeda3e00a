use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::EngineConfig;
use crate::parsers::{detect_format_with_limit, open_input};

/// Lines read from a candidate file when sniffing its format
const SNIFF_LINES: usize = 200;

/// File discovery for 23andMe and VCF inputs
pub struct FileDiscovery {
    recursive: bool,
    scan_lines: usize,
}

impl FileDiscovery {
    pub fn new(recursive: bool) -> Self {
        Self {
            recursive,
            scan_lines: EngineConfig::default().detection_scan_lines,
        }
    }

    pub fn with_scan_lines(mut self, scan_lines: usize) -> Self {
        self.scan_lines = scan_lines;
        self
    }

    /// Expand files and directories into a de-duplicated list of inputs
    /// whose content sniffs as a supported format.
    ///
    /// Explicit file paths are kept even when sniffing fails so the caller
    /// can report the parse error.
    pub fn discover(&self, inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for path in inputs {
            if path.is_file() {
                files.push(path.clone());
            } else if path.is_dir() {
                files.extend(
                    self.discover_in_directory(path)?
                        .into_iter()
                        .filter(|candidate| self.is_supported_file(candidate)),
                );
            } else {
                debug!("Skipping missing input {}", path.display());
            }
        }

        let mut seen = HashSet::new();
        files.retain(|path| seen.insert(path.clone()));

        Ok(files)
    }

    fn discover_in_directory(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        if self.recursive {
            for entry in WalkDir::new(dir)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if path.is_file() && self.is_candidate_extension(path) {
                    files.push(path.to_path_buf());
                }
            }
        } else {
            let entries = fs::read_dir(dir)
                .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

            for entry in entries {
                let entry = entry.with_context(|| {
                    format!("Failed to read directory entry in: {}", dir.display())
                })?;
                let path = entry.path();

                if path.is_file() && self.is_candidate_extension(&path) {
                    files.push(path);
                }
            }
            files.sort();
        }

        Ok(files)
    }

    fn is_candidate_extension(&self, path: &Path) -> bool {
        match path.extension() {
            Some(ext) => matches!(
                ext.to_string_lossy().to_lowercase().as_str(),
                "vcf" | "txt" | "tsv" | "gz" | "bgz" | "bz2" | "xz"
            ),
            None => true,
        }
    }

    /// Sniff the head of the file with the same rules the parser uses
    pub fn is_supported_file(&self, path: &Path) -> bool {
        let Ok(reader) = open_input(path) else {
            return false;
        };

        let head: Vec<String> = reader
            .lines()
            .take(SNIFF_LINES)
            .map_while(|line| line.ok())
            .collect();

        detect_format_with_limit(&head.join("\n"), self.scan_lines).is_supported()
    }
}
