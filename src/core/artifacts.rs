//! # Artifact Recording Module / 工件记录模块
//!
//! Hashes the files of a job workspace so a step record can carry the
//! materials a step found and the products it left behind. Paths are
//! relative to the workspace root and always use `/` as the separator.
//!
//! 对作业工作区中的文件进行哈希，使步骤记录能够包含步骤开始时的材料及其留下的产物。
//! 路径相对于工作区根目录，并始终使用 `/` 作为分隔符。

use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::core::config::ArtifactSettings;
use crate::core::error::SpecificationError;

/// Recorded path to the hex encoded SHA-256 digest of its content.
pub type ArtifactHashes = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("stripping prefixes maps more than one file to '{key}'")]
    DuplicateKey { key: String },
}

/// One compiled `.gitignore` style pattern.
#[derive(Debug, Clone)]
struct ExcludePattern {
    regex: Regex,
    dir_only: bool,
}

impl ExcludePattern {
    /// Patterns without a `/` match at any depth, patterns with one are
    /// anchored at the workspace root. `*` and `?` never cross a `/`, `**`
    /// does, and a trailing `/` matches directories only.
    fn compile(pattern: &str) -> Result<Self, SpecificationError> {
        let invalid = |reason: String| SpecificationError::InvalidExcludePattern {
            pattern: pattern.to_string(),
            reason,
        };

        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(invalid("pattern is empty".to_string()));
        }
        if trimmed.starts_with('!') {
            return Err(invalid("negated patterns are not supported".to_string()));
        }

        let (body, dir_only) = match trimmed.strip_suffix('/') {
            Some(body) => (body, true),
            None => (trimmed, false),
        };
        let anchored = body.contains('/');
        let chars: Vec<char> = body.trim_start_matches('/').chars().collect();

        let mut source = String::from("^");
        if !anchored {
            source.push_str("(?:.*/)?");
        }
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '*' if chars.get(i + 1) == Some(&'*') => {
                    if chars.get(i + 2) == Some(&'/') {
                        source.push_str("(?:.*/)?");
                        i += 3;
                    } else {
                        source.push_str(".*");
                        i += 2;
                    }
                    continue;
                }
                '*' => source.push_str("[^/]*"),
                '?' => source.push_str("[^/]"),
                '[' => {
                    if let Some(len) = chars[i + 1..].iter().position(|&c| c == ']') {
                        let class: String = chars[i + 1..i + 1 + len].iter().collect();
                        let class = match class.strip_prefix('!') {
                            Some(rest) => format!("^{rest}"),
                            None => class,
                        };
                        source.push('[');
                        source.push_str(&class.replace('[', r"\["));
                        source.push(']');
                        i += len + 2;
                        continue;
                    }
                    source.push_str(r"\[");
                }
                c => source.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
            }
            i += 1;
        }
        source.push('$');

        let regex = Regex::new(&source).map_err(|e| invalid(e.to_string()))?;
        Ok(Self { regex, dir_only })
    }

    fn matches(&self, path: &str, is_dir: bool) -> bool {
        (is_dir || !self.dir_only) && self.regex.is_match(path)
    }
}

/// Walks a directory tree and hashes every regular file in it.
///
/// Excluded directories are not entered. Symlinks to files are hashed
/// through the link; symlinks to directories are not followed and dangling
/// links are skipped.
///
/// 遍历目录树并对其中的每个普通文件进行哈希。
/// 被排除的目录不会进入。指向文件的符号链接通过链接进行哈希；
/// 指向目录的符号链接不会被跟随，悬空链接会被跳过。
#[derive(Debug, Clone)]
pub struct ArtifactRecorder {
    exclude: Vec<ExcludePattern>,
    lstrip_paths: Vec<String>,
    normalize_line_endings: bool,
}

impl ArtifactRecorder {
    /// # Errors
    /// Returns a [`SpecificationError`] if an exclude pattern does not
    /// compile or one lstrip path is a prefix of another.
    pub fn new(settings: &ArtifactSettings) -> Result<Self, SpecificationError> {
        for (position, first) in settings.lstrip_paths.iter().enumerate() {
            for second in &settings.lstrip_paths[position + 1..] {
                if first.starts_with(second.as_str()) || second.starts_with(first.as_str()) {
                    return Err(SpecificationError::OverlappingLstripPaths {
                        first: first.clone(),
                        second: second.clone(),
                    });
                }
            }
        }

        let exclude = settings
            .exclude
            .iter()
            .map(|pattern| ExcludePattern::compile(pattern))
            .collect::<Result<_, _>>()?;

        Ok(Self {
            exclude,
            lstrip_paths: settings.lstrip_paths.clone(),
            normalize_line_endings: settings.normalize_line_endings,
        })
    }

    /// Hashes every file below `root` that no exclude pattern matches.
    pub fn record(&self, root: &Path) -> Result<ArtifactHashes, ArtifactError> {
        let mut hashes = ArtifactHashes::new();
        self.walk(root, "", &mut hashes)?;
        Ok(hashes)
    }

    fn walk(&self, dir: &Path, prefix: &str, hashes: &mut ArtifactHashes) -> Result<(), ArtifactError> {
        let entries = fs::read_dir(dir).map_err(|source| io_error(dir, source))?;
        for entry in entries {
            let entry = entry.map_err(|source| io_error(dir, source))?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let relative = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };

            let file_type = entry.file_type().map_err(|source| io_error(&path, source))?;
            if file_type.is_dir() {
                if !self.is_excluded(&relative, true) {
                    self.walk(&path, &relative, hashes)?;
                }
                continue;
            }

            if file_type.is_symlink() {
                match fs::metadata(&path) {
                    Ok(target) if target.is_file() => {}
                    Ok(_) => {
                        debug!(path = %relative, "not following directory symlink");
                        continue;
                    }
                    Err(_) => {
                        debug!(path = %relative, "skipping dangling symlink");
                        continue;
                    }
                }
            } else if !file_type.is_file() {
                continue;
            }

            if self.is_excluded(&relative, false) {
                continue;
            }
            let key = self.key_for(&relative);
            if hashes.contains_key(&key) {
                return Err(ArtifactError::DuplicateKey { key });
            }
            let digest = self.hash_file(&path)?;
            hashes.insert(key, digest);
        }
        Ok(())
    }

    fn is_excluded(&self, relative: &str, is_dir: bool) -> bool {
        self.exclude
            .iter()
            .any(|pattern| pattern.matches(relative, is_dir))
    }

    fn key_for(&self, relative: &str) -> String {
        self.lstrip_paths
            .iter()
            .find_map(|prefix| relative.strip_prefix(prefix.as_str()))
            .unwrap_or(relative)
            .to_string()
    }

    fn hash_file(&self, path: &Path) -> Result<String, ArtifactError> {
        let bytes = fs::read(path).map_err(|source| io_error(path, source))?;
        let mut hasher = Sha256::new();
        if self.normalize_line_endings {
            hasher.update(normalize_line_endings(&bytes));
        } else {
            hasher.update(&bytes);
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Rewrites `\r\n` and lone `\r` to `\n`.
fn normalize_line_endings(bytes: &[u8]) -> Vec<u8> {
    let mut normalized = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied().peekable();
    while let Some(byte) = iter.next() {
        if byte == b'\r' {
            iter.next_if_eq(&b'\n');
            normalized.push(b'\n');
        } else {
            normalized.push(byte);
        }
    }
    normalized
}

fn io_error(path: &Path, source: io::Error) -> ArtifactError {
    ArtifactError::Io {
        path: path.display().to_string(),
        source,
    }
}
