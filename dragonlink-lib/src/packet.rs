use crate::constants::CODE_WIDTH;
use crate::error::DlError;
use bytes::{Bytes, BytesMut};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Normalize a code to the packet field width.
///
/// Short codes are left-padded with `'0'`. Longer codes keep their first
/// [`CODE_WIDTH`] characters; this loses information, so it is logged.
pub fn pad_code(code: &str) -> String {
    let len = code.chars().count();
    if len <= CODE_WIDTH {
        format!("{:0>width$}", code, width = CODE_WIDTH)
    } else {
        let truncated: String = code.chars().take(CODE_WIDTH).collect();
        warn!(
            "Code {:?} is longer than {} characters, truncating to {:?}",
            code, CODE_WIDTH, truncated
        );
        truncated
    }
}

/// Number of non-overlapping occurrences of `placeholder`, scanning left to right.
pub fn count_occurrences(template: &[u8], placeholder: &str) -> usize {
    let needle = placeholder.as_bytes();
    if needle.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut rest = template;
    while let Some(pos) = find(rest, needle) {
        count += 1;
        rest = &rest[pos + needle.len()..];
    }
    count
}

/// Replace every occurrence of `placeholder` in `template` with the padded `code`.
pub fn build(template: &[u8], placeholder: &str, code: &str) -> Result<Bytes, DlError> {
    check_placeholder(placeholder)?;
    Ok(replace_all(template, placeholder.as_bytes(), pad_code(code).as_bytes()))
}

fn check_placeholder(placeholder: &str) -> Result<(), DlError> {
    if placeholder.is_empty() {
        return Err(DlError::InvalidPlaceholder("placeholder must not be empty".to_string()));
    }
    Ok(())
}

fn replace_all(template: &[u8], needle: &[u8], replacement: &[u8]) -> Bytes {
    let mut patched = BytesMut::with_capacity(template.len());
    let mut rest = template;
    while let Some(pos) = find(rest, needle) {
        patched.extend_from_slice(&rest[..pos]);
        patched.extend_from_slice(replacement);
        rest = &rest[pos + needle.len()..];
    }
    patched.extend_from_slice(rest);
    patched.freeze()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// A captured packet loaded from disk.
#[derive(Debug, Clone)]
pub struct PacketTemplate {
    path: PathBuf,
    content: Bytes,
}

impl PacketTemplate {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DlError> {
        let path = path.as_ref().to_path_buf();
        let content = std::fs::read(&path).map_err(|source| DlError::TemplateRead {
            path: path.clone(),
            source,
        })?;
        debug!("Loaded template {:?} ({} bytes)", path, content.len());
        Ok(Self {
            path,
            content: Bytes::from(content),
        })
    }

    pub fn from_bytes(content: impl Into<Bytes>) -> Self {
        Self {
            path: PathBuf::new(),
            content: content.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn occurrences(&self, placeholder: &str) -> usize {
        count_occurrences(&self.content, placeholder)
    }

    /// Substitute `code` for every `placeholder` in the template.
    pub fn patch(&self, placeholder: &str, code: &str) -> Result<PatchedPacket, DlError> {
        check_placeholder(placeholder)?;
        let substitutions = self.occurrences(placeholder);
        if substitutions == 0 {
            warn!(
                "Template {:?} contains no {:?} placeholder, packet will be replayed unchanged",
                self.path, placeholder
            );
        }
        let padded = pad_code(code);
        let content = replace_all(&self.content, placeholder.as_bytes(), padded.as_bytes());
        Ok(PatchedPacket {
            content,
            code: padded,
            substitutions,
        })
    }
}

/// Template content with the ID field filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedPacket {
    pub content: Bytes,
    /// The padded code that was substituted
    pub code: String,
    pub substitutions: usize,
}

impl PatchedPacket {
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), DlError> {
        let path = path.as_ref();
        std::fs::write(path, &self.content).map_err(|source| DlError::OutputWrite {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            "Wrote patched packet to {:?} ({} substitution(s) of {})",
            path, self.substitutions, self.code
        );
        Ok(())
    }
}
