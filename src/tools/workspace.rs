// Path confinement for every file a tool touches

use std::path::{Component, Path, PathBuf};

use super::ToolError;

/// The directory a pipeline run reads from and writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join a model-supplied relative path onto the root.
    ///
    /// Absolute paths and any `..` component are rejected; a leading `./` and
    /// a leading copy of the root itself are tolerated.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, ToolError> {
        let trimmed = relative.trim().trim_matches(|c| c == '\'' || c == '"');
        if trimmed.is_empty() {
            return Err(ToolError::InvalidArguments("empty path".to_string()));
        }

        let candidate = Path::new(trimmed);
        let candidate = candidate.strip_prefix(&self.root).unwrap_or(candidate);

        let mut clean = PathBuf::new();
        for component in candidate.components() {
            match component {
                Component::Normal(part) => clean.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(ToolError::PathOutsideWorkspace(trimmed.to_string()));
                }
            }
        }
        if clean.as_os_str().is_empty() {
            return Err(ToolError::InvalidArguments(format!("'{}' is not a file path", trimmed)));
        }

        Ok(self.root.join(clean))
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative() {
        let ws = Workspace::new("/work");
        assert_eq!(ws.resolve("jira_ticket.txt").unwrap(), PathBuf::from("/work/jira_ticket.txt"));
        assert_eq!(ws.resolve("./out/plan.md").unwrap(), PathBuf::from("/work/out/plan.md"));
        assert_eq!(ws.resolve("'cleaned_data.csv'").unwrap(), PathBuf::from("/work/cleaned_data.csv"));
    }

    #[test]
    fn test_resolve_accepts_root_prefixed_path() {
        let ws = Workspace::new("/work");
        assert_eq!(ws.resolve("/work/a.csv").unwrap(), PathBuf::from("/work/a.csv"));
    }

    #[test]
    fn test_resolve_rejects_escapes() {
        let ws = Workspace::new("/work");
        assert!(matches!(ws.resolve("../etc/passwd"), Err(ToolError::PathOutsideWorkspace(_))));
        assert!(matches!(ws.resolve("/etc/passwd"), Err(ToolError::PathOutsideWorkspace(_))));
        assert!(matches!(ws.resolve("a/../../b"), Err(ToolError::PathOutsideWorkspace(_))));
        assert!(matches!(ws.resolve("  "), Err(ToolError::InvalidArguments(_))));
    }
}
