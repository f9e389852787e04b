//! Read-only access to a GitHub repository through the REST contents API.
//!
//! Two operations: read one file, list one directory. A missing file is
//! the one failure the architect agent can recover from, so
//! [`GithubRepo::read_file_or_hint`] answers it with the sibling listing of
//! the parent directory instead of a dead end.

use base64::Engine;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::StatusCode;
use serde::Deserialize;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Characters escaped inside one path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// The path does not resolve to a file in the repository.
    #[error("path not found in repository: {0}")]
    NotFound(String),
    /// Transport, auth, rate limit or any other remote-side failure.
    #[error("repository access failed: {0}")]
    Access(String),
}

/// `owner/name` of a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinate {
    pub owner: String,
    pub name: String,
}

impl RepoCoordinate {
    /// Parse `owner/name`, an https URL or an SSH remote
    /// (`git@github.com:owner/name.git`).
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        let tail = ["github.com/", "github.com:"]
            .iter()
            .find_map(|host| trimmed.rfind(host).map(|idx| &trimmed[idx + host.len()..]))
            .unwrap_or(trimmed);
        let tail = tail.trim_matches('/');
        let tail = tail.strip_suffix(".git").unwrap_or(tail);

        let (owner, name) = tail.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl std::fmt::Display for RepoCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    Submodule,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::File => write!(f, "file"),
            EntryKind::Dir => write!(f, "dir"),
            EntryKind::Symlink => write!(f, "symlink"),
            EntryKind::Submodule => write!(f, "submodule"),
        }
    }
}

/// One child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepoEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Contents {
    Dir(Vec<RepoEntry>),
    File(FileContents),
}

#[derive(Deserialize)]
struct FileContents {
    #[serde(rename = "type")]
    kind: EntryKind,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

/// A GitHub repository reachable with an optional bearer token.
#[derive(Clone)]
pub struct GithubRepo {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
    coordinate: RepoCoordinate,
}

impl GithubRepo {
    pub fn new(
        http: reqwest::Client,
        api_base: &str,
        token: Option<String>,
        coordinate: RepoCoordinate,
    ) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
            coordinate,
        }
    }

    fn contents_url(&self, path: &str) -> String {
        let encoded: Vec<String> = normalize(path)
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| utf8_percent_encode(s, SEGMENT).to_string())
            .collect();
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base,
            self.coordinate.owner,
            self.coordinate.name,
            encoded.join("/")
        )
    }

    async fn fetch(&self, path: &str) -> Result<Contents, RepoError> {
        let mut req = self
            .http
            .get(self.contents_url(path))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "architect-studio");
        if let Some(ref token) = self.token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| RepoError::Access(format!("GitHub request failed: {e}")))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RepoError::NotFound(normalize(path).to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RepoError::Access(format!("GitHub API error {status}: {body}")));
        }

        resp.json::<Contents>()
            .await
            .map_err(|e| RepoError::Access(format!("Unexpected GitHub response: {e}")))
    }

    /// Fetch and decode a file's content.
    pub async fn read_file(&self, path: &str) -> Result<String, RepoError> {
        let file = match self.fetch(path).await? {
            Contents::File(f) => f,
            Contents::Dir(_) => return Err(RepoError::NotFound(normalize(path).to_string())),
        };
        if file.kind != EntryKind::File {
            return Err(RepoError::NotFound(normalize(path).to_string()));
        }

        match (file.encoding.as_deref(), file.content) {
            (Some("base64"), Some(content)) => {
                let compact: String = content.split_whitespace().collect();
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(compact)
                    .map_err(|e| RepoError::Access(format!("Bad base64 from GitHub: {e}")))?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            (encoding, _) => Err(RepoError::Access(format!(
                "GitHub returned no inline content for {} (encoding: {})",
                normalize(path),
                encoding.unwrap_or("none")
            ))),
        }
    }

    /// List the immediate children of a directory. `""` is the root.
    pub async fn list_directory(&self, path: &str) -> Result<Vec<RepoEntry>, RepoError> {
        match self.fetch(path).await {
            Ok(Contents::Dir(entries)) => Ok(entries),
            Ok(Contents::File(_)) => Err(RepoError::Access(format!(
                "'{}' is a file, not a directory",
                normalize(path)
            ))),
            Err(RepoError::NotFound(p)) => {
                Err(RepoError::Access(format!("directory not found: '{p}'")))
            }
            Err(e) => Err(e),
        }
    }

    /// Read a file; when it does not exist, describe what the parent
    /// directory does contain.
    pub async fn read_file_or_hint(&self, path: &str) -> Result<String, RepoError> {
        match self.read_file(path).await {
            Err(RepoError::NotFound(missing)) => {
                let dir = parent_dir(&missing);
                tracing::debug!(repo = %self.coordinate, path = %missing, dir, "File not found, listing parent");
                match self.list_directory(dir).await {
                    Ok(entries) => {
                        let siblings: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
                        Ok(format!(
                            "Error: File '{missing}' not found. Here are the files available in that directory: {}",
                            siblings.join(", ")
                        ))
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "Parent listing failed");
                        Err(RepoError::NotFound(missing))
                    }
                }
            }
            other => other,
        }
    }

    /// Directory listing rendered for an agent.
    pub async fn describe_directory(&self, path: &str) -> Result<String, RepoError> {
        let entries = self.list_directory(path).await?;
        let lines: Vec<String> = entries
            .iter()
            .map(|e| format!("- {} ({})", e.path, e.kind))
            .collect();
        Ok(format!("Contents of '{}':\n{}", normalize(path), lines.join("\n")))
    }
}

fn normalize(path: &str) -> &str {
    let p = path.trim().trim_matches('/');
    if p == "." { "" } else { p }
}

/// Containing directory of a repository path, `""` at top level.
pub fn parent_dir(path: &str) -> &str {
    normalize(path).rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_from_plain_and_url_forms() {
        let expected = RepoCoordinate {
            owner: "octo".into(),
            name: "widgets".into(),
        };
        assert_eq!(RepoCoordinate::parse("octo/widgets"), Some(expected.clone()));
        assert_eq!(
            RepoCoordinate::parse("https://github.com/octo/widgets/"),
            Some(expected.clone())
        );
        assert_eq!(
            RepoCoordinate::parse("git@github.com:octo/widgets.git"),
            Some(expected.clone())
        );
        assert_eq!(
            RepoCoordinate::parse("ssh://git@github.com/octo/widgets.git"),
            Some(expected.clone())
        );
        assert_eq!(RepoCoordinate::parse(" /octo/widgets "), Some(expected));
    }

    #[test]
    fn coordinate_rejects_malformed() {
        assert_eq!(RepoCoordinate::parse(""), None);
        assert_eq!(RepoCoordinate::parse("widgets"), None);
        assert_eq!(RepoCoordinate::parse("octo/"), None);
        assert_eq!(RepoCoordinate::parse("git@github.com:octo"), None);
        assert_eq!(RepoCoordinate::parse("https://github.com/octo/widgets/tree/main"), None);
    }

    #[test]
    fn parent_of_nested_and_top_level() {
        assert_eq!(parent_dir("src/missing.py"), "src");
        assert_eq!(parent_dir("a/b/c.rs"), "a/b");
        assert_eq!(parent_dir("README.md"), "");
        assert_eq!(parent_dir("/src/x.py"), "src");
    }

    #[test]
    fn contents_url_escapes_segments_and_keeps_root() {
        let repo = GithubRepo::new(
            reqwest::Client::new(),
            "https://api.example.com/",
            None,
            RepoCoordinate::parse("octo/widgets").unwrap(),
        );
        assert_eq!(
            repo.contents_url(""),
            "https://api.example.com/repos/octo/widgets/contents/"
        );
        assert_eq!(
            repo.contents_url("/docs/my file.md"),
            "https://api.example.com/repos/octo/widgets/contents/docs/my%20file.md"
        );
    }

    #[test]
    fn empty_token_is_dropped() {
        let repo = GithubRepo::new(
            reqwest::Client::new(),
            DEFAULT_API_BASE,
            Some(String::new()),
            RepoCoordinate::parse("octo/widgets").unwrap(),
        );
        assert!(repo.token.is_none());
    }
}
