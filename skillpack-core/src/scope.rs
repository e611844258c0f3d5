//! Installation scopes and their resolution to directories
//!
//! A scope is how broadly an asset applies: to every project of the user,
//! to one repository, or to a path inside a repository. Resolution maps a
//! (client, scope) pair to the client's configuration directory for that
//! scope. It never touches the filesystem; handlers create directories.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::client::ClientId;
use crate::config::Paths;
use crate::{Result, SkillpackError};

/// Installation breadth
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Every project of the current user
    Global,
    /// A whole repository
    Repository { url: String },
    /// A path prefix inside a repository
    Path { url: String, path: String },
}

impl Scope {
    pub fn repository(url: impl Into<String>) -> Self {
        Scope::Repository { url: url.into() }
    }

    /// Path scope. An empty path is the whole repository.
    pub fn path(url: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into().trim_matches('/').to_string();
        if path.is_empty() {
            Scope::Repository { url: url.into() }
        } else {
            Scope::Path {
                url: url.into(),
                path,
            }
        }
    }

    /// Rebuild a scope from ledger fields
    pub fn from_parts(repository: &str, path: &str) -> Self {
        if repository.is_empty() {
            Scope::Global
        } else {
            Scope::path(repository, path)
        }
    }

    /// Split into ledger fields `(repository, path)`
    pub fn to_parts(&self) -> (String, String) {
        match self {
            Scope::Global => (String::new(), String::new()),
            Scope::Repository { url } => (url.clone(), String::new()),
            Scope::Path { url, path } => (url.clone(), path.clone()),
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Scope::Global)
    }

    pub fn repository_url(&self) -> Option<&str> {
        match self {
            Scope::Global => None,
            Scope::Repository { url } | Scope::Path { url, .. } => Some(url),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => write!(f, "global"),
            Scope::Repository { url } => write!(f, "{url}"),
            Scope::Path { url, path } => write!(f, "{url}#{path}"),
        }
    }
}

/// Resolved location of one client's configuration for one scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeBase {
    pub client: ClientId,
    /// The client's configuration directory, e.g. `~/.claude` or `repo/.cursor`
    pub dir: PathBuf,
    /// Directory the scope covers: home for global, else repo root or `repo/path`
    pub root: PathBuf,
    pub global: bool,
}

impl ScopeBase {
    /// Build directly from a client directory (tests, ad-hoc installs)
    pub fn new(client: ClientId, dir: impl Into<PathBuf>, root: impl Into<PathBuf>, global: bool) -> Self {
        Self {
            client,
            dir: dir.into(),
            root: root.into(),
            global,
        }
    }

    /// Subdirectory of the client dir, e.g. `skills`
    pub fn join(&self, path: impl AsRef<Path>) -> PathBuf {
        self.dir.join(path)
    }
}

/// Path scope as a relative path that cannot leave the checkout
fn relative_scope_path(path: &str) -> Result<PathBuf> {
    let unified = path.replace('\\', "/");
    let mut relative = PathBuf::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(SkillpackError::Path(format!(
                    "Scope path '{path}' escapes the repository"
                )));
            }
        }
    }
    Ok(relative)
}

/// Resolve the configuration directory of `client` for `scope`.
///
/// Repository and path scopes need the local checkout root of the
/// repository; global scopes ignore it.
pub fn resolve(
    client: ClientId,
    scope: &Scope,
    paths: &Paths,
    repo_root: Option<&Path>,
) -> Result<ScopeBase> {
    match scope {
        Scope::Global => Ok(ScopeBase {
            client,
            dir: paths.client_home(client.global_dir_name()),
            root: paths.home.clone(),
            global: true,
        }),
        Scope::Repository { url } | Scope::Path { url, .. } => {
            let repo_root = repo_root.ok_or_else(|| {
                SkillpackError::Path(format!("No local checkout known for repository {url}"))
            })?;
            let root = match scope {
                Scope::Path { path, .. } => repo_root.join(relative_scope_path(path)?),
                _ => repo_root.to_path_buf(),
            };
            Ok(ScopeBase {
                client,
                dir: root.join(client.project_dir_name()),
                root,
                global: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> Paths {
        Paths::with_roots("/home/dev", "/home/dev/.local/share/skillpack")
    }

    #[test]
    fn test_global_resolution() {
        let base = resolve(ClientId::ClaudeCode, &Scope::Global, &paths(), None).unwrap();
        assert_eq!(base.dir, PathBuf::from("/home/dev/.claude"));
        assert_eq!(base.root, PathBuf::from("/home/dev"));
        assert!(base.global);
    }

    #[test]
    fn test_repository_resolution() {
        let scope = Scope::repository("https://github.com/acme/app");
        let base = resolve(ClientId::Copilot, &scope, &paths(), Some(Path::new("/src/app"))).unwrap();
        assert_eq!(base.dir, PathBuf::from("/src/app/.github"));
        assert!(!base.global);
    }

    #[test]
    fn test_path_resolution() {
        let scope = Scope::path("https://github.com/acme/app", "services/api/");
        let base = resolve(ClientId::Cursor, &scope, &paths(), Some(Path::new("/src/app"))).unwrap();
        assert_eq!(base.dir, PathBuf::from("/src/app/services/api/.cursor"));
        assert_eq!(base.root, PathBuf::from("/src/app/services/api"));
    }

    #[test]
    fn test_path_outside_checkout_is_rejected() {
        let root = Some(Path::new("/src/app"));
        for path in ["../../etc", "services/../../outside", "C:\\Windows\\..\\.."] {
            let scope = Scope::path("https://github.com/acme/app", path);
            let err = resolve(ClientId::ClaudeCode, &scope, &paths(), root).unwrap_err();
            assert!(matches!(err, SkillpackError::Path(_)), "{path}: {err}");
        }

        let scope = Scope::path("https://github.com/acme/app", "./services/api");
        let base = resolve(ClientId::ClaudeCode, &scope, &paths(), root).unwrap();
        assert_eq!(base.root, PathBuf::from("/src/app/services/api"));
    }

    #[test]
    fn test_repository_needs_checkout() {
        let scope = Scope::repository("https://github.com/acme/app");
        assert!(resolve(ClientId::Gemini, &scope, &paths(), None).is_err());
    }

    #[test]
    fn test_parts_round_trip() {
        for scope in [
            Scope::Global,
            Scope::repository("https://x/y"),
            Scope::path("https://x/y", "a/b"),
        ] {
            let (repo, path) = scope.to_parts();
            assert_eq!(Scope::from_parts(&repo, &path), scope);
        }
        assert_eq!(Scope::path("https://x/y", ""), Scope::repository("https://x/y"));
    }
}
