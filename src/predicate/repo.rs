//! Built-in predicates over a target's metadata and local checkout.

use glob::Pattern;

use super::{Predicate, Verdict};
use crate::context::ExecutionContext;
use crate::vcs::Checkout;

/// The target's path exists and is a directory.
pub struct RepoExists;

impl Predicate for RepoExists {
    fn check(&self, ctx: &ExecutionContext) -> Verdict {
        if ctx.path().is_dir() {
            Verdict::pass("Repository exists locally")
        } else {
            Verdict::fail("Repository doesn't exist locally")
        }
    }
}

/// The checkout has nothing to commit. Unreadable status counts as dirty.
pub struct RepoClean;

impl Predicate for RepoClean {
    fn check(&self, ctx: &ExecutionContext) -> Verdict {
        if !ctx.path().exists() {
            return Verdict::fail("Repository doesn't exist locally");
        }
        let dirty = Checkout::open(ctx.path())
            .and_then(|c| c.is_dirty())
            .unwrap_or(true);
        if dirty {
            Verdict::fail("Repository has unstaged changes")
        } else {
            Verdict::pass("Repository is clean")
        }
    }
}

pub struct HasGitDirectory;

impl Predicate for HasGitDirectory {
    fn check(&self, ctx: &ExecutionContext) -> Verdict {
        if ctx.path().join(".git").is_dir() {
            Verdict::pass("Is a git repository")
        } else {
            Verdict::fail("Not a git repository")
        }
    }
}

pub struct NotArchived;

impl Predicate for NotArchived {
    fn check(&self, ctx: &ExecutionContext) -> Verdict {
        if ctx.target.archived {
            Verdict::fail("Repository is archived")
        } else {
            Verdict::pass("Repository is not archived")
        }
    }
}

pub struct NotFork;

impl Predicate for NotFork {
    fn check(&self, ctx: &ExecutionContext) -> Verdict {
        if ctx.target.fork {
            Verdict::fail("Repository is a fork")
        } else {
            Verdict::pass("Repository is not a fork")
        }
    }
}

pub struct IsPrivate;

impl Predicate for IsPrivate {
    fn check(&self, ctx: &ExecutionContext) -> Verdict {
        if ctx.target.is_private() {
            Verdict::pass("Repository is private")
        } else {
            Verdict::fail("Repository is public")
        }
    }
}

pub struct IsPublic;

impl Predicate for IsPublic {
    fn check(&self, ctx: &ExecutionContext) -> Verdict {
        if ctx.target.is_private() {
            Verdict::fail("Repository is private")
        } else {
            Verdict::pass("Repository is public")
        }
    }
}

/// A path relative to the checkout root exists.
pub struct FileExists(pub String);

impl FileExists {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }
}

impl Predicate for FileExists {
    fn check(&self, ctx: &ExecutionContext) -> Verdict {
        if ctx.path().join(&self.0).exists() {
            Verdict::pass(format!("File {} exists", self.0))
        } else {
            Verdict::fail(format!("File {} doesn't exist", self.0))
        }
    }
}

pub struct FileNotExists(pub String);

impl FileNotExists {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }
}

impl Predicate for FileNotExists {
    fn check(&self, ctx: &ExecutionContext) -> Verdict {
        if ctx.path().join(&self.0).exists() {
            Verdict::fail(format!("File {} already exists", self.0))
        } else {
            Verdict::pass(format!("File {} doesn't exist", self.0))
        }
    }
}

pub struct DirectoryExists(pub String);

impl DirectoryExists {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }
}

impl Predicate for DirectoryExists {
    fn check(&self, ctx: &ExecutionContext) -> Verdict {
        if ctx.path().join(&self.0).is_dir() {
            Verdict::pass(format!("Directory {} exists", self.0))
        } else {
            Verdict::fail(format!("Directory {} doesn't exist", self.0))
        }
    }
}

/// Primary language matches, ignoring case.
pub struct HasLanguage(String);

impl HasLanguage {
    pub fn new(language: impl Into<String>) -> Self {
        Self(language.into().to_lowercase())
    }
}

impl Predicate for HasLanguage {
    fn check(&self, ctx: &ExecutionContext) -> Verdict {
        match ctx.target.language.as_deref() {
            Some(lang) if lang.to_lowercase() == self.0 => {
                Verdict::pass(format!("Repository uses {}", lang))
            }
            _ => Verdict::fail(format!("Repository doesn't use {}", self.0)),
        }
    }
}

/// Target name matches a glob. An invalid glob never matches.
pub struct NameMatches {
    raw: String,
    pattern: Option<Pattern>,
}

impl NameMatches {
    pub fn new(pattern: impl Into<String>) -> Self {
        let raw = pattern.into();
        let pattern = Pattern::new(&raw).ok();
        Self { raw, pattern }
    }
}

impl Predicate for NameMatches {
    fn check(&self, ctx: &ExecutionContext) -> Verdict {
        match &self.pattern {
            Some(p) if p.matches(&ctx.target.name) => {
                Verdict::pass(format!("Name matches pattern {}", self.raw))
            }
            Some(_) => Verdict::fail(format!("Name doesn't match pattern {}", self.raw)),
            None => Verdict::fail(format!("Invalid pattern {}", self.raw)),
        }
    }
}

pub struct OwnerIs(String);

impl OwnerIs {
    pub fn new(owner: impl Into<String>) -> Self {
        Self(owner.into())
    }
}

impl Predicate for OwnerIs {
    fn check(&self, ctx: &ExecutionContext) -> Verdict {
        if ctx.target.owner == self.0 {
            Verdict::pass(format!("Owner is {}", self.0))
        } else {
            Verdict::fail(format!("Owner is {}, not {}", ctx.target.owner, self.0))
        }
    }
}

/// Passes when the run was started with guards disabled (`--force`).
pub struct ForceEnabled;

impl Predicate for ForceEnabled {
    fn check(&self, ctx: &ExecutionContext) -> Verdict {
        if ctx.ignore_guards() {
            Verdict::pass("Force mode enabled")
        } else {
            Verdict::fail("Force mode not enabled")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunFlags;
    use crate::target::{Target, Visibility};
    use crate::vcs::testing::setup_repo;
    use tempfile::tempdir;

    fn ctx_for(target: Target) -> ExecutionContext {
        ExecutionContext::new(target, "/fleet", RunFlags::default())
    }

    #[test]
    fn test_repo_exists_and_git_directory() {
        let dir = tempdir().unwrap();
        let missing = ctx_for(Target::new("gone", dir.path().join("gone")));
        assert!(!RepoExists.check(&missing).passed);
        assert!(!HasGitDirectory.check(&missing).passed);

        let present = ctx_for(Target::new("here", dir.path()));
        assert_eq!(
            RepoExists.check(&present),
            Verdict::pass("Repository exists locally")
        );
        assert!(!HasGitDirectory.check(&present).passed);

        setup_repo(dir.path());
        assert!(HasGitDirectory.check(&present).passed);
    }

    #[test]
    fn test_repo_clean() {
        let dir = tempdir().unwrap();
        setup_repo(dir.path());
        let ctx = ctx_for(Target::new("repo", dir.path()));
        assert_eq!(RepoClean.check(&ctx), Verdict::pass("Repository is clean"));

        std::fs::write(dir.path().join("scratch.txt"), "wip").unwrap();
        assert_eq!(
            RepoClean.check(&ctx),
            Verdict::fail("Repository has unstaged changes")
        );
    }

    #[test]
    fn test_repo_clean_treats_non_repo_as_dirty() {
        let dir = tempdir().unwrap();
        let ctx = ctx_for(Target::new("plain", dir.path()));
        assert!(!RepoClean.check(&ctx).passed);
    }

    #[test]
    fn test_metadata_predicates() {
        let archived_fork = ctx_for(
            Target::new("old", "/fleet/old")
                .with_flags(true, true)
                .with_visibility(Visibility::Private),
        );
        assert_eq!(
            NotArchived.check(&archived_fork),
            Verdict::fail("Repository is archived")
        );
        assert_eq!(
            NotFork.check(&archived_fork),
            Verdict::fail("Repository is a fork")
        );
        assert!(IsPrivate.check(&archived_fork).passed);
        assert!(!IsPublic.check(&archived_fork).passed);

        let fresh = ctx_for(Target::new("new", "/fleet/new"));
        assert!(NotArchived.check(&fresh).passed);
        assert!(NotFork.check(&fresh).passed);
        assert!(IsPublic.check(&fresh).passed);
        assert_eq!(IsPrivate.check(&fresh), Verdict::fail("Repository is public"));
    }

    #[test]
    fn test_file_and_directory_predicates() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "# hi").unwrap();
        std::fs::create_dir(dir.path().join(".claude")).unwrap();
        let ctx = ctx_for(Target::new("repo", dir.path()));

        assert_eq!(
            FileExists::new("README.md").check(&ctx),
            Verdict::pass("File README.md exists")
        );
        assert_eq!(
            FileExists::new("LICENSE").check(&ctx),
            Verdict::fail("File LICENSE doesn't exist")
        );
        assert!(FileNotExists::new("LICENSE").check(&ctx).passed);
        assert_eq!(
            FileNotExists::new("README.md").check(&ctx),
            Verdict::fail("File README.md already exists")
        );
        assert!(DirectoryExists::new(".claude").check(&ctx).passed);
        assert!(!DirectoryExists::new("README.md").check(&ctx).passed);
    }

    #[test]
    fn test_has_language_is_case_insensitive() {
        let ctx = ctx_for(Target::new("repo", "/fleet/repo").with_language("Rust"));
        assert_eq!(
            HasLanguage::new("rust").check(&ctx),
            Verdict::pass("Repository uses Rust")
        );
        assert!(!HasLanguage::new("Go").check(&ctx).passed);

        let none = ctx_for(Target::new("repo", "/fleet/repo"));
        assert!(!HasLanguage::new("rust").check(&none).passed);
    }

    #[test]
    fn test_name_matches_glob() {
        let ctx = ctx_for(Target::new("api-gateway", "/fleet/api-gateway"));
        assert!(NameMatches::new("api-*").check(&ctx).passed);
        assert!(!NameMatches::new("web-*").check(&ctx).passed);
        assert!(!NameMatches::new("[").check(&ctx).passed);
    }

    #[test]
    fn test_owner_is() {
        let ctx = ctx_for(Target::new("repo", "/fleet/repo").with_owner("acme"));
        assert!(OwnerIs::new("acme").check(&ctx).passed);
        assert_eq!(
            OwnerIs::new("globex").check(&ctx),
            Verdict::fail("Owner is acme, not globex")
        );
    }

    #[test]
    fn test_force_enabled_follows_ignore_guards() {
        let target = Target::new("repo", "/fleet/repo");
        let normal = ExecutionContext::new(target.clone(), "/fleet", RunFlags::default());
        assert!(!ForceEnabled.check(&normal).passed);

        let forced = ExecutionContext::new(
            target,
            "/fleet",
            RunFlags {
                ignore_guards: true,
                ..RunFlags::default()
            },
        );
        assert!(ForceEnabled.check(&forced).passed);
    }
}
