//! Narrowing a listed fleet down to the targets a run should see.
//!
//! Filtering happens before planning: a filtered-out target never appears
//! in the plan, unlike a target whose guards fail.

use glob::Pattern;

use crate::errors::FleetError;
use crate::target::Target;

#[derive(Debug, Clone, Default)]
pub struct TargetFilter {
    /// Exact repository names. Empty means all.
    pub repos: Vec<String>,
    /// Owners, compared case-insensitively. Empty means all.
    pub orgs: Vec<String>,
    /// Glob patterns matched against the repository name.
    pub patterns: Vec<String>,
    pub include_forks: bool,
    pub include_archived: bool,
    pub private_only: bool,
    pub public_only: bool,
}

/// A validated [`TargetFilter`] with its patterns compiled.
#[derive(Debug)]
pub struct CompiledFilter {
    rules: TargetFilter,
    patterns: Vec<Pattern>,
}

impl TargetFilter {
    pub fn compile(self) -> Result<CompiledFilter, FleetError> {
        if self.private_only && self.public_only {
            return Err(FleetError::ConflictingVisibility);
        }
        let patterns = self
            .patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| FleetError::InvalidPattern {
                    pattern: p.clone(),
                    message: e.msg.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CompiledFilter {
            rules: self,
            patterns,
        })
    }
}

impl CompiledFilter {
    pub fn matches(&self, target: &Target) -> bool {
        let rules = &self.rules;
        if target.fork && !rules.include_forks {
            return false;
        }
        if target.archived && !rules.include_archived {
            return false;
        }
        if rules.private_only && !target.is_private() {
            return false;
        }
        if rules.public_only && target.is_private() {
            return false;
        }
        if !rules.repos.is_empty() && !rules.repos.iter().any(|r| *r == target.name) {
            return false;
        }
        if !rules.orgs.is_empty() && !rules.orgs.iter().any(|o| o.eq_ignore_ascii_case(&target.owner))
        {
            return false;
        }
        if !self.patterns.is_empty() && !self.patterns.iter().any(|p| p.matches(&target.name)) {
            return false;
        }
        true
    }

    /// Keep matching targets, preserving order.
    pub fn apply(&self, targets: Vec<Target>) -> Vec<Target> {
        targets.into_iter().filter(|t| self.matches(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Visibility;

    fn target(name: &str, owner: &str) -> Target {
        Target::new(name, format!("/fleet/{}", name)).with_owner(owner)
    }

    fn fleet() -> Vec<Target> {
        vec![
            target("api", "Acme"),
            target("api-docs", "acme").with_visibility(Visibility::Private),
            target("forked", "acme").with_flags(false, true),
            target("old", "acme").with_flags(true, false),
            target("web", "other"),
        ]
    }

    fn names(targets: &[Target]) -> Vec<&str> {
        targets.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn test_default_excludes_forks_and_archived() {
        let filter = TargetFilter::default().compile().unwrap();
        assert_eq!(names(&filter.apply(fleet())), vec!["api", "api-docs", "web"]);
    }

    #[test]
    fn test_include_forks_and_archived() {
        let filter = TargetFilter {
            include_forks: true,
            include_archived: true,
            ..Default::default()
        }
        .compile()
        .unwrap();
        assert_eq!(filter.apply(fleet()).len(), 5);
    }

    #[test]
    fn test_visibility() {
        let private = TargetFilter {
            private_only: true,
            ..Default::default()
        }
        .compile()
        .unwrap();
        assert_eq!(names(&private.apply(fleet())), vec!["api-docs"]);

        let public = TargetFilter {
            public_only: true,
            ..Default::default()
        }
        .compile()
        .unwrap();
        assert_eq!(names(&public.apply(fleet())), vec!["api", "web"]);
    }

    #[test]
    fn test_conflicting_visibility_is_an_error() {
        let err = TargetFilter {
            private_only: true,
            public_only: true,
            ..Default::default()
        }
        .compile()
        .unwrap_err();
        assert!(matches!(err, FleetError::ConflictingVisibility));
    }

    #[test]
    fn test_repos_are_exact() {
        let filter = TargetFilter {
            repos: vec!["api".into()],
            ..Default::default()
        }
        .compile()
        .unwrap();
        assert_eq!(names(&filter.apply(fleet())), vec!["api"]);
    }

    #[test]
    fn test_orgs_are_case_insensitive() {
        let filter = TargetFilter {
            orgs: vec!["ACME".into()],
            ..Default::default()
        }
        .compile()
        .unwrap();
        assert_eq!(names(&filter.apply(fleet())), vec!["api", "api-docs"]);
    }

    #[test]
    fn test_patterns_glob_on_name() {
        let filter = TargetFilter {
            patterns: vec!["api*".into()],
            ..Default::default()
        }
        .compile()
        .unwrap();
        assert_eq!(names(&filter.apply(fleet())), vec!["api", "api-docs"]);
    }

    #[test]
    fn test_invalid_pattern() {
        let err = TargetFilter {
            patterns: vec!["[".into()],
            ..Default::default()
        }
        .compile()
        .unwrap_err();
        assert!(matches!(err, FleetError::InvalidPattern { .. }));
    }
}
