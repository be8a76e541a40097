//! Guards: boolean conditions over an [`ExecutionContext`] that explain
//! themselves.
//!
//! Predicates are composed with [`AllOf`], [`AnyOf`] and [`Not`]. Nested
//! `AllOf`/`AnyOf` are flattened at construction, so
//! `all_of([a, all_of([b, c])])` evaluates exactly like `all_of([a, b, c])`.
//!
//! ```ignore
//! let guard = all_of([guard(RepoExists), not(guard(IsPrivate))]);
//! let verdict = guard.check(&ctx);
//! ```

pub mod repo;

use std::sync::Arc;

use crate::context::ExecutionContext;

pub use repo::{
    DirectoryExists, FileExists, FileNotExists, ForceEnabled, HasGitDirectory, HasLanguage,
    IsPrivate, IsPublic, NameMatches, NotArchived, NotFork, OwnerIs, RepoClean, RepoExists,
};

/// Result of a predicate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    pub reason: String,
}

impl Verdict {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            passed: true,
            reason: reason.into(),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
        }
    }
}

/// A named condition that decides whether a pipeline, branch or step runs.
///
/// Implementations must be side-effect free apart from cheap filesystem
/// reads, and callable from many worker threads at once.
pub trait Predicate: Send + Sync {
    fn check(&self, ctx: &ExecutionContext) -> Verdict;

    /// Operands if this is a conjunction. Used for flattening.
    fn conjuncts(&self) -> Option<&[Guard]> {
        None
    }

    /// Operands if this is a disjunction. Used for flattening.
    fn disjuncts(&self) -> Option<&[Guard]> {
        None
    }
}

/// Shared, immutable predicate handle.
pub type Guard = Arc<dyn Predicate>;

/// Wrap a concrete predicate as a [`Guard`].
pub fn guard<P: Predicate + 'static>(predicate: P) -> Guard {
    Arc::new(predicate)
}

/// Passes iff every operand passes. Reports the first failure.
pub struct AllOf {
    parts: Vec<Guard>,
}

impl AllOf {
    pub fn new(predicates: impl IntoIterator<Item = Guard>) -> Self {
        let mut parts = Vec::new();
        for p in predicates {
            match p.conjuncts() {
                Some(inner) => parts.extend(inner.iter().cloned()),
                None => parts.push(p),
            }
        }
        Self { parts }
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl Predicate for AllOf {
    fn check(&self, ctx: &ExecutionContext) -> Verdict {
        for p in &self.parts {
            let verdict = p.check(ctx);
            if !verdict.passed {
                return verdict;
            }
        }
        Verdict::pass("All conditions met")
    }

    fn conjuncts(&self) -> Option<&[Guard]> {
        Some(&self.parts)
    }
}

/// Passes iff any operand passes. Reports the first success, or every
/// failure reason joined with `"; "`.
pub struct AnyOf {
    parts: Vec<Guard>,
}

impl AnyOf {
    pub fn new(predicates: impl IntoIterator<Item = Guard>) -> Self {
        let mut parts = Vec::new();
        for p in predicates {
            match p.disjuncts() {
                Some(inner) => parts.extend(inner.iter().cloned()),
                None => parts.push(p),
            }
        }
        Self { parts }
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl Predicate for AnyOf {
    fn check(&self, ctx: &ExecutionContext) -> Verdict {
        if self.parts.is_empty() {
            return Verdict::fail("No alternatives to satisfy");
        }
        let mut reasons = Vec::with_capacity(self.parts.len());
        for p in &self.parts {
            let verdict = p.check(ctx);
            if verdict.passed {
                return verdict;
            }
            reasons.push(verdict.reason);
        }
        Verdict::fail(reasons.join("; "))
    }

    fn disjuncts(&self) -> Option<&[Guard]> {
        Some(&self.parts)
    }
}

/// Inverts its operand, keeping the operand's reason behind a `Not: ` prefix.
pub struct Not {
    inner: Guard,
}

impl Not {
    pub fn new(inner: Guard) -> Self {
        Self { inner }
    }
}

impl Predicate for Not {
    fn check(&self, ctx: &ExecutionContext) -> Verdict {
        let verdict = self.inner.check(ctx);
        Verdict {
            passed: !verdict.passed,
            reason: format!("Not: {}", verdict.reason),
        }
    }
}

pub struct AlwaysTrue;

impl Predicate for AlwaysTrue {
    fn check(&self, _ctx: &ExecutionContext) -> Verdict {
        Verdict::pass("Always passes")
    }
}

pub struct AlwaysFalse {
    reason: String,
}

impl AlwaysFalse {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Default for AlwaysFalse {
    fn default() -> Self {
        Self::new("Always fails")
    }
}

impl Predicate for AlwaysFalse {
    fn check(&self, _ctx: &ExecutionContext) -> Verdict {
        Verdict::fail(self.reason.clone())
    }
}

pub fn all_of(predicates: impl IntoIterator<Item = Guard>) -> Guard {
    Arc::new(AllOf::new(predicates))
}

pub fn any_of(predicates: impl IntoIterator<Item = Guard>) -> Guard {
    Arc::new(AnyOf::new(predicates))
}

pub fn not(predicate: Guard) -> Guard {
    Arc::new(Not::new(predicate))
}
