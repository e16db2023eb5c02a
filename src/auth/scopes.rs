//! auth::scopes
//!
//! Maps granted OAuth / API-token scopes to operation capabilities.
//!
//! # Scope Formats
//!
//! Bitbucket reports scopes in two shapes:
//!
//! - OAuth consumers and app passwords: `repository`, `repository:write`,
//!   `pullrequest:write`, ...
//! - API tokens: `{action}:{resource}:bitbucket`, e.g.
//!   `read:repository:bitbucket`
//!
//! A capability is permitted when any granted scope satisfies it. Higher
//! access levels imply lower ones (`repository:admin` grants write and read).
//!
//! # Unknown Scopes
//!
//! Static secrets often carry no scope information at all. What happens then
//! is decided by [`ScopePolicy`]; the default permits reads only.
//!
//! # Requests
//!
//! [`Capability::for_request`] classifies a raw API request by method and
//! path; [`ScopePolicy::permits_request`] is the gate applied before it is
//! sent.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeSet;
//! use bbkt::auth::scopes::{Capability, ScopePolicy};
//!
//! let granted: BTreeSet<String> = ["pullrequest:write".to_string()].into();
//! let policy = ScopePolicy::ReadOnly;
//!
//! assert!(policy.permits(&granted, Capability::ReadPullRequests));
//! assert!(policy.permits(&granted, Capability::WritePullRequests));
//! assert!(!policy.permits(&granted, Capability::WriteRepository));
//! ```

use std::collections::BTreeSet;
use std::fmt;

use reqwest::Method;
use serde::{Deserialize, Serialize};

/// An operation class gated on scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    /// List and read repositories, branches, commits, source.
    ReadRepository,

    /// Create repositories, branches, tags; write files.
    WriteRepository,

    /// Delete repositories.
    DeleteRepository,

    /// List and read pull requests and their comments.
    ReadPullRequests,

    /// Create, update, merge, approve and comment on pull requests.
    WritePullRequests,

    /// List pipelines and read step logs.
    ReadPipelines,

    /// Trigger and stop pipelines.
    WritePipelines,

    /// List and read issues.
    ReadIssues,

    /// Create and update issues.
    WriteIssues,
}

impl Capability {
    /// Every capability, in display order.
    pub const ALL: [Capability; 9] = [
        Capability::ReadRepository,
        Capability::WriteRepository,
        Capability::DeleteRepository,
        Capability::ReadPullRequests,
        Capability::WritePullRequests,
        Capability::ReadPipelines,
        Capability::WritePipelines,
        Capability::ReadIssues,
        Capability::WriteIssues,
    ];

    /// Classify an API request.
    ///
    /// `path` may be relative to the API base or an absolute URL. Returns
    /// `None` for requests outside `/repositories` (account, workspace and
    /// user endpoints), which no capability covers.
    pub fn for_request(method: &Method, path: &str) -> Option<Capability> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let path = match path.split_once("://") {
            Some((_, rest)) => rest.split_once('/').map(|(_, p)| p).unwrap_or_default(),
            None => path,
        };
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let start = segments.iter().position(|s| *s == "repositories")?;
        let rest = &segments[start + 1..];
        let read = matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS);

        let capability = if rest.contains(&"pullrequests") {
            if read {
                Capability::ReadPullRequests
            } else {
                Capability::WritePullRequests
            }
        } else if rest.iter().any(|s| s.starts_with("pipelines")) {
            if read {
                Capability::ReadPipelines
            } else {
                Capability::WritePipelines
            }
        } else if rest.contains(&"issues") {
            if read {
                Capability::ReadIssues
            } else {
                Capability::WriteIssues
            }
        } else if read {
            Capability::ReadRepository
        } else if *method == Method::DELETE && rest.len() == 2 {
            Capability::DeleteRepository
        } else {
            Capability::WriteRepository
        };
        Some(capability)
    }

    /// Whether the capability only reads.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Capability::ReadRepository
                | Capability::ReadPullRequests
                | Capability::ReadPipelines
                | Capability::ReadIssues
        )
    }

    /// Scopes that satisfy this capability, in either format.
    pub fn accepted_scopes(&self) -> &'static [&'static str] {
        match self {
            Capability::ReadRepository => &[
                "repository",
                "repository:write",
                "repository:admin",
                "read:repository:bitbucket",
                "write:repository:bitbucket",
                "admin:repository:bitbucket",
            ],
            Capability::WriteRepository => &[
                "repository:write",
                "repository:admin",
                "write:repository:bitbucket",
                "admin:repository:bitbucket",
            ],
            Capability::DeleteRepository => {
                &["repository:delete", "delete:repository:bitbucket"]
            }
            Capability::ReadPullRequests => &[
                "pullrequest",
                "pullrequest:write",
                "read:pullrequest:bitbucket",
                "write:pullrequest:bitbucket",
            ],
            Capability::WritePullRequests => {
                &["pullrequest:write", "write:pullrequest:bitbucket"]
            }
            Capability::ReadPipelines => &[
                "pipeline",
                "pipeline:write",
                "read:pipeline:bitbucket",
                "write:pipeline:bitbucket",
            ],
            Capability::WritePipelines => &["pipeline:write", "write:pipeline:bitbucket"],
            Capability::ReadIssues => &[
                "issue",
                "issue:write",
                "read:issue:bitbucket",
                "write:issue:bitbucket",
            ],
            Capability::WriteIssues => &["issue:write", "write:issue:bitbucket"],
        }
    }

    /// Whether `granted` contains a scope satisfying this capability.
    pub fn satisfied_by(&self, granted: &BTreeSet<String>) -> bool {
        self.accepted_scopes()
            .iter()
            .any(|scope| granted.contains(*scope))
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::ReadRepository => "read repositories",
            Capability::WriteRepository => "write repositories",
            Capability::DeleteRepository => "delete repositories",
            Capability::ReadPullRequests => "read pull requests",
            Capability::WritePullRequests => "write pull requests",
            Capability::ReadPipelines => "read pipelines",
            Capability::WritePipelines => "run pipelines",
            Capability::ReadIssues => "read issues",
            Capability::WriteIssues => "write issues",
        };
        write!(f, "{}", name)
    }
}

/// What to permit when the granted scope set is empty (unknown).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopePolicy {
    /// Unknown scopes permit read capabilities only.
    #[default]
    ReadOnly,

    /// Unknown scopes permit everything.
    AllowAll,
}

impl ScopePolicy {
    /// Decide whether `capability` is permitted for `granted`.
    ///
    /// A non-empty scope set is authoritative regardless of policy.
    pub fn permits(&self, granted: &BTreeSet<String>, capability: Capability) -> bool {
        if granted.is_empty() {
            return match self {
                ScopePolicy::ReadOnly => capability.is_read_only(),
                ScopePolicy::AllowAll => true,
            };
        }
        capability.satisfied_by(granted)
    }

    /// Decide whether a request may be sent with `granted`.
    ///
    /// Requests that map to no capability are reads or account-level writes;
    /// reads always pass, and writes are refused only while the scope set is
    /// unknown under [`ScopePolicy::ReadOnly`].
    pub fn permits_request(
        &self,
        granted: &BTreeSet<String>,
        method: &Method,
        path: &str,
    ) -> bool {
        match Capability::for_request(method, path) {
            Some(capability) => self.permits(granted, capability),
            None => {
                matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
                    || !granted.is_empty()
                    || *self == ScopePolicy::AllowAll
            }
        }
    }

    /// All capabilities permitted for `granted`, in display order.
    pub fn permitted(&self, granted: &BTreeSet<String>) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|c| self.permits(granted, *c))
            .collect()
    }
}

impl fmt::Display for ScopePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopePolicy::ReadOnly => write!(f, "read_only"),
            ScopePolicy::AllowAll => write!(f, "allow_all"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scopes(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn higher_levels_imply_lower() {
        let granted = scopes(&["repository:admin"]);
        assert!(Capability::ReadRepository.satisfied_by(&granted));
        assert!(Capability::WriteRepository.satisfied_by(&granted));
        assert!(!Capability::DeleteRepository.satisfied_by(&granted));
    }

    #[test]
    fn api_token_scopes_are_recognised() {
        let granted = scopes(&["read:pullrequest:bitbucket", "write:issue:bitbucket"]);
        assert!(Capability::ReadPullRequests.satisfied_by(&granted));
        assert!(!Capability::WritePullRequests.satisfied_by(&granted));
        assert!(Capability::ReadIssues.satisfied_by(&granted));
        assert!(Capability::WriteIssues.satisfied_by(&granted));
        assert!(!Capability::ReadPipelines.satisfied_by(&granted));
    }

    #[test]
    fn read_scope_does_not_grant_write() {
        let granted = scopes(&["pipeline"]);
        assert!(Capability::ReadPipelines.satisfied_by(&granted));
        assert!(!Capability::WritePipelines.satisfied_by(&granted));
    }

    #[test]
    fn unknown_scopes_default_to_read_only() {
        let empty = BTreeSet::new();
        let policy = ScopePolicy::default();
        assert_eq!(policy, ScopePolicy::ReadOnly);

        for capability in Capability::ALL {
            assert_eq!(
                policy.permits(&empty, capability),
                capability.is_read_only(),
                "{capability}"
            );
        }
    }

    #[test]
    fn allow_all_only_widens_unknown_scopes() {
        let empty = BTreeSet::new();
        assert!(ScopePolicy::AllowAll.permits(&empty, Capability::DeleteRepository));

        let granted = scopes(&["repository"]);
        assert!(!ScopePolicy::AllowAll.permits(&granted, Capability::WriteRepository));
    }

    #[test]
    fn permitted_lists_in_display_order() {
        let granted = scopes(&["issue:write", "repository"]);
        assert_eq!(
            ScopePolicy::ReadOnly.permitted(&granted),
            vec![
                Capability::ReadRepository,
                Capability::ReadIssues,
                Capability::WriteIssues
            ]
        );
    }

    #[test]
    fn requests_map_to_capabilities() {
        let cases = [
            (Method::GET, "/repositories/ws/repo", Capability::ReadRepository),
            (Method::DELETE, "/repositories/ws/repo", Capability::DeleteRepository),
            (Method::DELETE, "repositories/ws/repo/refs/branches/x", Capability::WriteRepository),
            (Method::POST, "/repositories/ws/repo/src", Capability::WriteRepository),
            (Method::GET, "/repositories/ws/repo/pullrequests/1", Capability::ReadPullRequests),
            (Method::POST, "/repositories/ws/repo/pullrequests", Capability::WritePullRequests),
            (Method::POST, "/repositories/ws/repo/pipelines/", Capability::WritePipelines),
            (Method::GET, "/repositories/ws/repo/pipelines_config", Capability::ReadPipelines),
            (Method::PUT, "/repositories/ws/repo/issues/7", Capability::WriteIssues),
            (Method::HEAD, "/repositories/ws/repo/issues?q=x", Capability::ReadIssues),
            (
                Method::GET,
                "https://api.bitbucket.org/2.0/repositories/ws?page=2",
                Capability::ReadRepository,
            ),
        ];
        for (method, path, expected) in cases {
            assert_eq!(
                Capability::for_request(&method, path),
                Some(expected),
                "{method} {path}"
            );
        }
        assert_eq!(Capability::for_request(&Method::GET, "/user"), None);
        assert_eq!(Capability::for_request(&Method::POST, "/workspaces/ws/hooks"), None);
    }

    #[test]
    fn read_only_refuses_writes_with_unknown_scopes() {
        let empty = BTreeSet::new();
        let policy = ScopePolicy::ReadOnly;

        assert!(policy.permits_request(&empty, &Method::GET, "/repositories/ws/repo"));
        assert!(policy.permits_request(&empty, &Method::GET, "/user"));
        assert!(!policy.permits_request(&empty, &Method::DELETE, "/repositories/ws/repo"));
        assert!(!policy.permits_request(&empty, &Method::POST, "/workspaces/ws/hooks"));

        assert!(ScopePolicy::AllowAll.permits_request(
            &empty,
            &Method::DELETE,
            "/repositories/ws/repo"
        ));
    }

    #[test]
    fn known_scopes_gate_requests_under_any_policy() {
        let granted = scopes(&["repository:write"]);
        for policy in [ScopePolicy::ReadOnly, ScopePolicy::AllowAll] {
            assert!(policy.permits_request(&granted, &Method::POST, "/repositories/ws/repo/src"));
            assert!(!policy.permits_request(&granted, &Method::DELETE, "/repositories/ws/repo"));
            assert!(!policy.permits_request(
                &granted,
                &Method::POST,
                "/repositories/ws/repo/pullrequests"
            ));
            assert!(policy.permits_request(&granted, &Method::POST, "/workspaces/ws/hooks"));
        }
    }

    #[test]
    fn policy_parses_from_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: ScopePolicy,
        }
        let parsed: Wrapper = toml::from_str("policy = \"allow_all\"").expect("parse");
        assert_eq!(parsed.policy, ScopePolicy::AllowAll);
        assert_eq!(ScopePolicy::ReadOnly.to_string(), "read_only");
    }
}
