//! IAM-style policy documents and their evaluation.
//!
//! Evaluation is deny-overrides: any matching Deny statement wins, then any
//! matching Allow admits, and everything else is an implicit deny. A
//! non-admin identity with no attached policies is therefore denied.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// A policy document (bucket policy or named IAM policy)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "Statement")]
    pub statements: Vec<PolicyStatement>,
}

fn default_version() -> String {
    "2012-10-17".to_string()
}

impl PolicyDocument {
    /// Parse a policy from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// A single statement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub effect: Effect,
    #[serde(default)]
    pub principal: Principal,
    pub action: StringOrList,
    pub resource: StringOrList,
}

/// Allow or Deny
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// Principal: `"*"`, a single ARN, or `{"AWS": ...}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Principal {
    #[default]
    #[serde(skip_deserializing)]
    Unspecified,
    Literal(String),
    Aws {
        #[serde(rename = "AWS")]
        aws: StringOrList,
    },
}

impl Principal {
    /// True when the statement applies to everyone
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        match self {
            Principal::Unspecified => true,
            Principal::Literal(s) => s == "*",
            Principal::Aws { aws } => aws.iter().any(|s| s == "*"),
        }
    }
}

/// A string or list of strings, as AWS policies allow in Action/Resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    Single(String),
    List(Vec<String>),
}

impl StringOrList {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        match self {
            StringOrList::Single(s) => std::slice::from_ref(s).iter().map(String::as_str),
            StringOrList::List(v) => v.as_slice().iter().map(String::as_str),
        }
    }
}

/// Evaluation result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny,
    /// No matching statement
    ImplicitDeny,
}

/// Evaluate an ordered list of policy documents against an action and
/// resource ARN. Documents that fail to parse are skipped (logged), never
/// treated as a grant.
#[must_use]
pub fn evaluate_documents(documents: &[String], action: &str, resource: &str) -> PolicyDecision {
    let mut allowed = false;
    for doc in documents {
        let policy = match PolicyDocument::from_json(doc) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "skipping unparseable policy document");
                continue;
            }
        };
        match evaluate(&policy, action, resource) {
            PolicyDecision::Deny => return PolicyDecision::Deny,
            PolicyDecision::Allow => allowed = true,
            PolicyDecision::ImplicitDeny => {}
        }
    }
    if allowed {
        PolicyDecision::Allow
    } else {
        PolicyDecision::ImplicitDeny
    }
}

/// Evaluate one document.
#[must_use]
pub fn evaluate(policy: &PolicyDocument, action: &str, resource: &str) -> PolicyDecision {
    let mut allowed = false;
    for statement in &policy.statements {
        let matches = statement.action.iter().any(|p| action_matches(p, action))
            && statement.resource.iter().any(|p| wildcard_match(p, resource));
        if !matches {
            continue;
        }
        match statement.effect {
            Effect::Deny => return PolicyDecision::Deny,
            Effect::Allow => allowed = true,
        }
    }
    if allowed {
        PolicyDecision::Allow
    } else {
        PolicyDecision::ImplicitDeny
    }
}

fn action_matches(pattern: &str, action: &str) -> bool {
    wildcard_match(pattern, action)
}

/// Case-sensitive glob match supporting `*` (any run) and `?` (one char).
#[must_use]
pub fn wildcard_match(pattern: &str, value: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let v: Vec<char> = value.chars().collect();

    // Iterative backtracking matcher: remembers the last `*` position.
    let (mut pi, mut vi) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while vi < v.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == v[vi]) {
            pi += 1;
            vi += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, vi));
            pi += 1;
        } else if let Some((spi, svi)) = star {
            pi = spi + 1;
            vi = svi + 1;
            star = Some((spi, svi + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// Does this bucket policy grant anonymous read access? True when any Allow
/// statement names `Principal:"*"` and covers `s3:GetObject` (or `s3:*`).
/// Works on the parsed document, so re-serialized JSON detects identically.
#[must_use]
pub fn allows_public_read(policy_json: &str) -> bool {
    let Ok(policy) = PolicyDocument::from_json(policy_json) else {
        return false;
    };
    policy.statements.iter().any(|s| {
        s.effect == Effect::Allow
            && s.principal.is_wildcard()
            && s.action
                .iter()
                .any(|a| a == "s3:GetObject" || a == "s3:*" || a == "*")
    })
}
