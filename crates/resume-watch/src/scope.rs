//! Watch scope and the store requests derived from it.

/// How the store should interpret a resume token on a list call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeTokenMatch {
    /// Any state at least as new as the token
    NotOlderThan,
    /// Exactly the state at the token
    Exact,
}

/// Immutable selection parameters for one watch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchScope {
    namespace: Option<String>,
    label_selector: Option<String>,
    field_selector: Option<String>,
    resume_token: Option<String>,
    resume_token_match: Option<ResumeTokenMatch>,
    timeout_seconds: Option<u32>,
}

impl WatchScope {
    /// Cluster-wide scope.
    pub fn all() -> Self {
        Self::default()
    }

    /// Scope limited to a single namespace.
    pub fn namespaced(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }

    /// Restrict to resources matching a label selector.
    #[must_use]
    pub fn labels(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }

    /// Restrict to resources matching a field selector.
    #[must_use]
    pub fn fields(mut self, selector: impl Into<String>) -> Self {
        self.field_selector = Some(selector.into());
        self
    }

    /// Start from an explicit resume token. An empty token means "current state".
    #[must_use]
    pub fn from_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.resume_token = (!token.is_empty()).then_some(token);
        self
    }

    /// How a non-empty resume token is interpreted by the store.
    #[must_use]
    pub fn matching(mut self, mode: ResumeTokenMatch) -> Self {
        self.resume_token_match = Some(mode);
        self
    }

    /// Server-side timeout hint for each watch request.
    #[must_use]
    pub fn timeout(mut self, seconds: u32) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Namespace, or `None` for every namespace.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Label selector, if any.
    pub fn label_selector(&self) -> Option<&str> {
        self.label_selector.as_deref()
    }

    /// Field selector, if any.
    pub fn field_selector(&self) -> Option<&str> {
        self.field_selector.as_deref()
    }

    /// Starting resume token, if any.
    pub fn resume_token(&self) -> Option<&str> {
        self.resume_token.as_deref()
    }

    /// Resume token match mode, if any.
    pub fn resume_token_match(&self) -> Option<ResumeTokenMatch> {
        self.resume_token_match
    }

    /// Server-side timeout hint, if any.
    pub fn timeout_seconds(&self) -> Option<u32> {
        self.timeout_seconds
    }
}

/// A single list call (`watch=false`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    /// Namespace, or `None` for every namespace
    pub namespace: Option<String>,
    /// Label selector
    pub label_selector: Option<String>,
    /// Field selector
    pub field_selector: Option<String>,
    /// State to list at
    pub resume_token: Option<String>,
    /// How the store should interpret `resume_token`
    pub resume_token_match: Option<ResumeTokenMatch>,
    /// Page size
    pub limit: Option<u32>,
}

impl ListRequest {
    /// One-item probe used to check whether `token` is still retained.
    pub fn probe(scope: &WatchScope, token: &str) -> Self {
        Self {
            namespace: scope.namespace.clone(),
            label_selector: scope.label_selector.clone(),
            field_selector: scope.field_selector.clone(),
            resume_token: Some(token.to_string()),
            resume_token_match: scope.resume_token_match,
            limit: Some(1),
        }
    }
}

/// A streaming watch call (`watch=true`, `allowWatchBookmarks=true`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRequest {
    /// Namespace, or `None` for every namespace
    pub namespace: Option<String>,
    /// Label selector
    pub label_selector: Option<String>,
    /// Field selector
    pub field_selector: Option<String>,
    /// Empty means "start from the store's current state"
    pub resume_token: String,
    /// How the store should interpret a non-empty `resume_token`
    pub resume_token_match: Option<ResumeTokenMatch>,
    /// Server-side timeout hint
    pub timeout_seconds: Option<u32>,
    /// Ask the store for bookmark notifications
    pub allow_bookmarks: bool,
}

impl WatchRequest {
    /// Watch `scope` starting at `resume_token`.
    pub fn new(scope: &WatchScope, resume_token: &str) -> Self {
        Self {
            namespace: scope.namespace.clone(),
            label_selector: scope.label_selector.clone(),
            field_selector: scope.field_selector.clone(),
            resume_token: resume_token.to_string(),
            resume_token_match: scope.resume_token_match,
            timeout_seconds: scope.timeout_seconds,
            allow_bookmarks: true,
        }
    }
}
