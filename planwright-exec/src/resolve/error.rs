use crate::secrets::SecretError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("template cycle: {}", chain.join(" -> "))]
    TemplateCycle { chain: Vec<String> },

    /// A decrypted value that is itself a template failed to parse or render.
    /// Carries no detail: the template text is secret.
    #[error("template inside secret variable {name} is invalid")]
    SecretTemplate { name: String },

    #[error("cannot resolve secret variable {name}: {source}")]
    Secret {
        name: String,
        #[source]
        source: SecretError,
    },
}

impl ResolveError {
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::UndefinedVariable(_) => "undefined_variable",
            ResolveError::TemplateCycle { .. } => "template_cycle",
            ResolveError::SecretTemplate { .. } => "template",
            ResolveError::Secret {
                source: SecretError::KeyNotFound(_),
                ..
            } => "key_not_found",
            ResolveError::Secret { .. } => "secret",
        }
    }

    /// Secret failures may be transient (key source I/O); template problems are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ResolveError::Secret { .. })
    }
}
