use std::fmt;

/// Error raised inside the sandbox and carried back to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    pub name: String,
    pub message: String,
    pub stack: String,
}

impl ScriptError {
    /// Builds a script error, prefixing `name: message` onto the stack text
    /// when the interpreter left it out.
    pub fn new(name: impl Into<String>, message: impl Into<String>, stack: Option<String>) -> Self {
        let name = name.into();
        let message = message.into();
        let header = format!("{}: {}", name, message);
        let stack = match stack {
            Some(stack) if stack.starts_with(&header) => stack,
            Some(stack) if !stack.is_empty() => format!("{}\n{}", header, stack),
            _ => header,
        };
        Self { name, message, stack }
    }

    /// Appends an `at function (label)` frame unless the stack already
    /// names `label`.
    pub fn located(mut self, function: &str, label: &str) -> Self {
        if !self.stack.contains(label) {
            self.stack.push_str(&format!("\n    at {} ({})", function, label));
        }
        self
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// One failed fallback candidate, kept for the aggregate error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFailure {
    pub directive: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub enum ProxyError {
    Parse(String),
    EntryNotFound { name: String, found: String },
    SandboxEscape(String),
    Script(ScriptError),
    Sandbox(String),
    InvalidInput(String),
    NotModified,
    NotFound(String),
    Fetch(String),
    CandidateConnect { directive: String, reason: String },
    AllCandidatesFailed(Vec<CandidateFailure>),
    Config(String),
    Timeout,
    Io(String),
}

impl ProxyError {
    pub fn is_not_modified(&self) -> bool {
        matches!(self, ProxyError::NotModified)
    }
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::Parse(msg) => write!(f, "Failed to parse PAC script: {}", msg),
            ProxyError::EntryNotFound { name, found } => write!(
                f,
                "Expected a \"function\" named `{}` to be defined, but got \"{}\"",
                name, found
            ),
            ProxyError::SandboxEscape(msg) => write!(f, "Sandbox violation: {}", msg),
            ProxyError::Script(err) => write!(f, "{}", err.message),
            ProxyError::Sandbox(msg) => write!(f, "Sandbox error: {}", msg),
            ProxyError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            ProxyError::NotModified => write!(f, "Source has not been modified"),
            ProxyError::NotFound(uri) => write!(f, "Source not found: {}", uri),
            ProxyError::Fetch(msg) => write!(f, "Fetch failed: {}", msg),
            ProxyError::CandidateConnect { directive, reason } => {
                write!(f, "Proxy {} failed: {}", directive, reason)
            }
            ProxyError::AllCandidatesFailed(failures) => {
                let list = failures
                    .iter()
                    .map(|failure| format!("{:?} ({})", failure.directive, failure.reason))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "Failed to establish a socket connection to proxies: [{}]", list)
            }
            ProxyError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ProxyError::Timeout => write!(f, "Operation timed out"),
            ProxyError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for ProxyError {}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
