use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A value crossing the sandbox boundary.
///
/// Primitives travel as-is. Objects and arrays are carried as JSON so the
/// host never holds a reference into the interpreter heap.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Json(serde_json::Value),
}

impl HostValue {
    /// JavaScript truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            HostValue::Undefined | HostValue::Null => false,
            HostValue::Bool(b) => *b,
            HostValue::Number(n) => *n != 0.0 && !n.is_nan(),
            HostValue::String(s) => !s.is_empty(),
            HostValue::Json(_) => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// `String(value)` as the script would see it.
    pub fn to_js_string(&self) -> String {
        match self {
            HostValue::Undefined => "undefined".to_string(),
            HostValue::Null => "null".to_string(),
            HostValue::Bool(b) => b.to_string(),
            HostValue::Number(n) => format_number(*n),
            HostValue::String(s) => s.clone(),
            HostValue::Json(serde_json::Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    serde_json::Value::Null => String::new(),
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            HostValue::Json(_) => "[object Object]".to_string(),
        }
    }

    /// `Number(value)`, NaN when the value has no numeric reading.
    pub fn to_number(&self) -> f64 {
        match self {
            HostValue::Undefined => f64::NAN,
            HostValue::Null => 0.0,
            HostValue::Bool(b) => f64::from(u8::from(*b)),
            HostValue::Number(n) => *n,
            HostValue::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            HostValue::Json(_) => f64::NAN,
        }
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_js_string())
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::String(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::String(s)
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        HostValue::Number(n)
    }
}

impl From<Option<String>> for HostValue {
    fn from(value: Option<String>) -> Self {
        value.map(HostValue::String).unwrap_or(HostValue::Null)
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.abs() >= 1e21 || n.abs() < 1e-6 {
        let exp = format!("{:e}", n);
        match exp.split_once('e') {
            Some((mantissa, power)) if !power.starts_with('-') => format!("{}e+{}", mantissa, power),
            _ => exp,
        }
    } else {
        // f64 Display never uses an exponent and drops a zero fraction.
        format!("{}", n)
    }
}

/// Error returned by a host function; surfaces in the sandbox as a thrown
/// (or rejected) `Error` of the given name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostError {
    pub name: String,
    pub message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: "Error".to_string(),
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self {
            name: "TypeError".to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

pub type HostResult = std::result::Result<HostValue, HostError>;
pub type SyncHostFn = Arc<dyn Fn(&[HostValue]) -> HostResult + Send + Sync>;
pub type AsyncHostFn = Arc<dyn Fn(Vec<HostValue>) -> BoxFuture<'static, HostResult> + Send + Sync>;

/// A host capability injected into the sandbox. Whether it is asynchronous
/// is part of the descriptor, never guessed from the callable.
#[derive(Clone)]
pub enum HostFunction {
    Sync(SyncHostFn),
    Async(AsyncHostFn),
}

impl HostFunction {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&[HostValue]) -> HostResult + Send + Sync + 'static,
    {
        HostFunction::Sync(Arc::new(f))
    }

    pub fn asynchronous<F>(f: F) -> Self
    where
        F: Fn(Vec<HostValue>) -> BoxFuture<'static, HostResult> + Send + Sync + 'static,
    {
        HostFunction::Async(Arc::new(f))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, HostFunction::Async(_))
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostFunction::Sync(_) => f.write_str("HostFunction::Sync"),
            HostFunction::Async(_) => f.write_str("HostFunction::Async"),
        }
    }
}

/// Named host functions bound into the sandbox global scope.
pub type SandboxBindings = BTreeMap<String, HostFunction>;

/// Reads argument `index` as a string, `"undefined"` when missing.
pub fn arg_string(args: &[HostValue], index: usize) -> String {
    args.get(index).map(HostValue::to_js_string).unwrap_or_else(|| "undefined".to_string())
}
