//! Built-in functions callable from source expressions.
//!
//! Each [`Function`] is a pure operation over JSON values. It carries its own
//! JavaScript body so generated routines can embed it. The [`FunctionRegistry`]
//! binds call names such as `$ADD` to these operations.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::{RegistryError, RegistryResult};

/// Call name reserved for enumeration lookups.
pub const ENUM_CALL: &str = "$ENUM";

static CALL_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\$[A-Za-z_][A-Za-z0-9_]*$").expect("call name pattern is valid")
});

/// Whether `name` is a syntactically valid call name.
pub fn is_valid_call_name(name: &str) -> bool {
    CALL_NAME.is_match(name)
}

/// All available operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Function {
    /// Numeric sum of all arguments
    Add,

    /// Numeric product of all arguments
    Multiply,

    /// First argument minus the second
    Subtract,

    /// First argument divided by the second
    Divide,

    /// Concatenate arguments as strings
    Join,

    /// Arithmetic mean of all arguments
    Average,

    /// Largest argument
    Max,

    /// Smallest argument
    Min,

    /// `(condition, then, else)`
    If,
}

impl Function {
    pub const ALL: [Function; 9] = [
        Function::Add,
        Function::Multiply,
        Function::Subtract,
        Function::Divide,
        Function::Join,
        Function::Average,
        Function::Max,
        Function::Min,
        Function::If,
    ];

    /// Name this function is registered under by default.
    pub fn default_name(&self) -> &'static str {
        match self {
            Function::Add => "$ADD",
            Function::Multiply => "$MULTIPLY",
            Function::Subtract => "$SUBTRACT",
            Function::Divide => "$DIVIDE",
            Function::Join => "$JOIN",
            Function::Average => "$AVERAGE",
            Function::Max => "$MAX",
            Function::Min => "$MIN",
            Function::If => "$IF",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Function::Add => "Sum of all arguments (numeric coercion)",
            Function::Multiply => "Product of all arguments",
            Function::Subtract => "First argument minus the second",
            Function::Divide => "First argument divided by the second",
            Function::Join => "Arguments concatenated as text",
            Function::Average => "Mean of all arguments",
            Function::Max => "Largest argument",
            Function::Min => "Smallest argument",
            Function::If => "Second argument if the first is truthy, else the third",
        }
    }

    /// JavaScript implementation embedded in generated routines.
    pub fn js_source(&self) -> &'static str {
        match self {
            Function::Add => {
                "(...args) =>\n  args.reduce((prev, next) => Number(prev) + Number(next), 0)"
            }
            Function::Multiply => "(...args) => args.reduce((prev, next) => prev * next, 1)",
            Function::Subtract => "(...args) => args[0] - args[1]",
            Function::Divide => "(...args) => args[0] / args[1]",
            Function::Join => "(...args) => args.join(\"\")",
            Function::Average => {
                "(...args) =>\n  args.reduce((a, b) => Number(a) + Number(b), 0) / args.length"
            }
            Function::Max => "(...args) => Math.max(...args)",
            Function::Min => "(...args) => Math.min(...args)",
            Function::If => {
                "(condition, thenClause, elseClause) => {\n  if (condition) return thenClause;\n  else return elseClause;\n}"
            }
        }
    }

    /// Apply this function to already evaluated arguments.
    ///
    /// `None` is JavaScript's `undefined`: a missing key or element field. It
    /// coerces to `NaN` where `null` coerces to `0`, joins as empty text, and a
    /// `None` result leaves the assigned key out.
    pub fn apply(&self, args: &[Option<Value>]) -> Option<Value> {
        let numbers = || args.iter().map(|arg| arg_number(arg.as_ref()));
        match self {
            Function::Add => Some(number_value(numbers().sum())),
            Function::Multiply => Some(number_value(numbers().product())),
            Function::Subtract => Some(number_value(nth_number(args, 0) - nth_number(args, 1))),
            Function::Divide => Some(number_value(nth_number(args, 0) / nth_number(args, 1))),
            Function::Join => Some(Value::String(
                args.iter()
                    .map(|arg| arg.as_ref().map(join_text).unwrap_or_default())
                    .collect(),
            )),
            Function::Average => {
                let sum: f64 = numbers().sum();
                Some(number_value(sum / args.len() as f64))
            }
            Function::Max => Some(number_value(numbers().fold(f64::NEG_INFINITY, |acc, n| {
                if acc.is_nan() || n.is_nan() { f64::NAN } else { acc.max(n) }
            }))),
            Function::Min => Some(number_value(numbers().fold(f64::INFINITY, |acc, n| {
                if acc.is_nan() || n.is_nan() { f64::NAN } else { acc.min(n) }
            }))),
            Function::If => {
                let condition = args.first().and_then(Option::as_ref);
                let chosen = if condition.is_some_and(is_truthy) { 1 } else { 2 };
                args.get(chosen).cloned().flatten()
            }
        }
    }
}

/// `Number(arg)`, with `undefined` giving `NaN`.
fn arg_number(arg: Option<&Value>) -> f64 {
    arg.map(to_number).unwrap_or(f64::NAN)
}

fn nth_number(args: &[Option<Value>], index: usize) -> f64 {
    arg_number(args.get(index).and_then(Option::as_ref))
}

/// JavaScript `Number(value)`.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => parse_number(s),
        Value::Array(items) => match items.as_slice() {
            [] => 0.0,
            [single] => parse_number(&join_text(single)),
            _ => f64::NAN,
        },
        Value::Object(_) => f64::NAN,
    }
}

fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim();
    match trimmed {
        "" => 0.0,
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed
            .chars()
            .any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') =>
        {
            f64::NAN
        }
        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
    }
}

/// Text of a value as `Array.prototype.join` renders it.
pub fn join_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                n.to_string()
            } else {
                format_number(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(join_text).collect::<Vec<_>>().join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i128)
    } else {
        n.to_string()
    }
}

/// JavaScript truthiness.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Numeric result as JSON; non-finite values become `null` like `JSON.stringify`.
pub fn number_value(n: f64) -> Value {
    if !n.is_finite() {
        Value::Null
    } else if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Binds call names to functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionRegistry {
    functions: IndexMap<String, Function>,
}

impl FunctionRegistry {
    /// A registry holding every built-in under its default name.
    pub fn builtin() -> Self {
        let functions = Function::ALL
            .iter()
            .map(|f| (f.default_name().to_string(), *f))
            .collect();
        Self { functions }
    }

    /// Bind `name` to `function`, replacing any previous binding.
    pub fn register(&mut self, name: &str, function: Function) -> RegistryResult<()> {
        if name == ENUM_CALL {
            return Err(RegistryError::Reserved);
        }
        if !is_valid_call_name(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        self.functions.insert(name.to_string(), function);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Function> {
        self.functions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Built-ins extended with the bindings of a JSON object such as
    /// `{"$SUM": "add", "$CONCAT": "join"}`.
    pub fn from_json(json: &str) -> RegistryResult<Self> {
        let entries: IndexMap<String, Value> = serde_json::from_str(json)?;
        let mut registry = Self::builtin();
        for (name, tag) in entries {
            let function = serde_json::from_value::<Function>(tag.clone())
                .map_err(|_| RegistryError::UnknownOperation(tag.to_string()))?;
            registry.register(&name, function)?;
        }
        Ok(registry)
    }

    /// Load a registry file, see [`FunctionRegistry::from_json`].
    pub fn load(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Markdown table of the registered functions.
    pub fn describe(&self) -> String {
        let mut out = String::from("Available functions:\n\n| Call | Description |\n|------|-------------|\n");
        for (name, function) in &self.functions {
            out.push_str(&format!("| {}(...) | {} |\n", name, function.description()));
        }
        out.push_str(&format!(
            "| {}(index) | Entry of the rule's enumeration table at `index` |\n",
            ENUM_CALL
        ));
        out
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(values: &[Value]) -> Vec<Option<Value>> {
        values.iter().cloned().map(Some).collect()
    }

    #[test]
    fn test_add_coerces_like_number() {
        let f = Function::Add;
        assert_eq!(f.apply(&args(&[json!(1), json!("2"), json!(null)])), Some(json!(3)));
        assert_eq!(f.apply(&args(&[json!(1.5), json!(true)])), Some(json!(2.5)));
        assert_eq!(f.apply(&args(&[json!("abc"), json!(1)])), Some(Value::Null));
        assert_eq!(f.apply(&[]), Some(json!(0)));
    }

    #[test]
    fn test_undefined_argument_is_nan() {
        // A missing key is NaN, not 0 like null.
        assert_eq!(Function::Add.apply(&[None, Some(json!(1))]), Some(Value::Null));
        assert_eq!(Function::Add.apply(&[Some(json!(null)), Some(json!(1))]), Some(json!(1)));
        assert_eq!(Function::Max.apply(&[None]), Some(Value::Null));
        assert_eq!(Function::Max.apply(&[Some(json!(null)), Some(json!(-2))]), Some(json!(0)));
        assert_eq!(Function::Multiply.apply(&[Some(json!(2)), None]), Some(Value::Null));
        assert_eq!(Function::Average.apply(&[Some(json!(4)), None]), Some(Value::Null));
    }

    #[test]
    fn test_multiply_subtract_divide() {
        assert_eq!(Function::Multiply.apply(&args(&[json!(2), json!(3), json!("4")])), Some(json!(24)));
        assert_eq!(Function::Subtract.apply(&args(&[json!(10), json!(4)])), Some(json!(6)));
        assert_eq!(Function::Subtract.apply(&args(&[json!(10)])), Some(Value::Null));
        assert_eq!(Function::Divide.apply(&args(&[json!(7), json!(2)])), Some(json!(3.5)));
        assert_eq!(Function::Divide.apply(&args(&[json!(1), json!(0)])), Some(Value::Null));
    }

    #[test]
    fn test_join() {
        let joined = Function::Join.apply(&args(&[json!("Ann"), json!(" "), json!(null), json!(7), json!(["a", "b"])]));
        assert_eq!(joined, Some(json!("Ann 7a,b")));
        assert_eq!(Function::Join.apply(&args(&[json!(2.0)])), Some(json!("2")));
        assert_eq!(Function::Join.apply(&[Some(json!("a")), None, Some(json!("b"))]), Some(json!("ab")));
    }

    #[test]
    fn test_average_max_min() {
        assert_eq!(Function::Average.apply(&args(&[json!(1), json!(2), json!(6)])), Some(json!(3)));
        assert_eq!(Function::Average.apply(&[]), Some(Value::Null));
        assert_eq!(Function::Max.apply(&args(&[json!(3), json!("9"), json!(-1)])), Some(json!(9)));
        assert_eq!(Function::Min.apply(&args(&[json!(3), json!(9), json!(-1)])), Some(json!(-1)));
        assert_eq!(Function::Max.apply(&[]), Some(Value::Null));
        assert_eq!(Function::Min.apply(&args(&[json!(1), json!("x")])), Some(Value::Null));
    }

    #[test]
    fn test_if_uses_truthiness() {
        let f = Function::If;
        assert_eq!(f.apply(&args(&[json!(1), json!("yes"), json!("no")])), Some(json!("yes")));
        assert_eq!(f.apply(&args(&[json!(""), json!("yes"), json!("no")])), Some(json!("no")));
        assert_eq!(f.apply(&args(&[json!(0), json!("yes"), json!("no")])), Some(json!("no")));
        assert_eq!(f.apply(&args(&[json!([]), json!("yes")])), Some(json!("yes")));
    }

    #[test]
    fn test_if_passes_undefined_through() {
        let f = Function::If;
        assert_eq!(f.apply(&args(&[json!(false), json!("yes")])), None);
        assert_eq!(f.apply(&[Some(json!(true)), None, Some(json!(1))]), None);
        assert_eq!(f.apply(&[None, Some(json!("yes")), Some(json!("no"))]), Some(json!("no")));
        assert_eq!(f.apply(&args(&[json!(true), json!(null)])), Some(Value::Null));
    }

    #[test]
    fn test_builtin_registry() {
        let registry = FunctionRegistry::builtin();
        assert_eq!(registry.len(), Function::ALL.len());
        assert_eq!(registry.get("$ADD"), Some(Function::Add));
        assert!(!registry.contains(ENUM_CALL));
    }

    #[test]
    fn test_register_rejects_reserved_and_invalid() {
        let mut registry = FunctionRegistry::builtin();
        assert!(matches!(registry.register("$ENUM", Function::Add), Err(RegistryError::Reserved)));
        assert!(matches!(registry.register("SUM", Function::Add), Err(RegistryError::InvalidName(_))));
        assert!(registry.register("$SUM", Function::Add).is_ok());
        assert_eq!(registry.get("$SUM"), Some(Function::Add));
    }

    #[test]
    fn test_registry_from_json() {
        let registry = FunctionRegistry::from_json(r#"{"$SUM": "add", "$CONCAT": "join"}"#).unwrap();
        assert_eq!(registry.get("$SUM"), Some(Function::Add));
        assert_eq!(registry.get("$CONCAT"), Some(Function::Join));
        assert!(registry.contains("$MAX"));

        let err = FunctionRegistry::from_json(r#"{"$X": "explode"}"#).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownOperation(_)));
    }

    #[test]
    fn test_describe_lists_enum() {
        let text = FunctionRegistry::builtin().describe();
        assert!(text.contains("$JOIN(...)"));
        assert!(text.contains("$ENUM(index)"));
    }
}
