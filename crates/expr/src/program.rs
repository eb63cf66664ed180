//! Compilation: parse, validate against the environment surface, and
//! pre-compile literal regex patterns.

use std::collections::HashMap;
use std::sync::Mutex;

use regex::Regex;
use serde_json::Value;

use crate::ast::Expr;
use crate::error::ExprError;
use crate::eval::{contains_value, eval, truthy, type_name};
use crate::parser::parse;

/// Helper functions callable from expressions, with fixed arity.
const HELPER_ARITY: &[(&str, usize)] = &[("len", 1), ("contains", 2), ("matches", 2)];

/// The evaluation environment: named JSON roots.
#[derive(Debug, Clone, Default)]
pub struct Env {
    roots: HashMap<String, Value>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.roots.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.roots.get(name)
    }

    pub fn root_names(&self) -> impl Iterator<Item = &str> {
        self.roots.keys().map(String::as_str)
    }
}

/// Regex helper state: literal patterns compile once at program build,
/// dynamic patterns compile on first use and are cached.
pub(crate) struct Helpers {
    regex_cache: Mutex<HashMap<String, Regex>>,
}

impl Helpers {
    fn new() -> Self {
        Self {
            regex_cache: Mutex::new(HashMap::new()),
        }
    }

    fn precompile(&self, pattern: &str) -> Result<(), ExprError> {
        let mut cache = self.regex_cache.lock().expect("regex cache poisoned");
        if !cache.contains_key(pattern) {
            let re = Regex::new(pattern).map_err(|e| ExprError::Regex {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;
            cache.insert(pattern.to_string(), re);
        }
        Ok(())
    }

    fn is_match(&self, text: &str, pattern: &str) -> Result<bool, ExprError> {
        let mut cache = self.regex_cache.lock().expect("regex cache poisoned");
        if let Some(re) = cache.get(pattern) {
            return Ok(re.is_match(text));
        }
        let re = Regex::new(pattern).map_err(|e| ExprError::Regex {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        let matched = re.is_match(text);
        cache.insert(pattern.to_string(), re);
        Ok(matched)
    }

    pub(crate) fn call(&self, name: &str, args: &[Value]) -> Result<Value, ExprError> {
        match name {
            "len" => match &args[0] {
                Value::String(s) => Ok(Value::from(s.chars().count() as i64)),
                Value::Array(a) => Ok(Value::from(a.len() as i64)),
                Value::Object(m) => Ok(Value::from(m.len() as i64)),
                Value::Null => Ok(Value::from(0)),
                other => Err(ExprError::Type(format!(
                    "len() expects string, array, or object, got {}",
                    type_name(other)
                ))),
            },
            "contains" => contains_value(&args[0], &args[1]).map(Value::Bool),
            "matches" => {
                let text = match &args[0] {
                    Value::String(s) => s.as_str(),
                    Value::Null => return Ok(Value::Bool(false)),
                    other => {
                        return Err(ExprError::Type(format!(
                            "matches() expects a string, got {}",
                            type_name(other)
                        )))
                    }
                };
                let pattern = match &args[1] {
                    Value::String(p) => p.as_str(),
                    other => {
                        return Err(ExprError::Type(format!(
                            "matches() pattern must be a string, got {}",
                            type_name(other)
                        )))
                    }
                };
                self.is_match(text, pattern).map(Value::Bool)
            }
            other => Err(ExprError::UnknownFunction(other.to_string())),
        }
    }
}

/// A compiled condition, ready for repeated evaluation.
pub struct Program {
    source: String,
    expr: Expr,
    helpers: Helpers,
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program").field("source", &self.source).finish()
    }
}

impl Program {
    /// The original expression text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against an environment, returning the raw JSON result.
    pub fn eval(&self, env: &Env) -> Result<Value, ExprError> {
        eval(&self.expr, env, &self.helpers)
    }

    /// Evaluate and require a boolean outcome.
    ///
    /// Rule conditions must decide. Anything other than an actual
    /// `bool` is a type error, never a silent coercion.
    pub fn eval_bool(&self, env: &Env) -> Result<bool, ExprError> {
        match self.eval(env)? {
            Value::Bool(b) => Ok(b),
            other => Err(ExprError::Type(format!(
                "condition produced {} instead of a boolean",
                type_name(&other)
            ))),
        }
    }

    /// Truthiness-based evaluation, for callers that opt into coercion.
    pub fn eval_truthy(&self, env: &Env) -> Result<bool, ExprError> {
        Ok(truthy(&self.eval(env)?))
    }
}

/// Compile a condition against the declared environment surface.
///
/// `allowed_roots` lists the identifier roots expressions may reference
/// (e.g. `event`, `timestamp`, `now`). Anything else is rejected here,
/// not at evaluation time.
pub fn compile(source: &str, allowed_roots: &[&str]) -> Result<Program, ExprError> {
    let expr = parse(source)?;
    let helpers = Helpers::new();

    let mut validation: Result<(), ExprError> = Ok(());
    expr.walk(&mut |node| {
        if validation.is_err() {
            return;
        }
        match node {
            Expr::Ident { name, .. } => {
                if !allowed_roots.contains(&name.as_str()) {
                    validation = Err(ExprError::UnknownIdentifier(name.clone()));
                }
            }
            Expr::Call { name, args, .. } => {
                match HELPER_ARITY.iter().find(|(n, _)| n == name) {
                    None => validation = Err(ExprError::UnknownFunction(name.clone())),
                    Some((_, arity)) => {
                        if args.len() != *arity {
                            validation = Err(ExprError::Arity {
                                name: name.clone(),
                                expected: *arity,
                                got: args.len(),
                            });
                        } else if name == "matches" {
                            // Literal patterns compile now so bad regexes
                            // fail the rule at load, not per event.
                            if let Some(Expr::Str(pattern)) = args.get(1) {
                                if let Err(e) = helpers.precompile(pattern) {
                                    validation = Err(e);
                                }
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    });
    validation?;

    Ok(Program {
        source: source.to_string(),
        expr,
        helpers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ROOTS: &[&str] = &["event", "timestamp", "metadata", "now", "today", "yesterday"];

    fn env_with_event(event: Value) -> Env {
        let mut env = Env::new();
        env.insert("event", event);
        env
    }

    #[test]
    fn amount_threshold() {
        let program = compile("event.amount > 10000", ROOTS).unwrap();
        let env = env_with_event(json!({"amount": 15000}));
        assert!(program.eval_bool(&env).unwrap());

        let env = env_with_event(json!({"amount": 500}));
        assert!(!program.eval_bool(&env).unwrap());
    }

    #[test]
    fn combined_condition_from_the_field() {
        let program = compile(
            r#"event.amount > 10000 and contains(event.tags, "cross_border")"#,
            ROOTS,
        )
        .unwrap();
        let env = env_with_event(json!({
            "amount": 20000,
            "tags": ["cross_border", "wire"],
        }));
        assert!(program.eval_bool(&env).unwrap());

        let env = env_with_event(json!({"amount": 20000, "tags": ["domestic"]}));
        assert!(!program.eval_bool(&env).unwrap());
    }

    #[test]
    fn missing_fields_are_null_and_compare_false() {
        let program = compile("event.amount > 100", ROOTS).unwrap();
        let env = env_with_event(json!({}));
        assert!(!program.eval_bool(&env).unwrap());
    }

    #[test]
    fn null_equality() {
        let program = compile("event.missing == null", ROOTS).unwrap();
        let env = env_with_event(json!({}));
        assert!(program.eval_bool(&env).unwrap());
    }

    #[test]
    fn in_operator() {
        let program = compile(r#"event.country in ["KP", "IR", "SY"]"#, ROOTS).unwrap();
        let env = env_with_event(json!({"country": "IR"}));
        assert!(program.eval_bool(&env).unwrap());

        let env = env_with_event(json!({"country": "DE"}));
        assert!(!program.eval_bool(&env).unwrap());
    }

    #[test]
    fn matches_helper_with_literal_pattern() {
        let program = compile(r#"matches(event.iban, "^DE[0-9]+$")"#, ROOTS).unwrap();
        let env = env_with_event(json!({"iban": "DE4412345"}));
        assert!(program.eval_bool(&env).unwrap());

        let env = env_with_event(json!({"iban": "FR7612345"}));
        assert!(!program.eval_bool(&env).unwrap());
    }

    #[test]
    fn bad_literal_regex_fails_compile() {
        let err = compile(r#"matches(event.x, "(unclosed")"#, ROOTS).unwrap_err();
        assert!(matches!(err, ExprError::Regex { .. }));
    }

    #[test]
    fn undeclared_root_rejected() {
        let err = compile("secrets.api_key == \"x\"", ROOTS).unwrap_err();
        assert_eq!(err, ExprError::UnknownIdentifier("secrets".to_string()));
    }

    #[test]
    fn unknown_function_rejected() {
        let err = compile("exec(event)", ROOTS).unwrap_err();
        assert_eq!(err, ExprError::UnknownFunction("exec".to_string()));
    }

    #[test]
    fn arity_checked() {
        let err = compile("len(event, 2)", ROOTS).unwrap_err();
        assert!(matches!(err, ExprError::Arity { .. }));
    }

    #[test]
    fn non_boolean_result_is_an_error() {
        let program = compile("event.amount + 1", ROOTS).unwrap();
        let env = env_with_event(json!({"amount": 5}));
        assert!(program.eval_bool(&env).is_err());
        // Truthy evaluation still works for callers that want it.
        assert!(program.eval_truthy(&env).unwrap());
    }

    #[test]
    fn arithmetic_and_modulo() {
        let program = compile("event.a * 2 + 1 == 7 and event.a % 2 == 1", ROOTS).unwrap();
        let env = env_with_event(json!({"a": 3}));
        assert!(program.eval_bool(&env).unwrap());
    }

    #[test]
    fn division_by_zero_is_runtime_error() {
        let program = compile("10 / event.divisor > 1", ROOTS).unwrap();
        let env = env_with_event(json!({"divisor": 0}));
        assert!(program.eval(&env).is_err());
    }

    #[test]
    fn string_ops() {
        let program = compile(
            r#"len(event.name) >= 3 and event.prefix + "x" == "abx""#,
            ROOTS,
        )
        .unwrap();
        let env = env_with_event(json!({"name": "abc", "prefix": "ab"}));
        assert!(program.eval_bool(&env).unwrap());
    }

    #[test]
    fn index_access() {
        let program = compile(r#"event.entities[0] == "acc-1""#, ROOTS).unwrap();
        let env = env_with_event(json!({"entities": ["acc-1", "acc-2"]}));
        assert!(program.eval_bool(&env).unwrap());
    }

    #[test]
    fn non_ascii_strings() {
        let program = compile(r#"contains(event.note, "Überweisung")"#, ROOTS).unwrap();
        let env = env_with_event(json!({"note": "Eilige Überweisung nach Zürich"}));
        assert!(program.eval_bool(&env).unwrap());
        let program = compile("len(event.emoji) == 2", ROOTS).unwrap();
        let env = env_with_event(json!({"emoji": "🚨⚠"}));
        assert!(program.eval_bool(&env).unwrap());
    }
}
