use std::f64::consts::{E, PI, TAU};

use rhai::{Dynamic, Engine, Scope, AST};
use serde::{Deserialize, Serialize};

use crate::{Result, SpectraError};

/// Single-argument math functions callable with either number type. `log`
/// is the natural logarithm, as in common calculator syntax.
const UNARY_FUNCTIONS: [(&str, fn(f64) -> f64); 16] = [
    ("sin", f64::sin),
    ("cos", f64::cos),
    ("tan", f64::tan),
    ("asin", f64::asin),
    ("acos", f64::acos),
    ("atan", f64::atan),
    ("sinh", f64::sinh),
    ("cosh", f64::cosh),
    ("tanh", f64::tanh),
    ("sqrt", f64::sqrt),
    ("cbrt", f64::cbrt),
    ("exp", f64::exp),
    ("log", f64::ln),
    ("ln", f64::ln),
    ("log10", f64::log10),
    ("log2", f64::log2),
];

/// Named constants visible to every expression.
const CONSTANTS: [(&str, f64); 5] = [
    ("pi", PI),
    ("PI", PI),
    ("e", E),
    ("E", E),
    ("tau", TAU),
];

/// Builds the engine shared by every expression automation. Scripts are plain
/// expressions over `t`, so the operation budget stays small.
///
/// Arithmetic follows calculator rules rather than integer rules: `/` between
/// integers yields a float and `^` is exponentiation.
pub(crate) fn expression_engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_max_operations(10_000);
    engine.set_max_expr_depths(64, 32);
    engine.set_fast_operators(false);

    engine.register_fn("/", |a: i64, b: i64| a as f64 / b as f64);
    engine.register_fn("**", |a: f64, b: f64| a.powf(b));
    engine.register_fn("**", |a: f64, b: i64| a.powf(b as f64));
    engine.register_fn("**", |a: i64, b: f64| (a as f64).powf(b));
    engine.register_fn("**", |a: i64, b: i64| (a as f64).powf(b as f64));
    engine.register_fn("pow", |a: f64, b: f64| a.powf(b));
    engine.register_fn("pow", |a: f64, b: i64| a.powf(b as f64));
    engine.register_fn("pow", |a: i64, b: f64| (a as f64).powf(b));
    engine.register_fn("pow", |a: i64, b: i64| (a as f64).powf(b as f64));

    for (name, function) in UNARY_FUNCTIONS {
        engine.register_fn(name, move |x: f64| function(x));
        engine.register_fn(name, move |x: i64| function(x as f64));
    }
    engine
}

/// `^` binds tighter than `*` in calculator syntax, which matches the
/// engine's `**`.
fn to_script(expression: &str) -> String {
    expression.replace('^', "**")
}

/// User supplied formula evaluated with `t` bound to the current time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MathExpression {
    input_string: String,
    #[serde(skip)]
    compiled: Option<AST>,
    #[serde(skip)]
    compile_error: Option<String>,
}

impl Default for MathExpression {
    fn default() -> Self {
        Self::new("sin(t)")
    }
}

impl PartialEq for MathExpression {
    fn eq(&self, other: &Self) -> bool {
        self.input_string == other.input_string
    }
}

impl MathExpression {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            input_string: expression.into(),
            compiled: None,
            compile_error: None,
        }
    }

    pub fn expression(&self) -> &str {
        &self.input_string
    }

    /// Replaces the formula; it is recompiled on the next evaluation.
    pub fn set_expression(&mut self, expression: impl Into<String>) {
        self.input_string = expression.into();
        self.compiled = None;
        self.compile_error = None;
    }

    pub fn evaluate(&mut self, engine: &Engine, time: f64) -> Result<f64> {
        if let Some(err) = &self.compile_error {
            return Err(SpectraError::config(err.clone()));
        }

        if self.compiled.is_none() {
            match engine.compile_expression(to_script(&self.input_string)) {
                Ok(ast) => self.compiled = Some(ast),
                Err(err) => {
                    let message = format!("cannot parse `{}`: {err}", self.input_string);
                    self.compile_error = Some(message.clone());
                    return Err(SpectraError::config(message));
                }
            }
        }

        let Some(ast) = &self.compiled else {
            return Err(SpectraError::config("expression was not compiled"));
        };

        let mut scope = Scope::new();
        for (name, value) in CONSTANTS {
            scope.push_constant(name, value);
        }
        scope.push("t", time);
        let result: Dynamic = engine
            .eval_ast_with_scope(&mut scope, ast)
            .map_err(|err| SpectraError::config(format!("`{}`: {err}", self.input_string)))?;

        let value = result
            .as_float()
            .ok()
            .or_else(|| result.as_int().ok().map(|v| v as f64))
            .ok_or_else(|| {
                SpectraError::config(format!(
                    "`{}` produced a non-numeric {}",
                    self.input_string,
                    result.type_name()
                ))
            })?;

        if value.is_finite() {
            Ok(value)
        } else {
            Err(SpectraError::config(format!(
                "`{}` produced a non-finite value",
                self.input_string
            )))
        }
    }
}
