//! The `<fes:Function>` registry.
//!
//! Functions are advertised in GetCapabilities and resolved during query
//! compilation, where the argument count is checked against the
//! registration. Projects register their own; a few string/number helpers
//! ship by default.

use meridian_core::error::{Result, WfsError};
use meridian_core::values::ScalarValue;
use std::collections::HashMap;
use std::sync::Arc;

type Evaluator = dyn Fn(&[ScalarValue]) -> Result<ScalarValue> + Send + Sync;

/// One registered function.
#[derive(Clone)]
pub struct FunctionDef {
    pub name: String,
    /// Argument type QNames, advertised in the capabilities document.
    pub argument_types: Vec<&'static str>,
    pub return_type: &'static str,
    evaluator: Arc<Evaluator>,
}

impl FunctionDef {
    pub fn arity(&self) -> usize {
        self.argument_types.len()
    }

    pub fn evaluate(&self, args: &[ScalarValue]) -> Result<ScalarValue> {
        (self.evaluator)(args)
    }
}

impl std::fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionDef")
            .field("name", &self.name)
            .field("argument_types", &self.argument_types)
            .finish()
    }
}

/// Registry of functions callable from filter expressions.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionDef>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the common helpers old clients expect.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("abs", &["xs:double"], "xs:double", |args| {
            match args[0].as_f64() {
                Some(v) => Ok(ScalarValue::Double(v.abs())),
                None => Err(invalid_argument("abs", &args[0])),
            }
        });
        registry.register("strToLowerCase", &["xs:string"], "xs:string", |args| {
            Ok(ScalarValue::String(args[0].to_string().to_lowercase()))
        });
        registry.register("strToUpperCase", &["xs:string"], "xs:string", |args| {
            Ok(ScalarValue::String(args[0].to_string().to_uppercase()))
        });
        registry.register("strLength", &["xs:string"], "xs:int", |args| {
            Ok(ScalarValue::Integer(args[0].to_string().chars().count() as i64))
        });
        registry
    }

    pub fn register(
        &mut self,
        name: &str,
        argument_types: &[&'static str],
        return_type: &'static str,
        evaluator: impl Fn(&[ScalarValue]) -> Result<ScalarValue> + Send + Sync + 'static,
    ) {
        self.functions.insert(
            name.to_string(),
            FunctionDef {
                name: name.to_string(),
                argument_types: argument_types.to_vec(),
                return_type,
                evaluator: Arc::new(evaluator),
            },
        );
    }

    pub fn resolve(&self, name: &str) -> Result<&FunctionDef> {
        self.functions.get(name).ok_or_else(|| {
            WfsError::invalid_parameter(format!("Unknown function: {name}"), "filter")
        })
    }

    /// Resolve and check the argument count.
    pub fn resolve_call(&self, name: &str, arg_count: usize) -> Result<&FunctionDef> {
        let def = self.resolve(name)?;
        if def.arity() != arg_count {
            return Err(WfsError::invalid_parameter(
                format!(
                    "Function '{name}' expects {} argument(s), got {arg_count}",
                    def.arity()
                ),
                "filter",
            ));
        }
        Ok(def)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionDef> {
        self.functions.values()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

fn invalid_argument(function: &str, value: &ScalarValue) -> WfsError {
    WfsError::invalid_parameter(
        format!("Invalid argument for function '{function}': {value}"),
        "filter",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_functions_evaluate() {
        let registry = FunctionRegistry::with_defaults();
        let abs = registry.resolve_call("abs", 1).unwrap();
        assert_eq!(
            abs.evaluate(&[ScalarValue::Double(-4.0)]).unwrap(),
            ScalarValue::Double(4.0)
        );
    }

    #[test]
    fn arity_is_checked() {
        let registry = FunctionRegistry::with_defaults();
        assert!(registry.resolve_call("abs", 2).is_err());
        assert!(registry.resolve_call("nope", 0).is_err());
    }
}
