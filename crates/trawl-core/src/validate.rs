use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;

use crate::error::AppError;

/// Structural category of extracted data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    String,
    Number,
    Integer,
    Float,
    Boolean,
    Array,
    Object,
    Null,
    /// No data at all (a script that completed without a value).
    Undefined,
    Any,
}

struct Category {
    name: &'static str,
    shape: Shape,
    matches: fn(Option<&Value>) -> bool,
}

/// Adding a category is a row here plus a `Shape` variant.
const CATEGORIES: &[Category] = &[
    Category { name: "string", shape: Shape::String, matches: is_string },
    Category { name: "number", shape: Shape::Number, matches: is_number },
    Category { name: "integer", shape: Shape::Integer, matches: is_integer },
    Category { name: "float", shape: Shape::Float, matches: is_float },
    Category { name: "boolean", shape: Shape::Boolean, matches: is_boolean },
    Category { name: "array", shape: Shape::Array, matches: is_array },
    Category { name: "object", shape: Shape::Object, matches: is_object },
    Category { name: "null", shape: Shape::Null, matches: is_null },
    Category { name: "undefined", shape: Shape::Undefined, matches: is_undefined },
    Category { name: "any", shape: Shape::Any, matches: is_any },
];

fn is_string(v: Option<&Value>) -> bool {
    matches!(v, Some(Value::String(_)))
}

fn is_number(v: Option<&Value>) -> bool {
    matches!(v, Some(Value::Number(_)))
}

fn is_integer(v: Option<&Value>) -> bool {
    matches!(v, Some(Value::Number(n)) if n.is_i64() || n.is_u64())
}

fn is_float(v: Option<&Value>) -> bool {
    matches!(v, Some(Value::Number(n)) if n.is_f64())
}

fn is_boolean(v: Option<&Value>) -> bool {
    matches!(v, Some(Value::Bool(_)))
}

fn is_array(v: Option<&Value>) -> bool {
    matches!(v, Some(Value::Array(_)))
}

fn is_object(v: Option<&Value>) -> bool {
    matches!(v, Some(Value::Object(_)))
}

fn is_null(v: Option<&Value>) -> bool {
    matches!(v, Some(Value::Null))
}

fn is_undefined(v: Option<&Value>) -> bool {
    v.is_none()
}

fn is_any(_: Option<&Value>) -> bool {
    true
}

fn category(shape: Shape) -> &'static Category {
    CATEGORIES
        .iter()
        .find(|c| c.shape == shape)
        .unwrap_or(&CATEGORIES[CATEGORIES.len() - 1])
}

impl Shape {
    pub fn name(&self) -> &'static str {
        category(*self).name
    }

    pub fn matches(&self, data: Option<&Value>) -> bool {
        (category(*self).matches)(data)
    }
}

/// `|`-separated list of shapes; data passes if it matches any of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeExpr {
    shapes: Vec<Shape>,
}

impl TypeExpr {
    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn matches(&self, data: Option<&Value>) -> bool {
        self.shapes.iter().any(|shape| shape.matches(data))
    }
}

impl FromStr for TypeExpr {
    type Err = AppError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let shapes = expr
            .split('|')
            .map(|part| {
                let name = part.trim().to_ascii_lowercase();
                CATEGORIES
                    .iter()
                    .find(|c| c.name == name)
                    .map(|c| c.shape)
                    .ok_or_else(|| {
                        AppError::TypeExpression(format!("unknown type '{}' in '{expr}'", part.trim()))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { shapes })
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.shapes.iter().map(Shape::name).collect();
        write!(f, "{}", names.join("|"))
    }
}

type PredicateFn = dyn Fn(Option<&Value>) -> bool + Send + Sync;

/// Check applied to extracted data before a job counts as successful.
#[derive(Clone)]
pub enum Validation {
    Predicate(Arc<PredicateFn>),
    Types(TypeExpr),
    Schema(Arc<jsonschema::Validator>),
}

impl fmt::Debug for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validation::Predicate(_) => f.write_str("Validation::Predicate"),
            Validation::Types(expr) => write!(f, "Validation::Types({expr})"),
            Validation::Schema(_) => f.write_str("Validation::Schema"),
        }
    }
}

impl Validation {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(Option<&Value>) -> bool + Send + Sync + 'static,
    {
        Validation::Predicate(Arc::new(f))
    }

    /// Parse a type expression such as `"array|object"`.
    pub fn types(expr: &str) -> Result<Self, AppError> {
        Ok(Validation::Types(expr.parse()?))
    }

    /// Compile a JSON Schema.
    pub fn schema(schema: &Value) -> Result<Self, AppError> {
        let validator =
            jsonschema::validator_for(schema).map_err(|e| AppError::SchemaError(e.to_string()))?;
        Ok(Validation::Schema(Arc::new(validator)))
    }

    /// Returns true if `data` passes. A panicking predicate fails validation.
    pub fn validate(&self, data: Option<&Value>) -> bool {
        match self {
            Validation::Predicate(f) => catch_unwind(AssertUnwindSafe(|| f(data))).unwrap_or(false),
            Validation::Types(expr) => expr.matches(data),
            Validation::Schema(validator) => data.is_some_and(|d| validator.is_valid(d)),
        }
    }
}
