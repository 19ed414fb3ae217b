//! Typed filter predicates.
//!
//! Filters are built from [`Field`] references instead of strings spliced into
//! an expression. The same predicate list is compiled into a placeholder-based
//! filter expression for DynamoDB ([`compile_filter`]) and evaluated directly
//! by the in-memory store ([`Predicate::matches`]). A list of predicates is a
//! conjunction.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::Value;

use super::item::Item;

/// A reference to an item attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field(Cow<'static, str>);

impl Field {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn equals(self, value: impl Into<Value>) -> Predicate {
        self.compare(Comparator::Eq, value)
    }

    pub fn not_equals(self, value: impl Into<Value>) -> Predicate {
        self.compare(Comparator::Ne, value)
    }

    pub fn less_than(self, value: impl Into<Value>) -> Predicate {
        self.compare(Comparator::Lt, value)
    }

    pub fn less_or_equal(self, value: impl Into<Value>) -> Predicate {
        self.compare(Comparator::Le, value)
    }

    pub fn greater_than(self, value: impl Into<Value>) -> Predicate {
        self.compare(Comparator::Gt, value)
    }

    pub fn greater_or_equal(self, value: impl Into<Value>) -> Predicate {
        self.compare(Comparator::Ge, value)
    }

    pub fn contains(self, value: impl Into<Value>) -> Predicate {
        Predicate::Contains {
            field: self,
            value: value.into(),
        }
    }

    pub fn begins_with(self, prefix: impl Into<String>) -> Predicate {
        Predicate::BeginsWith {
            field: self,
            prefix: prefix.into(),
        }
    }

    pub fn exists(self) -> Predicate {
        Predicate::Exists(self)
    }

    pub fn not_exists(self) -> Predicate {
        Predicate::NotExists(self)
    }

    /// Matches when the attribute equals any of `values`.
    ///
    /// An empty set places no constraint.
    pub fn one_of<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Predicate {
        Predicate::In {
            field: self,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    fn compare(self, op: Comparator, value: impl Into<Value>) -> Predicate {
        Predicate::Compare {
            field: self,
            op,
            value: value.into(),
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Eq => "=",
            Comparator::Ne => "<>",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
        }
    }
}

/// A single filter condition over one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        field: Field,
        op: Comparator,
        value: Value,
    },
    /// Substring match on strings, membership on lists.
    Contains {
        field: Field,
        value: Value,
    },
    BeginsWith {
        field: Field,
        prefix: String,
    },
    Exists(Field),
    NotExists(Field),
    In {
        field: Field,
        values: Vec<Value>,
    },
    /// Disjunction. An empty disjunction places no constraint.
    AnyOf(Vec<Predicate>),
}

impl Predicate {
    pub fn any_of(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::AnyOf(predicates.into_iter().collect())
    }

    /// Evaluate the predicate against an item.
    ///
    /// A comparison against a missing attribute is false, except `<>` which
    /// is true.
    pub fn matches(&self, item: &Item) -> bool {
        match self {
            Predicate::Compare { field, op, value } => match item.get(field.name()) {
                Some(actual) => compare(actual, *op, value),
                None => *op == Comparator::Ne,
            },
            Predicate::Contains { field, value } => match (item.get(field.name()), value) {
                (Some(Value::String(haystack)), Value::String(needle)) => {
                    haystack.contains(needle.as_str())
                }
                (Some(Value::Array(values)), needle) => values.contains(needle),
                _ => false,
            },
            Predicate::BeginsWith { field, prefix } => item
                .get(field.name())
                .and_then(Value::as_str)
                .is_some_and(|s| s.starts_with(prefix.as_str())),
            Predicate::Exists(field) => item.contains_key(field.name()),
            Predicate::NotExists(field) => !item.contains_key(field.name()),
            Predicate::In { field, values } => {
                values.is_empty()
                    || item
                        .get(field.name())
                        .is_some_and(|actual| values.iter().any(|v| v == actual))
            }
            Predicate::AnyOf(predicates) => {
                predicates.is_empty() || predicates.iter().any(|p| p.matches(item))
            }
        }
    }

    fn is_unconstrained(&self) -> bool {
        match self {
            Predicate::In { values, .. } => values.is_empty(),
            Predicate::AnyOf(predicates) => {
                predicates.is_empty() || predicates.iter().any(Predicate::is_unconstrained)
            }
            _ => false,
        }
    }
}

/// True when every predicate matches the item.
pub fn matches_all(predicates: &[Predicate], item: &Item) -> bool {
    predicates.iter().all(|p| p.matches(item))
}

fn compare(actual: &Value, op: Comparator, expected: &Value) -> bool {
    let ordering = match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (a, b) if a == b => Some(Ordering::Equal),
        _ => None,
    };

    match (op, ordering) {
        (Comparator::Eq, ord) => ord == Some(Ordering::Equal),
        (Comparator::Ne, ord) => ord != Some(Ordering::Equal),
        (Comparator::Lt, Some(ord)) => ord == Ordering::Less,
        (Comparator::Le, Some(ord)) => ord != Ordering::Greater,
        (Comparator::Gt, Some(ord)) => ord == Ordering::Greater,
        (Comparator::Ge, Some(ord)) => ord != Ordering::Less,
        (_, None) => false,
    }
}

/// A filter expression with its placeholder maps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterExpression {
    pub expression: String,
    /// `#fN` -> attribute name.
    pub names: BTreeMap<String, String>,
    /// `:fN` -> value.
    pub values: BTreeMap<String, Value>,
}

impl FilterExpression {
    fn name_placeholder(&mut self, field: &Field) -> String {
        if let Some((placeholder, _)) = self.names.iter().find(|(_, name)| *name == field.name()) {
            return placeholder.clone();
        }
        let placeholder = format!("#f{}", self.names.len());
        self.names
            .insert(placeholder.clone(), field.name().to_string());
        placeholder
    }

    fn value_placeholder(&mut self, value: &Value) -> String {
        let placeholder = format!(":f{}", self.values.len());
        self.values.insert(placeholder.clone(), value.clone());
        placeholder
    }

    fn render(&mut self, predicate: &Predicate) -> String {
        match predicate {
            Predicate::Compare { field, op, value } => {
                let name = self.name_placeholder(field);
                let value = self.value_placeholder(value);
                format!("{name} {} {value}", op.symbol())
            }
            Predicate::Contains { field, value } => {
                let name = self.name_placeholder(field);
                let value = self.value_placeholder(value);
                format!("contains({name}, {value})")
            }
            Predicate::BeginsWith { field, prefix } => {
                let name = self.name_placeholder(field);
                let value = self.value_placeholder(&Value::String(prefix.clone()));
                format!("begins_with({name}, {value})")
            }
            Predicate::Exists(field) => {
                format!("attribute_exists({})", self.name_placeholder(field))
            }
            Predicate::NotExists(field) => {
                format!("attribute_not_exists({})", self.name_placeholder(field))
            }
            Predicate::In { field, values } => {
                let name = self.name_placeholder(field);
                let placeholders: Vec<String> =
                    values.iter().map(|v| self.value_placeholder(v)).collect();
                format!("{name} IN ({})", placeholders.join(", "))
            }
            Predicate::AnyOf(predicates) => {
                let parts: Vec<String> = predicates.iter().map(|p| self.render(p)).collect();
                format!("({})", parts.join(" OR "))
            }
        }
    }
}

/// Compile a conjunction of predicates into a filter expression.
///
/// Returns `None` when nothing constrains the result.
pub fn compile_filter(predicates: &[Predicate]) -> Option<FilterExpression> {
    let mut filter = FilterExpression::default();
    let parts: Vec<String> = predicates
        .iter()
        .filter(|p| !p.is_unconstrained())
        .map(|p| filter.render(p))
        .collect();

    if parts.is_empty() {
        return None;
    }
    filter.expression = parts.join(" AND ");
    Some(filter)
}
