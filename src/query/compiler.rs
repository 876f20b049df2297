use super::compiled::{Clause, CompiledQuery, NumericRange, Occurrence};
use super::fix::fix_query;
use super::fuzzy::FuzzyQueryBuilder;
use super::values;
use crate::error::{Result, SearchError};
use crate::index::fields::{DataType, FieldDefinition, FieldRegistry};
use crate::index::usage::FieldUsageTracker;
use crate::index::IndexHandle;
use crate::types::Condition;
use tantivy::query::QueryParser;

/// Translates a [`Condition`] tree into a [`CompiledQuery`].
///
/// AND children are required, OR children optional and NOT children
/// prohibited. Leaves are normalized per data type and then dispatched on
/// `(data type, operator)`; combinations without a rule contribute nothing.
pub struct QueryCompiler<'a> {
    index: &'a IndexHandle,
    registry: &'a dyn FieldRegistry,
    usage: Option<&'a FieldUsageTracker>,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(index: &'a IndexHandle, registry: &'a dyn FieldRegistry) -> Self {
        QueryCompiler {
            index,
            registry,
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: &'a FieldUsageTracker) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Compile `condition`. `required` decides whether the terms of a
    /// multi-token `contains` leaf must all match.
    pub fn compile(&self, condition: &Condition, required: bool) -> Result<Option<CompiledQuery>> {
        match condition {
            Condition::And { children } => self.combine(children, true, Occurrence::Must),
            Condition::Or { children } => self.combine(children, false, Occurrence::Should),
            // A clause cannot be required and prohibited at once.
            Condition::Not { children } => self.combine(children, false, Occurrence::MustNot),
            Condition::Condition {
                field,
                operator,
                value,
            } => self.compile_leaf(field, operator, value, required),
        }
    }

    fn combine(
        &self,
        children: &[Condition],
        required: bool,
        occurrence: Occurrence,
    ) -> Result<Option<CompiledQuery>> {
        let mut clauses = Vec::with_capacity(children.len());
        for child in children {
            if let Some(query) = self.compile(child, required)? {
                clauses.push(Clause::new(occurrence, query));
            }
        }
        if clauses.is_empty() {
            Ok(None)
        } else {
            Ok(Some(CompiledQuery::Boolean(clauses)))
        }
    }

    fn compile_leaf(
        &self,
        field: &str,
        operator: &str,
        value: &str,
        required: bool,
    ) -> Result<Option<CompiledQuery>> {
        let def = self
            .registry
            .get_def(field)
            .ok_or_else(|| SearchError::FieldNotFound(field.to_string()))?;
        if let Some(usage) = self.usage {
            usage.use_field(&def.name);
        }

        let operator = operator.trim().to_lowercase();
        let op = operator.as_str();
        let (data_type, value) = self.normalize(&def, op, value)?;
        let name = def.name.clone();

        let query = match (data_type, op) {
            (DataType::Text, "contains") => self.contains(name, &value, required),
            (DataType::Text | DataType::Identifier, "like") => Some(like(name, &value)),
            (DataType::Text, "phrase" | "=") => {
                let terms = self.index.analyzer().tokens(&value);
                if terms.is_empty() {
                    None
                } else {
                    Some(CompiledQuery::Phrase { field: name, terms })
                }
            }
            (DataType::Text, "fuzzy") => Some(FuzzyQueryBuilder::new(name, value).build()),
            (DataType::Text, "range") => {
                let mut tokens = self.index.analyzer().tokens(&value).into_iter();
                tokens.next().map(|lower| CompiledQuery::TermRange {
                    field: name,
                    lower: Some(lower),
                    upper: tokens.next(),
                    include_lower: true,
                    include_upper: true,
                })
            }
            (DataType::Date | DataType::Time | DataType::Timestamp, _) => {
                let number = values::to_numeric(&def.name, &value)?;
                Some(CompiledQuery::IntRange {
                    field: name,
                    range: numeric_range(op, number, i64::MIN, i64::MAX),
                })
            }
            (DataType::Identifier, "=") => Some(CompiledQuery::Term {
                field: name,
                text: value,
            }),
            (DataType::Boolean, _) => Some(CompiledQuery::Term {
                field: name,
                text: values::boolean_term(&value).to_string(),
            }),
            (DataType::Decimal, _) => {
                let number = values::parse_decimal(&def.name, &value)?;
                Some(CompiledQuery::FloatRange {
                    field: name,
                    range: numeric_range(op, number, f64::MIN, f64::MAX),
                })
            }
            (DataType::Integer, _) => {
                let number = values::parse_integer(&def.name, &value)?;
                Some(CompiledQuery::IntRange {
                    field: name,
                    range: numeric_range(op, number, i64::MIN, i64::MAX),
                })
            }
            (DataType::Text, "lucene") => Some(self.native(&def, &value)?),
            (DataType::Text | DataType::Identifier, "<" | "<=" | ">" | ">=") => {
                Some(term_range(name, op, value))
            }
            _ => {
                tracing::info!(
                    "Not supported, fieldtype: {} operator: {}",
                    def.data_type,
                    operator
                );
                None
            }
        };
        Ok(query)
    }

    /// Apply the per-type value rules; returns the type used for dispatch.
    fn normalize(
        &self,
        def: &FieldDefinition,
        operator: &str,
        value: &str,
    ) -> Result<(DataType, String)> {
        let normalized = match def.data_type {
            DataType::Date => (DataType::Date, values::normalize_date(&def.name, value)?),
            // The native grammar path is normalized by fix_query instead.
            DataType::Text | DataType::Name if operator == "lucene" => {
                (DataType::Text, value.to_string())
            }
            DataType::Text | DataType::Name => (DataType::Text, self.index.analyzer().fold(value)),
            DataType::Decimal => (DataType::Decimal, values::normalize_decimal(value)),
            DataType::Index => (DataType::Identifier, self.index.analyzer().fold(value)),
            other => (other, value.to_string()),
        };
        Ok(normalized)
    }

    fn contains(&self, field: String, value: &str, required: bool) -> Option<CompiledQuery> {
        let mut tokens = self.index.analyzer().tokens(value);
        match tokens.len() {
            0 => None,
            1 => tokens.pop().map(|text| CompiledQuery::Term { field, text }),
            _ => {
                let occurrence = if required {
                    Occurrence::Must
                } else {
                    Occurrence::Should
                };
                let clauses = tokens
                    .into_iter()
                    .map(|text| {
                        Clause::new(
                            occurrence,
                            CompiledQuery::Term {
                                field: field.clone(),
                                text,
                            },
                        )
                    })
                    .collect();
                Some(CompiledQuery::Boolean(clauses))
            }
        }
    }

    fn native(&self, def: &FieldDefinition, value: &str) -> Result<CompiledQuery> {
        let source = fix_query(value);
        let field = self.index.field(&def.name)?;
        let parser = QueryParser::for_index(self.index.inner(), vec![field]);
        let query = parser.parse_query(&source)?;
        Ok(CompiledQuery::Native { source, query })
    }
}

fn like(field: String, value: &str) -> CompiledQuery {
    let stripped = value.trim_end_matches('*');
    if stripped.contains('*') || stripped.contains('?') {
        CompiledQuery::Wildcard {
            field,
            pattern: value.to_string(),
        }
    } else {
        CompiledQuery::Prefix {
            field,
            prefix: stripped.to_string(),
        }
    }
}

/// `>`/`>=` set the lower bound, `<`/`<=` the upper one; the two-character
/// forms are inclusive. `=` is an exact match, anything else the full range.
pub(crate) fn numeric_range<T: Copy>(operator: &str, value: T, min: T, max: T) -> NumericRange<T> {
    let inclusive = operator.len() == 2;
    match operator.chars().next() {
        Some('>') => NumericRange {
            lower: value,
            upper: max,
            include_lower: inclusive,
            include_upper: true,
        },
        Some('<') => NumericRange {
            lower: min,
            upper: value,
            include_lower: true,
            include_upper: inclusive,
        },
        _ if operator == "=" => NumericRange::exact(value),
        _ => NumericRange {
            lower: min,
            upper: max,
            include_lower: true,
            include_upper: true,
        },
    }
}

fn term_range(field: String, operator: &str, value: String) -> CompiledQuery {
    let inclusive = operator.len() == 2;
    if operator.starts_with('>') {
        CompiledQuery::TermRange {
            field,
            lower: Some(value),
            upper: None,
            include_lower: inclusive,
            include_upper: false,
        }
    } else {
        CompiledQuery::TermRange {
            field,
            lower: None,
            upper: Some(value),
            include_lower: false,
            include_upper: inclusive,
        }
    }
}
