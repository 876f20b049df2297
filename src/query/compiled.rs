use crate::error::{Result, SearchError};
use crate::index::IndexHandle;
use std::ops::Bound;
use tantivy::query::{
    AllQuery, BooleanQuery, FuzzyTermQuery, Occur, PhraseQuery, Query, RangeQuery, RegexQuery,
    TermQuery,
};
use tantivy::schema::{Field, IndexRecordOption};
use tantivy::Term;

/// How a clause takes part in its enclosing boolean query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occurrence {
    Must,
    Should,
    MustNot,
}

impl Occurrence {
    fn to_occur(self) -> Occur {
        match self {
            Occurrence::Must => Occur::Must,
            Occurrence::Should => Occur::Should,
            Occurrence::MustNot => Occur::MustNot,
        }
    }
}

#[derive(Debug)]
pub struct Clause {
    pub occurrence: Occurrence,
    pub query: CompiledQuery,
}

impl Clause {
    pub fn new(occurrence: Occurrence, query: CompiledQuery) -> Self {
        Clause { occurrence, query }
    }
}

/// Numeric range with independently inclusive bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericRange<T> {
    pub lower: T,
    pub upper: T,
    pub include_lower: bool,
    pub include_upper: bool,
}

impl<T: Copy> NumericRange<T> {
    pub fn exact(value: T) -> Self {
        NumericRange {
            lower: value,
            upper: value,
            include_lower: true,
            include_upper: true,
        }
    }
}

/// Engine-independent query tree produced by the
/// [`QueryCompiler`](super::compiler::QueryCompiler).
#[derive(Debug)]
pub enum CompiledQuery {
    Term {
        field: String,
        text: String,
    },
    Phrase {
        field: String,
        terms: Vec<String>,
    },
    Prefix {
        field: String,
        prefix: String,
    },
    /// `*` matches any run of characters, `?` exactly one.
    Wildcard {
        field: String,
        pattern: String,
    },
    Fuzzy {
        field: String,
        term: String,
        distance: u8,
    },
    /// Range over raw terms; `None` leaves that side open.
    TermRange {
        field: String,
        lower: Option<String>,
        upper: Option<String>,
        include_lower: bool,
        include_upper: bool,
    },
    IntRange {
        field: String,
        range: NumericRange<i64>,
    },
    FloatRange {
        field: String,
        range: NumericRange<f64>,
    },
    /// Already parsed by the engine's own query grammar.
    Native {
        source: String,
        query: Box<dyn Query>,
    },
    Boolean(Vec<Clause>),
}

impl CompiledQuery {
    /// Visit every non-boolean leaf together with the occurrence of the
    /// clause that holds it (`None` for a bare leaf at the root).
    pub fn leaves(&self) -> Vec<(Option<Occurrence>, &CompiledQuery)> {
        let mut out = Vec::new();
        collect_leaves(self, None, &mut out);
        out
    }

    pub fn to_tantivy(&self, index: &IndexHandle) -> Result<Box<dyn Query>> {
        let query: Box<dyn Query> = match self {
            CompiledQuery::Term { field, text } => {
                let field = index.field(field)?;
                Box::new(term_query(field, text))
            }
            CompiledQuery::Phrase { field, terms } => {
                let field = index.field(field)?;
                match terms.as_slice() {
                    [] => {
                        return Err(SearchError::InvalidQuery(
                            "phrase without terms".to_string(),
                        ))
                    }
                    // PhraseQuery needs at least two terms.
                    [single] => Box::new(term_query(field, single)),
                    _ => Box::new(PhraseQuery::new(
                        terms
                            .iter()
                            .map(|t| Term::from_field_text(field, t))
                            .collect(),
                    )),
                }
            }
            CompiledQuery::Prefix { field, prefix } => {
                let field = index.field(field)?;
                let pattern = format!("{}.*", regex::escape(prefix));
                Box::new(RegexQuery::from_pattern(&pattern, field)?)
            }
            CompiledQuery::Wildcard { field, pattern } => {
                let field = index.field(field)?;
                Box::new(RegexQuery::from_pattern(&wildcard_to_regex(pattern), field)?)
            }
            CompiledQuery::Fuzzy {
                field,
                term,
                distance,
            } => {
                let field = index.field(field)?;
                Box::new(FuzzyTermQuery::new(
                    Term::from_field_text(field, term),
                    *distance,
                    true,
                ))
            }
            CompiledQuery::TermRange {
                field,
                lower,
                upper,
                include_lower,
                include_upper,
            } => {
                let field = index.field(field)?;
                let to_bound = |value: &Option<String>, inclusive: bool| match value {
                    Some(v) => bound(Term::from_field_text(field, v), inclusive),
                    None => Bound::Unbounded,
                };
                let lower = to_bound(lower, *include_lower);
                let upper = to_bound(upper, *include_upper);
                if matches!((&lower, &upper), (Bound::Unbounded, Bound::Unbounded)) {
                    return Err(SearchError::InvalidQuery(
                        "term range without bounds".to_string(),
                    ));
                }
                Box::new(RangeQuery::new(lower, upper))
            }
            CompiledQuery::IntRange { field, range } => {
                let field = index.field(field)?;
                Box::new(RangeQuery::new(
                    bound(Term::from_field_i64(field, range.lower), range.include_lower),
                    bound(Term::from_field_i64(field, range.upper), range.include_upper),
                ))
            }
            CompiledQuery::FloatRange { field, range } => {
                let field = index.field(field)?;
                Box::new(RangeQuery::new(
                    bound(Term::from_field_f64(field, range.lower), range.include_lower),
                    bound(Term::from_field_f64(field, range.upper), range.include_upper),
                ))
            }
            CompiledQuery::Native { query, .. } => query.box_clone(),
            CompiledQuery::Boolean(clauses) => {
                let mut subqueries: Vec<(Occur, Box<dyn Query>)> = clauses
                    .iter()
                    .map(|c| Ok((c.occurrence.to_occur(), c.query.to_tantivy(index)?)))
                    .collect::<Result<_>>()?;
                // A purely negative query matches nothing unless anchored.
                let only_negative = !subqueries.is_empty()
                    && subqueries.iter().all(|(occur, _)| *occur == Occur::MustNot);
                if only_negative {
                    subqueries.push((Occur::Must, Box::new(AllQuery)));
                }
                Box::new(BooleanQuery::new(subqueries))
            }
        };
        Ok(query)
    }
}

fn collect_leaves<'a>(
    query: &'a CompiledQuery,
    occurrence: Option<Occurrence>,
    out: &mut Vec<(Option<Occurrence>, &'a CompiledQuery)>,
) {
    match query {
        CompiledQuery::Boolean(clauses) => {
            for clause in clauses {
                collect_leaves(&clause.query, Some(clause.occurrence), out);
            }
        }
        leaf => out.push((occurrence, leaf)),
    }
}

fn term_query(field: Field, text: &str) -> TermQuery {
    TermQuery::new(
        Term::from_field_text(field, text),
        IndexRecordOption::WithFreqs,
    )
}

fn bound(term: Term, inclusive: bool) -> Bound<Term> {
    if inclusive {
        Bound::Included(term)
    } else {
        Bound::Excluded(term)
    }
}

fn wildcard_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() * 2);
    let mut literal = String::new();
    for c in pattern.chars() {
        match c {
            '*' | '?' => {
                regex.push_str(&regex::escape(&literal));
                literal.clear();
                regex.push_str(if c == '*' { ".*" } else { "." });
            }
            other => literal.push(other),
        }
    }
    regex.push_str(&regex::escape(&literal));
    regex
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::fields::{DataType, FieldDefinition};
    use crate::tokenizer::Analyzer;

    fn index() -> IndexHandle {
        IndexHandle::in_memory(
            "compiled",
            &[
                FieldDefinition::new("title", DataType::Text),
                FieldDefinition::new("year", DataType::Integer),
            ],
            Analyzer::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_wildcard_to_regex() {
        assert_eq!(wildcard_to_regex("ab*c?"), "ab.*c.");
        assert_eq!(wildcard_to_regex("a.b*"), "a\\.b.*");
    }

    #[test]
    fn test_leaves_report_occurrence() {
        let query = CompiledQuery::Boolean(vec![
            Clause::new(
                Occurrence::Must,
                CompiledQuery::Term {
                    field: "title".to_string(),
                    text: "a".to_string(),
                },
            ),
            Clause::new(
                Occurrence::MustNot,
                CompiledQuery::Boolean(vec![Clause::new(
                    Occurrence::Should,
                    CompiledQuery::Term {
                        field: "title".to_string(),
                        text: "b".to_string(),
                    },
                )]),
            ),
        ]);
        let occurrences: Vec<_> = query.leaves().into_iter().map(|(o, _)| o).collect();
        assert_eq!(
            occurrences,
            vec![Some(Occurrence::Must), Some(Occurrence::Should)]
        );
    }

    #[test]
    fn test_to_tantivy_resolves_fields() {
        let index = index();
        let phrase = CompiledQuery::Phrase {
            field: "title".to_string(),
            terms: vec!["hello".to_string()],
        };
        assert!(phrase.to_tantivy(&index).is_ok());

        let range = CompiledQuery::IntRange {
            field: "year".to_string(),
            range: NumericRange::exact(2001),
        };
        assert!(range.to_tantivy(&index).is_ok());

        let unknown = CompiledQuery::Term {
            field: "nope".to_string(),
            text: "x".to_string(),
        };
        assert!(matches!(
            unknown.to_tantivy(&index),
            Err(SearchError::FieldNotFound(_))
        ));
    }
}
