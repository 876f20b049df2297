use super::compiled::CompiledQuery;

/// Builds the fuzzy leaf for `text + fuzzy` conditions.
///
/// The edit distance grows with the term length: one- and two-character
/// terms must match exactly, since any fuzziness would match nearly every
/// short token in the index.
pub struct FuzzyQueryBuilder {
    field: String,
    term: String,
    distance: u8,
}

impl FuzzyQueryBuilder {
    pub fn new(field: impl Into<String>, term: impl Into<String>) -> Self {
        let term = term.into();
        let distance = Self::calculate_distance(&term);
        FuzzyQueryBuilder {
            field: field.into(),
            term,
            distance,
        }
    }

    fn calculate_distance(term: &str) -> u8 {
        let len = term.chars().count();
        if len < 3 {
            0
        } else if len < 6 {
            1
        } else {
            2
        }
    }

    pub fn build(self) -> CompiledQuery {
        if self.distance == 0 {
            return CompiledQuery::Term {
                field: self.field,
                text: self.term,
            };
        }

        CompiledQuery::Fuzzy {
            field: self.field,
            term: self.term,
            distance: self.distance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_by_length() {
        assert_eq!(FuzzyQueryBuilder::calculate_distance("ab"), 0);
        assert_eq!(FuzzyQueryBuilder::calculate_distance("haus"), 1);
        assert_eq!(FuzzyQueryBuilder::calculate_distance("häuser"), 2);
    }

    #[test]
    fn test_short_terms_degrade_to_term() {
        let query = FuzzyQueryBuilder::new("title", "ab").build();
        assert!(matches!(query, CompiledQuery::Term { ref text, .. } if text == "ab"));

        let query = FuzzyQueryBuilder::new("title", "mycore").build();
        assert!(matches!(query, CompiledQuery::Fuzzy { distance: 2, .. }));
    }
}
