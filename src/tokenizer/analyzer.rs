use tantivy::tokenizer::{
    AsciiFoldingFilter, LowerCaser, RawTokenizer, RemoveLongFilter, SimpleTokenizer,
    StopWordFilter, TextAnalyzer, TokenStream,
};

/// Name under which the text analyzer is registered with each index.
pub const TEXT_TOKENIZER: &str = "mcr_text";

/// Tokenizer shared by indexing and query compilation of text fields.
///
/// Each searcher owns its own instance, so two indexes can run with
/// different stop word lists.
#[derive(Clone)]
pub struct Analyzer {
    text: TextAnalyzer,
    folder: TextAnalyzer,
}

impl Analyzer {
    pub fn new<I, S>(stop_words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let stop_words: Vec<String> = stop_words.into_iter().map(Into::into).collect();
        let text = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(255))
            .filter(LowerCaser)
            .filter(AsciiFoldingFilter)
            .filter(StopWordFilter::remove(stop_words))
            .build();

        let folder = TextAnalyzer::builder(RawTokenizer::default())
            .filter(LowerCaser)
            .filter(AsciiFoldingFilter)
            .build();

        Analyzer { text, folder }
    }

    pub fn register(&self, index: &tantivy::Index) {
        index.tokenizers().register(TEXT_TOKENIZER, self.text.clone());
    }

    /// Run `text` through the index-time analyzer and collect the terms.
    pub fn tokens(&self, text: &str) -> Vec<String> {
        let mut analyzer = self.text.clone();
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        while stream.advance() {
            tokens.push(stream.token().text.clone());
        }
        tokens
    }

    /// Case and diacritic folding of a whole value, without splitting it.
    pub fn fold(&self, text: &str) -> String {
        let mut folder = self.folder.clone();
        let mut stream = folder.token_stream(text);
        if stream.advance() {
            stream.token().text.clone()
        } else {
            String::new()
        }
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Analyzer::new(crate::config::DEFAULT_STOP_WORDS.iter().copied())
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_folded_and_stopped() {
        let analyzer = Analyzer::default();
        assert_eq!(
            analyzer.tokens("The Größe of Über-Häuser"),
            vec!["grosse", "uber", "hauser"]
        );
    }

    #[test]
    fn test_stop_word_only_value_has_no_tokens() {
        let analyzer = Analyzer::default();
        assert!(analyzer.tokens("the").is_empty());
    }

    #[test]
    fn test_custom_stop_words() {
        let analyzer = Analyzer::new(["der", "die", "das"]);
        assert_eq!(analyzer.tokens("Die Katze"), vec!["katze"]);
        assert_eq!(analyzer.tokens("the cat"), vec!["the", "cat"]);
    }

    #[test]
    fn test_fold_keeps_value_whole() {
        let analyzer = Analyzer::default();
        assert_eq!(analyzer.fold("Müller-Lüdenscheidt"), "muller-ludenscheidt");
        assert_eq!(analyzer.fold(""), "");
    }
}
