//! Language classifier registry.
//!
//! Central registration point for all per-language node classifiers. The
//! registry is initialized once at startup and provides thread-safe access
//! to language-specific classifiers. Languages with no dedicated grammar
//! entry here fall back to whole-file chunking in the chunker.

use std::collections::HashMap;
use std::sync::OnceLock;

use super::LanguageClassifier;
use crate::types::Language;

/// Global registry instance.
static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Get the global language classifier registry.
pub fn global_registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Registry of language classifiers.
pub struct Registry {
    classifiers: HashMap<Language, Box<dyn LanguageClassifier>>,
}

impl Registry {
    /// Create a new registry with all dedicated-grammar languages registered.
    fn new() -> Self {
        let mut classifiers: HashMap<Language, Box<dyn LanguageClassifier>> = HashMap::new();

        classifiers.insert(Language::Python, Box::new(super::languages::python::PythonClassifier));
        classifiers.insert(Language::Rust, Box::new(super::languages::rust::RustClassifier));
        classifiers.insert(Language::TypeScript, Box::new(super::languages::typescript::TypeScriptClassifier));
        classifiers.insert(Language::JavaScript, Box::new(super::languages::javascript::JavaScriptClassifier));
        classifiers.insert(Language::Go, Box::new(super::languages::go::GoClassifier));
        classifiers.insert(Language::Java, Box::new(super::languages::java::JavaClassifier));
        classifiers.insert(Language::C, Box::new(super::languages::c::CClassifier));
        classifiers.insert(Language::Cpp, Box::new(super::languages::cpp::CppClassifier));
        classifiers.insert(Language::CSharp, Box::new(super::languages::csharp::CSharpClassifier));
        classifiers.insert(Language::Ruby, Box::new(super::languages::ruby::RubyClassifier));
        classifiers.insert(Language::Php, Box::new(super::languages::php::PhpClassifier));
        classifiers.insert(Language::Swift, Box::new(super::languages::swift::SwiftClassifier));
        classifiers.insert(Language::Kotlin, Box::new(super::languages::kotlin::KotlinClassifier));

        Self { classifiers }
    }

    /// Get the classifier for a given language, if a dedicated grammar exists.
    pub fn get(&self, language: Language) -> Option<&dyn LanguageClassifier> {
        self.classifiers.get(&language).map(|c| c.as_ref())
    }

    /// List all registered languages.
    pub fn languages(&self) -> Vec<Language> {
        self.classifiers.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_all_dedicated_grammar_languages() {
        let reg = global_registry();
        for lang in [
            Language::Python,
            Language::Rust,
            Language::TypeScript,
            Language::JavaScript,
            Language::Go,
            Language::Java,
            Language::C,
            Language::Cpp,
            Language::CSharp,
            Language::Ruby,
            Language::Php,
            Language::Swift,
            Language::Kotlin,
        ] {
            assert!(reg.get(lang).is_some(), "missing classifier for {lang:?}");
        }
    }

    #[test]
    fn registry_returns_none_for_unregistered_languages() {
        let reg = global_registry();
        assert!(reg.get(Language::Unknown).is_none());
        assert!(reg.get(Language::Css).is_none());
        assert!(reg.get(Language::Html).is_none());
    }
}
