//! Skill canonicalization.
//!
//! The classifier reports skills the way the user typed them ("IA",
//! "Inteligencia Artificial", "ML"). Vector metadata is keyed by a small set
//! of canonical identifiers, so every mention is folded onto that set before
//! it is used as a search filter.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

/// Variant → canonical identifier. Keys are lower-case and trimmed.
const SKILL_TABLE: &[(&str, &str)] = &[
    // AI
    ("inteligencia artificial", "ai"),
    ("ia", "ai"),
    ("ai", "ai"),
    ("desarrollo de ia", "ai"),
    ("desarrollo de ai", "ai"),
    ("desarrollo ia", "ai"),
    ("desarrollo ai", "ai"),
    // Machine learning
    ("machine learning", "machine learning"),
    ("ml", "machine learning"),
    ("aprendizaje automatico", "machine learning"),
    ("aprendizaje automático", "machine learning"),
    // Data science
    ("data science", "data science"),
    ("ciencia de datos", "data science"),
    ("datascience", "data science"),
    // Generic programming mentions default to the main language
    ("programacion", "python"),
    ("programación", "python"),
    ("coding", "python"),
    ("desarrollo", "python"),
    // Web
    ("desarrollo web", "backend"),
    ("web development", "backend"),
    ("frontend", "backend"),
    // Tooling
    ("ci/cd", "ci/cd"),
    ("cicd", "ci/cd"),
    ("continuous integration", "ci/cd"),
    ("github", "github actions"),
    ("aws lambda", "lambda"),
    ("lambda functions", "lambda"),
    ("apis", "apis"),
    ("api", "apis"),
    ("rest api", "apis"),
    ("graphql", "apis"),
    // Personal
    ("cocinar", "cocina"),
    ("cooking", "cocina"),
    ("music", "musica"),
    ("sports", "deportes"),
    ("languages", "idiomas"),
    ("photography", "fotografia"),
    ("travel", "viajes"),
    ("reading", "lectura"),
    ("writing", "escritura"),
    ("meditation", "meditacion"),
    ("cycling", "ciclismo"),
    ("soccer", "futbol"),
    ("football", "futbol"),
    ("guitar", "guitarra"),
    ("spanish", "espanol"),
    ("english", "ingles"),
    ("portuguese", "portugues"),
    ("video editing", "edicion de video"),
    ("blog", "blogging"),
    ("podcast", "podcasting"),
];

static SKILL_MAP: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| SKILL_TABLE.iter().copied().collect());

/// Canonicalize a list of raw skill mentions.
///
/// Each mention is trimmed and lower-cased, then looked up in the variant
/// table; unknown terms pass through in their normalized form. Blank
/// mentions are dropped. Duplicates are removed keeping the first
/// occurrence.
pub fn canonicalize<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for skill in raw {
        let normalized = skill.as_ref().trim().to_lowercase();
        if normalized.is_empty() {
            continue;
        }
        let canonical = match SKILL_MAP.get(normalized.as_str()) {
            Some(mapped) => (*mapped).to_string(),
            None => normalized,
        };
        if seen.insert(canonical.clone()) {
            out.push(canonical);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_entry_maps_to_its_canonical_form() {
        for (variant, canonical) in SKILL_TABLE {
            assert_eq!(
                canonicalize([*variant]),
                vec![canonical.to_string()],
                "variant {variant:?}"
            );
        }
    }

    #[test]
    fn table_lookup_ignores_case_and_padding() {
        for (variant, canonical) in SKILL_TABLE {
            let shouted = format!("  {}\t", variant.to_uppercase());
            assert_eq!(
                canonicalize([shouted.as_str()]),
                vec![canonical.to_string()],
                "variant {shouted:?}"
            );
        }
    }

    #[test]
    fn canonical_identifiers_are_fixed_points() {
        let canonicals: HashSet<&str> = SKILL_TABLE.iter().map(|(_, c)| *c).collect();
        for canonical in canonicals {
            assert_eq!(canonicalize([canonical]), vec![canonical.to_string()]);
        }
    }

    #[test]
    fn ai_variants_collapse_to_one() {
        assert_eq!(
            canonicalize(["IA", "Inteligencia Artificial", "ai"]),
            vec!["ai".to_string()]
        );
    }

    #[test]
    fn unknown_terms_pass_through_normalized() {
        assert_eq!(
            canonicalize(["  Rust ", "PINECONE"]),
            vec!["rust".to_string(), "pinecone".to_string()]
        );
    }

    #[test]
    fn first_occurrence_order_is_kept() {
        let cases: &[(&[&str], &[&str])] = &[
            (&["ML", "python", "machine learning"], &["machine learning", "python"]),
            (&["cooking", "cocinar", "guitar"], &["cocina", "guitarra"]),
            (&["Docker", "API", "graphql", "docker"], &["docker", "apis"]),
            (&["soccer", "football", "spanish"], &["futbol", "espanol"]),
        ];
        for (input, expected) in cases {
            let expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
            assert_eq!(canonicalize(input.iter()), expected, "input {input:?}");
        }
    }

    #[test]
    fn empty_and_blank_input() {
        assert!(canonicalize(Vec::<String>::new()).is_empty());
        assert!(canonicalize(["", "   "]).is_empty());
    }
}
