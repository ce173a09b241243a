//! Localised message catalog.

use std::collections::HashMap;

use anyhow::Context;
use thiserror::Error;

const EMBEDDED: [(&str, &str); 2] = [
    ("en", include_str!("../../../locales/en.json")),
    ("fa", include_str!("../../../locales/fa.json")),
];

#[derive(Debug, Error, PartialEq, Eq)]
#[error("no value for placeholder {{{0}}}")]
pub struct MissingPlaceholder(pub String);

#[derive(Debug, Clone)]
pub struct Catalog {
    languages: HashMap<String, HashMap<String, String>>,
    fallback: String,
}

impl Catalog {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            languages: HashMap::new(),
            fallback: fallback.into(),
        }
    }

    /// Catalog with the locales shipped in `locales/`.
    pub fn embedded(fallback: impl Into<String>) -> anyhow::Result<Self> {
        let mut catalog = Self::new(fallback);
        for (lang, raw) in EMBEDDED {
            let entries: HashMap<String, String> = serde_json::from_str(raw)
                .with_context(|| format!("failed to parse locale {lang}"))?;
            catalog = catalog.with_language(lang, entries);
        }
        Ok(catalog)
    }

    pub fn with_language(mut self, lang: &str, entries: HashMap<String, String>) -> Self {
        self.languages.insert(lang.to_string(), entries);
        self
    }

    pub fn lookup(&self, key: &str, lang: &str) -> Option<&str> {
        self.languages
            .get(lang)
            .and_then(|entries| entries.get(key))
            .or_else(|| {
                self.languages
                    .get(&self.fallback)
                    .and_then(|entries| entries.get(key))
            })
            .map(String::as_str)
    }

    /// Renders `key`, falling back to the key itself when no language has it.
    /// Placeholders without a value are left as written.
    pub fn text(&self, key: &str, lang: &str, args: &[(&str, &str)]) -> String {
        let template = self.lookup(key, lang).unwrap_or(key);
        render(template, args, false).unwrap_or_else(|_| template.to_string())
    }
}

/// Substitutes `{name}` placeholders, failing on the first one `args` lacks.
/// `{{` and `}}` produce literal braces.
pub fn interpolate(template: &str, args: &[(&str, &str)]) -> Result<String, MissingPlaceholder> {
    render(template, args, true)
}

fn render(
    template: &str,
    args: &[(&str, &str)],
    strict: bool,
) -> Result<String, MissingPlaceholder> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find(['{', '}']) {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
            continue;
        }

        let Some(close) = tail.find('}') else {
            out.push_str(tail);
            return Ok(out);
        };
        let name = &tail[1..close];
        match args.iter().find(|(k, _)| *k == name) {
            Some((_, value)) => out.push_str(value),
            None if strict => return Err(MissingPlaceholder(name.to_string())),
            None => out.push_str(&tail[..=close]),
        }
        rest = &tail[close + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
