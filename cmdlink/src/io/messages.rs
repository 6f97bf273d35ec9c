//! Localized user-facing messages.
//!
//! Catalogs are flat `key = "template"` TOML tables rendered with minijinja
//! (`{{ name }}` placeholders). Lookup order: configured language, then `en`.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use minijinja::{Environment, Value, context};
use tracing::warn;

const EN_CATALOG: &str = include_str!("messages/en.toml");
const RU_CATALOG: &str = include_str!("messages/ru.toml");

const FALLBACK_LANGUAGE: &str = "en";

type Catalog = BTreeMap<String, String>;

/// Message catalog bound to one active language.
pub struct Messages {
    env: Environment<'static>,
    catalogs: BTreeMap<String, Catalog>,
    language: String,
}

impl Messages {
    /// Build the bundled catalogs with per-language `overrides` applied on top.
    pub fn new(language: &str, overrides: &BTreeMap<String, Catalog>) -> Result<Self> {
        let mut catalogs = BTreeMap::new();
        catalogs.insert("en".to_string(), parse_catalog("en", EN_CATALOG)?);
        catalogs.insert("ru".to_string(), parse_catalog("ru", RU_CATALOG)?);
        for (lang, entries) in overrides {
            let catalog: &mut Catalog = catalogs.entry(lang.clone()).or_default();
            catalog.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(Self {
            env: Environment::new(),
            catalogs,
            language: language.to_string(),
        })
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    fn template(&self, key: &str) -> Option<&str> {
        [self.language.as_str(), FALLBACK_LANGUAGE]
            .into_iter()
            .find_map(|lang| self.catalogs.get(lang).and_then(|c| c.get(key)))
            .map(String::as_str)
    }

    /// Render `key` with `ctx`. Unknown keys render as `message error: <key>`.
    pub fn render(&self, key: &str, ctx: Value) -> String {
        let Some(template) = self.template(key) else {
            warn!(key, language = %self.language, "message not found");
            return format!("message error: {key}");
        };
        match self.env.render_str(template, ctx) {
            Ok(rendered) => rendered,
            Err(err) => {
                warn!(key, err = %err, "failed to render message");
                template.to_string()
            }
        }
    }

    /// Render a key that takes no placeholders.
    pub fn text(&self, key: &str) -> String {
        self.render(key, context! {})
    }
}

fn parse_catalog(lang: &str, raw: &str) -> Result<Catalog> {
    toml::from_str(raw).with_context(|| format!("parse bundled {lang} message catalog"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_catalogs_share_keys() {
        let en = parse_catalog("en", EN_CATALOG).expect("en");
        let ru = parse_catalog("ru", RU_CATALOG).expect("ru");
        let en_keys: Vec<&String> = en.keys().collect();
        let ru_keys: Vec<&String> = ru.keys().collect();
        assert_eq!(en_keys, ru_keys);
    }

    #[test]
    fn renders_placeholders() {
        let messages = Messages::new("en", &BTreeMap::new()).expect("messages");
        assert_eq!(
            messages.render("run-success", context! { count => 3 }),
            "Executed 3 command(s)."
        );
    }

    #[test]
    fn falls_back_to_english() {
        let mut messages = Messages::new("ru", &BTreeMap::new()).expect("messages");
        messages.catalogs.get_mut("ru").expect("ru").remove("blocked");
        assert_eq!(
            messages.render("blocked", context! { cmd => "op me" }),
            "Blocked command: op me"
        );
    }

    #[test]
    fn overrides_replace_bundled_templates() {
        let overrides = BTreeMap::from([(
            "en".to_string(),
            BTreeMap::from([("run-start".to_string(), "go {{ link }}".to_string())]),
        )]);
        let messages = Messages::new("en", &overrides).expect("messages");
        assert_eq!(
            messages.render("run-start", context! { link => "https://x" }),
            "go https://x"
        );
    }

    #[test]
    fn unknown_key_reports_message_error() {
        let messages = Messages::new("en", &BTreeMap::new()).expect("messages");
        assert_eq!(messages.text("nope"), "message error: nope");
    }
}
