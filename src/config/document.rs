// INI document backed by rust-ini, with ordered, case-sensitive sections and keys

use anyhow::{bail, Context, Result};
use ini::{Ini, ParseOption, Properties};
use std::fmt;

/// Parsed INI file
#[derive(Debug, Clone, Default)]
pub struct IniDocument {
    ini: Ini,
}

fn parse_options() -> ParseOption {
    ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        enabled_indented_mutiline_value: true,
        ..Default::default()
    }
}

impl IniDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse INI text
    ///
    /// Accepts `key = value` and `key: value` pairs, `#` and `;` comment lines,
    /// and indented continuation lines, which are joined with a newline.
    /// Repeated sections are merged, later keys winning. Keys before the first
    /// section are rejected.
    pub fn parse(text: &str) -> Result<Self> {
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim_end();
            if line.starts_with('[') && !line.ends_with(']') {
                bail!("Malformed section header on line {}: {}", lineno + 1, raw);
            }
        }

        let parsed = Ini::load_from_str_opt(text, parse_options()).context("Invalid INI text")?;

        let mut doc = IniDocument::new();
        for (section, props) in parsed.iter() {
            let Some(section) = section else {
                if let Some((key, _)) = props.iter().next() {
                    bail!("Entry outside of any section: {}", key);
                }
                continue;
            };
            doc.add_section(section);
            for (key, value) in props.iter() {
                doc.set(section, key, value);
            }
        }
        Ok(doc)
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.ini.section(Some(section)).is_some()
    }

    /// Add a section if it doesn't exist yet
    pub fn add_section(&mut self, section: &str) {
        self.ini
            .entry(Some(section.to_string()))
            .or_insert(Properties::new());
    }

    /// Remove a section, returning whether it existed
    pub fn remove_section(&mut self, section: &str) -> bool {
        self.ini.delete(Some(section)).is_some()
    }

    pub fn sections(&self) -> Vec<String> {
        self.ini.sections().flatten().map(str::to_string).collect()
    }

    pub fn has_option(&self, section: &str, key: &str) -> bool {
        self.get(section, key).is_some()
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.ini.get_from(Some(section), key)
    }

    /// Set a value, creating the section if required
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.ini
            .with_section(Some(section))
            .set(key, value.into());
    }

    /// Remove a key, returning whether it existed
    pub fn remove_option(&mut self, section: &str, key: &str) -> bool {
        self.ini.delete_from(Some(section), key).is_some()
    }

    /// All key/value pairs of a section in file order
    pub fn items(&self, section: &str) -> Option<Vec<(String, String)>> {
        self.ini.section(Some(section)).map(|props| {
            props
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
    }
}

// Written by hand so values are never quoted or escaped
impl fmt::Display for IniDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (section, props) in self.ini.iter() {
            let Some(section) = section else { continue };
            writeln!(f, "[{}]", section)?;
            for (key, value) in props.iter() {
                if value.is_empty() {
                    writeln!(f, "{} =", key)?;
                } else {
                    writeln!(f, "{} = {}", key, value.replace('\n', "\n\t"))?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
