//! Birthday message rendering.
//!
//! Templates use `{placeholder}` substitution. Every grammatical field is
//! available in three letter-cases: `{they}` renders as stored, `{They}`
//! capitalized, `{THEY}` upper. `{ping}` is the literal mention and
//! `{age_suffixed}` combines the age with its English ordinal suffix.
//! `{{` and `}}` escape literal braces.
//!
//! Placeholder errors are configuration errors: [`validate_template`] runs
//! when the config loads and unknown keys are fatal there, never per-render.

use std::collections::HashMap;

use anyhow::{bail, Result};

use crate::features::pronouns::PronounSet;

/// Ordinal suffix for an age: 1st, 2nd, 3rd, 4th..20th, 21st, 22nd...
pub fn ordinal_suffix(n: u32) -> &'static str {
    if (4..=20).contains(&n) {
        return "th";
    }
    match n % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

pub fn age_with_suffix(age: u32) -> String {
    format!("{age}{}", ordinal_suffix(age))
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// The grammatical keys that get the three case variants.
const CASED_KEYS: [&str; 8] = [
    "name", "they", "them", "their", "theirs", "themself", "are", "theyre",
];

fn add_cased(vars: &mut HashMap<String, String>, key: &str, value: &str) {
    vars.insert(key.to_string(), value.to_string());
    vars.insert(capitalize_first(key), capitalize_first(value));
    vars.insert(key.to_uppercase(), value.to_uppercase());
}

fn substitutions(
    mention: &str,
    name: &str,
    pronouns: &PronounSet,
    age: Option<u32>,
) -> HashMap<String, String> {
    let p = pronouns;
    let mut vars = HashMap::new();
    add_cased(&mut vars, "name", name);
    add_cased(&mut vars, "they", &p.subjective);
    add_cased(&mut vars, "them", &p.objective);
    add_cased(&mut vars, "their", &p.determiner);
    add_cased(&mut vars, "theirs", &p.possessive);
    add_cased(&mut vars, "themself", &p.reflexive);
    add_cased(&mut vars, "are", p.to_be_conjugation());
    add_cased(&mut vars, "theyre", &p.contraction());
    if let Some(age) = age {
        add_cased(&mut vars, "age_suffixed", &age_with_suffix(age));
        vars.insert("age".to_string(), age.to_string());
    }
    vars.insert("ping".to_string(), mention.to_string());
    vars
}

/// Expand a birthday message template. Placeholders without a value (already
/// rejected by [`validate_template`] at config load) are left verbatim.
pub fn render(
    template: &str,
    mention: &str,
    name: &str,
    pronouns: &PronounSet,
    age: Option<u32>,
) -> String {
    let vars = substitutions(mention, name, pronouns, age);
    let mut out = String::with_capacity(template.len() + 32);
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut key = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    key.push(c);
                }
                match vars.get(&key) {
                    Some(value) if closed => out.push_str(value),
                    _ => {
                        out.push('{');
                        out.push_str(&key);
                        if closed {
                            out.push('}');
                        }
                    }
                }
            }
            c => out.push(c),
        }
    }

    out
}

/// Whether `key` is a valid placeholder. `age` and `age_suffixed` only exist
/// in with-age templates; `ping` and `age` have no case variants.
fn is_known_key(key: &str, with_age: bool) -> bool {
    if key == "ping" {
        return true;
    }
    if with_age && key == "age" {
        return true;
    }
    let cased: &[&str] = if with_age {
        &["name", "they", "them", "their", "theirs", "themself", "are", "theyre", "age_suffixed"]
    } else {
        &CASED_KEYS
    };
    cased.iter().any(|base| {
        key == *base || key == capitalize_first(base) || key == base.to_uppercase()
    })
}

/// Check a template for unknown placeholders and unbalanced braces. Called
/// at config load so template authoring mistakes fail the boot, not the
/// birthday.
pub fn validate_template(template: &str, with_age: bool) -> Result<()> {
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
            }
            '}' => bail!("Unmatched '}}'"),
            '{' => {
                let mut key = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    key.push(c);
                }
                if !closed {
                    bail!("Unmatched '{{'");
                }
                if !is_known_key(&key, with_age) {
                    bail!("Unknown placeholder {{{key}}}");
                }
            }
            _ => {}
        }
    }
    Ok(())
}
