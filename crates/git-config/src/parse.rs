//! Config file parser: git's INI-like format, one logical line at a time.
//!
//! Each logical line keeps its raw text so a file can be rewritten with
//! untouched lines byte-for-byte identical. A trailing backslash joins the
//! next physical line onto the current one.

use regex::Regex;

use crate::error::ConfigError;
use crate::types::Value;
use crate::SectionId;

/// UTF-8 BOM bytes.
const UTF8_BOM: &str = "\u{feff}";

const SECTION_LINE: &str = r#"(?i)\A\s*\[([a-z0-9-]+)(?: "(.+)")?\]\s*(?:\z|#|;)"#;
const VARIABLE_LINE: &str = r"(?is)\A\s*([a-z][a-z0-9-]*)\s*(?:=\s*(.*?))?\s*(?:\z|#|;)";
const BLANK_LINE: &str = r"\A\s*(?:\z|#|;)";

/// A variable assignment as written.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Name as spelled in the file.
    pub name: String,
    pub value: Value,
}

impl Variable {
    pub fn normal_name(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    /// `\t<name> = <value>\n`
    pub fn serialize(name: &str, value: &Value) -> String {
        format!("\t{name} = {value}\n")
    }
}

/// One logical line of a config file.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    /// Raw text, including the newline and any continuation backslashes.
    pub text: String,
    /// The section the line belongs to; the empty id before any header.
    pub section: SectionId,
    /// Set for assignments, `None` for headers, comments and blanks.
    pub variable: Option<Variable>,
}

struct Patterns {
    section: Regex,
    variable: Regex,
    blank: Regex,
}

impl Patterns {
    fn new() -> Result<Self, ConfigError> {
        Ok(Self {
            section: Regex::new(SECTION_LINE)?,
            variable: Regex::new(VARIABLE_LINE)?,
            blank: Regex::new(BLANK_LINE)?,
        })
    }
}

/// Split `input` into logical lines and classify each.
pub fn parse_config(input: &str, filename: &str) -> Result<Vec<Line>, ConfigError> {
    let patterns = Patterns::new()?;
    let input = input.strip_prefix(UTF8_BOM).unwrap_or(input);

    let mut lines = Vec::new();
    let mut section = SectionId::default();
    for (n, text) in logical_lines(input).into_iter().enumerate() {
        let body = text.strip_suffix('\n').unwrap_or(&text);

        let line = if let Some(caps) = patterns.section.captures(body) {
            section = SectionId::new(&caps[1], caps.get(2).map(|m| m.as_str()));
            Line {
                text,
                section: section.clone(),
                variable: None,
            }
        } else if let Some(caps) = patterns.variable.captures(body) {
            let value = match caps.get(2) {
                Some(raw) => Value::parse(&raw.as_str().replace("\\\n", "")),
                None => Value::Bool(true),
            };
            let variable = Variable {
                name: caps[1].to_owned(),
                value,
            };
            Line {
                text,
                section: section.clone(),
                variable: Some(variable),
            }
        } else if patterns.blank.is_match(body) {
            Line {
                text,
                section: section.clone(),
                variable: None,
            }
        } else {
            return Err(ConfigError::Parse {
                file: filename.to_owned(),
                line: n + 1,
            });
        };
        lines.push(line);
    }
    Ok(lines)
}

/// Physical lines, with those ending in `\` joined to their successor.
fn logical_lines(input: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut buffer = String::new();
    for physical in input.split_inclusive('\n') {
        buffer.push_str(physical);
        if !buffer.ends_with("\\\n") {
            lines.push(std::mem::take(&mut buffer));
        }
    }
    if !buffer.is_empty() {
        lines.push(buffer);
    }
    lines
}
