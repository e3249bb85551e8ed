//! Variables available to command lines as `$name`.

use std::collections::BTreeMap;

use crate::error::CommandError;

/// Mapping of variable names to values, mutated by the `set` command.
#[derive(Debug, Default, Clone)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

/// Variable names are ASCII alphanumerics and underscores.
fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_name_char)
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable. Returns `true` when an existing value was replaced.
    pub fn set(&mut self, name: &str, value: &str) -> Result<bool, CommandError> {
        if !is_valid_name(name) {
            return Err(CommandError::invalid(
                "set",
                format!("invalid name for variable \"{}\"", name),
            ));
        }
        let replaced = self
            .vars
            .insert(name.to_string(), value.to_string())
            .is_some();
        Ok(replaced)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn clear(&mut self) {
        self.vars.clear();
    }

    /// Expand `$name` references. `$$` yields a literal `$`.
    ///
    /// A dangling `$`, a `$` not followed by a name, or an undefined name
    /// fails the whole line.
    pub fn substitute(&self, line: &str) -> Result<String, CommandError> {
        let mut out = String::with_capacity(line.len());
        let mut rest = line;
        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            if after.is_empty() {
                return Err(CommandError::Syntax("$ at end of command".into()));
            }
            if let Some(tail) = after.strip_prefix('$') {
                out.push('$');
                rest = tail;
                continue;
            }
            let end = after.find(|c| !is_name_char(c)).unwrap_or(after.len());
            if end == 0 {
                return Err(CommandError::Syntax(
                    "$ not followed by variable name".into(),
                ));
            }
            let name = &after[..end];
            let value = self.get(name).ok_or_else(|| {
                CommandError::Syntax(format!("variable \"{}\" not found", name))
            })?;
            out.push_str(value);
            rest = &after[end..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// One `name,value` line per variable, fields CSV-escaped.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        for (name, value) in self.iter() {
            out.push_str(&csv_field(name));
            out.push(',');
            out.push_str(&csv_field(value));
            out.push('\n');
        }
        out
    }
}

/// Quote a field containing whitespace, commas or quotes; quotes are doubled.
fn csv_field(field: &str) -> String {
    let needs_quotes = field
        .chars()
        .any(|c| c.is_whitespace() || c == ',' || c == '"');
    if needs_quotes {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(pairs: &[(&str, &str)]) -> Environment {
        let mut env = Environment::new();
        for (k, v) in pairs {
            env.set(k, v).unwrap();
        }
        env
    }

    #[test]
    fn substitutes_variables() {
        let env = env_with(&[("X", "hi"), ("room_2", "den")]);
        assert_eq!(env.substitute("exec echo $X").unwrap(), "exec echo hi");
        assert_eq!(env.substitute("$room_2-light").unwrap(), "den-light");
        assert_eq!(env.substitute("no refs").unwrap(), "no refs");
    }

    #[test]
    fn double_dollar_is_literal() {
        let env = Environment::new();
        assert_eq!(env.substitute("echo $$").unwrap(), "echo $");
        assert_eq!(env.substitute("$$X").unwrap(), "$X");
    }

    #[test]
    fn substitution_errors() {
        let env = env_with(&[("X", "1")]);
        assert!(matches!(env.substitute("echo $"), Err(CommandError::Syntax(_))));
        assert!(matches!(env.substitute("echo $ x"), Err(CommandError::Syntax(_))));
        assert!(matches!(env.substitute("echo $Y"), Err(CommandError::Syntax(_))));
        // a defined name must match exactly, not by prefix
        assert!(matches!(env.substitute("echo $XY"), Err(CommandError::Syntax(_))));
    }

    #[test]
    fn set_overwrites_and_validates() {
        let mut env = Environment::new();
        assert!(!env.set("A", "1").unwrap());
        assert!(env.set("A", "2").unwrap());
        assert_eq!(env.to_csv(), "A,2\n");
        assert!(env.set("bad-name", "x").is_err());
        assert!(env.set("", "x").is_err());
    }

    #[test]
    fn csv_quotes_only_when_needed() {
        let env = env_with(&[
            ("plain", "value"),
            ("spaced", "two words"),
            ("comma", "a,b"),
            ("quoted", "say \"hi\""),
        ]);
        let csv = env.to_csv();
        assert!(csv.contains("plain,value\n"));
        assert!(csv.contains("spaced,\"two words\"\n"));
        assert!(csv.contains("comma,\"a,b\"\n"));
        assert!(csv.contains("quoted,\"say \"\"hi\"\"\"\n"));
    }

    #[test]
    fn csv_round_trips_through_reader() {
        let pairs = [
            ("A", "1"),
            ("B", "tab\there"),
            ("C", " leading"),
            ("D", "\"\",,\""),
            ("E", ""),
        ];
        let env = env_with(&pairs);
        let csv_text = env.to_csv();

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::None)
            .from_reader(csv_text.as_bytes());
        let parsed: Vec<(String, String)> = reader
            .records()
            .map(|r| {
                let r = r.unwrap();
                (r[0].to_string(), r[1].to_string())
            })
            .collect();

        let expected: Vec<(String, String)> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(parsed, expected);
        assert_eq!(parsed.len(), pairs.len());
    }
}
