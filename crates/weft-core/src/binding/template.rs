//! BindingTemplate - `{name}` プレースホルダを含むパス/文字列テンプレート

use std::collections::HashMap;
use std::fmt;

use super::BindingError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// Parsed template: an ordered sequence of literal and placeholder segments.
///
/// `{name}` is a placeholder. `{{` and `}}` stand for literal braces.
/// Placeholder names are matched case-sensitively and may contain ASCII
/// letters, digits, `_`, `-` and `.`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingTemplate {
    pattern: String,
    segments: Vec<Segment>,
}

impl BindingTemplate {
    pub fn parse(pattern: &str) -> Result<Self, BindingError> {
        let invalid = |reason: &str| BindingError::InvalidTemplate {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = pattern.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') => return Err(invalid("nested '{'")),
                            Some(ch) => name.push(ch),
                            None => return Err(invalid("unterminated '{'")),
                        }
                    }
                    if name.is_empty() {
                        return Err(invalid("empty placeholder name"));
                    }
                    if !name
                        .chars()
                        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'))
                    {
                        return Err(invalid(&format!("invalid placeholder name '{name}'")));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name));
                }
                '}' => return Err(invalid("unmatched '}'")),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            pattern: pattern.to_string(),
            segments,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn has_parameters(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Placeholder(_)))
    }

    /// Placeholder names in first-occurrence order, without duplicates.
    pub fn parameter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder(name) = segment
                && !names.contains(&name.as_str())
            {
                names.push(name);
            }
        }
        names
    }

    /// Substitute every placeholder.
    ///
    /// Fails on the first placeholder without a value; never returns a
    /// partially substituted string.
    pub fn bind(&self, values: &HashMap<String, String>) -> Result<String, BindingError> {
        let mut out = String::with_capacity(self.pattern.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    let value = values.get(name).ok_or_else(|| BindingError::MissingParameter {
                        name: name.clone(),
                        pattern: self.pattern.clone(),
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }

    /// Reverse of `bind`: match `input` against the template and capture
    /// placeholder values. Placeholders match lazily (shortest non-empty
    /// value), except the last one, which takes the remainder. A name that
    /// occurs twice must capture the same value both times.
    pub fn capture(&self, input: &str) -> Option<HashMap<String, String>> {
        let mut captures = HashMap::new();
        if capture_from(&self.segments, input, &mut captures) {
            Some(captures)
        } else {
            None
        }
    }
}

fn capture_from(segments: &[Segment], input: &str, captures: &mut HashMap<String, String>) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return input.is_empty();
    };
    match first {
        Segment::Literal(text) => input
            .strip_prefix(text.as_str())
            .is_some_and(|remaining| capture_from(rest, remaining, captures)),
        Segment::Placeholder(name) => {
            let ends: Vec<usize> = if rest.is_empty() {
                vec![input.len()]
            } else {
                input
                    .char_indices()
                    .map(|(i, _)| i)
                    .skip(1)
                    .chain(std::iter::once(input.len()))
                    .collect()
            };
            for end in ends {
                let value = &input[..end];
                if value.is_empty() {
                    continue;
                }
                let newly_captured = match captures.get(name) {
                    Some(existing) if existing != value => continue,
                    Some(_) => false,
                    None => {
                        captures.insert(name.clone(), value.to_string());
                        true
                    }
                };
                if capture_from(rest, &input[end..], captures) {
                    return true;
                }
                if newly_captured {
                    captures.remove(name);
                }
            }
            false
        }
    }
}

impl fmt::Display for BindingTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}
