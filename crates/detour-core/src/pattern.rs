use crate::error::{CoreError, Result};
use crate::path::SourcePath;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `:name`, exactly one segment.
    Param(String),
    /// `*name` or `*`, one or more trailing segments.
    Rest(Option<String>),
}

/// A parameterized source path such as `/blog/:year/:slug` or `/docs/*rest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    segments: Vec<Segment>,
}

/// Values captured by a [`Pattern`], in pattern order.
pub type Captures = Vec<(String, String)>;

impl Pattern {
    pub fn parse(source: &SourcePath) -> Result<Self> {
        let raw: Vec<&str> = source.segments().collect();
        let mut segments = Vec::with_capacity(raw.len());

        for (idx, segment) in raw.iter().enumerate() {
            let parsed = if let Some(name) = segment.strip_prefix(':') {
                if name.is_empty() {
                    return Err(CoreError::InvalidPattern(format!(
                        "unnamed parameter in '{}'",
                        source
                    )));
                }
                Segment::Param(name.to_string())
            } else if let Some(name) = segment.strip_prefix('*') {
                if idx + 1 != raw.len() {
                    return Err(CoreError::InvalidPattern(format!(
                        "wildcard must be the last segment in '{}'",
                        source
                    )));
                }
                Segment::Rest((!name.is_empty()).then(|| name.to_string()))
            } else {
                Segment::Literal(segment.to_string())
            };
            segments.push(parsed);
        }

        Ok(Self { segments })
    }

    /// Number of literal segments; more literals means a more specific pattern.
    pub fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    /// Matches `path` against the pattern and returns the captured values.
    pub fn captures(&self, path: &SourcePath) -> Option<Captures> {
        let parts: Vec<&str> = path.segments().collect();
        let mut captures = Captures::new();

        for (idx, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(literal) => {
                    if parts.get(idx) != Some(&literal.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.get(idx)?;
                    captures.push((name.clone(), (*value).to_string()));
                }
                Segment::Rest(name) => {
                    if idx >= parts.len() {
                        return None;
                    }
                    if let Some(name) = name {
                        captures.push((name.clone(), parts[idx..].join("/")));
                    }
                    return Some(captures);
                }
            }
        }

        (parts.len() == self.segments.len()).then_some(captures)
    }
}

/// Replaces `:name` and `*name` placeholders in `template` with captured values.
///
/// The template is scanned once, so text inside a substituted value is never
/// read as a placeholder. The longest matching name wins, so `:id` does not
/// clobber `:identifier`. Names compare without regard to ASCII case because
/// case-insensitive sources are stored lower-cased.
pub fn substitute(template: &str, captures: &Captures) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(idx) = rest.find(|c: char| c == ':' || c == '*') {
        let (head, tail) = rest.split_at(idx);
        out.push_str(head);
        let (sigil, after) = tail.split_at(1);

        match placeholder(after, captures) {
            Some((len, value)) => {
                out.push_str(value);
                rest = &after[len..];
            }
            None => {
                out.push_str(sigil);
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// The capture whose name starts `text`, with the length of the name.
fn placeholder<'c>(text: &str, captures: &'c Captures) -> Option<(usize, &'c str)> {
    let head = |name: &str| text.get(..name.len());

    captures
        .iter()
        .filter(|(name, _)| head(name.as_str()).is_some_and(|h| h.eq_ignore_ascii_case(name)))
        .max_by_key(|(name, _)| (name.len(), head(name.as_str()) == Some(name.as_str())))
        .map(|(name, value)| (name.len(), value.as_str()))
}
