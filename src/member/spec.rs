use regex::Regex;

use crate::error::{CubeError, CubeResult};

/// What a member specification asks for, before any lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberSpec {
    /// `Name` or `Parent.Name`.
    Member {
        parent: Option<String>,
        name: String,
    },
    /// `{ListName}` or `{Top.ListName}`.
    List { top: Option<String>, list: String },
}

/// Recognises the two specification forms. Braces and dots are reserved, so
/// a string matches at most one form; anything matching neither is rejected.
#[derive(Debug)]
pub struct SpecParser {
    member_list: Regex,
    member: Regex,
}

impl SpecParser {
    pub fn new() -> CubeResult<Self> {
        Ok(Self {
            member_list: Regex::new(r"^\{(?:([^.{}]+)\.)?([^.{}]+)\}$")?,
            member: Regex::new(r"^(?:([^.{}]+)\.)?([^.{}]+)$")?,
        })
    }

    pub fn parse(&self, dimension: &str, text: &str) -> CubeResult<MemberSpec> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(CubeError::EmptySpecification {
                dimension: dimension.to_string(),
            });
        }

        if let Some(captures) = self.member_list.captures(trimmed) {
            let top = optional_part(captures.get(1).map(|m| m.as_str()), text)?;
            let list = required_part(captures.get(2).map(|m| m.as_str()), text)?;
            return Ok(MemberSpec::List { top, list });
        }

        if let Some(captures) = self.member.captures(trimmed) {
            let parent = optional_part(captures.get(1).map(|m| m.as_str()), text)?;
            let name = required_part(captures.get(2).map(|m| m.as_str()), text)?;
            return Ok(MemberSpec::Member { parent, name });
        }

        Err(malformed(text))
    }
}

fn optional_part(part: Option<&str>, text: &str) -> CubeResult<Option<String>> {
    part.map(|value| required_part(Some(value), text)).transpose()
}

fn required_part(part: Option<&str>, text: &str) -> CubeResult<String> {
    let value = part.map(str::trim).unwrap_or("");
    if value.is_empty() {
        return Err(malformed(text));
    }
    Ok(value.to_string())
}

fn malformed(text: &str) -> CubeError {
    CubeError::MalformedSpecification {
        spec: text.to_string(),
    }
}
