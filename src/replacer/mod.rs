use crate::blueprint::Subrequest;
use crate::error::{Result, SubrequestsError};
use crate::runtime::response::SubResponse;
use regex::Regex;
use serde_json::Value;
use serde_json_path::JsonPath;

/// Where a token was found. Tokens in the URI are expanded before tokens in
/// the body; a subrequest carrying both resolves across two passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenLocation {
    Uri,
    Body,
}

impl TokenLocation {
    fn as_str(self) -> &'static str {
        match self {
            TokenLocation::Uri => "uri",
            TokenLocation::Body => "body",
        }
    }
}

/// A parsed `{{sourceId.body@$.json.path}}` token.
#[derive(Debug, Clone)]
struct Token {
    /// The full literal, including the delimiters. Substitution target.
    text: String,
    /// The request ID the token points at, `.body` suffix stripped.
    source_id: String,
    /// The JSONPath query to run against the subject bodies.
    query: String,
}

/// All resolutions of one distinct token, concatenated over every subject
/// response in pool order.
#[derive(Debug, Clone)]
struct TokenGroup {
    token: String,
    values: Vec<String>,
}

/// One coordinate of a cartesian-product point.
#[derive(Debug, Clone)]
struct Replacement {
    token: String,
    value: String,
}

/// Replaces JSONPath tokens in subrequests with values from prior responses.
///
/// One input subrequest can fan out into N output subrequests, because a
/// JSONPath expression can yield multiple values and a referenced subrequest
/// can itself have fanned out into multiple responses.
pub struct JsonPathReplacer {
    pattern: Regex,
}

impl JsonPathReplacer {
    pub fn new() -> Self {
        // Matches e.g. "{{req1.body@$.data.attributes.seasons..id}}".
        let pattern = Regex::new(r"\{\{([^{}]+\.[^{}]+)@([^{}]+)\}\}")
            .expect("token pattern is a valid regex");
        Self { pattern }
    }

    /// Performs the replacements for a whole wave.
    pub fn replace_batch(
        &self,
        batch: Vec<Subrequest>,
        pool: &[SubResponse],
    ) -> Result<Vec<Subrequest>> {
        let mut carry = Vec::new();
        for subrequest in batch {
            carry.extend(self.replace_item(subrequest, pool)?);
        }
        Ok(carry)
    }

    fn replace_item(
        &self,
        mut subrequest: Subrequest,
        pool: &[SubResponse],
    ) -> Result<Vec<Subrequest>> {
        let uri_replacements =
            self.extract_token_replacements(&subrequest, TokenLocation::Uri, pool)?;
        if !uri_replacements.is_empty() {
            // Only the URI tokens are expanded in this pass. The recursion
            // picks up the body tokens on each URI-resolved clone.
            let expanded =
                replace_tokens_in_location(&uri_replacements, &subrequest, TokenLocation::Uri)?;
            return self.replace_batch(expanded, pool);
        }
        let body_replacements =
            self.extract_token_replacements(&subrequest, TokenLocation::Body, pool)?;
        if !body_replacements.is_empty() {
            let expanded =
                replace_tokens_in_location(&body_replacements, &subrequest, TokenLocation::Body)?;
            return self.replace_batch(expanded, pool);
        }
        // Nothing to replace, the subrequest goes through as-is.
        subrequest.resolved = true;
        Ok(vec![subrequest])
    }

    /// Detects the tokens in one location and resolves each against the pool.
    ///
    /// Groups are returned in token discovery order; values inside a group
    /// follow pool order. Both orders feed the cartesian product, which in
    /// turn fixes the final response ordering.
    fn extract_token_replacements(
        &self,
        subrequest: &Subrequest,
        location: TokenLocation,
        pool: &[SubResponse],
    ) -> Result<Vec<TokenGroup>> {
        let subject = serialize_member(location, subrequest)?;
        let mut groups = Vec::new();
        for token in self.find_tokens(&subject) {
            // A response is a subject if it matches the content ID or is a
            // fan-out copy derived from it.
            let subjects: Vec<&SubResponse> = pool
                .iter()
                .filter(|response| {
                    let content_id = response.content_id();
                    content_id == token.source_id
                        || content_id
                            .strip_prefix(token.source_id.as_str())
                            .is_some_and(|rest| rest.starts_with('#'))
                })
                .collect();
            if subjects.is_empty() {
                let mut candidates = Vec::new();
                for response in pool {
                    let candidate = response.base_content_id().to_string();
                    if !candidates.contains(&candidate) {
                        candidates.push(candidate);
                    }
                }
                return Err(SubrequestsError::UnresolvableToken {
                    id: token.source_id,
                    candidates,
                });
            }
            let path = JsonPath::parse(&token.query).map_err(|e| {
                SubrequestsError::InvalidReplacementValue(format!(
                    "\"{}\" is not a valid JSONPath query: {e}",
                    token.query
                ))
            })?;
            let mut values = Vec::new();
            for subject in subjects {
                let body: Value = serde_json::from_str(&subject.body).map_err(|_| {
                    SubrequestsError::InvalidReplacementValue(format!(
                        "the body of {} is not structured data",
                        subject.content_id()
                    ))
                })?;
                values.extend(validate_replacements(path.query(&body).all())?);
            }
            groups.push(TokenGroup {
                token: token.text,
                values,
            });
        }
        Ok(groups)
    }

    /// Finds and parses the tokens in a string. Duplicated tokens are folded
    /// into one, keeping first-seen order.
    fn find_tokens(&self, subject: &str) -> Vec<Token> {
        let mut found: Vec<Token> = Vec::new();
        for captures in self.pattern.captures_iter(subject) {
            let text = captures[0].to_string();
            if found.iter().any(|token| token.text == text) {
                continue;
            }
            // Only body-sourced tokens are supported, so the location part
            // of the source reference is dropped.
            let source_id = captures[1]
                .strip_suffix(".body")
                .unwrap_or(&captures[1])
                .to_string();
            found.push(Token {
                text,
                source_id,
                query: captures[2].to_string(),
            });
        }
        found
    }
}

impl Default for JsonPathReplacer {
    fn default() -> Self {
        Self::new()
    }
}

/// Clones the subrequest once per cartesian-product point and substitutes
/// the token literals in the chosen location.
fn replace_tokens_in_location(
    groups: &[TokenGroup],
    subrequest: &Subrequest,
    location: TokenLocation,
) -> Result<Vec<Subrequest>> {
    let grouped_by_token: Vec<Vec<Replacement>> = groups
        .iter()
        .map(|group| {
            group
                .values
                .iter()
                .map(|value| Replacement {
                    token: group.token.clone(),
                    value: value.clone(),
                })
                .collect()
        })
        .collect();
    let mut replacements = Vec::new();
    for (index, point) in points(&grouped_by_token).into_iter().enumerate() {
        let mut cloned = subrequest.clone();
        cloned.request_id = format!(
            "{}#{}{{{}}}",
            subrequest.request_id,
            location.as_str(),
            index
        );
        // All the different replacements happen on the same subject.
        let mut token_subject = serialize_member(location, subrequest)?;
        for replacement in &point {
            token_subject = token_subject.replace(&replacement.token, &replacement.value);
        }
        deserialize_member(location, token_subject, &mut cloned)?;
        replacements.push(cloned);
    }
    Ok(replacements)
}

/// Cartesian product of the token groups, row-major: the first discovered
/// token is the outermost (slowest varying) coordinate.
fn points(grouped_by_token: &[Vec<Replacement>]) -> Vec<Vec<Replacement>> {
    let Some((current_group, rest)) = grouped_by_token.split_first() else {
        return Vec::new();
    };
    if rest.is_empty() {
        return current_group.iter().map(|item| vec![item.clone()]).collect();
    }
    let next_points = points(rest);
    let mut output = Vec::new();
    for resolution in current_group {
        for next_point in &next_points {
            let mut point = vec![resolution.clone()];
            point.extend(next_point.iter().cloned());
            output.push(point);
        }
    }
    output
}

/// Treats 'uri' and 'body' replacements the same way by working on text.
fn serialize_member(location: TokenLocation, subrequest: &Subrequest) -> Result<String> {
    match location {
        TokenLocation::Uri => Ok(subrequest.uri.clone()),
        TokenLocation::Body => serde_json::to_string(&subrequest.body)
            .map_err(|e| SubrequestsError::InvalidReplacementValue(e.to_string())),
    }
}

/// Undoes `serialize_member` after the substitutions happened.
fn deserialize_member(
    location: TokenLocation,
    serialized: String,
    subrequest: &mut Subrequest,
) -> Result<()> {
    match location {
        TokenLocation::Uri => subrequest.uri = serialized,
        TokenLocation::Body => {
            // Substitution is verbatim, so a non-idempotent value can break
            // the serialized body. That is on the caller.
            subrequest.body = serde_json::from_str(&serialized).map_err(|e| {
                SubrequestsError::InvalidReplacementValue(format!(
                    "the replaced body of {} is no longer valid JSON: {e}",
                    subrequest.request_id
                ))
            })?;
        }
    }
    Ok(())
}

/// The replacements need to be strings or integers. Anything else is not a
/// valid substitution value.
fn validate_replacements(yielded: Vec<&Value>) -> Result<Vec<String>> {
    let is_valid = yielded.iter().all(|value| match value {
        Value::String(_) => true,
        Value::Number(number) => number.is_i64() || number.is_u64(),
        _ => false,
    });
    if !is_valid {
        let found = serde_json::to_string(&yielded).unwrap_or_default();
        return Err(SubrequestsError::InvalidReplacementValue(found));
    }
    Ok(yielded
        .into_iter()
        .map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect())
}
