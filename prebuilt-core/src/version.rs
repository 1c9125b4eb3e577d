//! Discovery of available versions and selection of the one to install.
use crate::{
    Result, error,
    http::{HeaderMap, HttpClient, LINK, StatusCode, until_cancelled},
};
use semver::{Version, VersionReq};
use serde_json_path::JsonPath;
use snafu::ResultExt;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Constraint values that mean "any version".
const UNCONSTRAINED: &[&str] = &["", "*", "latest"];

const OPERATOR_CHARS: &[char] = &['<', '>', '=', '!', '~', '^'];

/// Resolve `constraint` to a concrete version using the listing at `versions_url`.
///
/// Providers that cannot list versions have no versions URL; for them the constraint is the
/// version and is returned unchanged.
pub async fn resolve_version(
    client: &HttpClient,
    versions_url: &str,
    path: &str,
    constraint: &str,
    prefix: &str,
    cancel: &CancellationToken,
) -> Result<String> {
    if versions_url.is_empty() {
        return Ok(constraint.to_string());
    }

    let versions = get_versions(client, versions_url, path, cancel).await?;
    tracing::debug!(
        url = versions_url,
        count = versions.len(),
        "Retrieved available versions"
    );

    find_latest_version(&versions, constraint, prefix)
}

/// Fetch the JSON document at `url` and every page linked from it with `Link: <...>; rel="next"`,
/// returning the non-empty strings selected by the JSONPath expression `path`, in page order.
pub async fn get_versions(
    client: &HttpClient,
    url: &str,
    path: &str,
    cancel: &CancellationToken,
) -> Result<Vec<String>> {
    let expression = JsonPath::parse(path).map_err(|e| error::Error::InvalidPathExpression {
        expression: path.to_string(),
        message: e.to_string(),
    })?;

    let mut versions = Vec::new();
    let mut visited = HashSet::new();
    let mut next = Some(url.to_string());

    while let Some(page_url) = next.take() {
        if !visited.insert(page_url.clone()) {
            tracing::warn!(url = %page_url, "Pagination links back to a page that was already read");
            break;
        }

        tracing::debug!(url = %page_url, "Fetching versions page");
        let response = until_cancelled(cancel, client.get(&page_url)).await?;
        let status = response.status();
        next = next_link(&page_url, response.headers());

        let body = until_cancelled(cancel, async {
            response
                .text()
                .await
                .with_context(|_| error::HttpRequestSnafu { url: &page_url })
        })
        .await?;

        if status != StatusCode::OK {
            return error::ProviderHttpSnafu {
                url: page_url,
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        let document: serde_json::Value = serde_json::from_str(&body)
            .with_context(|_| error::InvalidVersionsResponseSnafu { url: &page_url })?;

        for node in expression.query(&document).all() {
            match node.as_str() {
                Some("") => {}
                Some(version) => versions.push(version.to_string()),
                None => tracing::trace!(value = %node, "Ignoring non-string version"),
            }
        }
    }

    Ok(versions)
}

/// The target of the `rel="next"` link in the `Link` headers, resolved against the URL of the
/// page that carried it.
fn next_link(page_url: &str, headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|link| {
            let mut parts = link.split(';');
            let target = parts
                .next()?
                .trim()
                .strip_prefix('<')?
                .strip_suffix('>')?;

            let is_next = parts.any(|param| {
                let Some((key, value)) = param.split_once('=') else {
                    return false;
                };
                key.trim().eq_ignore_ascii_case("rel")
                    && value
                        .trim()
                        .trim_matches('"')
                        .split_whitespace()
                        .any(|rel| rel.eq_ignore_ascii_case("next"))
            });
            if !is_next {
                return None;
            }

            Url::parse(page_url)
                .and_then(|base| base.join(target))
                .map(String::from)
                .ok()
        })
}

/// Pick the highest version in `versions` that satisfies `constraint`.
///
/// `prefix` is a string that release tags carry in front of the version, such as `jq-` in
/// `jq-1.7.1`.  It is stripped from the candidates and the constraint before comparing; candidates
/// without it are not considered.  The version is returned exactly as it appears in `versions`.
///
/// Candidates that are not versions are ignored.  Prereleases are only selected if the constraint
/// names a prerelease of the same `major.minor.patch`.
pub fn find_latest_version(versions: &[String], constraint: &str, prefix: &str) -> Result<String> {
    let requirement = Constraint::parse(constraint, prefix)?;

    let mut candidates: Vec<(Version, &String)> = versions
        .iter()
        .filter_map(|raw| {
            let version = parse_version(raw.strip_prefix(prefix)?)?;
            requirement.matches(&version).then_some((version, raw))
        })
        .collect();

    candidates.sort_by(|(a, _), (b, _)| b.cmp_precedence(a));

    match candidates.first() {
        Some((_, raw)) => Ok((*raw).clone()),
        None => error::NoMatchingVersionSnafu { constraint }.fail(),
    }
}

/// Parse a version leniently: a leading `v` is ignored and missing minor and patch numbers are
/// taken to be zero.
fn parse_version(text: &str) -> Option<Version> {
    let text = strip_v(text);
    let (core, suffix) = match text.find(['-', '+']) {
        Some(index) => text.split_at(index),
        None => (text, ""),
    };

    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() > 3 || parts.iter().any(|part| part.is_empty()) {
        return None;
    }

    let mut normalized = parts.join(".");
    for _ in parts.len()..3 {
        normalized.push_str(".0");
    }
    normalized.push_str(suffix);

    Version::parse(&normalized).ok()
}

fn strip_v(text: &str) -> &str {
    match text.strip_prefix(['v', 'V']) {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
        _ => text,
    }
}

/// A version constraint: one or more `||`-separated alternatives, each a set of comparators that
/// must all hold.
#[derive(Debug)]
struct Constraint {
    alternatives: Vec<Alternative>,
}

#[derive(Debug)]
struct Alternative {
    requirement: VersionReq,

    /// Versions excluded with `!=`
    excluded: Vec<VersionReq>,
}

impl Constraint {
    fn parse(constraint: &str, prefix: &str) -> Result<Self> {
        let trimmed = constraint.trim();
        if UNCONSTRAINED.contains(&trimmed) {
            return Ok(Self {
                alternatives: vec![Alternative {
                    requirement: VersionReq::STAR,
                    excluded: Vec::new(),
                }],
            });
        }

        let alternatives = trimmed
            .split("||")
            .map(|alternative| Alternative::parse(constraint, alternative, prefix))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { alternatives })
    }

    fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|alternative| {
            alternative.requirement.matches(version)
                && !alternative
                    .excluded
                    .iter()
                    .any(|excluded| excluded.matches(version))
        })
    }
}

impl Alternative {
    /// Translate one alternative into `semver` syntax.
    ///
    /// Comparators may be separated by commas or whitespace, a bare version is an exact match
    /// rather than a caret requirement, and `A - B` is the inclusive range `>=A, <=B`.
    fn parse(constraint: &str, alternative: &str, prefix: &str) -> Result<Self> {
        let mut comparators: Vec<String> = Vec::new();
        let mut excluded = Vec::new();
        let mut pending_operator = String::new();
        let mut in_range = false;

        let pieces = alternative
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|piece| !piece.is_empty());

        for piece in pieces {
            if piece == "-" {
                match comparators.last_mut() {
                    Some(lower) if lower.starts_with('=') && !in_range => {
                        *lower = format!(">{}", lower);
                        in_range = true;
                        continue;
                    }
                    _ => return malformed(constraint, "a range needs a plain version on each side of `-`"),
                }
            }

            if piece.chars().all(|c| OPERATOR_CHARS.contains(&c)) {
                pending_operator.push_str(piece);
                continue;
            }

            let operator_len = piece.len() - piece.trim_start_matches(OPERATOR_CHARS).len();
            let (inline_operator, version) = piece.split_at(operator_len);
            let mut operator = std::mem::take(&mut pending_operator) + inline_operator;

            let version = version.strip_prefix(prefix).unwrap_or(version);
            let version = strip_v(version);

            if std::mem::take(&mut in_range) {
                if !operator.is_empty() {
                    return malformed(constraint, "a range needs a plain version on each side of `-`");
                }
                operator = "<=".to_string();
            }

            match operator.as_str() {
                "!=" => {
                    excluded.push(parse_requirement(constraint, &format!("={version}"))?);
                }
                "" if is_wildcard(version) => comparators.push(version.to_string()),
                "" | "==" => comparators.push(format!("={version}")),
                _ => comparators.push(format!("{operator}{version}")),
            }
        }

        if in_range {
            return malformed(constraint, "a range needs a plain version on each side of `-`");
        }
        if !pending_operator.is_empty() {
            return malformed(constraint, "an operator must be followed by a version");
        }

        let requirement = if comparators.is_empty() {
            VersionReq::STAR
        } else {
            parse_requirement(constraint, &comparators.join(", "))?
        };

        Ok(Self {
            requirement,
            excluded,
        })
    }
}

fn is_wildcard(version: &str) -> bool {
    version
        .split('.')
        .any(|part| matches!(part, "*" | "x" | "X"))
}

fn parse_requirement(constraint: &str, requirement: &str) -> Result<VersionReq> {
    VersionReq::parse(requirement).with_context(|_| error::InvalidConstraintSnafu { constraint })
}

fn malformed<T>(constraint: &str, reason: &'static str) -> Result<T> {
    error::MalformedConstraintSnafu { constraint, reason }.fail()
}
