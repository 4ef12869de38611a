/*
 * Copyright 2026 Stubwire Team
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use crate::model::Request;
use crate::rules::extractor::{Extracted, Extractor};
use crate::rules::overlay::{join_context, Overlay};
use crate::rules::resource::Resource;
use crate::rules::structural;
use http::Method;
use regex::Regex;

/// How an extracted value is compared with the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    Contain,
    StartsWith,
    EndsWith,
    /// Regular expression that must cover the whole value.
    Match,
    /// Path template with `:name` segments and `*` wildcards.
    Path,
    Json,
    Xml,
    XmlStruct,
}

/// Predicate over a request.
#[derive(Debug, Clone)]
pub enum Matcher {
    Any,
    Leaf {
        extractor: Extractor,
        operator: Operator,
        expected: Resource,
    },
    Exist(Extractor),
    And(Vec<Matcher>),
    Or(Vec<Matcher>),
    Not(Box<Matcher>),
}

impl Matcher {
    pub fn leaf(extractor: Extractor, operator: Operator, expected: impl Into<Resource>) -> Self {
        Matcher::Leaf {
            extractor,
            operator,
            expected: expected.into(),
        }
    }

    pub fn equal(extractor: Extractor, expected: impl Into<Resource>) -> Self {
        Self::leaf(extractor, Operator::Equal, expected)
    }

    pub fn pattern(extractor: Extractor, pattern: impl Into<Resource>) -> Self {
        Self::leaf(extractor, Operator::Match, pattern)
    }

    pub fn exist(extractor: Extractor) -> Self {
        Matcher::Exist(extractor)
    }

    pub fn uri(uri: &str) -> Self {
        Self::equal(Extractor::Uri, uri)
    }

    pub fn method(method: Method) -> Self {
        Self::equal(Extractor::Method, method.as_str())
    }

    /// Body equal to `content`.
    pub fn by(content: impl Into<Resource>) -> Self {
        Self::equal(Extractor::Content, content)
    }

    pub fn and(matchers: Vec<Matcher>) -> Self {
        Matcher::And(matchers)
    }

    pub fn or(matchers: Vec<Matcher>) -> Self {
        Matcher::Or(matchers)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(matcher: Matcher) -> Self {
        Matcher::Not(Box::new(matcher))
    }

    pub fn matches(&self, request: &Request) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::Leaf {
                extractor,
                operator,
                expected,
            } => {
                let Some(extracted) = extractor.extract(request) else {
                    return false;
                };
                let expected = match expected.read_for(Some(request)) {
                    Ok(content) => content,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read expected value");
                        return false;
                    }
                };
                operator.compare(&extracted, expected.bytes())
            }
            Matcher::Exist(extractor) => extractor.extract(request).is_some(),
            Matcher::And(matchers) => matchers.iter().all(|matcher| matcher.matches(request)),
            Matcher::Or(matchers) => matchers.iter().any(|matcher| matcher.matches(request)),
            Matcher::Not(matcher) => !matcher.matches(request),
        }
    }

    /// Applies an overlay. `None` means nothing in this matcher changed.
    ///
    /// Under a context, a matcher that does not pin the URI is additionally
    /// restricted to URIs below the prefix.
    pub fn apply(&self, overlay: &Overlay) -> Option<Matcher> {
        if let Overlay::Context(prefix) = overlay {
            if !self.constrains_uri() {
                let scoped = Self::pattern(
                    Extractor::Uri,
                    format!("{}(/.*)?", regex::escape(prefix.trim_end_matches('/'))),
                );
                return Some(match self {
                    Matcher::Any => scoped,
                    _ => Matcher::and(vec![
                        self.apply_inner(overlay).unwrap_or_else(|| self.clone()),
                        scoped,
                    ]),
                });
            }
        }
        self.apply_inner(overlay)
    }

    /// Whether every request this matcher accepts has its URI checked
    /// against an expectation the context rewrites under its prefix.
    fn constrains_uri(&self) -> bool {
        match self {
            Matcher::Leaf {
                extractor,
                operator,
                expected,
            } => {
                extractor.is_uri()
                    && operator.is_scoped_by_context()
                    && expected.as_text().is_some()
            }
            Matcher::And(matchers) => matchers.iter().any(Matcher::constrains_uri),
            Matcher::Or(matchers) => {
                !matchers.is_empty() && matchers.iter().all(Matcher::constrains_uri)
            }
            Matcher::Any | Matcher::Exist(_) | Matcher::Not(_) => false,
        }
    }

    fn apply_inner(&self, overlay: &Overlay) -> Option<Matcher> {
        match self {
            Matcher::Any => None,
            Matcher::Leaf {
                extractor,
                operator,
                expected,
            } => {
                let applied = expected.apply(overlay);
                let resource = applied.as_ref().unwrap_or(expected);
                let scoped = match overlay {
                    Overlay::Context(prefix) if extractor.is_uri() => {
                        scope_uri(prefix, *operator, resource)
                    }
                    _ => None,
                };

                match (scoped, applied) {
                    (Some(scoped), _) | (None, Some(scoped)) => Some(Matcher::Leaf {
                        extractor: extractor.clone(),
                        operator: *operator,
                        expected: scoped,
                    }),
                    (None, None) => None,
                }
            }
            Matcher::Exist(_) => None,
            Matcher::And(matchers) => apply_all(matchers, overlay).map(Matcher::And),
            Matcher::Or(matchers) => apply_all(matchers, overlay).map(Matcher::Or),
            Matcher::Not(matcher) => matcher.apply_inner(overlay).map(Self::not),
        }
    }
}

fn scope_uri(prefix: &str, operator: Operator, expected: &Resource) -> Option<Resource> {
    let uri = expected.as_text()?;
    match operator {
        Operator::Equal | Operator::StartsWith | Operator::Path => {
            Some(Resource::text(join_context(prefix, uri)))
        }
        Operator::Match => Some(Resource::text(format!(
            "{}(?:{})",
            regex::escape(prefix.trim_end_matches('/')),
            uri
        ))),
        _ => None,
    }
}

fn apply_all(matchers: &[Matcher], overlay: &Overlay) -> Option<Vec<Matcher>> {
    let applied: Vec<Option<Matcher>> =
        matchers.iter().map(|m| m.apply_inner(overlay)).collect();
    if applied.iter().all(Option::is_none) {
        return None;
    }

    Some(
        applied
            .into_iter()
            .zip(matchers)
            .map(|(applied, original)| applied.unwrap_or_else(|| original.clone()))
            .collect(),
    )
}

impl Operator {
    fn is_scoped_by_context(self) -> bool {
        matches!(
            self,
            Operator::Equal | Operator::StartsWith | Operator::Path | Operator::Match
        )
    }

    fn compare(self, extracted: &Extracted, expected: &[u8]) -> bool {
        match self {
            Operator::Equal => any_bytes(extracted, |actual| actual == expected),
            Operator::Contain => any_bytes(extracted, |actual| contains(actual, expected)),
            Operator::StartsWith => any_bytes(extracted, |actual| actual.starts_with(expected)),
            Operator::EndsWith => any_bytes(extracted, |actual| actual.ends_with(expected)),
            Operator::Match => {
                let pattern = String::from_utf8_lossy(expected);
                match Regex::new(&format!("^(?:{})$", pattern)) {
                    Ok(regex) => extracted.texts().iter().any(|value| regex.is_match(value)),
                    Err(e) => {
                        tracing::warn!(pattern = %pattern, error = %e, "Invalid match pattern");
                        false
                    }
                }
            }
            Operator::Path => {
                let template = String::from_utf8_lossy(expected);
                let Some(pattern) = compile_path_pattern(&normalize_path(&template)) else {
                    tracing::warn!(template = %template, "Invalid path template");
                    return false;
                };
                extracted
                    .texts()
                    .iter()
                    .any(|value| pattern.is_match(&normalize_path(value)))
            }
            Operator::Json => any_bytes(extracted, |actual| structural::json_equal(actual, expected)),
            Operator::Xml => {
                let expected = String::from_utf8_lossy(expected);
                extracted
                    .texts()
                    .iter()
                    .any(|actual| structural::xml_equal(actual, &expected))
            }
            Operator::XmlStruct => {
                let expected = String::from_utf8_lossy(expected);
                extracted
                    .texts()
                    .iter()
                    .any(|actual| structural::xml_struct_match(actual, &expected))
            }
        }
    }
}

fn any_bytes(extracted: &Extracted, predicate: impl Fn(&[u8]) -> bool) -> bool {
    match extracted {
        Extracted::Text(values) => values.iter().any(|value| predicate(value.as_bytes())),
        Extracted::Binary(bytes) => predicate(bytes),
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

/// Collapses duplicate slashes and drops a trailing slash.
fn normalize_path(path: &str) -> String {
    let mut normalized = String::new();
    let mut last_was_slash = false;

    for c in path.chars() {
        if c == '/' {
            if !last_was_slash {
                normalized.push(c);
                last_was_slash = true;
            }
        } else {
            normalized.push(c);
            last_was_slash = false;
        }
    }

    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }

    if normalized.is_empty() {
        "/".to_string()
    } else {
        normalized
    }
}

fn compile_path_pattern(path: &str) -> Option<Regex> {
    let mut pattern = String::new();
    let mut in_param = false;

    for c in path.chars() {
        match c {
            ':' => {
                in_param = true;
                pattern.push_str("([^/]+)");
            }
            '/' => {
                in_param = false;
                pattern.push_str("\\/");
            }
            '*' => pattern.push_str(".*"),
            _ if in_param => {}
            _ => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }

    Regex::new(&format!("^{}$", pattern)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HttpRequest, SocketRequest};
    use http::HeaderName;

    fn get(uri: &str) -> Request {
        Request::Http(HttpRequest::builder().uri(uri).build())
    }

    fn post(uri: &str, body: &str) -> Request {
        Request::Http(
            HttpRequest::builder()
                .method(Method::POST)
                .uri(uri)
                .content(body)
                .build(),
        )
    }

    #[test]
    fn test_empty_and_is_true_and_empty_or_is_false() {
        let request = get("/");
        assert!(Matcher::and(vec![]).matches(&request));
        assert!(!Matcher::or(vec![]).matches(&request));
    }

    #[test]
    fn test_double_negation() {
        let request = get("/foo");
        for matcher in [Matcher::uri("/foo"), Matcher::uri("/bar")] {
            let doubled = Matcher::not(Matcher::not(matcher.clone()));
            assert_eq!(doubled.matches(&request), matcher.matches(&request));
        }
    }

    #[test]
    fn test_composites() {
        let request = post("/foo", "body");
        let uri = Matcher::uri("/foo");
        let method = Matcher::method(Method::POST);
        let wrong = Matcher::uri("/bar");

        assert!(Matcher::and(vec![uri.clone(), method.clone()]).matches(&request));
        assert!(!Matcher::and(vec![uri.clone(), wrong.clone()]).matches(&request));
        assert!(Matcher::or(vec![wrong.clone(), method]).matches(&request));
        assert!(!Matcher::or(vec![wrong.clone()]).matches(&request));
        assert!(Matcher::not(wrong).matches(&request));
    }

    #[test]
    fn test_regex_is_anchored_to_whole_value() {
        let matcher = Matcher::pattern(Extractor::Uri, "fo+");
        assert!(matcher.matches(&get("foo")));
        assert!(!matcher.matches(&get("xfooy")));

        let alternation = Matcher::pattern(Extractor::Uri, "/a|/b");
        assert!(alternation.matches(&get("/b")));
        assert!(!alternation.matches(&get("/bc")));
    }

    #[test]
    fn test_invalid_regex_never_matches() {
        let matcher = Matcher::pattern(Extractor::Uri, "(unclosed");
        assert!(!matcher.matches(&get("(unclosed")));
    }

    #[test]
    fn test_equal_and_contain() {
        let request = post("/", "hello world");
        assert!(Matcher::by("hello world").matches(&request));
        assert!(!Matcher::by("hello").matches(&request));
        assert!(Matcher::leaf(Extractor::Content, Operator::Contain, "lo wo").matches(&request));
        assert!(Matcher::leaf(Extractor::Content, Operator::StartsWith, "hello").matches(&request));
        assert!(Matcher::leaf(Extractor::Content, Operator::EndsWith, "world").matches(&request));
        assert!(!Matcher::leaf(Extractor::Content, Operator::EndsWith, "hello").matches(&request));
    }

    #[test]
    fn test_binary_equality_is_byte_for_byte() {
        let request = Request::Socket(SocketRequest::new(vec![0u8, 159, 146, 150], "peer"));
        assert!(Matcher::by(Resource::bytes(vec![0u8, 159, 146, 150])).matches(&request));
        assert!(!Matcher::by(Resource::bytes(vec![0u8, 159])).matches(&request));
    }

    #[test]
    fn test_any_value_of_multi_valued_query_matches() {
        let request = get("/?tag=a&tag=b");
        assert!(Matcher::equal(Extractor::query("tag"), "b").matches(&request));
        assert!(!Matcher::equal(Extractor::query("tag"), "c").matches(&request));
    }

    #[test]
    fn test_exist() {
        let request = Request::Http(HttpRequest::builder().header("X-Token", "t").build());
        assert!(Matcher::exist(Extractor::header(HeaderName::from_static("x-token"))).matches(&request));
        assert!(!Matcher::exist(Extractor::header(HeaderName::from_static("x-other"))).matches(&request));
    }

    #[test]
    fn test_missing_attribute_never_matches() {
        let request = get("/");
        assert!(!Matcher::equal(Extractor::cookie("session"), "").matches(&request));
        assert!(!Matcher::by("").matches(&request));
    }

    #[test]
    fn test_json_structural_matcher() {
        let matcher = Matcher::leaf(Extractor::Content, Operator::Json, r#"{"b":2,"a":1}"#);
        assert!(matcher.matches(&post("/", r#"{"a":1,"b":2}"#)));

        let arrays = Matcher::leaf(Extractor::Content, Operator::Json, "[2,1]");
        assert!(!arrays.matches(&post("/", "[1,2]")));
    }

    #[test]
    fn test_xml_struct_matcher_is_asymmetric_on_attribute_names() {
        let expected_subset = Matcher::leaf(Extractor::Content, Operator::XmlStruct, r#"<a x="1"/>"#);
        assert!(expected_subset.matches(&post("/", r#"<a x="1" y="2"/>"#)));

        let expected_superset =
            Matcher::leaf(Extractor::Content, Operator::XmlStruct, r#"<a x="1" z="3"/>"#);
        assert!(!expected_superset.matches(&post("/", r#"<a x="1"/>"#)));
    }

    #[test]
    fn test_path_operator() {
        let matcher = Matcher::leaf(Extractor::Uri, Operator::Path, "/users/:id/posts/*");
        assert!(matcher.matches(&get("/users/42/posts/7")));
        assert!(matcher.matches(&get("//users/42/posts/7/")));
        assert!(!matcher.matches(&get("/users/42")));

        let literal = Matcher::leaf(Extractor::Uri, Operator::Path, "/v1.0/items");
        assert!(literal.matches(&get("/v1.0/items")));
        assert!(!literal.matches(&get("/v1x0/items")));
    }

    #[test]
    fn test_template_expected_value_sees_request() {
        let request = Request::Http(
            HttpRequest::builder()
                .uri("/echo")
                .header("X-Expected", "/echo")
                .build(),
        );
        let matcher = Matcher::equal(
            Extractor::Uri,
            Resource::template(Resource::text("{{req.headers.x-expected}}")),
        );
        assert!(matcher.matches(&request));
    }

    #[test]
    fn test_context_overlay_scopes_uri_matchers() {
        let overlay = Overlay::context("/api");

        let equal = Matcher::uri("/users").apply(&overlay).unwrap();
        assert!(equal.matches(&get("/api/users")));
        assert!(!equal.matches(&get("/users")));

        let pattern = Matcher::pattern(Extractor::Uri, "/users/[0-9]+")
            .apply(&overlay)
            .unwrap();
        assert!(pattern.matches(&get("/api/users/12")));

        let any = Matcher::Any.apply(&overlay).unwrap();
        assert!(any.matches(&get("/api")));
        assert!(any.matches(&get("/api/anything")));
        assert!(!any.matches(&get("/apiary")));
    }

    #[test]
    fn test_overlay_leaves_unaffected_matchers_alone() {
        assert!(Matcher::uri("/x").apply(&Overlay::file_root("/tmp")).is_none());
        assert!(Matcher::method(Method::GET)
            .apply(&Overlay::file_root("/tmp"))
            .is_none());
    }

    #[test]
    fn test_context_restricts_matchers_without_uri() {
        let overlay = Overlay::context("/api");

        let method = Matcher::method(Method::GET).apply(&overlay).unwrap();
        assert!(method.matches(&get("/api/users")));
        assert!(!method.matches(&get("/users")));

        let negated = Matcher::not(Matcher::uri("/admin")).apply(&overlay).unwrap();
        assert!(negated.matches(&get("/api/users")));
        assert!(!negated.matches(&get("/api/admin")));
        assert!(!negated.matches(&get("/users")));
    }

    #[test]
    fn test_context_keeps_every_uri_operator_under_prefix() {
        let overlay = Overlay::context("/api");

        let contain = Matcher::leaf(Extractor::Uri, Operator::Contain, "users")
            .apply(&overlay)
            .unwrap();
        assert!(contain.matches(&get("/api/users")));
        assert!(!contain.matches(&get("/users")));

        let ends_with = Matcher::leaf(Extractor::Uri, Operator::EndsWith, ".json")
            .apply(&overlay)
            .unwrap();
        assert!(ends_with.matches(&get("/api/data.json")));
        assert!(!ends_with.matches(&get("/data.json")));

        let alternation = Matcher::pattern(Extractor::Uri, "/a|/b").apply(&overlay).unwrap();
        assert!(alternation.matches(&get("/api/a")));
        assert!(alternation.matches(&get("/api/b")));
        assert!(!alternation.matches(&get("/b")));
        assert!(!alternation.matches(&get("/a")));

        let templated = Matcher::equal(
            Extractor::Uri,
            Resource::template(Resource::text("/{{req.method}}")),
        )
        .apply(&overlay)
        .unwrap();
        assert!(!templated.matches(&get("/GET")));
    }

    #[test]
    fn test_composite_overlay_rebuilds_only_changed_children() {
        let overlay = Overlay::context("/api");
        let matcher = Matcher::and(vec![Matcher::method(Method::GET), Matcher::uri("/users")]);

        match matcher.apply(&overlay) {
            Some(Matcher::And(children)) => {
                assert!(matches!(
                    &children[0],
                    Matcher::Leaf { extractor: Extractor::Method, .. }
                ));
                assert!(children[1].matches(&get("/api/users")));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
