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

//! Structural comparison of JSON and XML documents.
//!
//! Unparseable input on either side never matches.

use roxmltree::{Document, Node, NodeType};

/// Objects compare as maps (key order is irrelevant), arrays element by element.
pub fn json_equal(actual: &[u8], expected: &[u8]) -> bool {
    let actual: serde_json::Value = match serde_json::from_slice(actual) {
        Ok(value) => value,
        Err(_) => return false,
    };
    let expected: serde_json::Value = match serde_json::from_slice(expected) {
        Ok(value) => value,
        Err(_) => return false,
    };

    actual == expected
}

/// Exact document equality: names, attribute names and values, text.
/// Whitespace-only text, comments and processing instructions are ignored.
pub fn xml_equal(actual: &str, expected: &str) -> bool {
    compare_documents(actual, expected, exact_match)
}

/// Shape-only equality.
///
/// Tag names and child structure must agree. Attributes are compared by
/// name only and one way: every attribute named on the expected element
/// must be present on the actual element, extra attributes on the actual
/// element are accepted, and values are never compared. Text content is
/// not compared either.
pub fn xml_struct_match(actual: &str, expected: &str) -> bool {
    compare_documents(actual, expected, struct_match)
}

fn compare_documents(actual: &str, expected: &str, compare: fn(Node, Node) -> bool) -> bool {
    let actual = match Document::parse(actual.trim()) {
        Ok(document) => document,
        Err(e) => {
            tracing::debug!(error = %e, "Actual content is not XML");
            return false;
        }
    };
    let expected = match Document::parse(expected.trim()) {
        Ok(document) => document,
        Err(e) => {
            tracing::warn!(error = %e, "Expected XML does not parse");
            return false;
        }
    };

    compare(actual.root(), expected.root())
}

fn significant_children<'a, 'input>(node: Node<'a, 'input>) -> Vec<Node<'a, 'input>> {
    node.children()
        .filter(|child| match child.node_type() {
            NodeType::Element => true,
            NodeType::Text => child.text().map(|t| !t.trim().is_empty()).unwrap_or(false),
            _ => false,
        })
        .collect()
}

fn children_match(actual: Node, expected: Node, compare: fn(Node, Node) -> bool) -> bool {
    let actual = significant_children(actual);
    let expected = significant_children(expected);

    actual.len() == expected.len()
        && actual
            .into_iter()
            .zip(expected)
            .all(|(actual, expected)| compare(actual, expected))
}

fn exact_match(actual: Node, expected: Node) -> bool {
    if actual.node_type() != expected.node_type() {
        return false;
    }

    match expected.node_type() {
        NodeType::Root => children_match(actual, expected, exact_match),
        NodeType::Element => {
            actual.tag_name() == expected.tag_name()
                && actual.attributes().count() == expected.attributes().count()
                && expected.attributes().all(|attribute| {
                    actual.attributes().any(|candidate| {
                        candidate.name() == attribute.name()
                            && candidate.namespace() == attribute.namespace()
                            && candidate.value() == attribute.value()
                    })
                })
                && children_match(actual, expected, exact_match)
        }
        NodeType::Text => {
            actual.text().map(str::trim) == expected.text().map(str::trim)
        }
        _ => true,
    }
}

fn struct_match(actual: Node, expected: Node) -> bool {
    if actual.node_type() != expected.node_type() {
        return false;
    }

    match expected.node_type() {
        NodeType::Root => children_match(actual, expected, struct_match),
        NodeType::Element => {
            actual.tag_name().name() == expected.tag_name().name()
                && children_match(actual, expected, struct_match)
                && expected.attributes().all(|attribute| {
                    actual.attributes().any(|candidate| {
                        candidate.name() == attribute.name()
                            && candidate.namespace() == attribute.namespace()
                    })
                })
        }
        _ => true,
    }
}
