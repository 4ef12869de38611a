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

pub mod extractor;
pub mod handler;
pub mod matcher;
pub mod overlay;
pub mod resource;
pub mod structural;
pub mod template;

use crate::action::RequestAction;
use crate::error::HandlerError;
use crate::model::SessionContext;
use handler::ResponseHandler;
use matcher::Matcher;
use overlay::Overlay;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct Rule {
    matcher: Matcher,
    handler: ResponseHandler,
    on_complete: Vec<RequestAction>,
}

impl Rule {
    pub fn new(matcher: Matcher, handler: ResponseHandler) -> Self {
        Self {
            matcher,
            handler,
            on_complete: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: RequestAction) -> Self {
        self.on_complete.push(action);
        self
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn handler(&self) -> &ResponseHandler {
        &self.handler
    }

    /// Applies an overlay. `None` means the rule is unaffected.
    pub fn apply(&self, overlay: &Overlay) -> Option<Rule> {
        let matcher = self.matcher.apply(overlay);
        let mut handler = self.handler.apply(overlay);
        let actions: Vec<Option<RequestAction>> = self
            .on_complete
            .iter()
            .map(|action| action.apply(overlay))
            .collect();

        if let Overlay::ResponseHeader { name, value } = overlay {
            let base = handler.unwrap_or_else(|| self.handler.clone());
            handler = Some(ResponseHandler::composite(vec![
                base,
                ResponseHandler::Header {
                    name: name.clone(),
                    value: value.clone(),
                },
            ]));
        }

        if matcher.is_none() && handler.is_none() && actions.iter().all(Option::is_none) {
            return None;
        }

        Some(Rule {
            matcher: matcher.unwrap_or_else(|| self.matcher.clone()),
            handler: handler.unwrap_or_else(|| self.handler.clone()),
            on_complete: actions
                .into_iter()
                .zip(&self.on_complete)
                .map(|(applied, original)| applied.unwrap_or_else(|| original.clone()))
                .collect(),
        })
    }
}

/// Ordered rules; the first whose matcher accepts a request answers it.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Arc<Rule>>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules: rules.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    /// Runs the first matching rule against the context.
    ///
    /// Returns `Ok(false)` and leaves the response untouched when no rule
    /// matches. Completion actions of the winning rule run after its handler.
    pub async fn resolve(&self, context: &mut SessionContext) -> Result<bool, HandlerError> {
        for (index, rule) in self.rules.iter().enumerate() {
            if !rule.matcher.matches(context.request()) {
                continue;
            }

            info!(rule = index, "Rule matched");
            rule.handler.handle(context).await?;

            for action in &rule.on_complete {
                action.execute(context.request()).await;
            }
            return Ok(true);
        }

        debug!(rules = self.rules.len(), "No rule matched");
        Ok(false)
    }

    /// Rules of `self` followed by rules of `other`.
    pub fn concat(&self, other: &RuleSet) -> RuleSet {
        RuleSet {
            rules: self.rules.iter().chain(&other.rules).cloned().collect(),
        }
    }

    /// Applies an overlay to every rule. Unchanged rules are shared, not copied.
    pub fn apply(&self, overlay: &Overlay) -> RuleSet {
        RuleSet {
            rules: self
                .rules
                .iter()
                .map(|rule| match rule.apply(overlay) {
                    Some(applied) => Arc::new(applied),
                    None => Arc::clone(rule),
                })
                .collect(),
        }
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<T: IntoIterator<Item = Rule>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
