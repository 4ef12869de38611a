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

use crate::error::HandlerError;
use crate::model::dump::{dump_request, dump_response};
use crate::model::{Request, Response, SessionContext};
use crate::monitor::Monitor;
use crate::rules::RuleSet;
use arc_swap::ArcSwap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Outcome of one exchange, for the transport to serialize.
#[derive(Debug)]
pub enum Exchange {
    Handled(Response),
    Unmatched,
    Failed(HandlerError),
}

/// Resolves requests against the live rule set and reports to the monitor.
///
/// The rule set sits behind an [`ArcSwap`]; a reload swaps in a whole new
/// set while in-flight exchanges finish on the old one.
#[derive(Clone)]
pub struct Dispatcher {
    rules: Arc<ArcSwap<RuleSet>>,
    monitor: Arc<dyn Monitor>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("rules", &self.rules.load().len())
            .field("monitor", &self.monitor)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(rules: RuleSet, monitor: Arc<dyn Monitor>) -> Self {
        Self {
            rules: Arc::new(ArcSwap::from_pointee(rules)),
            monitor,
        }
    }

    pub fn rules(&self) -> Arc<RuleSet> {
        self.rules.load_full()
    }

    /// Replaces the live rule set.
    pub fn reload(&self, rules: RuleSet) {
        self.rules.store(Arc::new(rules));
    }

    pub async fn dispatch(&self, request: Request) -> Exchange {
        let socket = matches!(request, Request::Socket(_));
        notify("before_dispatch", self.monitor.before_dispatch(&dump_request(&request)));

        let rules = self.rules.load_full();
        let mut context = SessionContext::new(request);

        match rules.resolve(&mut context).await {
            Ok(true) => {
                let response = context.into_response();
                notify(
                    "after_dispatch",
                    self.monitor.after_dispatch(&dump_response(&response, socket)),
                );
                Exchange::Handled(response)
            }
            Ok(false) => {
                notify(
                    "on_unmatched",
                    self.monitor.on_unmatched(&dump_request(context.request())),
                );
                Exchange::Unmatched
            }
            Err(e) => {
                notify("on_error", self.monitor.on_error(&e.to_string()));
                Exchange::Failed(e)
            }
        }
    }

    /// Reports a failure that happened outside rule resolution, such as a
    /// broken connection.
    pub fn report_error(&self, error: &str) {
        notify("on_error", self.monitor.on_error(error));
    }
}

fn notify(hook: &'static str, result: anyhow::Result<()>) {
    if let Err(e) = result {
        warn!(hook = hook, error = %e, "Monitor hook failed");
    }
}
