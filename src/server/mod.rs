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

pub mod app;
pub mod dispatcher;
pub mod handlers;
pub mod socket;
pub mod tls;

pub use app::{run_http, AppState};
pub use dispatcher::{Dispatcher, Exchange};
pub use handlers::request_handler;

use crate::error::MergeError;
use crate::monitor::{CompositeMonitor, LogMonitor, Monitor};
use crate::rules::RuleSet;
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_MAX_REQUEST_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// HTTP, or HTTPS when the binding carries a TLS identity.
    Http,
    Socket,
}

impl TransportKind {
    fn name(&self) -> &'static str {
        match self {
            TransportKind::Http => "http",
            TransportKind::Socket => "socket",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsIdentity {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub host: String,
    /// `0` leaves the choice to the operating system.
    pub port: u16,
    pub transport: TransportKind,
    pub tls: Option<TlsIdentity>,
    pub workers: usize,
    pub max_request_size: usize,
}

impl Binding {
    pub fn new(transport: TransportKind) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            transport,
            tls: None,
            workers: 4,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A rule set bound to a transport.
#[derive(Debug, Clone)]
pub struct StubServer {
    binding: Binding,
    rules: RuleSet,
    monitors: Vec<Arc<dyn Monitor>>,
    quiet: bool,
}

impl StubServer {
    pub fn new(binding: Binding, rules: RuleSet) -> Self {
        Self {
            binding,
            rules,
            monitors: Vec::new(),
            quiet: false,
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn Monitor>) -> Self {
        self.monitors.push(monitor);
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    pub fn binding_mut(&mut self) -> &mut Binding {
        &mut self.binding
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Monitor notified around every dispatch: the log unless quiet, plus
    /// any attached monitors.
    pub fn monitor(&self) -> Arc<dyn Monitor> {
        let mut monitors = Vec::with_capacity(self.monitors.len() + 1);
        if !self.quiet {
            monitors.push(Arc::new(LogMonitor) as Arc<dyn Monitor>);
        }
        monitors.extend(self.monitors.iter().cloned());
        Arc::new(CompositeMonitor::new(monitors))
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.rules.clone(), self.monitor())
    }

    /// Combines two servers of the same transport.
    ///
    /// Rules of `self` come first. The port of `self` wins unless it is `0`,
    /// the first TLS identity wins, and the result is quiet only when both
    /// servers are.
    pub fn merge(self, other: StubServer) -> Result<StubServer, MergeError> {
        if self.binding.transport != other.binding.transport {
            return Err(MergeError::IncompatibleTransport {
                left: self.binding.transport.name(),
                right: other.binding.transport.name(),
            });
        }

        let port = if self.binding.port != 0 {
            self.binding.port
        } else {
            other.binding.port
        };

        let binding = Binding {
            port,
            tls: self.binding.tls.clone().or(other.binding.tls),
            ..self.binding
        };

        let mut monitors = self.monitors;
        monitors.extend(other.monitors);

        Ok(StubServer {
            binding,
            rules: self.rules.concat(&other.rules),
            monitors,
            quiet: self.quiet && other.quiet,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::handler::ResponseHandler;
    use crate::rules::matcher::Matcher;
    use crate::rules::Rule;

    fn server(port: u16, body: &str) -> StubServer {
        let binding = Binding {
            port,
            ..Binding::new(TransportKind::Http)
        };
        StubServer::new(
            binding,
            RuleSet::new(vec![Rule::new(Matcher::Any, ResponseHandler::content(body))]),
        )
    }

    fn identity(name: &str) -> TlsIdentity {
        TlsIdentity {
            cert: PathBuf::from(format!("{}.crt", name)),
            key: PathBuf::from(format!("{}.key", name)),
        }
    }

    #[test]
    fn test_merge_keeps_first_port_and_rule_order() {
        let first = server(8080, "Ra");
        let second = server(0, "Rb");
        let ra = Arc::clone(&first.rules().rules()[0]);
        let rb = Arc::clone(&second.rules().rules()[0]);

        let merged = first.merge(second).unwrap();
        assert_eq!(merged.binding().port, 8080);
        assert_eq!(merged.rules().len(), 2);
        assert!(Arc::ptr_eq(&merged.rules().rules()[0], &ra));
        assert!(Arc::ptr_eq(&merged.rules().rules()[1], &rb));
    }

    #[test]
    fn test_merge_falls_back_to_second_port() {
        let merged = server(0, "a").merge(server(9090, "b")).unwrap();
        assert_eq!(merged.binding().port, 9090);
    }

    #[test]
    fn test_merge_first_tls_identity_wins() {
        let mut first = server(0, "a");
        first.binding_mut().tls = Some(identity("first"));
        let mut second = server(0, "b");
        second.binding_mut().tls = Some(identity("second"));

        let merged = first.merge(second).unwrap();
        assert_eq!(merged.binding().tls, Some(identity("first")));

        let mut tls_second = server(0, "b");
        tls_second.binding_mut().tls = Some(identity("second"));
        let merged = server(0, "a").merge(tls_second).unwrap();
        assert_eq!(merged.binding().tls, Some(identity("second")));
    }

    #[test]
    fn test_merge_quiet_only_if_both_quiet() {
        let merged = server(0, "a").quiet(true).merge(server(0, "b")).unwrap();
        assert!(!merged.is_quiet());

        let merged = server(0, "a")
            .quiet(true)
            .merge(server(0, "b").quiet(true))
            .unwrap();
        assert!(merged.is_quiet());
    }

    #[test]
    fn test_merge_rejects_mixed_transports() {
        let socket = StubServer::new(Binding::new(TransportKind::Socket), RuleSet::default());
        let error = server(0, "a").merge(socket).unwrap_err();
        assert_eq!(
            error,
            MergeError::IncompatibleTransport {
                left: "http",
                right: "socket"
            }
        );
    }
}
