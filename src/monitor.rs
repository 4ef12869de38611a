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

//! Observers notified around every dispatch.
//!
//! Hooks receive human-readable dumps. A failing hook is logged by the
//! dispatcher and otherwise ignored.

use anyhow::Context;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

pub trait Monitor: Send + Sync + fmt::Debug {
    fn before_dispatch(&self, request: &str) -> anyhow::Result<()>;

    fn after_dispatch(&self, response: &str) -> anyhow::Result<()>;

    fn on_unmatched(&self, request: &str) -> anyhow::Result<()>;

    fn on_error(&self, error: &str) -> anyhow::Result<()>;
}

/// Writes every dump to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMonitor;

impl Monitor for LogMonitor {
    fn before_dispatch(&self, request: &str) -> anyhow::Result<()> {
        info!("Request received:\n\n{}\n", request);
        Ok(())
    }

    fn after_dispatch(&self, response: &str) -> anyhow::Result<()> {
        info!("Response return:\n\n{}\n", response);
        Ok(())
    }

    fn on_unmatched(&self, request: &str) -> anyhow::Result<()> {
        warn!("Nothing matched request:\n\n{}\n", request);
        Ok(())
    }

    fn on_error(&self, error: &str) -> anyhow::Result<()> {
        warn!(error = %error, "Exchange failed");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QuietMonitor;

impl Monitor for QuietMonitor {
    fn before_dispatch(&self, _: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn after_dispatch(&self, _: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_unmatched(&self, _: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_error(&self, _: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Appends every dump to a log file.
#[derive(Debug)]
pub struct FileMonitor {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileMonitor {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open monitor log {}", path.display()))?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    fn append(&self, title: &str, body: &str) -> anyhow::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("monitor log {} is poisoned", self.path.display()))?;

        writeln!(
            file,
            "{} {}:\n\n{}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            title,
            body
        )
        .with_context(|| format!("Failed to write monitor log {}", self.path.display()))
    }
}

impl Monitor for FileMonitor {
    fn before_dispatch(&self, request: &str) -> anyhow::Result<()> {
        self.append("Request received", request)
    }

    fn after_dispatch(&self, response: &str) -> anyhow::Result<()> {
        self.append("Response return", response)
    }

    fn on_unmatched(&self, request: &str) -> anyhow::Result<()> {
        self.append("Nothing matched request", request)
    }

    fn on_error(&self, error: &str) -> anyhow::Result<()> {
        self.append("Exchange failed", error)
    }
}

/// Fans every hook out to several monitors. All of them are called even if
/// one fails; the first failure is returned.
#[derive(Debug, Clone, Default)]
pub struct CompositeMonitor {
    monitors: Vec<Arc<dyn Monitor>>,
}

impl CompositeMonitor {
    pub fn new(monitors: Vec<Arc<dyn Monitor>>) -> Self {
        Self { monitors }
    }

    fn each(&self, hook: impl Fn(&dyn Monitor) -> anyhow::Result<()>) -> anyhow::Result<()> {
        let mut first_error = None;
        for monitor in &self.monitors {
            if let Err(e) = hook(monitor.as_ref()) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Monitor for CompositeMonitor {
    fn before_dispatch(&self, request: &str) -> anyhow::Result<()> {
        self.each(|monitor| monitor.before_dispatch(request))
    }

    fn after_dispatch(&self, response: &str) -> anyhow::Result<()> {
        self.each(|monitor| monitor.after_dispatch(response))
    }

    fn on_unmatched(&self, request: &str) -> anyhow::Result<()> {
        self.each(|monitor| monitor.on_unmatched(request))
    }

    fn on_error(&self, error: &str) -> anyhow::Result<()> {
        self.each(|monitor| monitor.on_error(error))
    }
}
