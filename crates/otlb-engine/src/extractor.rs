//! Metric-to-entity extraction.
//!
//! Incoming data points carry no monitoring identity of their own; an
//! extractor reads attribute values out of a point and matches them against
//! the (host, service) pairs the engine actually monitors. The grammar is
//! command-line shaped because it rides in on the check command definition:
//!
//! ```text
//! --extractor=attributes
//!     --host_path=resource_metrics.resource.attributes.host
//!     --service_path=resource_metrics.resource.attributes.service
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use otlb_metrics::DataPoint;
use otlb_proto::common::collect_strings;
use parking_lot::Mutex;

use crate::error::EngineError;

/// Find a `--name=value` token in a whitespace-split command line.
pub(crate) fn find_arg<'a>(cmdline: &'a str, name: &str) -> Option<&'a str> {
    cmdline
        .split_whitespace()
        .find_map(|token| token.strip_prefix("--")?.strip_prefix(name)?.strip_prefix('='))
}

/// The (host, service) pairs currently registered for telemetry checks.
///
/// Shared between the bridge and every extractor; extraction only ever
/// yields pairs present here.
#[derive(Default)]
pub struct HostServList {
    inner: Mutex<HashMap<String, HashSet<String>>>,
}

impl HostServList {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, host: &str, service: &str) {
        self.inner
            .lock()
            .entry(host.to_owned())
            .or_default()
            .insert(service.to_owned());
    }

    pub fn unregister(&self, host: &str, service: &str) {
        let mut inner = self.inner.lock();
        if let Some(services) = inner.get_mut(host) {
            services.remove(service);
            if services.is_empty() {
                inner.remove(host);
            }
        }
    }

    pub fn contains(&self, host: &str, service: &str) -> bool {
        self.inner
            .lock()
            .get(host)
            .is_some_and(|services| services.contains(service))
    }

    /// Match candidate attribute values against the registered pairs.
    ///
    /// Tries every (host, service) combination first, then each host with
    /// the empty service (host checks carry no service attribute).
    pub fn match_candidates(&self, hosts: &[&str], services: &[&str]) -> Option<(String, String)> {
        let inner = self.inner.lock();
        for host in hosts {
            let Some(registered) = inner.get(*host) else {
                continue;
            };
            for service in services {
                if registered.contains(*service) {
                    return Some(((*host).to_owned(), (*service).to_owned()));
                }
            }
            if registered.contains("") {
                return Some(((*host).to_owned(), String::new()));
            }
        }
        None
    }
}

/// An extraction rule built from a command line.
pub trait HostServExtractor: Send + Sync + 'static {
    /// The (host, service) this point belongs to, if it matches a
    /// registered pair.
    fn extract(&self, point: &DataPoint) -> Option<(String, String)>;
}

/// Where in the batch an attribute path points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AttributeOwner {
    Resource,
    Scope,
    DataPoint,
}

#[derive(Clone, Debug)]
struct AttributePath {
    owner: AttributeOwner,
    key: String,
}

impl AttributePath {
    fn parse(path: &str) -> Result<Self, EngineError> {
        const RESOURCE: &str = "resource_metrics.resource.attributes.";
        const SCOPE: &str = "resource_metrics.scope_metrics.scope.attributes.";
        const POINT: &str = "resource_metrics.scope_metrics.data.data_points.attributes.";

        let (owner, key) = if let Some(key) = path.strip_prefix(RESOURCE) {
            (AttributeOwner::Resource, key)
        } else if let Some(key) = path.strip_prefix(SCOPE) {
            (AttributeOwner::Scope, key)
        } else if let Some(key) = path.strip_prefix(POINT) {
            (AttributeOwner::DataPoint, key)
        } else {
            return Err(EngineError::InvalidPath(path.to_owned()));
        };
        if key.is_empty() {
            return Err(EngineError::InvalidPath(path.to_owned()));
        }
        Ok(Self {
            owner,
            key: key.to_owned(),
        })
    }

    fn candidates<'a>(&self, point: &'a DataPoint) -> Vec<&'a str> {
        let attributes = match self.owner {
            AttributeOwner::Resource => point.resource_attributes(),
            AttributeOwner::Scope => point.scope_attributes(),
            AttributeOwner::DataPoint => point.attributes(),
        };
        collect_strings(attributes, &self.key)
    }
}

/// The `attributes` grammar: host and service are read from configurable
/// attribute paths.
pub struct AttributesExtractor {
    host_path: AttributePath,
    service_path: AttributePath,
    allowed: Arc<HostServList>,
}

impl AttributesExtractor {
    fn parse(cmdline: &str, allowed: Arc<HostServList>) -> Result<Self, EngineError> {
        let host_path = find_arg(cmdline, "host_path").ok_or_else(|| {
            EngineError::MissingArgument {
                arg: "host_path",
                cmdline: cmdline.to_owned(),
            }
        })?;
        let service_path =
            find_arg(cmdline, "service_path").ok_or_else(|| EngineError::MissingArgument {
                arg: "service_path",
                cmdline: cmdline.to_owned(),
            })?;
        Ok(Self {
            host_path: AttributePath::parse(host_path)?,
            service_path: AttributePath::parse(service_path)?,
            allowed,
        })
    }
}

impl HostServExtractor for AttributesExtractor {
    fn extract(&self, point: &DataPoint) -> Option<(String, String)> {
        let hosts = self.host_path.candidates(point);
        if hosts.is_empty() {
            return None;
        }
        let services = self.service_path.candidates(point);
        self.allowed.match_candidates(&hosts, &services)
    }
}

/// Build an extractor from its command line. Unknown grammar fails fast.
pub fn create_extractor(
    cmdline: &str,
    allowed: Arc<HostServList>,
) -> Result<Arc<dyn HostServExtractor>, EngineError> {
    match find_arg(cmdline, "extractor") {
        Some("attributes") => Ok(Arc::new(AttributesExtractor::parse(cmdline, allowed)?)),
        _ => Err(EngineError::UnknownExtractor(cmdline.to_owned())),
    }
}
