use std::collections::HashMap;

use super::{ProbeError, ProbeOptions, Protocol, Target};
use crate::probe::{self, HttpSettings, Probe};

/// Builds a configured probe for a target.
pub type Factory = Box<dyn Fn(&Target, &ProbeOptions) -> Result<Probe, ProbeError> + Send + Sync>;

/// Protocol → probe factory table, filled once during setup.
#[derive(Default)]
pub struct Registry {
    factories: HashMap<Protocol, Factory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in protocol registered.
    pub fn builtin(settings: &HttpSettings, tls_meta: bool) -> Self {
        let mut registry = Self::new();
        probe::tcp::register(&mut registry, tls_meta);
        probe::udp::register(&mut registry);
        probe::http::register(&mut registry, settings.clone());
        registry
    }

    /// Associates `factory` with `protocol`. A later registration for the
    /// same protocol replaces the earlier one.
    pub fn register(&mut self, protocol: Protocol, factory: Factory) {
        if self.factories.insert(protocol, factory).is_some() {
            log::debug!("replaced probe factory for {protocol}");
        }
    }

    pub fn resolve(&self, protocol: Protocol) -> Option<&Factory> {
        self.factories.get(&protocol)
    }

    /// Resolves the target's protocol and builds its probe.
    pub fn build(&self, target: &Target, options: &ProbeOptions) -> Result<Probe, ProbeError> {
        let factory = self
            .resolve(target.protocol)
            .ok_or_else(|| ProbeError::UnsupportedProtocol(target.protocol.to_string()))?;
        factory(target, options)
    }
}
