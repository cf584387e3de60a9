//! Configuration types
//!
//! The typed model of a `tc-config` document. Every field mirrors an element
//! or attribute of the core schema and is `None` when the document omits it;
//! defaulting fills the gaps afterwards. Plugin payloads stay as [`Element`]s.

use serde::Serialize;

use crate::xml::Element;

/// Root of the platform configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TcConfig {
    pub plugins: Option<Plugins>,
    pub tc_properties: Option<TcProperties>,
    pub failover_priority: Option<FailoverPriority>,
    pub servers: Option<Servers>,
}

impl TcConfig {
    /// Servers in document order, empty when there is no `<servers>`
    pub fn server_list(&self) -> &[Server] {
        self.servers.as_ref().map(|s| s.server.as_slice()).unwrap_or(&[])
    }

    /// Add one empty server when the document declares none
    pub fn ensure_default_server(&mut self) -> bool {
        let servers = self.servers.get_or_insert_with(Servers::default);
        if servers.server.is_empty() {
            servers.server.push(Server::default());
            return true;
        }
        false
    }

    /// Value of a `tc-properties` entry
    pub fn property(&self, name: &str) -> Option<&str> {
        self.tc_properties
            .as_ref()?
            .property
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

/// Extension entries of `<plugins>`, in document order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Plugins {
    pub entries: Vec<PluginEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginEntry {
    /// `<config>`: a value looked up by type after parsing
    Config(Element),
    /// `<service>`: a per-server value that servers may override
    Service(Service),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Service {
    pub id: Option<String>,
    pub fragment: Element,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TcProperties {
    pub property: Vec<Property>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Property {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailoverPriority {
    Availability,
    Consistency(Consistency),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Consistency {
    pub voter: Option<Voter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Voter {
    pub count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Servers {
    pub server: Vec<Server>,
    pub client_reconnect_window: Option<i32>,
}

/// One server of the stripe
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Server {
    pub host: Option<String>,
    pub name: Option<String>,
    pub bind: Option<String>,
    pub data: Option<String>,
    pub logs: Option<String>,
    pub tsa_port: Option<BindPort>,
    pub tsa_group_port: Option<BindPort>,
    pub management_port: Option<BindPort>,
    pub service_overrides: Option<ServiceOverrides>,
}

impl Server {
    /// Name the server is registered under, empty before defaulting
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn tsa_port_value(&self) -> u16 {
        self.tsa_port.as_ref().map(|p| p.value).unwrap_or(0)
    }

    /// Service overrides declared by this server
    pub fn overrides(&self) -> &[ServiceOverride] {
        self.service_overrides
            .as_ref()
            .map(|o| o.service_override.as_slice())
            .unwrap_or(&[])
    }
}

/// A port with an optional bind address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BindPort {
    pub value: u16,
    pub bind: Option<String>,
}

impl BindPort {
    pub fn new(value: u16, bind: Option<String>) -> Self {
        Self { value, bind }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceOverrides {
    pub service_override: Vec<ServiceOverride>,
}

/// Replacement (or removal, when `fragment` is `None`) of one service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceOverride {
    pub overrides: String,
    pub fragment: Option<Element>,
}
