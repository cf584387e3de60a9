//! Binding a validated document onto the configuration model
//!
//! The binder trusts the schema for structure and only reports what the
//! schema cannot express: values out of the model's range and service
//! overrides that reference an unknown service.

use std::collections::HashSet;
use std::str::FromStr;

use log::debug;

use super::defaults::{DEFAULT_CLIENT_RECONNECT_WINDOW, DEFAULT_TSA_PORT};
use super::types::{
    BindPort, Consistency, FailoverPriority, PluginEntry, Plugins, Property, Server, Service, ServiceOverride,
    ServiceOverrides, Servers, TcConfig, TcProperties, Voter,
};
use crate::common::{Result, TcConfigError};
use crate::schema::CORE_NAMESPACE;
use crate::xml::Element;

/// Bind a `tc-config` root element
pub fn bind(root: &Element) -> Result<TcConfig> {
    if root.namespace() != Some(CORE_NAMESPACE) || root.name() != "tc-config" {
        return Err(binding(root, format!("expected {{{}}}tc-config, found {}", CORE_NAMESPACE, root.qualified_name())));
    }

    let config = TcConfig {
        plugins: core_child(root, "plugins").map(bind_plugins).transpose()?,
        tc_properties: core_child(root, "tc-properties").map(bind_properties).transpose()?,
        failover_priority: core_child(root, "failover-priority").map(bind_failover).transpose()?,
        servers: core_child(root, "servers").map(bind_servers).transpose()?,
    };

    check_override_references(&config)?;
    debug!(
        "Bound configuration with {} server(s) and {} extension entr(ies)",
        config.server_list().len(),
        config.plugins.as_ref().map(|p| p.entries.len()).unwrap_or(0)
    );
    Ok(config)
}

fn core_child<'a>(parent: &'a Element, name: &str) -> Option<&'a Element> {
    parent
        .child_elements()
        .find(|c| c.namespace() == Some(CORE_NAMESPACE) && c.name() == name)
}

fn core_children<'a>(parent: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
    parent
        .child_elements()
        .filter(move |c| c.namespace() == Some(CORE_NAMESPACE) && c.name() == name)
}

fn binding(at: &Element, message: String) -> TcConfigError {
    let pos = at.position();
    TcConfigError::Binding(format!("{}:{}: {}", pos.line, pos.column, message))
}

fn number<T: FromStr>(at: &Element, what: &str, text: &str) -> Result<T> {
    text.trim()
        .parse()
        .map_err(|_| binding(at, format!("{} value '{}' is out of range", what, text.trim())))
}

/// Numeric content of `at`; an empty element takes the schema's declared default
fn number_or<T: FromStr>(at: &Element, what: &str, default: Option<T>) -> Result<T> {
    let text = at.text();
    match default {
        Some(default) if text.is_empty() && at.child_elements().next().is_none() => Ok(default),
        _ => number(at, what, &text),
    }
}

fn token(element: &Element) -> String {
    element.text().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The single extension element inside a `<config>`, `<service>` or
/// `<service-override>`
fn payload(element: &Element) -> Option<Element> {
    element
        .child_elements()
        .find(|c| c.namespace() != Some(CORE_NAMESPACE))
        .cloned()
}

fn bind_plugins(element: &Element) -> Result<Plugins> {
    let mut entries = Vec::new();
    for child in element.child_elements() {
        if child.namespace() != Some(CORE_NAMESPACE) {
            continue;
        }
        match child.name() {
            "config" => {
                let fragment = payload(child).ok_or_else(|| binding(child, "config entry has no payload".into()))?;
                entries.push(PluginEntry::Config(fragment));
            }
            "service" => {
                let fragment = payload(child).ok_or_else(|| binding(child, "service entry has no payload".into()))?;
                entries.push(PluginEntry::Service(Service {
                    id: child.attribute("id").map(|id| id.trim().to_string()),
                    fragment,
                }));
            }
            _ => {}
        }
    }
    Ok(Plugins { entries })
}

fn bind_properties(element: &Element) -> Result<TcProperties> {
    let property = core_children(element, "property")
        .map(|p| {
            let name = p.attribute("name").ok_or_else(|| binding(p, "property without name".into()))?;
            let value = p.attribute("value").ok_or_else(|| binding(p, "property without value".into()))?;
            Ok(Property { name: name.to_string(), value: value.to_string() })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(TcProperties { property })
}

fn bind_failover(element: &Element) -> Result<FailoverPriority> {
    if core_child(element, "availability").is_some() {
        return Ok(FailoverPriority::Availability);
    }
    let consistency = core_child(element, "consistency")
        .ok_or_else(|| binding(element, "failover-priority needs availability or consistency".into()))?;

    let voter = core_child(consistency, "voter")
        .map(|v| {
            let count = v.attribute("count").ok_or_else(|| binding(v, "voter without count".into()))?;
            Ok::<_, TcConfigError>(Voter { count: number(v, "voter count", count)? })
        })
        .transpose()?;
    Ok(FailoverPriority::Consistency(Consistency { voter }))
}

fn bind_servers(element: &Element) -> Result<Servers> {
    let server = core_children(element, "server")
        .map(bind_server)
        .collect::<Result<Vec<_>>>()?;
    let client_reconnect_window = core_child(element, "client-reconnect-window")
        .map(|w| number_or(w, "client-reconnect-window", Some(DEFAULT_CLIENT_RECONNECT_WINDOW)))
        .transpose()?;
    Ok(Servers { server, client_reconnect_window })
}

fn bind_server(element: &Element) -> Result<Server> {
    let port = |name: &str, default: Option<u16>| -> Result<Option<BindPort>> {
        core_child(element, name)
            .map(|p| {
                Ok(BindPort {
                    value: number_or(p, name, default)?,
                    bind: p.attribute("bind").map(str::to_string),
                })
            })
            .transpose()
    };

    Ok(Server {
        host: element.attribute("host").map(str::to_string),
        name: element.attribute("name").map(|n| n.trim().to_string()),
        bind: element.attribute("bind").map(str::to_string),
        data: core_child(element, "data").map(token),
        logs: core_child(element, "logs").map(token),
        tsa_port: port("tsa-port", Some(DEFAULT_TSA_PORT))?,
        tsa_group_port: port("tsa-group-port", None)?,
        management_port: port("management-port", None)?,
        service_overrides: core_child(element, "service-overrides")
            .map(bind_overrides)
            .transpose()?,
    })
}

fn bind_overrides(element: &Element) -> Result<ServiceOverrides> {
    let service_override = core_children(element, "service-override")
        .map(|o| {
            let overrides = o
                .attribute("overrides")
                .ok_or_else(|| binding(o, "service-override without overrides".into()))?;
            Ok(ServiceOverride {
                overrides: overrides.trim().to_string(),
                fragment: payload(o),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ServiceOverrides { service_override })
}

fn check_override_references(config: &TcConfig) -> Result<()> {
    let ids: HashSet<&str> = config
        .plugins
        .iter()
        .flat_map(|p| p.entries.iter())
        .filter_map(|entry| match entry {
            PluginEntry::Service(service) => service.id.as_deref(),
            PluginEntry::Config(_) => None,
        })
        .collect();

    for server in config.server_list() {
        for o in server.overrides() {
            if !ids.contains(o.overrides.as_str()) {
                return Err(TcConfigError::Binding(format!(
                    "service-override on server {:?} references unknown service '{}'",
                    server.display_name(),
                    o.overrides
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;

    fn doc(body: &str) -> Element {
        parse_document(&format!(
            r#"<tc-config xmlns="http://www.terracotta.org/config" xmlns:foo="urn:example:foo">{}</tc-config>"#,
            body
        ))
        .unwrap()
    }

    #[test]
    fn test_bind_full_document() {
        let root = doc(r#"
            <plugins>
              <config><foo:foo>bar</foo:foo></config>
              <service id="svc"><foo:foo>baz</foo:foo></service>
            </plugins>
            <tc-properties><property name="a" value="b"/></tc-properties>
            <failover-priority><consistency><voter count="2"/></consistency></failover-priority>
            <servers>
              <server host="h1" name="s1" bind="10.0.0.1">
                <logs> /var/log/tc </logs>
                <tsa-port bind="10.0.0.2">200</tsa-port>
                <service-overrides>
                  <service-override overrides="svc"><foo:foo>qux</foo:foo></service-override>
                </service-overrides>
              </server>
              <client-reconnect-window>30</client-reconnect-window>
            </servers>"#);

        let config = bind(&root).unwrap();
        let entries = &config.plugins.as_ref().unwrap().entries;
        assert_eq!(entries.len(), 2);
        match &entries[0] {
            PluginEntry::Config(fragment) => assert_eq!(fragment.text(), "bar"),
            other => panic!("unexpected {:?}", other),
        }
        match &entries[1] {
            PluginEntry::Service(service) => {
                assert_eq!(service.id.as_deref(), Some("svc"));
                assert_eq!(service.fragment.namespace(), Some("urn:example:foo"));
            }
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(config.property("a"), Some("b"));
        assert_eq!(
            config.failover_priority,
            Some(FailoverPriority::Consistency(Consistency { voter: Some(Voter { count: 2 }) }))
        );

        let servers = config.servers.as_ref().unwrap();
        assert_eq!(servers.client_reconnect_window, Some(30));
        let server = &servers.server[0];
        assert_eq!(server.host.as_deref(), Some("h1"));
        assert_eq!(server.logs.as_deref(), Some("/var/log/tc"));
        assert_eq!(server.tsa_port, Some(BindPort::new(200, Some("10.0.0.2".into()))));
        assert_eq!(server.management_port, None);
        assert_eq!(server.overrides()[0].overrides, "svc");
        assert_eq!(server.overrides()[0].fragment.as_ref().map(Element::text).as_deref(), Some("qux"));
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(bind(&doc("")).unwrap(), TcConfig::default());
    }

    #[test]
    fn test_wrong_root() {
        let root = parse_document("<tc-config/>").unwrap();
        assert!(matches!(bind(&root), Err(TcConfigError::Binding(_))));
    }

    #[test]
    fn test_port_out_of_range() {
        let root = doc("<servers><server><tsa-port>70000</tsa-port></server></servers>");
        match bind(&root) {
            Err(TcConfigError::Binding(msg)) => assert!(msg.contains("70000")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_elements_bind_declared_defaults() {
        let root = doc(r#"
            <servers>
              <server name="s1"><tsa-port bind="10.0.0.1"/></server>
              <client-reconnect-window/>
            </servers>"#);
        let config = bind(&root).unwrap();
        let servers = config.servers.as_ref().unwrap();
        assert_eq!(servers.client_reconnect_window, Some(DEFAULT_CLIENT_RECONNECT_WINDOW));
        assert_eq!(servers.server[0].tsa_port, Some(BindPort::new(DEFAULT_TSA_PORT, Some("10.0.0.1".into()))));
    }

    #[test]
    fn test_empty_port_without_default_is_rejected() {
        let root = doc("<servers><server><management-port/></server></servers>");
        assert!(matches!(bind(&root), Err(TcConfigError::Binding(_))));
    }

    #[test]
    fn test_removal_override_has_no_fragment() {
        let root = doc(r#"
            <plugins><service id="svc"><foo:foo/></service></plugins>
            <servers><server name="s1"><service-overrides><service-override overrides="svc"/></service-overrides></server></servers>"#);
        let config = bind(&root).unwrap();
        assert_eq!(config.server_list()[0].overrides()[0].fragment, None);
    }

    #[test]
    fn test_unknown_override_reference() {
        let root = doc(r#"
            <servers><server name="s1"><service-overrides><service-override overrides="nope"/></service-overrides></server></servers>"#);
        match bind(&root) {
            Err(TcConfigError::Binding(msg)) => assert!(msg.contains("nope")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
