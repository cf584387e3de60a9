//! Schema default injection
//!
//! Walks a bound configuration and fills every absent field that has a
//! schema-declared default. Each model type lists its own fields through
//! [`SchemaType::visit_defaults`]; plugin payloads are never entered.
//! Injection is idempotent: present fields are left untouched.

use log::trace;

use super::types::{
    BindPort, Consistency, FailoverPriority, Plugins, Property, Server, ServiceOverride, ServiceOverrides, Servers,
    TcConfig, TcProperties, Voter,
};
use crate::common::{Result, TcConfigError};
use crate::schema::SchemaDefaults;

/// A configuration record bound from a named schema type
pub trait SchemaType {
    /// Schema type name used as the first half of the default key
    fn type_name(&self) -> &'static str;

    /// Offer every field to the injector
    fn visit_defaults(&mut self, injector: &DefaultInjector<'_>) -> Result<()>;
}

/// A record with simple content plus attributes, such as a port with a bind
/// address. A default literal for such a field populates the content value.
pub trait SimpleContent: SchemaType + Default {
    type Value: Coerce;

    fn set_value(&mut self, value: Self::Value);
}

/// Conversion from a default literal
pub trait Coerce: Sized {
    fn coerce(text: &str) -> Option<Self>;
}

macro_rules! coerce_from_str {
    ($($t:ty),*) => {
        $(impl Coerce for $t {
            fn coerce(text: &str) -> Option<Self> {
                text.trim().parse().ok()
            }
        })*
    };
}

coerce_from_str!(i8, i16, i32, i64, u8, u16, u32, u64);

macro_rules! coerce_float {
    ($($t:ty),*) => {
        $(impl Coerce for $t {
            fn coerce(text: &str) -> Option<Self> {
                match text.trim() {
                    "INF" => Some(<$t>::INFINITY),
                    "-INF" => Some(<$t>::NEG_INFINITY),
                    "NaN" => Some(<$t>::NAN),
                    other => other.parse().ok(),
                }
            }
        })*
    };
}

coerce_float!(f32, f64);

impl Coerce for bool {
    fn coerce(text: &str) -> Option<Self> {
        match text.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }
}

impl Coerce for char {
    fn coerce(text: &str) -> Option<Self> {
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    }
}

impl Coerce for String {
    fn coerce(text: &str) -> Option<Self> {
        Some(text.to_string())
    }
}

/// Fills absent fields from a [`SchemaDefaults`] table
#[derive(Debug, Clone, Copy)]
pub struct DefaultInjector<'d> {
    defaults: &'d SchemaDefaults,
}

impl<'d> DefaultInjector<'d> {
    pub fn new(defaults: &'d SchemaDefaults) -> Self {
        Self { defaults }
    }

    /// Inject defaults into `node` and everything below it
    pub fn apply<T: SchemaType + ?Sized>(&self, node: &mut T) -> Result<()> {
        node.visit_defaults(self)
    }

    /// A plain field: set it from the default literal when absent
    pub fn value<V: Coerce>(&self, owner: &str, field: &str, slot: &mut Option<V>) -> Result<()> {
        if slot.is_some() {
            return Ok(());
        }
        if let Some(text) = self.defaults.get(owner, field) {
            trace!("Default {}.{} = {}", owner, field, text);
            *slot = Some(coerce(owner, field, text)?);
        }
        Ok(())
    }

    /// A simple-content field: create the record when absent and set its
    /// content value, otherwise descend into it
    pub fn wrapper<W: SimpleContent>(&self, owner: &str, field: &str, slot: &mut Option<W>) -> Result<()> {
        match slot {
            Some(record) => record.visit_defaults(self),
            None => {
                let Some(text) = self.defaults.get(owner, field) else {
                    return Ok(());
                };
                trace!("Default {}.{} = {}", owner, field, text);
                let mut record = W::default();
                record.set_value(coerce(owner, field, text)?);
                record.visit_defaults(self)?;
                *slot = Some(record);
                Ok(())
            }
        }
    }

    /// A nested record: descend when present
    pub fn node<N: SchemaType>(&self, slot: &mut Option<N>) -> Result<()> {
        match slot {
            Some(record) => record.visit_defaults(self),
            None => Ok(()),
        }
    }

    /// A repeated record
    pub fn nodes<N: SchemaType>(&self, items: &mut [N]) -> Result<()> {
        items.iter_mut().try_for_each(|item| item.visit_defaults(self))
    }
}

fn coerce<V: Coerce>(owner: &str, field: &str, text: &str) -> Result<V> {
    V::coerce(text).ok_or_else(|| TcConfigError::DefaultCoercion {
        field: format!("{}.{}", owner, field),
        text: text.to_string(),
    })
}

impl SchemaType for TcConfig {
    fn type_name(&self) -> &'static str {
        "tc-config"
    }

    fn visit_defaults(&mut self, injector: &DefaultInjector<'_>) -> Result<()> {
        injector.node(&mut self.plugins)?;
        injector.node(&mut self.tc_properties)?;
        injector.node(&mut self.failover_priority)?;
        injector.node(&mut self.servers)
    }
}

impl SchemaType for Plugins {
    fn type_name(&self) -> &'static str {
        "plugins"
    }

    // Fragments belong to their plugins.
    fn visit_defaults(&mut self, _injector: &DefaultInjector<'_>) -> Result<()> {
        Ok(())
    }
}

impl SchemaType for TcProperties {
    fn type_name(&self) -> &'static str {
        "tc-properties"
    }

    fn visit_defaults(&mut self, injector: &DefaultInjector<'_>) -> Result<()> {
        injector.nodes(&mut self.property)
    }
}

impl SchemaType for Property {
    fn type_name(&self) -> &'static str {
        "property"
    }

    fn visit_defaults(&mut self, _injector: &DefaultInjector<'_>) -> Result<()> {
        Ok(())
    }
}

impl SchemaType for FailoverPriority {
    fn type_name(&self) -> &'static str {
        "failover-priority"
    }

    fn visit_defaults(&mut self, injector: &DefaultInjector<'_>) -> Result<()> {
        match self {
            FailoverPriority::Availability => Ok(()),
            FailoverPriority::Consistency(consistency) => consistency.visit_defaults(injector),
        }
    }
}

impl SchemaType for Consistency {
    fn type_name(&self) -> &'static str {
        "consistency"
    }

    fn visit_defaults(&mut self, injector: &DefaultInjector<'_>) -> Result<()> {
        injector.node(&mut self.voter)
    }
}

impl SchemaType for Voter {
    fn type_name(&self) -> &'static str {
        "voter"
    }

    fn visit_defaults(&mut self, _injector: &DefaultInjector<'_>) -> Result<()> {
        Ok(())
    }
}

impl SchemaType for Servers {
    fn type_name(&self) -> &'static str {
        "servers"
    }

    fn visit_defaults(&mut self, injector: &DefaultInjector<'_>) -> Result<()> {
        let owner = self.type_name();
        injector.nodes(&mut self.server)?;
        injector.value(owner, "client-reconnect-window", &mut self.client_reconnect_window)
    }
}

impl SchemaType for Server {
    fn type_name(&self) -> &'static str {
        "server"
    }

    fn visit_defaults(&mut self, injector: &DefaultInjector<'_>) -> Result<()> {
        let owner = self.type_name();
        injector.value(owner, "host", &mut self.host)?;
        injector.value(owner, "name", &mut self.name)?;
        injector.value(owner, "bind", &mut self.bind)?;
        injector.value(owner, "data", &mut self.data)?;
        injector.value(owner, "logs", &mut self.logs)?;
        injector.wrapper(owner, "tsa-port", &mut self.tsa_port)?;
        injector.wrapper(owner, "tsa-group-port", &mut self.tsa_group_port)?;
        injector.wrapper(owner, "management-port", &mut self.management_port)?;
        injector.node(&mut self.service_overrides)
    }
}

impl SchemaType for BindPort {
    fn type_name(&self) -> &'static str {
        "bind-port"
    }

    fn visit_defaults(&mut self, injector: &DefaultInjector<'_>) -> Result<()> {
        injector.value(self.type_name(), "bind", &mut self.bind)
    }
}

impl SimpleContent for BindPort {
    type Value = u16;

    fn set_value(&mut self, value: u16) {
        self.value = value;
    }
}

impl SchemaType for ServiceOverrides {
    fn type_name(&self) -> &'static str {
        "service-overrides"
    }

    fn visit_defaults(&mut self, injector: &DefaultInjector<'_>) -> Result<()> {
        injector.nodes(&mut self.service_override)
    }
}

impl SchemaType for ServiceOverride {
    fn type_name(&self) -> &'static str {
        "service-override"
    }

    fn visit_defaults(&mut self, _injector: &DefaultInjector<'_>) -> Result<()> {
        Ok(())
    }
}
