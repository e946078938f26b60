//! Service entity declarations.
//!
//! Services are named calls with a typed argument schema. Arguments
//! arrive positionally on the wire and are decoded against the declared
//! schema into a name → value map before reaching the handler.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::protocol::messages::{
    ExecuteServiceArgument, ListEntitiesServicesArgument, ListEntitiesServicesResponse,
    ServiceArgType,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceArgValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    String(String),
}

pub type ServiceArgs = HashMap<String, ServiceArgValue>;

#[derive(Debug, Clone)]
pub struct ServiceArg {
    pub name: String,
    pub ty: ServiceArgType,
}

impl ServiceArg {
    pub fn new(name: &str, ty: ServiceArgType) -> Self {
        Self {
            name: name.to_string(),
            ty,
        }
    }
}

type ExecuteFn = Box<dyn Fn(ServiceArgs) + Send + Sync>;

pub struct ServiceEntity {
    pub key: u32,
    pub name: String,
    pub args: Vec<ServiceArg>,
    on_execute: ExecuteFn,
}

impl ServiceEntity {
    pub fn new(
        key: u32,
        name: &str,
        args: Vec<ServiceArg>,
        on_execute: impl Fn(ServiceArgs) + Send + Sync + 'static,
    ) -> Self {
        Self {
            key,
            name: name.to_string(),
            args,
            on_execute: Box::new(on_execute),
        }
    }

    pub fn definition(&self) -> ListEntitiesServicesResponse {
        ListEntitiesServicesResponse {
            name: self.name.clone(),
            key: self.key,
            args: self
                .args
                .iter()
                .map(|arg| ListEntitiesServicesArgument {
                    name: arg.name.clone(),
                    r#type: arg.ty as i32,
                })
                .collect(),
        }
    }

    /// Decode positional wire arguments against the schema and invoke the
    /// handler. Extra arguments are dropped; missing ones are absent from
    /// the map.
    pub fn execute(&self, wire_args: &[ExecuteServiceArgument]) {
        let mut decoded = ServiceArgs::new();
        for (i, wire_arg) in wire_args.iter().enumerate() {
            let Some(schema) = self.args.get(i) else {
                warn!(service = %self.name, index = i, "extra service argument dropped");
                continue;
            };
            let value = match schema.ty {
                ServiceArgType::Bool => ServiceArgValue::Bool(wire_arg.bool_),
                ServiceArgType::Int => ServiceArgValue::Int(wire_arg.int_),
                ServiceArgType::Float => ServiceArgValue::Float(wire_arg.float_),
                ServiceArgType::String => ServiceArgValue::String(wire_arg.string_.clone()),
            };
            decoded.insert(schema.name.clone(), value);
        }
        info!(service = %self.name, "executing service");
        (self.on_execute)(decoded);
    }
}
