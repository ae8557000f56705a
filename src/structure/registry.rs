//! Structure Registry
//!
//! Maps native types to wire identifiers and hands out the expand/shrink/collect functions
//! registered for them. Lookups are read-heavy and run many times per assignment;
//! registration is rare and happens under the write lock so that a registration becomes
//! visible in every table at once, and concurrent auto-registration of one type converges
//! to a single registration.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::Arc
};

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{Level, event};

use crate::{
    config::ExecutorConfig,
    domain::{
        constant::registry,
        definition::{Port, Widget},
        error::StructureError
    },
    port::collector::Native,
    structure::{
        builtin,
        hooks::{StructureHook, default_hooks},
        registration::{
            CollectFn, Expander, Predicate, RegisterOptions, Shrinker, Structure, StructureCandidate,
            StructureRegistration
        }
    }
};

static GLOBAL_REGISTRY: Lazy<Arc<StructureRegistry>> =
    Lazy::new(|| Arc::new(StructureRegistry::new().allow_auto_register(true)));

#[derive(Default)]
struct Tables {
    by_type:       HashMap<TypeId, Arc<StructureRegistration>>,
    by_identifier: HashMap<String, Arc<StructureRegistration>>
}

/// Optional parts of a port built by `get_port_for_cls`
#[derive(Default)]
pub struct PortOptions {
    pub nullable:      bool,
    pub default:       Option<Native>,
    pub label:         Option<String>,
    pub description:   Option<String>,
    pub assign_widget: Option<Widget>,
    pub return_widget: Option<Widget>
}

impl PortOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn default_value<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.default = Some(Arc::new(value));
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn assign_widget(mut self, widget: Widget) -> Self {
        self.assign_widget = Some(widget);
        self
    }

    pub fn return_widget(mut self, widget: Widget) -> Self {
        self.return_widget = Some(widget);
        self
    }
}

/// Bidirectional, type-driven conversion between wire values and native objects
pub struct StructureRegistry {
    hooks:               Vec<Arc<dyn StructureHook>>,
    allow_auto_register: bool,
    allow_overwrite:     bool,
    tables:              RwLock<Tables>
}

impl Default for StructureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StructureRegistry {
    /// Registry with the default hook chain and the built-in structures
    pub fn new() -> Self {
        Self::with_hooks(default_hooks())
    }

    /// Registry with a custom hook chain; built-in structures are still seeded
    pub fn with_hooks(hooks: Vec<Arc<dyn StructureHook>>) -> Self {
        let mut tables = Tables::default();
        for registration in builtin::registrations() {
            let registration = Arc::new(registration);
            tables.by_type.insert(registration.type_id, registration.clone());
            tables.by_identifier.insert(registration.identifier.clone(), registration);
        }

        Self { hooks, allow_auto_register: false, allow_overwrite: false, tables: RwLock::new(tables) }
    }

    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new().allow_auto_register(config.allow_auto_register).allow_overwrite(config.allow_overwrite)
    }

    /// Process-wide registry with auto-registration enabled
    pub fn global() -> Arc<StructureRegistry> {
        GLOBAL_REGISTRY.clone()
    }

    pub fn allow_auto_register(mut self, allow: bool) -> Self {
        self.allow_auto_register = allow;
        self
    }

    pub fn allow_overwrite(mut self, allow: bool) -> Self {
        self.allow_overwrite = allow;
        self
    }

    /// Put a hook in front of the chain so it shadows every existing one
    pub fn prepend_hook(&mut self, hook: Arc<dyn StructureHook>) {
        self.hooks.insert(0, hook);
    }

    pub fn hook_names(&self) -> Vec<&'static str> {
        self.hooks.iter().map(|hook| hook.name()).collect()
    }

    /// Register `T` through the first applicable hook
    pub fn register_as_structure<T: Structure>(
        &self,
        options: RegisterOptions
    ) -> Result<Arc<StructureRegistration>, StructureError> {
        self.register_candidate(T::candidate(), options)
    }

    /// Register a runtime-described type through the first applicable hook
    pub fn register_candidate(
        &self,
        candidate: StructureCandidate,
        options: RegisterOptions
    ) -> Result<Arc<StructureRegistration>, StructureError> {
        let registration = self.run_hooks(&candidate, options)?;

        let mut tables = self.tables.write();
        self.insert(&mut tables, registration)
    }

    fn run_hooks(
        &self,
        candidate: &StructureCandidate,
        options: RegisterOptions
    ) -> Result<StructureRegistration, StructureError> {
        let Some(hook) = self.hooks.iter().find(|hook| hook.is_applicable(candidate, &options)) else {
            event!(Level::WARN, event = registry::STRUCTURE_REJECTED, type_name = %candidate.type_name);
            return Err(StructureError::Definition(format!(
                "no hook knows how to register {}; tried {}",
                candidate.type_name,
                self.hook_names().join(", ")
            )));
        };

        hook.apply(candidate, options).map_err(|e| {
            event!(Level::WARN, event = registry::STRUCTURE_REJECTED,
                   type_name = %candidate.type_name, hook = %hook.name(), error = %e);
            match e {
                StructureError::Definition(message) => StructureError::Definition(message),
                other => StructureError::Definition(format!(
                    "hook {} failed to register {}: {}",
                    hook.name(),
                    candidate.type_name,
                    other
                ))
            }
        })
    }

    fn insert(
        &self,
        tables: &mut Tables,
        registration: StructureRegistration
    ) -> Result<Arc<StructureRegistration>, StructureError> {
        let identifier_taken = tables.by_identifier.get(&registration.identifier);
        let type_taken = tables.by_type.get(&registration.type_id);

        if !self.allow_overwrite {
            if let Some(existing) = identifier_taken {
                return Err(StructureError::Overwrite(format!(
                    "identifier {} is already registered for {}",
                    registration.identifier, existing.type_name
                )));
            }
            if let Some(existing) = type_taken {
                return Err(StructureError::Overwrite(format!(
                    "{} is already registered as {}",
                    registration.type_name, existing.identifier
                )));
            }
        }

        let overwritten = identifier_taken.is_some() || type_taken.is_some();

        if let Some(stale) = tables.by_type.remove(&registration.type_id) {
            tables.by_identifier.remove(&stale.identifier);
        }
        if let Some(stale) = tables.by_identifier.remove(&registration.identifier) {
            tables.by_type.remove(&stale.type_id);
        }

        let registration = Arc::new(registration);
        tables.by_type.insert(registration.type_id, registration.clone());
        tables.by_identifier.insert(registration.identifier.clone(), registration.clone());

        let name = if overwritten { registry::STRUCTURE_OVERWRITTEN } else { registry::STRUCTURE_REGISTERED };
        event!(Level::DEBUG, event = name,
               identifier = %registration.identifier, type_name = %registration.type_name, scope = %registration.scope);

        Ok(registration)
    }

    /// Registration for `T`, auto-registering it on first use when enabled
    pub fn get_registration_for_structure<T: Structure>(&self) -> Result<Arc<StructureRegistration>, StructureError> {
        let type_id = TypeId::of::<T>();
        if let Some(registration) = self.tables.read().by_type.get(&type_id) {
            return Ok(registration.clone());
        }

        if !self.allow_auto_register {
            event!(Level::DEBUG, event = registry::LOOKUP_MISSED, type_name = %std::any::type_name::<T>());
            return Err(StructureError::Registry(format!(
                "{} is not registered and auto-registration is disabled",
                std::any::type_name::<T>()
            )));
        }

        // Re-check under the write lock: a concurrent first use may have won the race
        let mut tables = self.tables.write();
        if let Some(registration) = tables.by_type.get(&type_id) {
            return Ok(registration.clone());
        }

        let registration = self.run_hooks(&T::candidate(), RegisterOptions::default())?;
        let registration = self.insert(&mut tables, registration)?;

        event!(Level::DEBUG, event = registry::STRUCTURE_AUTO_REGISTERED,
               identifier = %registration.identifier, type_name = %registration.type_name);

        Ok(registration)
    }

    pub fn get_identifier_for_structure<T: Structure>(&self) -> Result<String, StructureError> {
        Ok(self.get_registration_for_structure::<T>()?.identifier.clone())
    }

    /// Registration stored under a wire identifier
    pub fn get_registration_for_identifier(
        &self,
        identifier: &str
    ) -> Result<Arc<StructureRegistration>, StructureError> {
        self.tables.read().by_identifier.get(identifier).cloned().ok_or_else(|| {
            event!(Level::DEBUG, event = registry::LOOKUP_MISSED, identifier = %identifier);
            StructureError::Registry(format!("no structure registered as {}", identifier))
        })
    }

    pub fn get_expander_for_identifier(&self, identifier: &str) -> Result<Expander, StructureError> {
        Ok(self.get_registration_for_identifier(identifier)?.expand.clone())
    }

    pub fn get_shrinker_for_identifier(&self, identifier: &str) -> Result<Shrinker, StructureError> {
        Ok(self.get_registration_for_identifier(identifier)?.shrink.clone())
    }

    /// `None` when the structure holds nothing that needs releasing
    pub fn get_collector_for_identifier(&self, identifier: &str) -> Result<Option<CollectFn>, StructureError> {
        Ok(self.get_registration_for_identifier(identifier)?.collect.clone())
    }

    pub fn get_predicate_for_identifier(&self, identifier: &str) -> Result<Predicate, StructureError> {
        Ok(self.get_registration_for_identifier(identifier)?.predicate.clone())
    }

    pub fn get_default_widget_for_identifier(&self, identifier: &str) -> Result<Option<Widget>, StructureError> {
        Ok(self.get_registration_for_identifier(identifier)?.default_widget.clone())
    }

    /// Find the registration a native value belongs to by asking each predicate
    pub fn identify(&self, native: &Native) -> Option<Arc<StructureRegistration>> {
        let tables = self.tables.read();
        if let Some(registration) = tables.by_type.get(&(**native).type_id()) {
            return Some(registration.clone());
        }
        tables.by_identifier.values().find(|registration| (registration.predicate)(native)).cloned()
    }

    /// Build a port descriptor for `T`
    pub fn get_port_for_cls<T: Structure>(&self, key: &str, options: PortOptions) -> Result<Port, StructureError> {
        let registration = self.get_registration_for_structure::<T>()?;

        let default = match options.default {
            Some(native) => {
                let convert = registration.convert_default.as_ref().ok_or_else(|| {
                    StructureError::Registry(format!(
                        "{} has no default converter but port {} declares a default",
                        registration.identifier, key
                    ))
                })?;
                let value = convert(&native).map_err(|e| {
                    StructureError::Registry(format!("could not convert default of port {}: {}", key, e))
                })?;
                Some(value)
            }
            None => None
        };

        Ok(Port {
            key: key.to_string(),
            kind: registration.kind,
            identifier: registration.identifier.clone(),
            scope: registration.scope,
            nullable: options.nullable,
            default,
            label: options.label,
            description: options.description,
            assign_widget: options.assign_widget.or_else(|| registration.default_widget.clone()),
            return_widget: options.return_widget.or_else(|| registration.default_return_widget.clone())
        })
    }
}
