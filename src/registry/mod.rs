//! Read-only client over the process bean registry.
//!
//! Producers register `Inspectable` beans under a `BeanName`; report
//! handlers discover them by pattern and read metadata and attribute values
//! without any compile-time knowledge of their shapes.
//!
//! Queries are tolerant: a malformed pattern returns an empty set. Reads are
//! strict: a bean that vanished between discovery and inspection is an
//! error the caller must handle per bean.

pub mod bean;
pub mod name;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::{Result, StatusError};

pub use bean::{
    AttrValue, AttributeInfo, BeanDescriptor, DynamicBean, Inspectable, OperationInfo,
    ParameterInfo, ReadError,
};
pub use name::{BeanName, BeanPattern, NameError};

/// Default domain used when none is configured.
pub const DEFAULT_DOMAIN: &str = "DefaultDomain";

/// Hierarchical registry of named, inspectable beans.
pub struct BeanRegistry {
    default_domain: String,
    beans: RwLock<BTreeMap<BeanName, Arc<dyn Inspectable>>>,
}

impl Default for BeanRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_DOMAIN)
    }
}

impl BeanRegistry {
    pub fn new(default_domain: &str) -> Self {
        Self {
            default_domain: default_domain.to_string(),
            beans: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registers a bean, replacing any previous registration under `name`.
    pub fn register(
        &self,
        name: BeanName,
        bean: Arc<dyn Inspectable>,
    ) -> Option<Arc<dyn Inspectable>> {
        debug!("Registering bean {}", name);
        self.beans
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, bean)
    }

    /// Parses `name` and registers `bean` under it.
    pub fn register_named(
        &self,
        name: &str,
        bean: Arc<dyn Inspectable>,
    ) -> std::result::Result<BeanName, NameError> {
        let name = BeanName::parse(name)?;
        self.register(name.clone(), bean);
        Ok(name)
    }

    pub fn unregister(&self, name: &BeanName) -> bool {
        debug!("Unregistering bean {}", name);
        self.beans
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    pub fn is_registered(&self, name: &BeanName) -> bool {
        self.beans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.beans.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every registered name, sorted.
    pub fn query_all(&self) -> BTreeSet<BeanName> {
        self.beans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Names matching `pattern`. A malformed pattern yields an empty set.
    pub fn find_beans(&self, pattern: &str) -> BTreeSet<BeanName> {
        let pattern = match BeanPattern::parse(pattern) {
            Ok(p) => p,
            Err(e) => {
                debug!("Ignoring malformed bean pattern '{}': {}", pattern, e);
                return BTreeSet::new();
            }
        };
        self.find_matching(&pattern)
    }

    pub fn find_matching(&self, pattern: &BeanPattern) -> BTreeSet<BeanName> {
        self.beans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|name| pattern.matches(name, &self.default_domain))
            .cloned()
            .collect()
    }

    pub fn default_domain(&self) -> &str {
        &self.default_domain
    }

    /// Distinct domains of all registered beans, sorted.
    pub fn domains(&self) -> Vec<String> {
        let beans = self.beans.read().unwrap_or_else(PoisonError::into_inner);
        let domains: BTreeSet<&str> = beans.keys().map(BeanName::domain).collect();
        domains.into_iter().map(str::to_string).collect()
    }

    pub fn get_attribute(&self, name: &BeanName, attribute: &str) -> Result<AttrValue> {
        let bean = self.lookup(name)?;
        bean.read_attribute(attribute).map_err(|e| match e {
            ReadError::Unknown => StatusError::AttributeNotFound {
                bean: name.clone(),
                attribute: attribute.to_string(),
            },
            ReadError::Failed(reason) => StatusError::AttributeRead {
                bean: name.clone(),
                attribute: attribute.to_string(),
                reason,
            },
        })
    }

    pub fn get_descriptor(&self, name: &BeanName) -> Result<BeanDescriptor> {
        let bean = self.lookup(name)?;
        Ok(BeanDescriptor {
            attributes: bean.attributes(),
            operations: bean.operations(),
        })
    }

    // The lock is released before the bean is called, so beans may query
    // the registry themselves.
    fn lookup(&self, name: &BeanName) -> Result<Arc<dyn Inspectable>> {
        self.beans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| StatusError::BeanNotFound(name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_bean(max: u64) -> Arc<dyn Inspectable> {
        Arc::new(DynamicBean::new().attribute("maxThreads", "int", "max", move || max))
    }

    #[test]
    fn test_find_beans_by_pattern() {
        let registry = BeanRegistry::default();
        registry.register_named("Catalina:type=ThreadPool,name=a", pool_bean(1)).unwrap();
        registry.register_named("Catalina:type=ThreadPool,name=b", pool_bean(2)).unwrap();
        registry.register_named("Catalina:type=Manager,name=a", pool_bean(3)).unwrap();

        let found = registry.find_beans("*:type=ThreadPool,*");
        let names: Vec<&str> = found.iter().map(BeanName::as_str).collect();
        assert_eq!(
            names,
            vec!["Catalina:type=ThreadPool,name=a", "Catalina:type=ThreadPool,name=b"]
        );
    }

    #[test]
    fn test_malformed_pattern_yields_empty_set() {
        let registry = BeanRegistry::default();
        registry.register_named("d:type=A", pool_bean(1)).unwrap();
        assert!(registry.find_beans("no-colon").is_empty());
        assert!(registry.find_beans("d:type").is_empty());
        assert!(registry.find_beans("d:a=\"x").is_empty());
    }

    #[test]
    fn test_reordered_keys_name_the_same_bean() {
        let registry = BeanRegistry::default();
        registry.register_named("d:type=A,name=x", pool_bean(1)).unwrap();
        let reordered = registry.register_named("d:name=x,type=A", pool_bean(2)).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get_attribute(&reordered, "maxThreads").unwrap(), AttrValue::UInt(2));
        assert!(registry.unregister(&BeanName::parse("d:type=A,name=x").unwrap()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_vanished_bean_fails_loudly() {
        let registry = BeanRegistry::default();
        let name = registry.register_named("d:type=A", pool_bean(1)).unwrap();
        assert!(registry.unregister(&name));
        assert!(matches!(
            registry.get_attribute(&name, "maxThreads"),
            Err(StatusError::BeanNotFound(_))
        ));
        assert!(matches!(
            registry.get_descriptor(&name),
            Err(StatusError::BeanNotFound(_))
        ));
    }

    #[test]
    fn test_unknown_attribute_is_an_error() {
        let registry = BeanRegistry::default();
        let name = registry.register_named("d:type=A", pool_bean(9)).unwrap();
        assert_eq!(registry.get_attribute(&name, "maxThreads").unwrap(), AttrValue::UInt(9));
        assert!(matches!(
            registry.get_attribute(&name, "nope"),
            Err(StatusError::AttributeNotFound { .. })
        ));
    }

    #[test]
    fn test_domains_are_sorted_and_distinct() {
        let registry = BeanRegistry::new("mine");
        registry.register_named("zeta:type=A", pool_bean(1)).unwrap();
        registry.register_named("alpha:type=A", pool_bean(1)).unwrap();
        registry.register_named("alpha:type=B", pool_bean(1)).unwrap();
        assert_eq!(registry.domains(), vec!["alpha", "zeta"]);
        assert_eq!(registry.default_domain(), "mine");
    }

    #[test]
    fn test_bean_may_query_registry_while_being_read() {
        let registry = Arc::new(BeanRegistry::default());
        let inner = Arc::clone(&registry);
        let bean = DynamicBean::new().attribute("beanCount", "int", "registered beans", move || {
            inner.len()
        });
        let name = registry.register_named("self:type=Count", Arc::new(bean)).unwrap();
        assert_eq!(registry.get_attribute(&name, "beanCount").unwrap(), AttrValue::UInt(1));
    }
}
