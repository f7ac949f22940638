//! Known HR modules and the (module × action × scope) cross-product.

use serde::{Deserialize, Serialize};

use crate::{Action, ModuleKey, PermissionQuery, Scope};

/// Modules of the HR product, in catalog order.
pub const DEFAULT_HR_MODULES: [&str; 10] = [
    "employees",
    "salary",
    "health",
    "disciplinary",
    "documents",
    "absence",
    "contracts",
    "expenses",
    "offboarding",
    "reports",
];

/// The set of modules a simulation enumerates. Serialized as a plain list;
/// deserialization goes through [`ModuleCatalog::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ModuleKey>", into = "Vec<ModuleKey>")]
pub struct ModuleCatalog {
    modules: Vec<ModuleKey>,
}

impl ModuleCatalog {
    /// Sorted and de-duplicated, so enumeration order never depends on input order.
    pub fn new(modules: impl IntoIterator<Item = ModuleKey>) -> Self {
        let mut modules: Vec<ModuleKey> = modules.into_iter().collect();
        modules.sort();
        modules.dedup();
        Self { modules }
    }

    pub fn hr_default() -> Self {
        Self::new(DEFAULT_HR_MODULES.into_iter().map(ModuleKey::from))
    }

    pub fn modules(&self) -> &[ModuleKey] {
        &self.modules
    }

    pub fn contains(&self, module: &ModuleKey) -> bool {
        self.modules.binary_search(module).is_ok()
    }

    /// Every (module, action, scope) tuple, module-major.
    pub fn queries(&self) -> Vec<PermissionQuery> {
        let mut out = Vec::with_capacity(self.len() * Action::ALL.len() * Scope::ALL.len());
        for module in &self.modules {
            for action in Action::ALL {
                for scope in Scope::ALL {
                    out.push(PermissionQuery::new(module.clone(), action, scope));
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Default for ModuleCatalog {
    fn default() -> Self {
        Self::hr_default()
    }
}

impl From<Vec<ModuleKey>> for ModuleCatalog {
    fn from(modules: Vec<ModuleKey>) -> Self {
        Self::new(modules)
    }
}

impl From<ModuleCatalog> for Vec<ModuleKey> {
    fn from(catalog: ModuleCatalog) -> Self {
        catalog.modules
    }
}
