//! Lookup of referenced modules by name.
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::Module;

pub trait ModuleResolver {
    fn resolve(&self, name: &str) -> Option<&Module>;
}

impl ModuleResolver for () {
    fn resolve(&self, _name: &str) -> Option<&Module> {
        None
    }
}

/// A set of in-memory modules keyed by name.
#[derive(Debug, Default)]
pub struct ModuleSet {
    modules: FxHashMap<SmolStr, Module>,
}

impl ModuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `module`, replacing any module of the same name.
    pub fn insert(&mut self, module: Module) -> Option<Module> {
        self.modules.insert(module.name.clone(), module)
    }

    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Module> {
        self.modules.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Module> {
        self.modules.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(SmolStr::as_str)
    }
}

impl ModuleResolver for ModuleSet {
    fn resolve(&self, name: &str) -> Option<&Module> {
        self.get(name)
    }
}

impl FromIterator<Module> for ModuleSet {
    fn from_iter<T: IntoIterator<Item = Module>>(iter: T) -> Self {
        let mut set = Self::new();
        for module in iter {
            set.insert(module);
        }
        set
    }
}
