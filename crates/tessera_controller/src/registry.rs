//! Hook registry for one controller.
//!
//! The [`HookRegistry`] holds the controller's `hook -> name` map and every
//! attached part's hook bindings. Both are fixed once the controller is
//! built.
//!
//! # Invariants
//!
//! - The `hook -> name` map is bijective: no hook is declared twice and no
//!   name is used by two hooks.
//! - Every binding refers to a declared hook.
//! - A part binds at most one function per hook.

use hashbrown::HashMap;
use indexmap::IndexMap;

use crate::error::ConstructionError;
use crate::hook::HookId;
use crate::runner::HookBinding;

/// Registry of declared hooks and the part functions bound to them.
#[derive(Debug, Default)]
pub struct HookRegistry {
    /// Declared hooks, in declaration order.
    hook_names: IndexMap<HookId, String>,
    /// Reverse index used to keep names unique.
    names: HashMap<String, HookId>,
    /// Bindings per part, in attach order.
    bindings: IndexMap<String, Vec<HookBinding>>,
}

impl HookRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `hook` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConstructionError::DuplicateHook`] if the hook is already
    /// declared, or [`ConstructionError::DuplicateHookName`] if the name is.
    pub fn declare(
        &mut self,
        hook: HookId,
        name: impl Into<String>,
    ) -> Result<(), ConstructionError> {
        let name = name.into();
        if let Some(existing) = self.hook_names.get(&hook) {
            return Err(ConstructionError::DuplicateHook {
                hook: hook.type_name(),
                name: existing.clone(),
            });
        }
        if self.names.contains_key(&name) {
            return Err(ConstructionError::DuplicateHookName(name));
        }
        self.names.insert(name.clone(), hook);
        self.hook_names.insert(hook, name);
        Ok(())
    }

    /// Returns the name `hook` is declared under.
    #[must_use]
    pub fn name_of(&self, hook: HookId) -> Option<&str> {
        self.hook_names.get(&hook).map(String::as_str)
    }

    /// Returns the hook declared under `name`.
    #[must_use]
    pub fn hook_named(&self, name: &str) -> Option<HookId> {
        self.names.get(name).copied()
    }

    /// Returns `true` if `hook` is declared.
    #[must_use]
    pub fn contains(&self, hook: HookId) -> bool {
        self.hook_names.contains_key(&hook)
    }

    /// Iterates over declared hooks and their names.
    pub fn hooks(&self) -> impl Iterator<Item = (HookId, &str)> {
        self.hook_names
            .iter()
            .map(|(hook, name)| (*hook, name.as_str()))
    }

    /// Records the bindings of a part.
    ///
    /// # Errors
    ///
    /// Returns [`ConstructionError::UnknownHook`] for a binding to an
    /// undeclared hook and [`ConstructionError::MultipleBindings`] when two
    /// bindings share a hook.
    pub fn register_part(
        &mut self,
        part: &str,
        bindings: Vec<HookBinding>,
    ) -> Result<(), ConstructionError> {
        let mut seen = Vec::with_capacity(bindings.len());
        for binding in &bindings {
            let hook = binding.hook();
            if !self.contains(hook) {
                return Err(ConstructionError::UnknownHook {
                    part: part.to_owned(),
                    func: binding.func_name().to_owned(),
                    hook: hook.type_name(),
                });
            }
            if seen.contains(&hook) {
                return Err(ConstructionError::MultipleBindings {
                    part: part.to_owned(),
                    hook: hook.type_name(),
                });
            }
            seen.push(hook);
        }
        self.bindings.insert(part.to_owned(), bindings);
        Ok(())
    }

    /// Returns `{part name: binding}` for every part bound to `hook`, in
    /// attach order. Parts with no binding for `hook` are left out.
    #[must_use]
    pub fn find_hooked_functions(&self, hook: HookId) -> IndexMap<&str, &HookBinding> {
        self.bindings
            .iter()
            .filter_map(|(part, bindings)| {
                bindings
                    .iter()
                    .find(|binding| binding.hook() == hook)
                    .map(|binding| (part.as_str(), binding))
            })
            .collect()
    }
}
