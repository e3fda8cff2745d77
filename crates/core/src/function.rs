//! Named function chains.
//!
//! A function is a flat, ordered chain of hooks looked up by name. Each hook
//! receives the caller's input and the previous hook's output; the first hook
//! starts from an empty object.

use std::collections::HashMap;

use crate::asset::Object;
use crate::error::{CoreError, ResultExt};

pub type FunctionHook<C> =
    Box<dyn Fn(&mut C, &Object, Object) -> Result<Object, CoreError> + Send + Sync>;

pub struct FunctionExecutor<C> {
    functions: HashMap<String, Vec<FunctionHook<C>>>,
}

impl<C> Default for FunctionExecutor<C> {
    fn default() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }
}

impl<C> FunctionExecutor<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the chain registered under `name`.
    pub fn set_policy(&mut self, name: &str, chain: Vec<FunctionHook<C>>) {
        self.functions.insert(name.to_string(), chain);
    }

    /// Register a single-hook function.
    pub fn register<F>(&mut self, name: &str, hook: F)
    where
        F: Fn(&mut C, &Object, Object) -> Result<Object, CoreError> + Send + Sync + 'static,
    {
        self.set_policy(name, vec![Box::new(hook)]);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered function names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn execute(&self, ctx: &mut C, name: &str, input: &Object) -> Result<Object, CoreError> {
        let chain = self.functions.get(name).ok_or_else(|| {
            CoreError::BadRequest(format!("no policy for function '{name}' is defined"))
        })?;

        let mut output = Object::new();
        for (index, hook) in chain.iter().enumerate() {
            output = hook(ctx, input, output)
                .with_context(|| format!("execution of func #{index} failed"))?;
        }
        Ok(output)
    }
}
