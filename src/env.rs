//! rc environments: list-valued variables with a parent chain.
//!
//! Every rc variable is a list of strings; scalar use means the first
//! element. Lookup walks the parent chain, mutation is always local, so a
//! child environment (function call, subshell, assignment prefix) shadows
//! without copying. Functions live in a parallel table with the same
//! chain rule.

use crate::ast::Node;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A user-defined function: name plus unplanned body AST. The body is
/// re-planned per call so it picks up the call's environment.
#[derive(Debug, Clone)]
pub struct FuncDef {
    pub name: String,
    pub body: Arc<Node>,
}

/// A shared handle to one environment frame. Cloning the handle aliases
/// the frame; `child` creates a new frame.
#[derive(Clone)]
pub struct Env {
    inner: Arc<EnvInner>,
}

struct EnvInner {
    parent: Option<Env>,
    vars: RwLock<HashMap<String, Vec<String>>>,
    funcs: RwLock<HashMap<String, FuncDef>>,
}

impl Default for Env {
    fn default() -> Self {
        Env::new()
    }
}

impl Env {
    pub fn new() -> Env {
        Env {
            inner: Arc::new(EnvInner {
                parent: None,
                vars: RwLock::new(HashMap::new()),
                funcs: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// A child frame inheriting this one.
    pub fn child(&self) -> Env {
        Env {
            inner: Arc::new(EnvInner {
                parent: Some(self.clone()),
                vars: RwLock::new(HashMap::new()),
                funcs: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Looks up `name` through the chain. Numeric names (`1`, `2`, …)
    /// not stored anywhere mirror the elements of `$*`.
    pub fn get(&self, name: &str) -> Option<Vec<String>> {
        let mut cur = Some(self);
        while let Some(env) = cur {
            if let Some(v) = env.inner.vars.read().unwrap().get(name) {
                return Some(v.clone());
            }
            cur = env.inner.parent.as_ref();
        }
        if name != "0" && !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
            let n: usize = name.parse().ok()?;
            if n >= 1 {
                let star = self.get("*")?;
                return Some(star.get(n - 1).map(|s| vec![s.clone()]).unwrap_or_default());
            }
        }
        None
    }

    /// Looks up `name` in this frame only.
    pub fn get_local(&self, name: &str) -> Option<Vec<String>> {
        self.inner.vars.read().unwrap().get(name).cloned()
    }

    pub fn set(&self, name: &str, vals: Vec<String>) {
        self.inner
            .vars
            .write()
            .unwrap()
            .insert(name.to_string(), vals);
    }

    pub fn set1(&self, name: &str, val: &str) {
        self.set(name, vec![val.to_string()]);
    }

    /// Removes `name` from this frame only.
    pub fn unset(&self, name: &str) {
        self.inner.vars.write().unwrap().remove(name);
    }

    pub fn set_status(&self, status: i32) {
        self.set1("status", &status.to_string());
    }

    pub fn status(&self) -> i32 {
        self.get("status")
            .and_then(|v| v.first().and_then(|s| s.parse().ok()))
            .unwrap_or(0)
    }

    pub fn get_func(&self, name: &str) -> Option<FuncDef> {
        let mut cur = Some(self);
        while let Some(env) = cur {
            if let Some(def) = env.inner.funcs.read().unwrap().get(name) {
                return Some(def.clone());
            }
            cur = env.inner.parent.as_ref();
        }
        None
    }

    pub fn set_func(&self, name: &str, body: Node) {
        self.inner.funcs.write().unwrap().insert(
            name.to_string(),
            FuncDef {
                name: name.to_string(),
                body: Arc::new(body),
            },
        );
    }

    pub fn unset_func(&self, name: &str) {
        self.inner.funcs.write().unwrap().remove(name);
    }

    /// The chain merged into one map, nearest frame winning. Used to build
    /// the environment image for `exec`.
    pub fn snapshot(&self) -> HashMap<String, Vec<String>> {
        let mut frames = Vec::new();
        let mut cur = Some(self.clone());
        while let Some(env) = cur {
            frames.push(env.clone());
            cur = env.inner.parent.clone();
        }
        let mut out = HashMap::new();
        for env in frames.into_iter().rev() {
            for (k, v) in env.inner.vars.read().unwrap().iter() {
                out.insert(k.clone(), v.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_searches_parent_chain() {
        let parent = Env::new();
        parent.set("x", vec!["a".into(), "b".into()]);
        let child = parent.child();
        assert_eq!(child.get("x"), Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(child.get_local("x"), None);
    }

    #[test]
    fn set_shadows_locally() {
        let parent = Env::new();
        parent.set1("x", "outer");
        let child = parent.child();
        child.set1("x", "inner");
        assert_eq!(child.get("x"), Some(vec!["inner".to_string()]));
        assert_eq!(parent.get("x"), Some(vec!["outer".to_string()]));
    }

    #[test]
    fn unset_is_local() {
        let parent = Env::new();
        parent.set1("x", "v");
        let child = parent.child();
        child.unset("x");
        // the parent still supplies the value through the chain
        assert_eq!(child.get("x"), Some(vec!["v".to_string()]));
    }

    #[test]
    fn numeric_names_mirror_star() {
        let env = Env::new();
        env.set("*", vec!["a".into(), "b".into()]);
        assert_eq!(env.get("1"), Some(vec!["a".to_string()]));
        assert_eq!(env.get("2"), Some(vec!["b".to_string()]));
        assert_eq!(env.get("3"), Some(vec![]));
    }

    #[test]
    fn status_round_trips() {
        let env = Env::new();
        env.set_status(3);
        assert_eq!(env.get("status"), Some(vec!["3".to_string()]));
        assert_eq!(env.status(), 3);
    }

    #[test]
    fn funcs_follow_chain() {
        let parent = Env::new();
        parent.set_func("f", Node::word("body"));
        let child = parent.child();
        assert!(child.get_func("f").is_some());
        child.unset_func("f");
        assert!(child.get_func("f").is_some(), "unset is local");
        parent.unset_func("f");
        assert!(child.get_func("f").is_none());
    }

    #[test]
    fn snapshot_merges_nearest_first() {
        let parent = Env::new();
        parent.set1("a", "p");
        parent.set1("b", "p");
        let child = parent.child();
        child.set1("a", "c");
        let snap = child.snapshot();
        assert_eq!(snap["a"], vec!["c".to_string()]);
        assert_eq!(snap["b"], vec!["p".to_string()]);
    }
}
