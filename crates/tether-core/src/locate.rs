//! Depth-first search over the host object graph.
//!
//! The host object graph is cyclic. The locator tracks visited objects by
//! identity and only walks own enumerable data properties, so accessor
//! getters never run during a search.

use std::collections::HashSet;

use tracing::trace;

use crate::object::ObjectRef;
use crate::value::HostValue;

/// Configurable depth-first object search.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectLocator {
    max_depth: Option<usize>,
}

impl ObjectLocator {
    /// Create an unbounded locator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop descending below `depth` levels from the root.
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Return the first object reachable from `root` (including `root`)
    /// satisfying `predicate`, visiting each object at most once.
    ///
    /// Children are visited in property insertion order. Functions and
    /// primitives are never descended into.
    pub fn find<P>(&self, root: &HostValue, mut predicate: P) -> Option<ObjectRef>
    where
        P: FnMut(&ObjectRef) -> bool,
    {
        let root = root.as_object()?;
        let mut visited = HashSet::new();
        let mut stack = vec![(root.clone(), 0_usize)];
        let mut examined = 0_usize;

        while let Some((object, depth)) = stack.pop() {
            if !visited.insert(object.id()) {
                continue;
            }
            examined = examined.saturating_add(1);
            if predicate(&object) {
                trace!(examined, depth, "object located");
                return Some(object);
            }
            if self.max_depth.is_some_and(|max| depth >= max) {
                continue;
            }
            let next_depth = depth.saturating_add(1);
            // Reverse so the first property is popped first.
            for (_, child) in object.data_entries().into_iter().rev() {
                if let HostValue::Object(child) = child
                    && !visited.contains(&child.id())
                {
                    stack.push((child, next_depth));
                }
            }
        }

        trace!(examined, "object not found");
        None
    }
}

/// Search from `root` with an unbounded [`ObjectLocator`].
pub fn locate<P>(root: &HostValue, predicate: P) -> Option<ObjectRef>
where
    P: FnMut(&ObjectRef) -> bool,
{
    ObjectLocator::new().find(root, predicate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::HostFunction;
    use std::sync::Arc;

    #[test]
    fn test_finds_root() {
        let root = ObjectRef::new();
        root.set("marker", HostValue::Bool(true));
        let found = locate(&HostValue::Object(root.clone()), |o| o.has_own("marker"));
        assert!(found.unwrap().ptr_eq(&root));
    }

    #[test]
    fn test_cycle_without_match_terminates() {
        let a = ObjectRef::new();
        let b = ObjectRef::new();
        a.set("b", HostValue::Object(b.clone()));
        b.set("a", HostValue::Object(a.clone()));
        b.set("self", HostValue::Object(b.clone()));

        let mut calls = 0_u32;
        let found = locate(&HostValue::Object(a), |_| {
            calls = calls.saturating_add(1);
            false
        });
        assert!(found.is_none());
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_depth_first_in_insertion_order() {
        let root = ObjectRef::new();
        let first = ObjectRef::new();
        let deep = ObjectRef::new();
        let second = ObjectRef::new();
        deep.set("hit", HostValue::Bool(true));
        second.set("hit", HostValue::Bool(true));
        first.set("deep", HostValue::Object(deep.clone()));
        root.set("first", HostValue::Object(first));
        root.set("second", HostValue::Object(second));

        let found = locate(&HostValue::Object(root), |o| o.has_own("hit")).unwrap();
        assert!(found.ptr_eq(&deep));
    }

    #[test]
    fn test_does_not_descend_into_functions_or_accessors() {
        struct Exploding;
        impl crate::object::Accessor for Exploding {
            fn get(&self) -> HostValue {
                panic!("getter must not run during traversal");
            }
            fn set(&self, _: HostValue) {}
        }

        let root = ObjectRef::new();
        root.set(
            "fn",
            HostValue::Function(HostFunction::new("f", |_, _| Ok(HostValue::Undefined))),
        );
        root.define_accessor("trap", Arc::new(Exploding));
        assert!(locate(&HostValue::Object(root), |o| o.has_own("never")).is_none());
    }

    #[test]
    fn test_max_depth_limits_search() {
        let root = ObjectRef::new();
        let child = ObjectRef::new();
        let grandchild = ObjectRef::new();
        grandchild.set("hit", HostValue::Bool(true));
        child.set("g", HostValue::Object(grandchild));
        root.set("c", HostValue::Object(child));

        let locator = ObjectLocator::new().with_max_depth(1);
        assert!(
            locator
                .find(&HostValue::Object(root.clone()), |o| o.has_own("hit"))
                .is_none()
        );
        assert!(locate(&HostValue::Object(root), |o| o.has_own("hit")).is_some());
    }

    #[test]
    fn test_non_object_root() {
        assert!(locate(&HostValue::from("text"), |_| true).is_none());
    }
}
