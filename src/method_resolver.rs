// File: src/method_resolver.rs
//
// Method/getter/setter resolution along the ancestor chain (spec.md §4.3):
// singleton class -> class -> superclass chain (an `IClass` transparently
// splices an included module into that chain) -> Object root.

use crate::gc::{GcRef, Heap};
use crate::object::ObjKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Method,
    Getter,
    Setter,
    Static,
}

fn table<'a>(heap: &'a Heap, class: GcRef, slot: Slot) -> Option<&'a ahash::AHashMap<String, GcRef>> {
    match &heap.get(class).kind {
        ObjKind::Class(c) => Some(match slot {
            Slot::Method => &c.methods,
            Slot::Getter => &c.getters,
            Slot::Setter => &c.setters,
            Slot::Static => &c.static_methods,
        }),
        _ => None,
    }
}

fn superclass_of(heap: &Heap, class: GcRef) -> Option<GcRef> {
    match &heap.get(class).kind {
        ObjKind::Class(c) => c.superclass,
        _ => None,
    }
}

/// Walks `class`'s ancestor chain looking for `name` in the given table
/// kind, returning the defining class along with the member.
pub fn resolve_in_chain(heap: &Heap, class: GcRef, name: &str, slot: Slot) -> Option<(GcRef, GcRef)> {
    let mut cur = Some(class);
    while let Some(c) = cur {
        if let Some(t) = table(heap, c, slot) {
            if let Some(&m) = t.get(name) {
                return Some((c, m));
            }
        }
        cur = superclass_of(heap, c);
    }
    None
}

/// Resolves an instance method, consulting the instance's singleton class
/// first (spec.md §4.3 "singleton class -> class -> ...").
pub fn resolve_instance_method(heap: &Heap, instance: GcRef, name: &str) -> Option<GcRef> {
    let (class, singleton) = match &heap.get(instance).kind {
        ObjKind::Instance(i) => (i.class, i.singleton),
        _ => return None,
    };
    if let Some(s) = singleton {
        if let Some((_, m)) = resolve_in_chain(heap, s, name, Slot::Method) {
            return Some(m);
        }
    }
    resolve_in_chain(heap, class, name, Slot::Method).map(|(_, m)| m)
}

/// `super.method(...)` resolves starting one link above the class that
/// *declared* the currently executing method, not the receiver's runtime
/// class (spec.md §4.3).
pub fn resolve_super_method(heap: &Heap, declaring_class: GcRef, name: &str) -> Option<GcRef> {
    let start = superclass_of(heap, declaring_class)?;
    resolve_in_chain(heap, start, name, Slot::Method).map(|(_, m)| m)
}

pub fn resolve_getter(heap: &Heap, class: GcRef, name: &str) -> Option<GcRef> {
    resolve_in_chain(heap, class, name, Slot::Getter).map(|(_, m)| m)
}

pub fn resolve_setter(heap: &Heap, class: GcRef, name: &str) -> Option<GcRef> {
    resolve_in_chain(heap, class, name, Slot::Setter).map(|(_, m)| m)
}

pub fn resolve_static(heap: &Heap, class: GcRef, name: &str) -> Option<GcRef> {
    resolve_in_chain(heap, class, name, Slot::Static).map(|(_, m)| m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ClassObj;

    #[test]
    fn resolves_through_superclass_chain() {
        let mut heap = Heap::new();
        let base = heap.alloc(ObjKind::Class(ClassObj::new("Base", None)));
        let method = heap.alloc(ObjKind::Internal(vec![]));
        if let ObjKind::Class(c) = &mut heap.get_mut(base).kind {
            c.methods.insert("greet".into(), method);
        }
        let derived = heap.alloc(ObjKind::Class(ClassObj::new("Derived", Some(base))));
        let found = resolve_in_chain(&heap, derived, "greet", Slot::Method);
        assert_eq!(found, Some((base, method)));
    }

    #[test]
    fn super_call_starts_above_declaring_class_not_receiver_class() {
        let mut heap = Heap::new();
        let base = heap.alloc(ObjKind::Class(ClassObj::new("Base", None)));
        let base_method = heap.alloc(ObjKind::Internal(vec![]));
        if let ObjKind::Class(c) = &mut heap.get_mut(base).kind {
            c.methods.insert("greet".into(), base_method);
        }
        let mid = heap.alloc(ObjKind::Class(ClassObj::new("Mid", Some(base))));
        let _leaf = heap.alloc(ObjKind::Class(ClassObj::new("Leaf", Some(mid))));
        // `super.greet()` called from a method declared on `Mid` should
        // find `Base::greet`, regardless of the receiver's actual class.
        assert_eq!(resolve_super_method(&heap, mid, "greet"), Some(base_method));
    }
}
