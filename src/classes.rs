// File: src/classes.rs
//
// Bootstraps the root of the class DAG (spec.md §3 "the class pointer
// forms a DAG terminating at the root `Object` class") and the built-in
// error hierarchy (spec.md §7), wiring each `ErrorClass` variant to a real
// `ClassObj` on the heap so user code can `catch (TypeError e)` by name
// and `class MyError < Error {}` can subclass a bootstrapped class.

use crate::errors::ErrorClass;
use crate::gc::{GcRef, Heap};
use crate::object::{ClassObj, ObjKind};
use ahash::AHashMap;

/// The class table every thread starts with: `Object`/`Class`/`Module`
/// plus one entry per `ErrorClass` variant (block-control classes are
/// deliberately excluded — spec.md §7 "never propagate to user catches").
pub struct Builtins {
    pub object_class: GcRef,
    pub class_class: GcRef,
    pub module_class: GcRef,
    pub array_class: GcRef,
    pub map_class: GcRef,
    pub string_class: GcRef,
    pub error_classes: AHashMap<ErrorClass, GcRef>,
}

impl Builtins {
    pub fn bootstrap(heap: &mut Heap) -> Self {
        let object_class = heap.alloc(ObjKind::Class(ClassObj::new("Object", None)));
        let class_class = heap.alloc(ObjKind::Class(ClassObj::new("Class", Some(object_class))));
        let module_class = heap.alloc(ObjKind::Class(ClassObj::new("Module", Some(object_class))));
        let array_class = heap.alloc(ObjKind::Class(ClassObj::new("Array", Some(object_class))));
        let map_class = heap.alloc(ObjKind::Class(ClassObj::new("Map", Some(object_class))));
        let string_class = heap.alloc(ObjKind::Class(ClassObj::new("String", Some(object_class))));

        let mut error_classes = AHashMap::new();
        let root = heap.alloc(ObjKind::Class(ClassObj::new("Error", Some(object_class))));
        error_classes.insert(ErrorClass::Error, root);

        // Every other non-block-control class is a direct or indirect
        // descendant of `Error`; `superclass()` gives the parent to wire.
        let variants = [
            ErrorClass::ArgumentError,
            ErrorClass::TypeError,
            ErrorClass::NameError,
            ErrorClass::SyntaxError,
            ErrorClass::SystemError,
            ErrorClass::LoadError,
            ErrorClass::RecursionError,
            ErrorClass::ZeroDivisionError,
            ErrorClass::IndexError,
        ];
        for variant in variants {
            let parent = variant.superclass().and_then(|p| error_classes.get(&p).copied()).unwrap_or(root);
            let class = heap.alloc(ObjKind::Class(ClassObj::new(variant.name(), Some(parent))));
            error_classes.insert(variant, class);
        }

        // `IndexError` is declared before its parent `ArgumentError` above
        // only if insertion order matters; both are present by now so a
        // second pass re-parents anything inserted out of order.
        if let (Some(&idx_err), Some(&arg_err)) =
            (error_classes.get(&ErrorClass::IndexError), error_classes.get(&ErrorClass::ArgumentError))
        {
            if let ObjKind::Class(c) = &mut heap.get_mut(idx_err).kind {
                c.superclass = Some(arg_err);
            }
        }

        Builtins { object_class, class_class, module_class, array_class, map_class, string_class, error_classes }
    }

    pub fn error_class_ref(&self, class: ErrorClass) -> GcRef {
        *self.error_classes.get(&class).expect("every ErrorClass variant is bootstrapped")
    }

    pub fn by_name(&self, name: &str) -> Option<GcRef> {
        match name {
            "Object" => Some(self.object_class),
            "Class" => Some(self.class_class),
            "Module" => Some(self.module_class),
            "Array" => Some(self.array_class),
            "Map" => Some(self.map_class),
            "String" => Some(self.string_class),
            _ => ErrorClass::by_name(name).map(|c| self.error_class_ref(c)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_hierarchy_resolves_to_object_root() {
        let mut heap = Heap::new();
        let builtins = Builtins::bootstrap(&mut heap);
        let type_error = builtins.error_class_ref(ErrorClass::TypeError);
        let superclass = match &heap.get(type_error).kind {
            ObjKind::Class(c) => c.superclass,
            _ => None,
        };
        assert_eq!(superclass, Some(builtins.error_class_ref(ErrorClass::Error)));
    }

    #[test]
    fn index_error_descends_from_argument_error() {
        let mut heap = Heap::new();
        let builtins = Builtins::bootstrap(&mut heap);
        let idx = builtins.error_class_ref(ErrorClass::IndexError);
        let superclass = match &heap.get(idx).kind {
            ObjKind::Class(c) => c.superclass,
            _ => None,
        };
        assert_eq!(superclass, Some(builtins.error_class_ref(ErrorClass::ArgumentError)));
    }

    #[test]
    fn by_name_finds_bootstrapped_classes() {
        let mut heap = Heap::new();
        let builtins = Builtins::bootstrap(&mut heap);
        assert_eq!(builtins.by_name("TypeError"), Some(builtins.error_class_ref(ErrorClass::TypeError)));
        assert_eq!(builtins.by_name("Array"), Some(builtins.array_class));
        assert_eq!(builtins.by_name("NoSuchClass"), None);
    }
}
