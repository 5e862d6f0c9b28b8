// File: src/gc.rs
//
// Generational mark-and-sweep collector (spec.md §4.7), grounded in
// `examples/original_source/memory.c`'s `heapList`/`freeList` slab design
// and `examples/original_source/vm.h`'s `bytesAllocated`/`nextGCThreshhold`
// fields. Objects are never freed by raw pointer; a `GcRef` is a stable
// index into the heap's slab storage, recycled through a free list once an
// object is swept.

use crate::object::{Generation, Obj, ObjKind};
use crate::value::Value;

pub const SLAB_SIZE: usize = 10_000;
const INITIAL_GC_THRESHOLD: usize = 1 << 20; // 1 MiB, mirrors the original's default.
const GC_GROWTH_FACTOR: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GcRef(u32);

impl GcRef {
    fn index(self) -> usize {
        self.0 as usize
    }
}

enum Slot {
    Free(Option<u32>),
    Occupied(Obj),
}

struct Slab {
    slots: Vec<Slot>,
}

impl Slab {
    fn new() -> Self {
        let mut slots = Vec::with_capacity(SLAB_SIZE);
        for _ in 0..SLAB_SIZE {
            slots.push(Slot::Free(None));
        }
        Slab { slots }
    }
}

/// Controls how aggressively `maybe_collect` runs, mirroring the CLI's
/// `--stress-GC={young,full,both,none}` flag (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StressMode {
    None,
    Young,
    Full,
    Both,
}

pub struct Heap {
    slabs: Vec<Slab>,
    free_head: Option<u32>,
    len: usize,
    bytes_allocated: usize,
    next_threshold: usize,
    pub enabled: bool,
    pub stress: StressMode,
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            slabs: vec![Slab::new()],
            free_head: None,
            len: 0,
            bytes_allocated: 0,
            next_threshold: INITIAL_GC_THRESHOLD,
            enabled: true,
            stress: StressMode::None,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn should_collect(&self) -> bool {
        self.enabled && (self.bytes_allocated >= self.next_threshold || self.stress != StressMode::None)
    }

    fn grow_threshold(&mut self) {
        self.next_threshold = self.bytes_allocated.saturating_mul(GC_GROWTH_FACTOR).max(INITIAL_GC_THRESHOLD);
    }

    fn object_size(kind: &ObjKind) -> usize {
        std::mem::size_of::<Obj>()
            + match kind {
                ObjKind::String { value, .. } => value.len(),
                ObjKind::Array(v) => v.len() * std::mem::size_of::<Value>(),
                ObjKind::Map(m) => m.len() * std::mem::size_of::<(Value, Value)>() * 2,
                _ => 0,
            }
    }

    pub fn alloc(&mut self, kind: ObjKind) -> GcRef {
        self.bytes_allocated += Self::object_size(&kind);
        let obj = Obj::new(kind);
        if let Some(idx) = self.free_head {
            let (slab_idx, slot_idx) = Self::split(idx);
            let next_free = match &self.slabs[slab_idx].slots[slot_idx] {
                Slot::Free(n) => *n,
                Slot::Occupied(_) => unreachable!("free list points at occupied slot"),
            };
            self.free_head = next_free;
            self.slabs[slab_idx].slots[slot_idx] = Slot::Occupied(obj);
            self.len += 1;
            return GcRef(idx);
        }

        let slab_idx = self.slabs.len() - 1;
        let slot_idx_in_slab = self.len % SLAB_SIZE;
        if self.len > 0 && slot_idx_in_slab == 0 {
            self.slabs.push(Slab::new());
        }
        let slab_idx = self.slabs.len() - 1;
        let slot_idx = self.len - slab_idx * SLAB_SIZE;
        self.slabs[slab_idx].slots[slot_idx] = Slot::Occupied(obj);
        let idx = (slab_idx * SLAB_SIZE + slot_idx) as u32;
        self.len += 1;
        GcRef(idx)
    }

    fn split(idx: u32) -> (usize, usize) {
        let idx = idx as usize;
        (idx / SLAB_SIZE, idx % SLAB_SIZE)
    }

    pub fn get(&self, r: GcRef) -> &Obj {
        let (s, i) = Self::split(r.0);
        match &self.slabs[s].slots[i] {
            Slot::Occupied(o) => o,
            Slot::Free(_) => panic!("dangling GcRef {:?}", r),
        }
    }

    pub fn get_mut(&mut self, r: GcRef) -> &mut Obj {
        let (s, i) = Self::split(r.0);
        match &mut self.slabs[s].slots[i] {
            Slot::Occupied(o) => o,
            Slot::Free(_) => panic!("dangling GcRef {:?}", r),
        }
    }

    pub fn hide(&mut self, r: GcRef) {
        self.get_mut(r).header.no_gc = true;
    }

    pub fn unhide(&mut self, r: GcRef) {
        self.get_mut(r).header.no_gc = false;
    }

    fn references(obj: &Obj) -> Vec<GcRef> {
        let mut out = Vec::new();
        let push_val = |out: &mut Vec<GcRef>, v: &Value| {
            if let Value::Object(r) = v {
                out.push(*r);
            }
        };
        match &obj.kind {
            ObjKind::Array(items) => items.iter().for_each(|v| push_val(&mut out, v)),
            ObjKind::Map(pairs) => pairs.iter().for_each(|(k, v)| {
                push_val(&mut out, k);
                push_val(&mut out, v);
            }),
            ObjKind::Internal(items) => items.iter().for_each(|v| push_val(&mut out, v)),
            ObjKind::Closure(c) => {
                out.push(c.function);
                out.extend(c.upvalues.iter().copied());
            }
            ObjKind::Upvalue(u) => push_val(&mut out, &u.closed),
            ObjKind::BoundMethod(b) => {
                push_val(&mut out, &b.receiver);
                out.push(b.method);
            }
            ObjKind::Class(c) => {
                if let Some(s) = c.superclass {
                    out.push(s);
                }
                if let Some(m) = c.included_module {
                    out.push(m);
                }
                out.extend(c.methods.values().copied());
                out.extend(c.getters.values().copied());
                out.extend(c.setters.values().copied());
                out.extend(c.static_methods.values().copied());
            }
            ObjKind::Instance(i) => {
                out.push(i.class);
                out.extend(i.fields.values().filter_map(|v| v.as_object()));
                if let Some(s) = i.singleton {
                    out.push(s);
                }
            }
            ObjKind::String { .. } | ObjKind::Function(_) | ObjKind::Native(_) | ObjKind::Regex(_) => {}
        }
        out
    }

    /// Full mark phase: marks every object reachable from `roots`, walking
    /// a gray-stack to avoid recursion depth blowing the native stack on
    /// deep structures (spec.md §4.7 "gray-stack cursor").
    fn mark(&mut self, roots: &[GcRef]) {
        let mut gray: Vec<GcRef> = roots.to_vec();
        while let Some(r) = gray.pop() {
            let (s, i) = Self::split(r.0);
            let already_marked = match &self.slabs[s].slots[i] {
                Slot::Occupied(o) => o.header.marked,
                Slot::Free(_) => continue,
            };
            if already_marked {
                continue;
            }
            let refs = {
                let obj = match &mut self.slabs[s].slots[i] {
                    Slot::Occupied(o) => {
                        o.header.marked = true;
                        o
                    }
                    Slot::Free(_) => continue,
                };
                Self::references(obj)
            };
            gray.extend(refs);
        }
    }

    fn sweep(&mut self) {
        let num_slabs = self.slabs.len();
        for slab_idx in 0..num_slabs {
            for slot_idx in 0..SLAB_SIZE {
                let idx = (slab_idx * SLAB_SIZE + slot_idx) as u32;
                let free_obj;
                match &mut self.slabs[slab_idx].slots[slot_idx] {
                    Slot::Occupied(o) if o.header.marked => {
                        o.header.marked = false;
                        if o.header.generation == crate::object::Generation::Young {
                            o.header.generation = Generation::Old;
                        }
                        continue;
                    }
                    Slot::Occupied(o) if o.header.no_gc => {
                        o.header.marked = false;
                        continue;
                    }
                    Slot::Occupied(_) => {
                        free_obj = true;
                    }
                    Slot::Free(_) => continue,
                }
                if free_obj {
                    let old_head = self.free_head;
                    self.slabs[slab_idx].slots[slot_idx] = Slot::Free(old_head);
                    self.free_head = Some(idx);
                }
            }
        }
    }

    /// Runs one full collection cycle. `roots` must already enumerate every
    /// live reference reachable from C-stack locals, open upvalues, exec-
    /// context stacks and hidden objects (spec.md §4.7); the heap itself
    /// has no notion of "the VM", so the caller assembles that root set.
    pub fn collect(&mut self, roots: &[GcRef]) {
        self.mark(roots);
        self.sweep();
        self.bytes_allocated = self.len * std::mem::size_of::<Obj>();
        self.grow_threshold();
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjKind;

    #[test]
    fn alloc_and_get_round_trips() {
        let mut heap = Heap::new();
        let r = heap.alloc(ObjKind::String { value: "hi".into(), interned: false });
        assert_eq!(heap.get(r).type_name(), "String");
    }

    #[test]
    fn unreachable_objects_are_swept_and_recycled() {
        let mut heap = Heap::new();
        let a = heap.alloc(ObjKind::String { value: "a".into(), interned: false });
        let _b = heap.alloc(ObjKind::String { value: "b".into(), interned: false });
        heap.collect(&[a]);
        assert_eq!(heap.get(a).type_name(), "String");
        let c = heap.alloc(ObjKind::String { value: "c".into(), interned: false });
        // `c` should reuse the slot freed from `_b`.
        assert_ne!(c, a);
    }

    #[test]
    fn hidden_objects_survive_collection_with_no_roots() {
        let mut heap = Heap::new();
        let r = heap.alloc(ObjKind::String { value: "pinned".into(), interned: false });
        heap.hide(r);
        heap.collect(&[]);
        assert_eq!(heap.get(r).type_name(), "String");
    }
}
