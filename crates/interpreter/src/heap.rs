//! Object heap. Objects are never collected; they live until the machine
//! state is cleared.
use cranelift_entity::{entity_impl, PrimaryMap};
use rustc_hash::FxHashMap;
use slicefold_ir::Type;
use smol_str::SmolStr;

use crate::Value;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(u32);
entity_impl!(ObjRef, "obj");

#[derive(Debug, Clone, PartialEq)]
pub enum HeapObject {
    Array { elem: Type, elems: Vec<Value> },
    Instance {
        ty: Type,
        fields: FxHashMap<SmolStr, Value>,
    },
}

impl HeapObject {
    /// Name of the runtime type, used to match `catch` clauses.
    pub fn type_name(&self) -> String {
        match self {
            Self::Array { elem, .. } => format!("{elem}[]"),
            Self::Instance { ty, .. } => match ty.as_named() {
                Some(named) => named.name.to_string(),
                None => ty.to_string(),
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct Heap {
    objects: PrimaryMap<ObjRef, HeapObject>,
}

impl Heap {
    pub fn alloc(&mut self, object: HeapObject) -> ObjRef {
        self.objects.push(object)
    }

    pub fn alloc_array(&mut self, elem: Type, elems: Vec<Value>) -> ObjRef {
        self.alloc(HeapObject::Array { elem, elems })
    }

    pub fn get(&self, obj: ObjRef) -> &HeapObject {
        &self.objects[obj]
    }

    pub fn get_mut(&mut self, obj: ObjRef) -> &mut HeapObject {
        &mut self.objects[obj]
    }

    pub fn elems(&self, obj: ObjRef) -> Option<&[Value]> {
        match &self.objects[obj] {
            HeapObject::Array { elems, .. } => Some(elems),
            HeapObject::Instance { .. } => None,
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }
}
