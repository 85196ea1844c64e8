//! Custom attributes attached to modules, types, methods, parameters and
//! properties.
use std::fmt;

use smol_str::SmolStr;

use crate::{
    function::ArgData,
    module::{PropertyDef, TypeDef},
    Function, Module,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Annotation {
    /// Full name of the attribute type, e.g.
    /// `Corvalius.ArraySlice.ArraySliceDoNotOptimizeAttribute`.
    pub name: SmolStr,
}

impl Annotation {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self { name: name.into() }
    }

    pub fn namespace(&self) -> &str {
        self.name.rsplit_once('.').map_or("", |(ns, _)| ns)
    }

    /// Name without namespace.
    pub fn simple_name(&self) -> &str {
        self.name.rsplit_once('.').map_or(&self.name, |(_, name)| name)
    }

    /// Returns `true` if this is `marker` declared in `namespace`. The simple
    /// name may carry the conventional `Attribute` suffix.
    pub fn is_marker(&self, namespace: &str, marker: &str) -> bool {
        let name = self.simple_name();
        self.namespace() == namespace
            && (name == marker || name.strip_suffix("Attribute") == Some(marker))
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations(Vec<Annotation>);

impl Annotations {
    pub fn push(&mut self, annotation: Annotation) {
        self.0.push(annotation);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn has_marker(&self, namespace: &str, marker: &str) -> bool {
        self.0.iter().any(|a| a.is_marker(namespace, marker))
    }

    /// Removes every annotation declared in `namespace` and returns the number
    /// of removed annotations.
    pub fn remove_namespace(&mut self, namespace: &str) -> usize {
        let before = self.0.len();
        self.0.retain(|a| a.namespace() != namespace);
        before - self.0.len()
    }
}

impl FromIterator<Annotation> for Annotations {
    fn from_iter<T: IntoIterator<Item = Annotation>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// An entity that can carry annotations.
pub trait AnnotationHost {
    fn annotations(&self) -> &Annotations;
    fn annotations_mut(&mut self) -> &mut Annotations;

    fn has_marker(&self, namespace: &str, marker: &str) -> bool {
        self.annotations().has_marker(namespace, marker)
    }

    fn remove_markers(&mut self, namespace: &str) -> usize {
        self.annotations_mut().remove_namespace(namespace)
    }
}

macro_rules! impl_annotation_host {
    ($($ty:ty),*) => {
        $(
            impl AnnotationHost for $ty {
                fn annotations(&self) -> &Annotations {
                    &self.annotations
                }

                fn annotations_mut(&mut self) -> &mut Annotations {
                    &mut self.annotations
                }
            }
        )*
    };
}

impl_annotation_host!(Module, TypeDef, Function, ArgData, PropertyDef);
