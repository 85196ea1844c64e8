use serde::{Deserialize, Serialize};

/// Names the weaver looks for in the slice library and in the woven module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WeaverConfig {
    /// Name of the module defining the slice type.
    pub library: String,
    /// Full name of the generic slice type, including the arity suffix.
    pub slice_type: String,
    pub array_field: String,
    pub offset_field: String,
    pub getter: String,
    pub setter: String,
    /// Simple name of the per-method opt-out annotation.
    pub opt_out_marker: String,
    /// Namespace declaring the opt-out marker. Every annotation in it is
    /// removed after weaving.
    pub marker_namespace: String,
    /// Guard shadow snapshots against a null slice binding. Only applies to
    /// slice types that are classes.
    pub null_guard: bool,
}

impl Default for WeaverConfig {
    fn default() -> Self {
        Self {
            library: "Corvalius.ArraySlice".into(),
            slice_type: "Corvalius.ArraySlice.ArraySlice`1".into(),
            array_field: "Array".into(),
            offset_field: "Offset".into(),
            getter: "get_Item".into(),
            setter: "set_Item".into(),
            opt_out_marker: "ArraySliceDoNotOptimize".into(),
            marker_namespace: "Corvalius.ArraySlice".into(),
            null_guard: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml() {
        let config: WeaverConfig = toml::from_str(
            r#"
            library = "Acme.Slices"
            slice_type = "Acme.Slices.Slice`1"
            null_guard = false
            "#,
        )
        .unwrap();

        assert_eq!(config.library, "Acme.Slices");
        assert_eq!(config.slice_type, "Acme.Slices.Slice`1");
        assert!(!config.null_guard);
        assert_eq!(config.getter, "get_Item");
        assert_eq!(config.marker_namespace, "Corvalius.ArraySlice");
    }

    #[test]
    fn unknown_key() {
        assert!(toml::from_str::<WeaverConfig>("libary = \"x\"").is_err());
    }
}
