//! Layered configuration merging.

/// Recursively deep-merge `overlay` into `base`.
///
/// - Tables merge recursively per-field.
/// - Scalars and arrays from the overlay **replace** the base value.
pub fn deep_merge(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                if let Some(base_val) = base_table.get_mut(key) {
                    deep_merge(base_val, overlay_val);
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_merge_and_arrays_replace() {
        let mut base: toml::Value = toml::from_str(
            r#"
            [discovery]
            tooling_global = "__a"
            state_markers = ["x", "y"]
        "#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
            [discovery]
            state_markers = ["z"]
            [loader]
            no_cache = false
        "#,
        )
        .unwrap();

        deep_merge(&mut base, &overlay);

        let discovery = &base["discovery"];
        assert_eq!(discovery["tooling_global"].as_str(), Some("__a"));
        assert_eq!(discovery["state_markers"].as_array().unwrap().len(), 1);
        assert_eq!(base["loader"]["no_cache"].as_bool(), Some(false));
    }
}
