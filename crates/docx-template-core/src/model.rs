use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

/// Field name to the value entered by the user.
pub type FieldValues = BTreeMap<String, String>;

/// A `{{name}}` token found in body text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderField {
    pub name: String,
    /// Index of the first occurrence among distinct placeholders.
    pub order: usize,
}

/// A property defined in `docProps/custom.xml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomProperty {
    pub name: String,
    pub value: String,
}

/// The user-facing editable unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    /// Styling and merge routing only; the field is edited the same way.
    pub is_custom_property: bool,
}

/// Union of placeholder and custom property names, deduplicated by name.
///
/// Placeholders come first in document order, followed by properties that
/// have no matching placeholder, in part order.
pub fn collect_fields(placeholder_names: &[String], properties: &[CustomProperty]) -> Vec<Field> {
    let property_names: HashSet<&str> = properties.iter().map(|p| p.name.as_str()).collect();
    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(placeholder_names.len() + properties.len());

    let names = placeholder_names
        .iter()
        .map(String::as_str)
        .chain(properties.iter().map(|p| p.name.as_str()));
    for name in names {
        if seen.insert(name) {
            fields.push(Field {
                name: name.to_string(),
                is_custom_property: property_names.contains(name),
            });
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn prop(name: &str, value: &str) -> CustomProperty {
        CustomProperty {
            name: name.into(),
            value: value.into(),
        }
    }

    #[test]
    fn test_same_name_is_one_custom_field() {
        let fields = collect_fields(
            &["title".to_string(), "body".to_string()],
            &[prop("title", "Draft"), prop("client", "")],
        );

        assert_eq!(
            fields,
            vec![
                Field {
                    name: "title".into(),
                    is_custom_property: true
                },
                Field {
                    name: "body".into(),
                    is_custom_property: false
                },
                Field {
                    name: "client".into(),
                    is_custom_property: true
                },
            ]
        );
    }

    #[test]
    fn test_no_fields() {
        assert!(collect_fields(&[], &[]).is_empty());
    }
}
