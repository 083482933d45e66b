//! Proptest generators for property-based testing.

use proptest::prelude::*;

/// A version or channel name: non-blank, printable.
pub fn version_name() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9._-]{0,31}".prop_map(String::from)
}

/// A tag list that may contain duplicates and surrounding whitespace.
pub fn tags() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        ("[a-z]{1,8}", prop::bool::ANY).prop_map(|(tag, padded)| {
            if padded {
                format!("  {} ", tag)
            } else {
                tag
            }
        }),
        0..6,
    )
}

/// One document's value.
pub fn json_document() -> impl Strategy<Value = serde_json::Value> {
    let leaf = prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::from),
        any::<i64>().prop_map(serde_json::Value::from),
        "[ -~]{0,24}".prop_map(serde_json::Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::from),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                .prop_map(|m| serde_json::Value::Object(m.into_iter().collect())),
        ]
    })
}

/// One document rendered as block YAML or as JSON text.
fn rendered_document() -> impl Strategy<Value = String> {
    (json_document(), any::<bool>()).prop_map(|(doc, as_yaml)| {
        if as_yaml {
            serde_yaml::to_string(&doc).unwrap_or_else(|_| format!("{}\n", doc))
        } else {
            format!("{}\n", doc)
        }
    })
}

/// Bytes of a YAML stream of one to four `---` separated documents, with
/// the count.
pub fn manifest_documents() -> impl Strategy<Value = (Vec<u8>, usize)> {
    prop::collection::vec(rendered_document(), 1..=4).prop_map(|docs| {
        let count = docs.len();
        (docs.join("---\n").into_bytes(), count)
    })
}
