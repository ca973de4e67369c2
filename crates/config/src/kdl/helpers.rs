//! Small accessors over KDL nodes.
//!
//! Configuration values are written as child nodes carrying a single
//! argument, e.g. `sender "pki@example.org"` inside a `mail { }` block.

use kdl::{KdlNode, KdlValue};

/// First positional argument of the child node called `name`
fn child_value<'a>(node: &'a KdlNode, name: &str) -> Option<&'a KdlValue> {
    node.children()?
        .nodes()
        .iter()
        .find(|child| child.name().value() == name)?
        .entries()
        .iter()
        .find(|entry| entry.name().is_none())
        .map(|entry| entry.value())
}

/// First positional argument of the node itself, as a string
pub fn get_first_arg_string(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|entry| entry.name().is_none())
        .and_then(|entry| entry.value().as_string())
        .map(str::to_string)
}

pub fn get_string_entry(node: &KdlNode, name: &str) -> Option<String> {
    child_value(node, name)
        .and_then(KdlValue::as_string)
        .map(str::to_string)
}

pub fn get_int_entry(node: &KdlNode, name: &str) -> Option<i64> {
    child_value(node, name)
        .and_then(KdlValue::as_integer)
        .and_then(|v| i64::try_from(v).ok())
}

pub fn get_bool_entry(node: &KdlNode, name: &str) -> Option<bool> {
    child_value(node, name).and_then(KdlValue::as_bool)
}

/// Names of the child nodes of `node`
pub fn child_names(node: &KdlNode) -> Vec<&str> {
    node.children()
        .map(|doc| doc.nodes().iter().map(|n| n.name().value()).collect())
        .unwrap_or_default()
}

/// Read a non-negative integer entry, rejecting negative or oversized values
pub fn get_u32_entry(node: &KdlNode, name: &str) -> anyhow::Result<Option<u32>> {
    match get_int_entry(node, name) {
        None => Ok(None),
        Some(v) => u32::try_from(v).map(Some).map_err(|_| {
            anyhow::anyhow!(
                "'{}' in '{}' block must be a non-negative integer, got {}",
                name,
                node.name().value(),
                v
            )
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kdl::KdlDocument;

    fn first_node(src: &str) -> KdlNode {
        let doc: KdlDocument = src.parse().unwrap();
        doc.nodes()[0].clone()
    }

    #[test]
    fn test_entries() {
        let node = first_node(
            r#"mail "primary" {
                sender "pki@example.org"
                retries 3
                enabled #true
            }"#,
        );

        assert_eq!(get_first_arg_string(&node).as_deref(), Some("primary"));
        assert_eq!(
            get_string_entry(&node, "sender").as_deref(),
            Some("pki@example.org")
        );
        assert_eq!(get_int_entry(&node, "retries"), Some(3));
        assert_eq!(get_bool_entry(&node, "enabled"), Some(true));
        assert_eq!(get_string_entry(&node, "missing"), None);
        assert_eq!(child_names(&node), vec!["sender", "retries", "enabled"]);
    }

    #[test]
    fn test_u32_entry_rejects_negative() {
        let node = first_node("schedule { reminder-lead-days -4 }");
        let err = get_u32_entry(&node, "reminder-lead-days").unwrap_err();
        assert!(err.to_string().contains("non-negative"));
    }
}
