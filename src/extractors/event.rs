//! Event relationships. Events embed the UID of the object they concern, so
//! these are the only by-UID edges in the catalogue.

use crate::error::Result;
use crate::graph::Node;
use crate::relationships::{Relationship, RelationshipMap};

pub fn relationships(node: &Node) -> Result<RelationshipMap> {
    let mut result = RelationshipMap::default();

    match node.group.as_str() {
        "" => {
            if let Some(uid) = node.nested_str(&["involvedObject", "uid"]) {
                if !uid.is_empty() {
                    result.add_dependency_by_uid(uid, Relationship::EventRegarding);
                }
            }
        }
        "events.k8s.io" => {
            if let Some(uid) = node.nested_str(&["regarding", "uid"]) {
                if !uid.is_empty() {
                    result.add_dependency_by_uid(uid, Relationship::EventRegarding);
                }
            }
            if let Some(uid) = node.nested_str(&["related", "uid"]) {
                if !uid.is_empty() {
                    result.add_dependency_by_uid(uid, Relationship::EventRelated);
                }
            }
        }
        _ => {}
    }

    Ok(result)
}
