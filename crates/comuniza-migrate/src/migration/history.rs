//! The platform's own migration history.
//!
//! Checked-in node definitions for the Comuniza schema, grouped by
//! namespace. Nodes here are immutable once they have been applied to a
//! shared environment; new schema work appends new nodes.

use super::node::MigrationNode;
use super::op::{Operation, ValueMap};
use super::transforms::{backfill_with_default, regenerate_tokens, TokenSpec};
use crate::schema::{FieldDef, FieldType, Value};

/// Notification settings granted to groups that predate the feature.
pub const DEFAULT_NOTIFICATION_SETTINGS: &str = r#"{"new_item":true,"new_member":true}"#;

/// The full platform history, every namespace included.
pub fn platform_history() -> Vec<MigrationNode> {
    vec![
        items_0001_initial(),
        items_0002_share_token(),
        items_0003_visibility(),
        groups_0001_initial(),
        groups_0002_notification_defaults(),
        sharing_0001_initial(),
    ]
}

fn items_0001_initial() -> MigrationNode {
    MigrationNode::new("items", "0001_initial")
        .operation(Operation::AddField {
            entity: "item".into(),
            field: FieldDef::new("name", FieldType::Text),
        })
        .operation(Operation::AddField {
            entity: "item".into(),
            field: FieldDef::new("status", FieldType::Text).with_default("active"),
        })
        .operation(Operation::AddField {
            entity: "item".into(),
            field: FieldDef::new("is_public", FieldType::Bool).with_default(false),
        })
        .operation(Operation::AddField {
            entity: "item".into(),
            field: FieldDef::new("owner_id", FieldType::Int),
        })
        .operation(Operation::AddIndex {
            entity: "item".into(),
            field: "owner_id".into(),
        })
}

/// Share tokens let an owner hand out a direct link to a single item.
/// Tokens existed before this node but were assigned inconsistently;
/// every empty one is regenerated from the standard token policy.
fn items_0002_share_token() -> MigrationNode {
    MigrationNode::new("items", "0002_share_token")
        .depends_on("items", "0001_initial")
        .operation(Operation::AddField {
            entity: "item".into(),
            field: FieldDef::nullable("share_token", FieldType::Text).with_default(""),
        })
        .operation(Operation::RunTransform(regenerate_tokens(
            "item",
            "share_token",
            TokenSpec::default(),
        )))
}

/// Item visibility graduates from a boolean to a three-valued enumeration
/// (`public` / `private` / `restricted`). Retype first with an explicit
/// value mapping, rename only after the retype: a single operation that
/// changes shape and identity at once cannot be reversed safely.
fn items_0003_visibility() -> MigrationNode {
    MigrationNode::new("items", "0003_visibility")
        .depends_on("items", "0002_share_token")
        .operation(Operation::AlterField {
            entity: "item".into(),
            from: FieldDef::new("is_public", FieldType::Bool).with_default(false),
            to: FieldDef::new("is_public", FieldType::Text).with_default("private"),
            map: Some(ValueMap::new().map(true, "public").map(false, "private")),
        })
        .operation(Operation::RenameField {
            entity: "item".into(),
            from: "is_public".into(),
            to: "visibility".into(),
        })
}

fn groups_0001_initial() -> MigrationNode {
    MigrationNode::new("groups", "0001_initial")
        .operation(Operation::AddField {
            entity: "group".into(),
            field: FieldDef::new("name", FieldType::Text),
        })
        .operation(Operation::AddField {
            entity: "group".into(),
            field: FieldDef::new("status", FieldType::Text).with_default("active"),
        })
        .operation(Operation::AddIndex {
            entity: "group".into(),
            field: "name".into(),
        })
}

/// Active groups created before per-group notification preferences get the
/// platform defaults; archived groups are left untouched.
fn groups_0002_notification_defaults() -> MigrationNode {
    MigrationNode::new("groups", "0002_notification_defaults")
        .depends_on("groups", "0001_initial")
        .operation(Operation::AddField {
            entity: "group".into(),
            field: FieldDef::nullable("notification_settings", FieldType::Text),
        })
        .operation(Operation::RunTransform(backfill_with_default(
            "group",
            "notification_settings",
            DEFAULT_NOTIFICATION_SETTINGS,
            Some(("status".to_string(), Value::Text("active".into()))),
        )))
}

fn sharing_0001_initial() -> MigrationNode {
    MigrationNode::new("sharing", "0001_initial")
        .depends_on("items", "0001_initial")
        .depends_on("groups", "0001_initial")
        .operation(Operation::AddField {
            entity: "loan".into(),
            field: FieldDef::new("item_id", FieldType::Int),
        })
        .operation(Operation::AddField {
            entity: "loan".into(),
            field: FieldDef::new("borrower_id", FieldType::Int),
        })
        .operation(Operation::AddField {
            entity: "loan".into(),
            field: FieldDef::new("returned", FieldType::Bool).with_default(false),
        })
        .operation(Operation::AddIndex {
            entity: "loan".into(),
            field: "item_id".into(),
        })
}
