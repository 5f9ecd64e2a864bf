//! Entitlements granted to a re-signed app.

use crate::{plist_codec, Result};
use plist::{Dictionary, Value};
use std::path::Path;

pub const KEYCHAIN_ACCESS_GROUPS: &str = "keychain-access-groups";
pub const TEAM_IDENTIFIER: &str = "com.apple.developer.team-identifier";
pub const APPLICATION_IDENTIFIER: &str = "application-identifier";
pub const GET_TASK_ALLOW: &str = "get-task-allow";

/// Wildcard entitlements for every app of `team_id`, debuggable.
pub fn for_team(team_id: &str) -> Dictionary {
    let wildcard = format!("{team_id}.*");

    let mut entitlements = Dictionary::new();
    entitlements.insert(
        KEYCHAIN_ACCESS_GROUPS.to_string(),
        Value::Array(vec![Value::String(wildcard.clone())]),
    );
    entitlements.insert(TEAM_IDENTIFIER.to_string(), Value::String(team_id.to_string()));
    entitlements.insert(APPLICATION_IDENTIFIER.to_string(), Value::String(wildcard));
    entitlements.insert(GET_TASK_ALLOW.to_string(), Value::Boolean(true));
    entitlements
}

/// Write the team's entitlements as an XML plist, replacing `path`.
pub fn write_for_team(team_id: &str, path: &Path) -> Result<()> {
    plist_codec::write(&Value::Dictionary(for_team(team_id)), path, false)
}

/// Whether the entitlements allow attaching a debugger.
pub fn allows_debugging(entitlements: &Dictionary) -> bool {
    entitlements.get(GET_TASK_ALLOW).and_then(Value::as_boolean) == Some(true)
}
