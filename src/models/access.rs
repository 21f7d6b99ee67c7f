//! Access grants attached to uploaded blobs and catalog entries.

use serde::{Deserialize, Serialize};

/// Read/update/delete rights scoped to a single user.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    pub user_id: String,
}

impl AccessGrant {
    pub fn owner(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    /// Permission strings in the `action("user:<id>")` form.
    pub fn permissions(&self) -> Vec<String> {
        ["read", "update", "delete"]
            .iter()
            .map(|action| format!("{}(\"user:{}\")", action, self.user_id))
            .collect()
    }

    /// Serialized form stored alongside blobs and archive rows.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.permissions())
    }

    /// Check a stored permission list for `action` granted to `user_id`.
    pub fn allows(stored: &str, action: &str, user_id: &str) -> bool {
        let wanted = format!("{}(\"user:{}\")", action, user_id);
        serde_json::from_str::<Vec<String>>(stored)
            .map(|perms| perms.iter().any(|p| *p == wanted))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissions_cover_read_update_delete_for_owner_only() {
        let grant = AccessGrant::owner("u-1");
        assert_eq!(
            grant.permissions(),
            vec![
                "read(\"user:u-1\")".to_string(),
                "update(\"user:u-1\")".to_string(),
                "delete(\"user:u-1\")".to_string(),
            ]
        );

        let stored = grant.to_json().unwrap();
        assert!(AccessGrant::allows(&stored, "read", "u-1"));
        assert!(AccessGrant::allows(&stored, "delete", "u-1"));
        assert!(!AccessGrant::allows(&stored, "read", "u-2"));
        assert!(!AccessGrant::allows("not json", "read", "u-1"));
    }
}
