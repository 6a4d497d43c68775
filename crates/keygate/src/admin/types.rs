use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;

/// Realm representation. Fields not modelled here stay in `extra`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Realm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SmolStr>,
    pub realm: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Client representation. `id` is the UUID, `client_id` the human name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SmolStr>,
    pub client_id: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct OwnerRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<SmolStr>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ScopeRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SmolStr>,
    pub name: SmolStr,
}

/// A protected resource of a resource server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Assigned by the provider; leave empty when creating.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SmolStr>,
    pub name: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<SmolStr>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<ScopeRef>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Any authorization policy, as listed by the resource server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SmolStr>,
    pub name: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<SmolStr>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_strategy: Option<SmolStr>,
    /// Type-specific settings. Values are JSON encoded as strings.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub config: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Policy {
    pub const TYPE_USER: &'static str = "user";

    /// The user-policy view of this policy, if it is one.
    pub fn as_user_policy(&self) -> Option<UserPolicy> {
        if self.kind.as_deref() != Some(Self::TYPE_USER) {
            return None;
        }
        let users = self
            .config
            .get("users")
            .and_then(Value::as_str)
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();
        Some(UserPolicy {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            logic: self
                .logic
                .clone()
                .unwrap_or_else(|| SmolStr::new_static(UserPolicy::LOGIC_POSITIVE)),
            users,
        })
    }
}

/// Policy granting access to a fixed set of users.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SmolStr>,
    pub name: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<SmolStr>,
    #[serde(default = "positive")]
    pub logic: SmolStr,
    /// User ids.
    #[serde(default)]
    pub users: Vec<SmolStr>,
}

fn positive() -> SmolStr {
    SmolStr::new_static(UserPolicy::LOGIC_POSITIVE)
}

impl UserPolicy {
    pub const LOGIC_POSITIVE: &'static str = "POSITIVE";
    pub const LOGIC_NEGATIVE: &'static str = "NEGATIVE";

    /// A policy ready to be created.
    pub fn new(name: impl Into<SmolStr>, users: impl IntoIterator<Item = impl Into<SmolStr>>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
            logic: positive(),
            users: users.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resource_uses_underscore_id() {
        let raw = json!({
            "_id": "r-1",
            "name": "res:campaign",
            "type": "urn:app:resources:campaign",
            "owner": {"id": "o-1", "name": "api-server"},
            "scopes": [{"id": "s-1", "name": "scopes:view"}],
            "ownerManagedAccess": false
        });
        let resource: Resource = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(resource.id.as_deref(), Some("r-1"));
        assert_eq!(resource.kind.as_deref(), Some("urn:app:resources:campaign"));
        assert_eq!(resource.scopes[0].name, "scopes:view");
        assert_eq!(resource.extra["ownerManagedAccess"], false);
        assert_eq!(serde_json::to_value(&resource).unwrap(), raw);

        let fresh = Resource {
            name: "res:new".into(),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&fresh).unwrap(), json!({"name": "res:new"}));
    }

    #[test]
    fn user_policy_view() {
        let policy: Policy = serde_json::from_value(json!({
            "id": "p-1",
            "name": "only alice",
            "type": "user",
            "decisionStrategy": "UNANIMOUS",
            "config": {"users": "[\"u-1\",\"u-2\"]"}
        }))
        .unwrap();
        assert_eq!(policy.decision_strategy.as_deref(), Some("UNANIMOUS"));
        let user = policy.as_user_policy().unwrap();
        assert_eq!(user.id.as_deref(), Some("p-1"));
        assert_eq!(user.logic, UserPolicy::LOGIC_POSITIVE);
        assert_eq!(user.users, vec![SmolStr::new("u-1"), SmolStr::new("u-2")]);

        let role = Policy {
            kind: Some("role".into()),
            ..policy
        };
        assert!(role.as_user_policy().is_none());
    }

    #[test]
    fn new_user_policy_defaults_to_positive() {
        let policy = UserPolicy::new("only alice", ["u-1"]);
        assert_eq!(
            serde_json::to_value(&policy).unwrap(),
            json!({"name": "only alice", "logic": "POSITIVE", "users": ["u-1"]})
        );
    }
}
