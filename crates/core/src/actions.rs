use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Closed set of resource capability classes. Context tags are resolved to a
/// variant exactly once at the boundary; anything unrecognized becomes
/// `Unknown` and maps to the permissive fallback action set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Devbox,
    Cluster,
    Launchpad,
    Unknown,
}

impl ResourceKind {
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "devbox" => Self::Devbox,
            "cluster" => Self::Cluster,
            // Deployments and statefulsets are driven through launchpad actions.
            "launchpad" | "deployment" | "statefulset" => Self::Launchpad,
            _ => Self::Unknown,
        }
    }

    /// Resolve the kind from an opaque resource context. Absent context, a
    /// non-object context, or a missing/unrecognized type tag all resolve to
    /// `Unknown` rather than an error.
    pub fn from_context(context: Option<&Value>) -> Self {
        let Some(context) = context else {
            return Self::Unknown;
        };
        let context = match context {
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(parsed) => return Self::from_context(Some(&parsed)),
                Err(_) => return Self::Unknown,
            },
            other => other,
        };
        let tag = context
            .get("resourceType")
            .or_else(|| context.get("resource_type"))
            .and_then(Value::as_str);
        match tag {
            Some(tag) => Self::parse(tag),
            None => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Devbox => "devbox",
            Self::Cluster => "cluster",
            Self::Launchpad => "launchpad",
            Self::Unknown => "unknown",
        }
    }
}

/// Immutable description of one action a model may request. Mutating actions
/// must pass through the approval gate before execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub name: String,
    pub parameters: Value,
    pub kind: ResourceKind,
    pub mutating: bool,
}

impl ActionDescriptor {
    pub fn new(
        name: impl Into<String>,
        parameters: Value,
        kind: ResourceKind,
        mutating: bool,
    ) -> Self {
        Self { name: name.into(), parameters, kind, mutating }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSet {
    actions: Vec<ActionDescriptor>,
}

impl ActionSet {
    pub fn new(actions: Vec<ActionDescriptor>) -> Self {
        Self { actions }
    }

    pub fn get(&self, name: &str) -> Option<&ActionDescriptor> {
        self.actions.iter().find(|action| action.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.actions.iter().map(|action| action.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionDescriptor> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Mapping from resource kind to the action set legal for that kind, built
/// once at process start and passed by reference into the router and
/// executor. The `all` set is the fallback for unknown or absent context.
#[derive(Clone, Debug)]
pub struct ActionRegistry {
    devbox: ActionSet,
    cluster: ActionSet,
    launchpad: ActionSet,
    all: ActionSet,
}

impl ActionRegistry {
    pub fn new(devbox: ActionSet, cluster: ActionSet, launchpad: ActionSet) -> Self {
        let mut combined = Vec::new();
        combined.extend(devbox.iter().cloned());
        combined.extend(cluster.iter().cloned());
        combined.extend(launchpad.iter().cloned());
        Self { devbox, cluster, launchpad, all: ActionSet::new(combined) }
    }

    pub fn with_default_catalog() -> Self {
        Self::new(devbox_actions(), cluster_actions(), launchpad_actions())
    }

    /// Resolve the action set for an opaque resource context. Unknown kinds
    /// fall back to the full set: better to offer a superset of actions than
    /// to silently disable the agent.
    pub fn resolve(&self, resource_context: Option<&Value>) -> &ActionSet {
        self.for_kind(ResourceKind::from_context(resource_context))
    }

    pub fn for_kind(&self, kind: ResourceKind) -> &ActionSet {
        match kind {
            ResourceKind::Devbox => &self.devbox,
            ResourceKind::Cluster => &self.cluster,
            ResourceKind::Launchpad => &self.launchpad,
            ResourceKind::Unknown => &self.all,
        }
    }

    pub fn all(&self) -> &ActionSet {
        &self.all
    }

    /// Look an action up across every set, for executor dispatch.
    pub fn find(&self, name: &str) -> Option<&ActionDescriptor> {
        self.all.get(name)
    }
}

fn name_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": { "type": "string", "description": description }
        },
        "required": ["name"]
    })
}

fn devbox_actions() -> ActionSet {
    use ResourceKind::Devbox;
    ActionSet::new(vec![
        ActionDescriptor::new(
            "create_devbox",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Devbox name" },
                    "runtime": {
                        "type": "string",
                        "description": "Runtime template, e.g. node.js, python, rust"
                    },
                    "cpu": { "type": "integer", "enum": [1, 2, 4, 8, 16] },
                    "memory": { "type": "integer", "enum": [1, 2, 4, 8, 16, 32] }
                },
                "required": ["name", "runtime"]
            }),
            Devbox,
            true,
        ),
        ActionDescriptor::new("delete_devbox", name_schema("Devbox name"), Devbox, true),
        ActionDescriptor::new("get_devbox", name_schema("Devbox name"), Devbox, false),
        ActionDescriptor::new("get_devbox_monitor", name_schema("Devbox name"), Devbox, false),
        ActionDescriptor::new("get_devbox_network", name_schema("Devbox name"), Devbox, false),
        ActionDescriptor::new(
            "update_devbox",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Devbox name" },
                    "cpu": { "type": "integer", "enum": [1, 2, 4, 8, 16] },
                    "memory": { "type": "integer", "enum": [1, 2, 4, 8, 16, 32] }
                },
                "required": ["name"]
            }),
            Devbox,
            true,
        ),
        ActionDescriptor::new(
            "create_devbox_ports",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Devbox name" },
                    "ports": { "type": "array", "items": { "type": "integer" } }
                },
                "required": ["name", "ports"]
            }),
            Devbox,
            true,
        ),
        ActionDescriptor::new(
            "delete_devbox_ports",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Devbox name" },
                    "ports": { "type": "array", "items": { "type": "integer" } }
                },
                "required": ["name", "ports"]
            }),
            Devbox,
            true,
        ),
        ActionDescriptor::new("start_devbox", name_schema("Devbox name"), Devbox, true),
        ActionDescriptor::new("pause_devbox", name_schema("Devbox name"), Devbox, true),
        ActionDescriptor::new("restart_devbox", name_schema("Devbox name"), Devbox, true),
    ])
}

fn cluster_actions() -> ActionSet {
    use ResourceKind::Cluster;
    ActionSet::new(vec![
        ActionDescriptor::new(
            "create_database",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Database cluster name" },
                    "engine": {
                        "type": "string",
                        "enum": ["postgresql", "mongodb", "apecloud-mysql", "redis", "kafka"]
                    },
                    "cpu": { "type": "integer", "enum": [1, 2, 4, 8] },
                    "memory": { "type": "integer", "enum": [1, 2, 4, 8, 16] },
                    "replicas": { "type": "integer", "minimum": 1, "maximum": 5 }
                },
                "required": ["name", "engine"]
            }),
            Cluster,
            true,
        ),
        ActionDescriptor::new(
            "delete_database",
            name_schema("Database cluster name"),
            Cluster,
            true,
        ),
        ActionDescriptor::new("get_database", name_schema("Database cluster name"), Cluster, false),
        ActionDescriptor::new(
            "get_database_logs",
            name_schema("Database cluster name"),
            Cluster,
            false,
        ),
        ActionDescriptor::new(
            "get_database_monitor",
            name_schema("Database cluster name"),
            Cluster,
            false,
        ),
        ActionDescriptor::new(
            "update_database",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Database cluster name" },
                    "cpu": { "type": "integer", "enum": [1, 2, 4, 8] },
                    "memory": { "type": "integer", "enum": [1, 2, 4, 8, 16] },
                    "replicas": { "type": "integer", "minimum": 1, "maximum": 5 }
                },
                "required": ["name"]
            }),
            Cluster,
            true,
        ),
        ActionDescriptor::new("start_database", name_schema("Database cluster name"), Cluster, true),
        ActionDescriptor::new("pause_database", name_schema("Database cluster name"), Cluster, true),
        ActionDescriptor::new(
            "restart_database",
            name_schema("Database cluster name"),
            Cluster,
            true,
        ),
    ])
}

fn launchpad_actions() -> ActionSet {
    use ResourceKind::Launchpad;
    ActionSet::new(vec![
        ActionDescriptor::new(
            "create_launchpad",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "App name" },
                    "image": { "type": "string", "description": "Container image reference" },
                    "cpu": { "type": "integer", "enum": [1, 2, 4, 8] },
                    "memory": { "type": "integer", "enum": [1, 2, 4, 8, 16] },
                    "ports": { "type": "array", "items": { "type": "integer" } }
                },
                "required": ["name", "image"]
            }),
            Launchpad,
            true,
        ),
        ActionDescriptor::new("delete_launchpad", name_schema("App name"), Launchpad, true),
        ActionDescriptor::new(
            "delete_launchpad_env",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "App name" },
                    "env_names": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["name", "env_names"]
            }),
            Launchpad,
            true,
        ),
        ActionDescriptor::new("get_launchpad", name_schema("App name"), Launchpad, false),
        ActionDescriptor::new("get_launchpad_logs", name_schema("App name"), Launchpad, false),
        ActionDescriptor::new("get_launchpad_monitor", name_schema("App name"), Launchpad, false),
        ActionDescriptor::new("get_launchpad_network", name_schema("App name"), Launchpad, false),
        ActionDescriptor::new(
            "update_launchpad",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "App name" },
                    "cpu": { "type": "integer", "enum": [1, 2, 4, 8] },
                    "memory": { "type": "integer", "enum": [1, 2, 4, 8, 16] },
                    "replicas": { "type": "integer", "minimum": 0, "maximum": 20 }
                },
                "required": ["name"]
            }),
            Launchpad,
            true,
        ),
        ActionDescriptor::new(
            "update_launchpad_image",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "App name" },
                    "image": { "type": "string", "description": "Container image reference" }
                },
                "required": ["name", "image"]
            }),
            Launchpad,
            true,
        ),
        ActionDescriptor::new(
            "update_launchpad_env",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "App name" },
                    "env": {
                        "type": "object",
                        "additionalProperties": { "type": "string" }
                    }
                },
                "required": ["name", "env"]
            }),
            Launchpad,
            true,
        ),
        ActionDescriptor::new(
            "create_launchpad_ports",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "App name" },
                    "ports": { "type": "array", "items": { "type": "integer" } }
                },
                "required": ["name", "ports"]
            }),
            Launchpad,
            true,
        ),
        ActionDescriptor::new("start_launchpad", name_schema("App name"), Launchpad, true),
        ActionDescriptor::new("pause_launchpad", name_schema("App name"), Launchpad, true),
        ActionDescriptor::new("restart_launchpad", name_schema("App name"), Launchpad, true),
    ])
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use serde_json::json;

    use super::{ActionRegistry, ResourceKind};

    #[test]
    fn context_tag_parsing_is_case_insensitive() {
        assert_eq!(ResourceKind::parse("DevBox"), ResourceKind::Devbox);
        assert_eq!(ResourceKind::parse("CLUSTER"), ResourceKind::Cluster);
        assert_eq!(ResourceKind::parse("Deployment"), ResourceKind::Launchpad);
        assert_eq!(ResourceKind::parse("statefulset"), ResourceKind::Launchpad);
        assert_eq!(ResourceKind::parse("volume"), ResourceKind::Unknown);
    }

    #[test]
    fn absent_or_malformed_context_resolves_to_unknown() {
        assert_eq!(ResourceKind::from_context(None), ResourceKind::Unknown);
        assert_eq!(
            ResourceKind::from_context(Some(&json!("not an object"))),
            ResourceKind::Unknown
        );
        assert_eq!(ResourceKind::from_context(Some(&json!({ "name": "x" }))), ResourceKind::Unknown);
    }

    #[test]
    fn stringified_context_is_parsed_before_tag_lookup() {
        let raw = json!("{\"name\":\"main-db\",\"resourceType\":\"cluster\"}");
        assert_eq!(ResourceKind::from_context(Some(&raw)), ResourceKind::Cluster);
    }

    #[test]
    fn known_kinds_resolve_to_nonempty_strict_subsets_of_all() {
        let registry = ActionRegistry::with_default_catalog();
        let all: BTreeSet<&str> = registry.all().names().into_iter().collect();

        for kind in [ResourceKind::Devbox, ResourceKind::Cluster, ResourceKind::Launchpad] {
            let set: BTreeSet<&str> = registry.for_kind(kind).names().into_iter().collect();
            assert!(!set.is_empty(), "{kind:?} set must not be empty");
            assert!(set.is_subset(&all), "{kind:?} set must be within the fallback set");
            assert!(set.len() < all.len(), "{kind:?} set must be a strict subset");
        }
    }

    #[test]
    fn known_kind_sets_are_pairwise_disjoint() {
        let registry = ActionRegistry::with_default_catalog();
        let kinds = [ResourceKind::Devbox, ResourceKind::Cluster, ResourceKind::Launchpad];

        for left in kinds {
            for right in kinds {
                if left == right {
                    continue;
                }
                let left_set: BTreeSet<&str> =
                    registry.for_kind(left).names().into_iter().collect();
                let right_set: BTreeSet<&str> =
                    registry.for_kind(right).names().into_iter().collect();
                assert!(
                    left_set.is_disjoint(&right_set),
                    "{left:?} and {right:?} action sets overlap"
                );
            }
        }
    }

    #[test]
    fn empty_context_falls_back_to_all_actions() {
        let registry = ActionRegistry::with_default_catalog();
        let resolved = registry.resolve(None);
        assert_eq!(resolved.len(), registry.all().len());
        assert!(resolved.contains("pause_database"));
        assert!(resolved.contains("pause_devbox"));
    }

    #[test]
    fn cluster_context_excludes_devbox_actions() {
        let registry = ActionRegistry::with_default_catalog();
        let context = json!({ "name": "main-db", "resourceType": "cluster" });
        let resolved = registry.resolve(Some(&context));
        assert!(resolved.contains("pause_database"));
        assert!(!resolved.contains("pause_devbox"));
    }

    #[test]
    fn every_kind_carries_create_and_delete_lifecycle_actions() {
        let registry = ActionRegistry::with_default_catalog();
        let lifecycle = [
            (ResourceKind::Devbox, "create_devbox", "delete_devbox"),
            (ResourceKind::Cluster, "create_database", "delete_database"),
            (ResourceKind::Launchpad, "create_launchpad", "delete_launchpad"),
        ];

        for (kind, create, delete) in lifecycle {
            let set = registry.for_kind(kind);
            for name in [create, delete] {
                let descriptor = set.get(name).unwrap_or_else(|| panic!("{name} missing"));
                assert!(descriptor.mutating, "{name} must require approval");
            }
        }
        assert!(registry.find("delete_launchpad_env").expect("descriptor").mutating);
    }

    #[test]
    fn mutating_flags_split_reads_from_writes() {
        let registry = ActionRegistry::with_default_catalog();
        assert!(!registry.find("get_database").expect("descriptor").mutating);
        assert!(registry.find("pause_database").expect("descriptor").mutating);
        assert!(registry.find("update_launchpad_env").expect("descriptor").mutating);
    }
}
