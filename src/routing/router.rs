//! Route lookup.

use std::collections::HashMap;

use crate::balancer::PolicyKind;
use crate::config::schema::{Config, ProtocolTag};

/// A routing rule with its policy identifiers resolved.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub name: String,
    pub path_prefix: String,
    pub upstream: String,
    pub policy: PolicyKind,
    pub protocol_policies: HashMap<ProtocolTag, PolicyKind>,
}

impl CompiledRule {
    /// The policy for a protocol tag: the override if one exists, the
    /// rule default otherwise.
    pub fn policy_for(&self, protocol: ProtocolTag) -> PolicyKind {
        self.protocol_policies
            .get(&protocol)
            .copied()
            .unwrap_or(self.policy)
    }
}

/// Compiled routing rules, longest prefix first.
#[derive(Debug, Default)]
pub struct RouteTable {
    rules: Vec<CompiledRule>,
    default_rule: Option<CompiledRule>,
}

impl RouteTable {
    pub fn from_config(config: &Config) -> Self {
        let mut rules = Vec::new();
        let mut default_rule = None;

        for (name, rule) in &config.routing {
            let compiled = CompiledRule {
                name: name.clone(),
                path_prefix: rule.path.clone(),
                upstream: rule.upstream.clone(),
                policy: resolve_policy(name, &rule.load_balancer),
                protocol_policies: rule
                    .protocols
                    .iter()
                    .map(|(tag, policy)| (*tag, resolve_policy(name, policy)))
                    .collect(),
            };

            if name == "default" {
                default_rule = Some(compiled);
            } else {
                rules.push(compiled);
            }
        }

        // Longest prefix first; BTreeMap iteration already fixed the
        // name order for equal lengths.
        rules.sort_by(|a, b| b.path_prefix.len().cmp(&a.path_prefix.len()));

        Self {
            rules,
            default_rule,
        }
    }

    /// Match a request path: longest matching prefix, then the rule named
    /// "default", then nothing.
    pub fn match_path(&self, path: &str) -> Option<&CompiledRule> {
        self.rules
            .iter()
            .find(|rule| path.starts_with(&rule.path_prefix))
            .or(self.default_rule.as_ref())
    }
}

fn resolve_policy(rule: &str, identifier: &str) -> PolicyKind {
    PolicyKind::parse(identifier).unwrap_or_else(|| {
        tracing::warn!(
            rule = %rule,
            policy = %identifier,
            "Unknown load balancer policy, using least_connections_weight"
        );
        PolicyKind::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RoutingRule;

    fn table(rules: &[(&str, &str, &str)]) -> RouteTable {
        let mut config = Config::default();
        for (name, path, policy) in rules {
            config.routing.insert(
                name.to_string(),
                RoutingRule {
                    path: path.to_string(),
                    upstream: format!("{}-upstream", name),
                    load_balancer: policy.to_string(),
                    ..Default::default()
                },
            );
        }
        RouteTable::from_config(&config)
    }

    #[test]
    fn longest_prefix_wins() {
        let table = table(&[
            ("api", "/api", "least_connections"),
            ("api-v2", "/api/v2", "weight"),
            ("default", "/", "least_connections_weight"),
        ]);

        assert_eq!(table.match_path("/api/v2/users").unwrap().name, "api-v2");
        assert_eq!(table.match_path("/api/v1/users").unwrap().name, "api");
        assert_eq!(table.match_path("/static/app.js").unwrap().name, "default");
    }

    #[test]
    fn default_rule_catches_unmatched_paths() {
        let table = table(&[
            ("api", "/api", "least_connections"),
            ("default", "/app", "least_connections"),
        ]);

        // The default rule applies even when its own prefix differs.
        assert_eq!(table.match_path("/other").unwrap().name, "default");
    }

    #[test]
    fn no_match_without_default() {
        let table = table(&[("api", "/api", "least_connections")]);
        assert!(table.match_path("/other").is_none());
    }

    #[test]
    fn unknown_policy_degrades_to_default() {
        let table = table(&[("api", "/api", "fastest_first")]);
        assert_eq!(
            table.match_path("/api").unwrap().policy,
            PolicyKind::LeastConnectionsWeight
        );
    }

    #[test]
    fn protocol_override_takes_precedence() {
        let mut config = Config::default();
        let mut protocols = std::collections::BTreeMap::new();
        protocols.insert(ProtocolTag::WebSocket, "ip_hash".to_string());
        config.routing.insert(
            "default".to_string(),
            RoutingRule {
                path: "/".to_string(),
                upstream: "web".to_string(),
                load_balancer: "least_connections".to_string(),
                protocols,
            },
        );
        let table = RouteTable::from_config(&config);
        let rule = table.match_path("/ws").unwrap();

        assert_eq!(rule.policy_for(ProtocolTag::WebSocket), PolicyKind::IpHash);
        assert_eq!(
            rule.policy_for(ProtocolTag::Http),
            PolicyKind::LeastConnections
        );
    }
}
