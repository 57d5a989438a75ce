//! Module path resolution
//!
//! Turns an incoming module path into a [`ResolvedRoute`] plus the forge
//! client that serves it. Resolution is two-staged: an exact replacement map
//! first, then ordered regex rewrite rules where the first match wins.

use crate::config::Config;
use crate::domain::{decode_module_path, split_major_version, ResolvedRoute};
use crate::infrastructure::forge::{self, ForgeClient, ForgeInitError, UpstreamHttp};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors building the resolver at startup
#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("invalid regexp {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("git-url {url:?} has no git-provider")]
    MissingProvider { url: String },

    #[error(transparent)]
    Forge(#[from] ForgeInitError),
}

#[derive(Debug)]
struct CompiledRule {
    pattern: Regex,
    base: Option<String>,
    group: Option<String>,
    repo: Option<String>,
    forge: Option<Arc<ForgeClient>>,
}

/// Compiled routing table, built once at startup and never mutated
#[derive(Debug)]
pub struct Resolver {
    modules: HashMap<String, String>,
    rules: Vec<CompiledRule>,
    default_forge: Option<Arc<ForgeClient>>,
    offline: Arc<ForgeClient>,
}

impl Resolver {
    pub fn from_config(config: &Config, http: &UpstreamHttp) -> Result<Self, ResolverError> {
        let default_forge = match &config.git_url {
            Some(url) => {
                let kind = config
                    .git_provider
                    .ok_or_else(|| ResolverError::MissingProvider { url: url.clone() })?;
                let token = config.git_token.as_deref().unwrap_or("");
                Some(Arc::new(forge::connect(kind, url, token, http)?))
            }
            None => None,
        };

        let mut rules = Vec::with_capacity(config.rules.len());
        for rule in &config.rules {
            let pattern = Regex::new(&rule.pattern).map_err(|source| ResolverError::Pattern {
                pattern: rule.pattern.clone(),
                source,
            })?;
            let forge = match &rule.git_url {
                Some(url) => {
                    let kind = rule
                        .git_provider
                        .ok_or_else(|| ResolverError::MissingProvider { url: url.clone() })?;
                    let token = rule.git_token.as_deref().unwrap_or("");
                    Some(Arc::new(forge::connect(kind, url, token, http)?))
                }
                None => None,
            };
            rules.push(CompiledRule {
                pattern,
                base: rule.base.clone(),
                group: rule.group.clone(),
                repo: rule.repo.clone(),
                forge,
            });
        }

        Ok(Resolver {
            modules: config.modules.clone(),
            rules,
            default_forge,
            offline: Arc::new(ForgeClient::Offline),
        })
    }

    /// Resolve a raw module path from the URL into a route and its adapter.
    ///
    /// Returns `None` when neither stage matched and no default adapter is
    /// configured. A matching rule without any adapter resolves to the
    /// offline client, which rejects upstream calls.
    pub fn resolve(&self, module: &str) -> Option<(ResolvedRoute, Arc<ForgeClient>)> {
        let decoded = decode_module_path(module);
        let mut path = decoded.clone();
        if let Some(mapped) = self.modules.get(&path) {
            debug!(from = %path, to = %mapped, "exact module replacement");
            path = mapped.clone();
        }

        let mut route = ResolvedRoute {
            original_path: decoded,
            ..Default::default()
        };
        let mut forge = self.default_forge.clone();
        let mut matched = forge.is_some();

        let parts: Vec<&str> = path.splitn(4, '/').collect();
        if parts.len() >= 3 {
            route.base = parts[0].to_string();
            route.group = parts[1].to_string();
            route.repo = parts[2].to_string();
            if parts.len() == 4 {
                route.sub_path = parts[3].to_string();
            }
        }

        for rule in &self.rules {
            if !rule.pattern.is_match(&path) {
                continue;
            }
            matched = true;
            if rule.forge.is_some() {
                forge = rule.forge.clone();
            }
            if let Some(template) = &rule.base {
                route.base = rule.pattern.replace_all(&path, template.as_str()).into_owned();
            }
            if let Some(template) = &rule.group {
                route.group = rule.pattern.replace_all(&path, template.as_str()).into_owned();
            }
            if let Some(template) = &rule.repo {
                route.repo = rule.pattern.replace_all(&path, template.as_str()).into_owned();
            }
            if let Some(idx) = route.repo.find('/') {
                route.sub_path = route.repo[idx + 1..].to_string();
                route.repo.truncate(idx);
            }
            debug!(
                path = %path,
                base = %route.base,
                group = %route.group,
                repo = %route.repo,
                "regexp rule matched"
            );
            break;
        }

        if !matched {
            return None;
        }

        let (major_version, clean_sub_path) = split_major_version(&route.sub_path);
        route.major_version = major_version;
        route.clean_sub_path = clean_sub_path;

        let forge = forge.unwrap_or_else(|| self.offline.clone());
        Some((route, forge))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ForgeKind, RouteRule};

    fn offline_config() -> Config {
        Config {
            git_url: Some("https://forge.test".to_string()),
            git_provider: Some(ForgeKind::Offline),
            ..Default::default()
        }
    }

    fn rule(pattern: &str) -> RouteRule {
        RouteRule {
            pattern: pattern.to_string(),
            base: None,
            group: None,
            repo: None,
            git_token: None,
            git_url: None,
            git_provider: None,
        }
    }

    fn resolve(config: &Config, module: &str) -> Option<ResolvedRoute> {
        let resolver = Resolver::from_config(config, &UpstreamHttp::default()).unwrap();
        resolver.resolve(module).map(|(route, _)| route)
    }

    #[test]
    fn exact_map_rewrites_before_split() {
        let mut config = offline_config();
        config.modules.insert(
            "example.com/a".to_string(),
            "forge-b.test/org/a".to_string(),
        );
        let route = resolve(&config, "example.com/a").unwrap();
        assert_eq!(route.original_path, "example.com/a");
        assert_eq!(route.base, "forge-b.test");
        assert_eq!(route.group, "org");
        assert_eq!(route.repo, "a");
        assert_eq!(route.base_group_repo(), "forge-b.test/org/a");
    }

    #[test]
    fn decodes_case_escapes_before_lookup() {
        let mut config = offline_config();
        config.modules.insert(
            "example.com/Upper".to_string(),
            "gitlab.test/grp/upper".to_string(),
        );
        let route = resolve(&config, "example.com/!upper").unwrap();
        assert_eq!(route.repo, "upper");
        assert_eq!(route.original_path, "example.com/Upper");
    }

    #[test]
    fn structural_split_extracts_major_version() {
        let config = offline_config();
        let route = resolve(&config, "gitlab.test/org/proj/v2/sub/dir").unwrap();
        assert_eq!(route.base, "gitlab.test");
        assert_eq!(route.group, "org");
        assert_eq!(route.repo, "proj");
        assert_eq!(route.sub_path, "v2/sub/dir");
        assert_eq!(route.major_version.as_deref(), Some("v2"));
        assert_eq!(route.clean_sub_path, "sub/dir");
    }

    #[test]
    fn first_matching_rule_wins() {
        let mut config = offline_config();
        let mut first = rule("mytest.domain/.*");
        first.repo = Some("first".to_string());
        let mut second = rule("mytest.domain/specific");
        second.repo = Some("second".to_string());
        config.rules = vec![first, second];

        let route = resolve(&config, "mytest.domain/specific").unwrap();
        assert_eq!(route.repo, "first");
    }

    #[test]
    fn rule_templates_substitute_captures() {
        let mut config = offline_config();
        let mut mapped = rule("^mytest.domain/([^/]+)$");
        mapped.base = Some("another.domain".to_string());
        mapped.group = Some("mirrors".to_string());
        mapped.repo = Some("$1".to_string());
        config.rules = vec![mapped];

        let route = resolve(&config, "mytest.domain/widget").unwrap();
        assert_eq!(route.base, "another.domain");
        assert_eq!(route.group, "mirrors");
        assert_eq!(route.repo, "widget");
    }

    #[test]
    fn repo_template_with_slash_splits_into_sub_path() {
        let mut config = offline_config();
        let mut mapped = rule("^short.test/([^/]+)$");
        mapped.base = Some("gitlab.test".to_string());
        mapped.group = Some("org".to_string());
        mapped.repo = Some("$1/v2/pkg".to_string());
        config.rules = vec![mapped];

        let route = resolve(&config, "short.test/proj").unwrap();
        assert_eq!(route.repo, "proj");
        assert_eq!(route.sub_path, "v2/pkg");
        assert_eq!(route.major_version.as_deref(), Some("v2"));
        assert_eq!(route.clean_sub_path, "pkg");
    }

    #[test]
    fn unmatched_path_without_default_is_not_found() {
        let mut config = Config::default();
        config.rules = vec![rule("^only.this/.*$")];
        let resolver = Resolver::from_config(&config, &UpstreamHttp::default()).unwrap();
        assert!(resolver.resolve("something.else/x/y").is_none());
        assert!(resolver.resolve("only.this/x").is_some());
    }

    #[test]
    fn bad_pattern_fails_at_startup() {
        let mut config = Config::default();
        config.rules = vec![rule("([unclosed")];
        let err = Resolver::from_config(&config, &UpstreamHttp::default()).unwrap_err();
        assert!(matches!(err, ResolverError::Pattern { .. }));
    }
}
