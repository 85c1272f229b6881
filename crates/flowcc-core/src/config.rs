use std::collections::BTreeSet;
use std::str::FromStr;

use flowcc_error::{Error, Result};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// How much of the graph survives into the rendered diagram.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// Calls, returns and the structural skeleton only.
    #[strum(to_string = "terse", serialize = "calls", serialize = "short")]
    #[serde(alias = "calls", alias = "short")]
    Terse,
    /// Drops prints, imports, exception plumbing and constructor bodies.
    #[strum(to_string = "compact", serialize = "simple")]
    #[serde(alias = "simple")]
    Compact,
    #[default]
    #[strum(to_string = "detailed", serialize = "advanced")]
    #[serde(alias = "advanced")]
    Detailed,
}

/// Size ceilings. Stored flat in TOML next to the other options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowLimits {
    /// Hard cap on nodes the builder may create.
    pub max_nodes: usize,
    /// Maximum number of call splices active at once.
    pub max_nesting_depth: usize,
    /// Regions with more direct nodes than this collapse.
    pub max_subgraph_nodes: usize,
    /// Text this long or longer is cut with `...`.
    pub max_text_length: usize,
    /// Conditions longer than this are cut with `...`.
    pub condition_truncate: usize,
}

impl Default for FlowLimits {
    fn default() -> Self {
        Self {
            max_nodes: 100,
            max_nesting_depth: 6,
            max_subgraph_nodes: 25,
            max_text_length: 80,
            condition_truncate: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub show_prints: bool,
    pub show_functions: bool,
    pub show_for_loops: bool,
    pub show_while_loops: bool,
    pub show_variables: bool,
    pub show_ifs: bool,
    pub show_imports: bool,
    pub show_exceptions: bool,
    pub show_returns: bool,
    pub show_classes: bool,
    /// Fold runs of simple statements into one node.
    pub merge_common_nodes: bool,
    /// One-way `Call` edges instead of `Call and Return`.
    pub sequential_flow: bool,
    #[serde(flatten)]
    pub limits: FlowLimits,
    pub subgraph_whitelist: BTreeSet<String>,
    pub force_collapse_list: BTreeSet<String>,
    pub view_mode: ViewMode,
    pub prune_unused_nodes: bool,
    pub breakpoint_lines: BTreeSet<u32>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            show_prints: true,
            show_functions: true,
            show_for_loops: true,
            show_while_loops: true,
            show_variables: true,
            show_ifs: true,
            show_imports: true,
            show_exceptions: true,
            show_returns: true,
            show_classes: true,
            merge_common_nodes: true,
            sequential_flow: false,
            limits: FlowLimits::default(),
            subgraph_whitelist: BTreeSet::new(),
            force_collapse_list: BTreeSet::new(),
            view_mode: ViewMode::default(),
            prune_unused_nodes: true,
            breakpoint_lines: BTreeSet::new(),
        }
    }
}

impl FlowConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| {
            Error::config_invalid(err.to_string()).with_operation("config::from_toml_str")
        })
    }

    pub fn with_sequential_flow(mut self, enabled: bool) -> Self {
        self.sequential_flow = enabled;
        self
    }

    pub fn with_merge_common_nodes(mut self, enabled: bool) -> Self {
        self.merge_common_nodes = enabled;
        self
    }

    pub fn with_view_mode(mut self, mode: ViewMode) -> Self {
        self.view_mode = mode;
        self
    }

    pub fn with_max_nodes(mut self, max: usize) -> Self {
        self.limits.max_nodes = max;
        self
    }

    pub fn with_max_nesting_depth(mut self, max: usize) -> Self {
        self.limits.max_nesting_depth = max;
        self
    }

    pub fn with_max_subgraph_nodes(mut self, max: usize) -> Self {
        self.limits.max_subgraph_nodes = max;
        self
    }

    pub fn with_whitelist<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subgraph_whitelist.extend(scopes.into_iter().map(Into::into));
        self
    }

    pub fn with_force_collapse<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.force_collapse_list.extend(scopes.into_iter().map(Into::into));
        self
    }

    pub fn with_breakpoints(mut self, lines: impl IntoIterator<Item = u32>) -> Self {
        self.breakpoint_lines.extend(lines);
        self
    }

    /// Overlay options from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Overlay options read through `lookup`. Unset variables leave the
    /// current value alone; unparsable ones are logged and ignored.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let toggles: [(&str, &mut bool); 13] = [
            ("SHOW_PRINTS", &mut self.show_prints),
            ("SHOW_FUNCTIONS", &mut self.show_functions),
            ("SHOW_FOR_LOOPS", &mut self.show_for_loops),
            ("SHOW_WHILE_LOOPS", &mut self.show_while_loops),
            ("SHOW_VARIABLES", &mut self.show_variables),
            ("SHOW_IFS", &mut self.show_ifs),
            ("SHOW_IMPORTS", &mut self.show_imports),
            ("SHOW_EXCEPTIONS", &mut self.show_exceptions),
            ("SHOW_RETURNS", &mut self.show_returns),
            ("SHOW_CLASSES", &mut self.show_classes),
            ("MERGE_COMMON_NODES", &mut self.merge_common_nodes),
            ("SEQUENTIAL_FLOW", &mut self.sequential_flow),
            ("PRUNE_UNUSED_NODES", &mut self.prune_unused_nodes),
        ];
        for (key, slot) in toggles {
            if let Some(raw) = lookup(key) {
                match parse_flag(&raw) {
                    Some(value) => *slot = value,
                    None => tracing::warn!(key, value = %raw, "ignoring unrecognized boolean"),
                }
            }
        }

        let numbers: [(&str, &mut usize); 3] = [
            ("MAX_NODES", &mut self.limits.max_nodes),
            ("MAX_NESTING_DEPTH", &mut self.limits.max_nesting_depth),
            ("MAX_SUBGRAPH_NODES", &mut self.limits.max_subgraph_nodes),
        ];
        for (key, slot) in numbers {
            if let Some(raw) = lookup(key) {
                match raw.trim().parse::<usize>() {
                    Ok(value) => *slot = value,
                    Err(_) => tracing::warn!(key, value = %raw, "ignoring non-numeric limit"),
                }
            }
        }

        if let Some(raw) = lookup("FLOWCHART_VIEW") {
            match ViewMode::from_str(raw.trim()) {
                Ok(mode) => self.view_mode = mode,
                Err(_) => tracing::warn!(value = %raw, "unknown view mode, keeping {}", self.view_mode),
            }
        }

        if let Some(raw) = lookup("SUBGRAPH_WHITELIST") {
            self.subgraph_whitelist.extend(parse_list(&raw));
        }
        if let Some(raw) = lookup("FORCE_COLLAPSE_LIST") {
            self.force_collapse_list.extend(parse_list(&raw));
        }

        let has_breakpoints = lookup("HAS_BREAKPOINTS")
            .as_deref()
            .and_then(parse_flag)
            .unwrap_or(false);
        if !has_breakpoints {
            return;
        }
        for item in lookup("BREAKPOINT_LINES").as_deref().map(parse_list).unwrap_or_default() {
            match item.parse::<u32>() {
                Ok(line) => {
                    self.breakpoint_lines.insert(line);
                }
                Err(_) => tracing::warn!(value = %item, "ignoring bad breakpoint line"),
            }
        }
    }
}

/// Accepts `1/true/yes/on` and `0/false/no/off`, any case.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Comma separated list; blanks dropped.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = FlowConfig::default();
        assert_eq!(config.limits.max_nodes, 100);
        assert_eq!(config.limits.max_nesting_depth, 6);
        assert_eq!(config.limits.max_subgraph_nodes, 25);
        assert!(config.merge_common_nodes);
        assert!(!config.sequential_flow);
        assert!(config.prune_unused_nodes);
        assert_eq!(config.view_mode, ViewMode::Detailed);
    }

    #[test]
    fn test_view_mode_aliases() {
        assert_eq!(ViewMode::from_str("calls").ok(), Some(ViewMode::Terse));
        assert_eq!(ViewMode::from_str("short").ok(), Some(ViewMode::Terse));
        assert_eq!(ViewMode::from_str("Simple").ok(), Some(ViewMode::Compact));
        assert_eq!(ViewMode::from_str("advanced").ok(), Some(ViewMode::Detailed));
        assert!(ViewMode::from_str("fancy").is_err());
        assert_eq!(ViewMode::Compact.to_string(), "compact");
    }

    #[test]
    fn test_from_toml() {
        let config = FlowConfig::from_toml_str(
            r#"
            sequential_flow = true
            max_subgraph_nodes = 5
            view_mode = "simple"
            subgraph_whitelist = ["class_Car"]
            "#,
        )
        .unwrap();
        assert!(config.sequential_flow);
        assert_eq!(config.limits.max_subgraph_nodes, 5);
        assert_eq!(config.limits.max_nodes, 100);
        assert_eq!(config.view_mode, ViewMode::Compact);
        assert!(config.subgraph_whitelist.contains("class_Car"));
    }

    #[test]
    fn test_from_toml_rejects_bad_types() {
        let err = FlowConfig::from_toml_str("max_nodes = \"many\"").unwrap_err();
        assert_eq!(err.kind(), flowcc_error::ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_env_overlay() {
        let mut config = FlowConfig::default();
        config.apply_env_with(env(&[
            ("SEQUENTIAL_FLOW", "1"),
            ("SHOW_PRINTS", "off"),
            ("MAX_SUBGRAPH_NODES", "7"),
            ("FLOWCHART_VIEW", "calls"),
            ("SUBGRAPH_WHITELIST", "class_Car, fact ,"),
            ("HAS_BREAKPOINTS", "1"),
            ("BREAKPOINT_LINES", "3,x,9"),
        ]));
        assert!(config.sequential_flow);
        assert!(!config.show_prints);
        assert_eq!(config.limits.max_subgraph_nodes, 7);
        assert_eq!(config.view_mode, ViewMode::Terse);
        assert_eq!(config.subgraph_whitelist.len(), 2);
        assert_eq!(config.breakpoint_lines.iter().copied().collect::<Vec<_>>(), vec![3, 9]);
    }

    #[test]
    fn test_env_bad_values_keep_defaults() {
        let mut config = FlowConfig::default();
        config.apply_env_with(env(&[
            ("SHOW_IFS", "maybe"),
            ("MAX_NODES", "lots"),
            ("FLOWCHART_VIEW", "3d"),
            ("BREAKPOINT_LINES", "4"),
        ]));
        assert!(config.show_ifs);
        assert_eq!(config.limits.max_nodes, 100);
        assert_eq!(config.view_mode, ViewMode::Detailed);
        assert!(config.breakpoint_lines.is_empty());
    }

    #[test]
    fn test_builders() {
        let config = FlowConfig::default()
            .with_max_subgraph_nodes(5)
            .with_force_collapse(["class_Car"])
            .with_breakpoints([4]);
        assert_eq!(config.limits.max_subgraph_nodes, 5);
        assert!(config.force_collapse_list.contains("class_Car"));
        assert!(config.breakpoint_lines.contains(&4));
    }
}
