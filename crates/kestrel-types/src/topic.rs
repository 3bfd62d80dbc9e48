// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// Identifies a topic: the agent that owns it, the payload type name, and an
/// optional scope used when one agent publishes several instances of the
/// same type (e.g. per-domain status).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicKey {
    pub publisher_agent: String,
    pub type_name: String,
    pub scope: Option<String>,
}

impl TopicKey {
    pub fn new(publisher_agent: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self { publisher_agent: publisher_agent.into(), type_name: type_name.into(), scope: None }
    }

    pub fn scoped(
        publisher_agent: impl Into<String>,
        type_name: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            publisher_agent: publisher_agent.into(),
            type_name: type_name.into(),
            scope: Some(scope.into()),
        }
    }

    /// Filesystem-safe directory name for this topic, used under the
    /// persistence root as `<root>/<dir_name>/<key>.<ext>`.
    pub fn dir_name(&self) -> String {
        match &self.scope {
            Some(scope) => format!("{}.{}.{}", self.publisher_agent, self.type_name, scope),
            None => format!("{}.{}", self.publisher_agent, self.type_name),
        }
    }
}

/// A change notification delivered to a subscription handler.
#[derive(Debug, Clone)]
pub enum ChangeEvent<T> {
    Create { key: String, value: T },
    Modify { key: String, old: T, new: T },
    Delete { key: String, old: T },
    /// Emitted once a subscription has caught up to the publisher's latest
    /// write at the time of activation (or after a lagged resync).
    Sync,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_name_includes_scope_when_present() {
        let t = TopicKey::scoped("zedagent", "AppInstanceConfig", "u1");
        assert_eq!(t.dir_name(), "zedagent.AppInstanceConfig.u1");
    }

    #[test]
    fn dir_name_omits_scope_when_absent() {
        let t = TopicKey::new("zedagent", "AppInstanceConfig");
        assert_eq!(t.dir_name(), "zedagent.AppInstanceConfig");
    }
}
