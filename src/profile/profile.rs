//! Profile aggregate.

use super::error::ProfileError;
use super::ip_gen::IpGen;
use super::template::TemplatePair;
use std::collections::HashSet;

/// A complete traffic profile: a default IP generation policy and one or more
/// template pairs. Validated on construction; immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    default_ip_gen: IpGen,
    templates: Vec<TemplatePair>,
}

impl Profile {
    pub fn new(default_ip_gen: IpGen, templates: Vec<TemplatePair>) -> Result<Self, ProfileError> {
        if templates.is_empty() {
            return Err(ProfileError::NoTemplates);
        }
        // 同一端口只能属于一个 server 模板，否则引擎无法分流入站连接
        let mut claimed = HashSet::new();
        for pair in &templates {
            for rule in pair.server.assoc.rules() {
                if !claimed.insert(rule.port) {
                    return Err(ProfileError::DuplicateAssocPort(rule.port));
                }
            }
        }
        Ok(Self {
            default_ip_gen,
            templates,
        })
    }

    pub fn default_ip_gen(&self) -> &IpGen {
        &self.default_ip_gen
    }

    pub fn templates(&self) -> &[TemplatePair] {
        &self.templates
    }

    /// Effective IP generator of template `idx` (template override or the
    /// profile default).
    pub fn ip_gen_for(&self, idx: usize) -> &IpGen {
        self.templates[idx]
            .client
            .ip_gen
            .as_ref()
            .unwrap_or(&self.default_ip_gen)
    }
}
