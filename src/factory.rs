/*
 * Patchbay - Audio Signal Routing Simulator
 * Copyright (c) 2025 MACHIKO LAB
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Node factory: resolve a kind string to a constructed node.
//!
//! Resolution order:
//!
//! 1. built-in kinds (case-insensitive)
//! 2. the legacy inline reference `kind: plugin` with
//!    `params.plugin: {module, class}`, resolved against modules already in
//!    the registry
//! 3. a manifest-declared plugin, admitted by the [`TrustPolicy`] before its
//!    module is resolved or loaded

use std::path::Path;

use thiserror::Error;

use crate::nodes::{builtin_constructor, NodeBuildError, NodeConstructor, BUILTIN_KINDS};
use crate::parameters::{NodeParams, ParameterError};
use crate::plugin::{load_plugin_module, PluginError, PluginRegistry, TrustPolicy};
use crate::processing::{AudioNode, NodeContext, NodeInfo};

/// Kind name of the legacy inline plugin reference.
pub const LEGACY_PLUGIN_KIND: &str = "plugin";

/// ファクトリーエラー
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("unknown node kind '{kind}' (built-in kinds: {})", available.join(", "))]
    UnknownKind { kind: String, available: Vec<String> },

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Build(#[from] NodeBuildError),

    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// ノードファクトリー
pub struct NodeFactory<'r> {
    policy: TrustPolicy,
    registry: &'r PluginRegistry,
}

impl NodeFactory<'static> {
    /// Factory backed by the process-wide registry.
    pub fn new(policy: TrustPolicy) -> Self {
        Self::with_registry(policy, PluginRegistry::global())
    }
}

impl Default for NodeFactory<'static> {
    fn default() -> Self {
        Self::new(TrustPolicy::from_env())
    }
}

impl<'r> NodeFactory<'r> {
    pub fn with_registry(policy: TrustPolicy, registry: &'r PluginRegistry) -> Self {
        Self { policy, registry }
    }

    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &PluginRegistry {
        self.registry
    }

    /// Build the node described by `ctx` and `params`.
    ///
    /// The reserved `channels` key is consumed by the caller and never reaches
    /// the constructor; the channel count arrives through `ctx`.
    pub fn create(
        &self,
        ctx: &NodeContext,
        params: &NodeParams,
        manifest: Option<&Path>,
    ) -> Result<Box<dyn AudioNode>, FactoryError> {
        let params = params.without("channels");

        if let Some(constructor) = builtin_constructor(&ctx.kind) {
            tracing::debug!(node_id = %ctx.id, kind = %ctx.kind, "resolved built-in kind");
            return Ok(constructor(ctx, &params)?);
        }

        if ctx.kind.eq_ignore_ascii_case(LEGACY_PLUGIN_KIND) {
            let (constructor, plugin_ctx) = self.resolve_legacy(ctx, &params)?;
            return invoke(constructor, &plugin_ctx, &params.without(LEGACY_PLUGIN_KIND));
        }

        if let Some(manifest_path) = manifest {
            let constructor = self.resolve_manifest(&ctx.kind, manifest_path)?;
            return invoke(constructor, ctx, &params);
        }

        Err(FactoryError::UnknownKind {
            kind: ctx.kind.clone(),
            available: BUILTIN_KINDS.iter().map(|k| k.to_string()).collect(),
        })
    }

    fn resolve_legacy(
        &self,
        ctx: &NodeContext,
        params: &NodeParams,
    ) -> Result<(NodeConstructor, NodeContext), FactoryError> {
        let reference = params
            .object(LEGACY_PLUGIN_KIND)?
            .ok_or_else(|| ParameterError::NotFound {
                name: LEGACY_PLUGIN_KIND.to_string(),
            })?;
        let module = reference.required_text("module")?;
        let kind = reference.required_text("class")?.to_lowercase();

        self.policy.check_namespace(&module)?;
        let constructor = self.registry.constructor(&module, &kind)?;

        tracing::debug!(node_id = %ctx.id, module = %module, kind = %kind, "resolved inline plugin reference");
        Ok((
            constructor,
            NodeContext::new(ctx.id.clone(), kind, ctx.sample_rate, ctx.channels),
        ))
    }

    fn resolve_manifest(&self, kind: &str, manifest_path: &Path) -> Result<NodeConstructor, FactoryError> {
        let manifest = self.policy.admit(manifest_path)?;

        let kind = kind.to_lowercase();
        if !manifest.allows_kind(&kind) {
            return Err(PluginError::KindNotAllowed {
                kind,
                plugin: manifest.name.clone(),
                allowed: manifest.allowed_node_kinds.clone(),
            }
            .into());
        }

        if !self.registry.contains_module(&manifest.module) {
            let module = load_plugin_module(&self.policy.plugin_dir(&manifest), &manifest.module)?;
            match self.registry.register(module) {
                Ok(()) | Err(PluginError::DuplicateModule { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }

        tracing::debug!(plugin = %manifest.name, module = %manifest.module, kind = %kind, "resolved manifest plugin kind");
        Ok(self.registry.constructor(&manifest.module, &kind)?)
    }
}

fn invoke(
    constructor: NodeConstructor,
    ctx: &NodeContext,
    params: &NodeParams,
) -> Result<Box<dyn AudioNode>, FactoryError> {
    let node = constructor(ctx, params)?;
    check_contract(ctx, node.node_info())?;
    Ok(node)
}

/// A plugin node must report the identity and shape it was built with.
fn check_contract(ctx: &NodeContext, info: &NodeInfo) -> Result<(), PluginError> {
    let reason = if info.id != ctx.id {
        format!("reports id '{}', built as '{}'", info.id, ctx.id)
    } else if info.sample_rate != ctx.sample_rate {
        format!("reports {} Hz, built at {} Hz", info.sample_rate, ctx.sample_rate)
    } else if info.channels != ctx.channels {
        format!("reports {} channels, built with {}", info.channels, ctx.channels)
    } else {
        return Ok(());
    };

    Err(PluginError::ContractViolation {
        kind: ctx.kind.clone(),
        reason,
    })
}
