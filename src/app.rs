use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use crate::discovery::{self, Mode, PrunedSlot, SourceSlot};
use crate::error::KiraError;
use crate::host::StepHost;
use crate::normalize::{MergeParams, SpecBuilder};
use crate::planner::{PlannedAction, Planner, ScriptBlock, StepSettings};
use crate::registry::DataRegistry;
use crate::resolver::{ResolvedSpec, Resolver, Warning};
use crate::tables::LookupTables;

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Treat any warning as fatal.
    pub strict: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    pub mode: Mode,
    pub specs: Vec<ResolvedSpec>,
    pub actions: Vec<PlannedAction>,
    pub warnings: Vec<Warning>,
    pub pruned: Vec<PrunedSlot>,
    pub registry: DataRegistry,
}

impl BuildResult {
    pub fn scripts(&self) -> impl Iterator<Item = &ScriptBlock> {
        self.actions.iter().filter_map(|action| match action {
            PlannedAction::Convert(block) => Some(block),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoverResult {
    pub mode: Mode,
    pub slots: Vec<SourceSlot>,
}

#[derive(Debug, Clone, Copy)]
pub enum ProgressSinkKind {
    Build,
    Discover,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone)]
pub struct App {
    tables: LookupTables,
    settings: StepSettings,
}

impl App {
    pub fn new(tables: LookupTables, settings: StepSettings) -> Self {
        Self { tables, settings }
    }

    pub fn tables(&self) -> &LookupTables {
        &self.tables
    }

    /// Runs one build pass: normalize, prune, resolve, then plan. Nothing is
    /// planned unless every item resolves.
    pub fn build<H: StepHost + ?Sized>(
        &self,
        mut registry: DataRegistry,
        params: MergeParams,
        host: &mut H,
        options: BuildOptions,
        sink: &dyn ProgressSink,
    ) -> Result<BuildResult, KiraError> {
        let started = Instant::now();

        sink.event(ProgressEvent {
            message: "phase=Discover; normalizing parameters".to_string(),
            elapsed: None,
        });
        let spec = SpecBuilder::new(params).build(&mut registry)?;
        info!(mode = ?spec.mode, items = spec.len(), pruned = spec.pruned.len(), "normalized merge spec");

        sink.event(ProgressEvent {
            message: format!("phase=Resolve; {} items", spec.len()),
            elapsed: Some(started.elapsed()),
        });
        let resolution = Resolver::new(&registry, &self.tables).resolve(&spec)?;
        let mut warnings = resolution.warnings;
        if options.strict && !warnings.is_empty() {
            return Err(KiraError::WarningsDenied(warnings.len()));
        }

        sink.event(ProgressEvent {
            message: "phase=Plan; building commands".to_string(),
            elapsed: Some(started.elapsed()),
        });
        let actions = Planner::new(&self.settings, &self.tables, host).plan(
            &mut registry,
            &resolution.specs,
            &mut warnings,
        )?;
        if options.strict && !warnings.is_empty() {
            return Err(KiraError::WarningsDenied(warnings.len()));
        }

        sink.event(ProgressEvent {
            message: format!("phase=Done; {} actions", actions.len()),
            elapsed: Some(started.elapsed()),
        });
        Ok(BuildResult {
            mode: spec.mode,
            specs: resolution.specs,
            actions,
            warnings,
            pruned: spec.pruned,
            registry,
        })
    }

    /// Lists the source slots a basic-mode build would pick up. Does not prune.
    pub fn discover(
        &self,
        registry: &DataRegistry,
        params: &MergeParams,
        sink: &dyn ProgressSink,
    ) -> DiscoverResult {
        sink.event(ProgressEvent {
            message: "phase=Discover; scanning registry".to_string(),
            elapsed: None,
        });
        let slots = discovery::discover(registry, &params.scope_filter())
            .into_iter()
            .collect();
        DiscoverResult {
            mode: params.mode(),
            slots,
        }
    }
}
