//! Semantics-preserving rewrites of a planned pipeline. Every pass is total
//! and the passes are run until none of them changes the pipeline, so
//! optimizing an optimized pipeline returns it unchanged.
use crate::ast::{Filter, Match, Pipeline, Stage, UnionWith};
use tracing::{event, Level};

mod constant_folding;
mod elem_match;
mod flatten_logical;
mod grouping;
mod merge_matches;
mod no_op_stages;

#[cfg(test)]
mod test;

/// A rewrite applied to a whole pipeline.
pub(crate) trait Pass {
    fn name(&self) -> &'static str;

    fn apply(&self, pipeline: Pipeline) -> Pipeline;
}

// Passes must be added to this vec in the order they should be applied.
static PASSES: fn() -> Vec<Box<dyn Pass>> = || {
    vec![
        Box::new(flatten_logical::FlattenLogicalPass),
        Box::new(constant_folding::ConstantFoldingPass),
        Box::new(elem_match::ElemMatchPass),
        Box::new(merge_matches::MergeMatchesPass),
        Box::new(no_op_stages::NoOpStagesPass),
        Box::new(grouping::GroupingPass),
    ]
};

/// Upper bound on rounds over the pass list. Each pass only shrinks the
/// pipeline, so this is never reached in practice.
const MAX_ROUNDS: usize = 32;

/// Applies every pass until the pipeline stops changing. Pipelines nested in
/// `$unionWith` are optimized first.
pub fn optimize_pipeline(pipeline: Pipeline) -> Pipeline {
    let passes = PASSES();
    let mut current = Pipeline::new(
        pipeline
            .stages
            .into_iter()
            .map(|stage| match stage {
                Stage::UnionWith(u) => Stage::UnionWith(UnionWith {
                    collection: u.collection,
                    pipeline: optimize_pipeline(u.pipeline),
                }),
                other => other,
            })
            .collect(),
    );
    for round in 0..MAX_ROUNDS {
        let mut changed = false;
        for pass in passes.iter() {
            let next = pass.apply(current.clone());
            if next != current {
                event!(Level::DEBUG, pass = pass.name(), round, "pass rewrote the pipeline");
                changed = true;
                current = next;
            }
        }
        if !changed {
            break;
        }
    }
    current
}

/// Simplifies a standalone filter. A filter that matches everything is `{}`.
pub fn optimize_filter(filter: Filter) -> Filter {
    let pipeline = optimize_pipeline(Pipeline::new(vec![Stage::Match(Match { filter })]));
    match pipeline.stages.into_iter().next() {
        Some(Stage::Match(Match { filter })) => filter,
        _ => Filter::MatchAll,
    }
}
