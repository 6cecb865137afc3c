use crate::{
    ast::{Filter, Pipeline, Stage},
    optimizer::Pass,
};

/// Adjacent `$match` stages become one `$match` on the conjunction.
pub(crate) struct MergeMatchesPass;

impl Pass for MergeMatchesPass {
    fn name(&self) -> &'static str {
        "merge_matches"
    }

    fn apply(&self, pipeline: Pipeline) -> Pipeline {
        let mut stages: Vec<Stage> = Vec::with_capacity(pipeline.stages.len());
        for stage in pipeline.stages {
            match (stages.last_mut(), stage) {
                (Some(Stage::Match(previous)), Stage::Match(next)) => {
                    let filter = std::mem::replace(&mut previous.filter, Filter::MatchAll);
                    previous.filter = Filter::and(vec![filter, next.filter]);
                }
                (_, stage) => stages.push(stage),
            }
        }
        Pipeline::new(stages)
    }
}
