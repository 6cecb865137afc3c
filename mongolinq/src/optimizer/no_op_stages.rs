use crate::{
    ast::{Expression, Filter, Limit, Pipeline, Project, ProjectItem, ReplaceRoot, Skip, Stage},
    optimizer::Pass,
};

/// Drops stages that pass every document through unchanged: `{ $match: {} }`,
/// `{ $skip: 0 }`, `$replaceRoot` of `$$ROOT` and a `$project` that repeats
/// the fields the previous `$project` produced. Consecutive `$limit`s keep
/// the smaller one.
pub(crate) struct NoOpStagesPass;

impl Pass for NoOpStagesPass {
    fn name(&self) -> &'static str {
        "no_op_stages"
    }

    fn apply(&self, pipeline: Pipeline) -> Pipeline {
        let mut stages: Vec<Stage> = Vec::with_capacity(pipeline.stages.len());
        for stage in pipeline.stages {
            match (stages.last_mut(), stage) {
                (_, Stage::Match(m)) if m.filter == Filter::MatchAll => {}
                (_, Stage::Skip(Skip { skip: 0 })) => {}
                (_, Stage::ReplaceRoot(ReplaceRoot { new_root })) if new_root.is_root() => {}
                (Some(Stage::Project(previous)), Stage::Project(next))
                    if is_identity_after(previous, &next) => {}
                (Some(Stage::Limit(previous)), Stage::Limit(Limit { limit })) => {
                    previous.limit = previous.limit.min(limit);
                }
                (_, stage) => stages.push(stage),
            }
        }
        Pipeline::new(stages)
    }
}

/// True when `next` keeps exactly the fields `previous` outputs, each under
/// its own name.
fn is_identity_after(previous: &Project, next: &Project) -> bool {
    let outputs = |p: &Project| -> Vec<String> {
        let mut names: Vec<String> = p
            .specifications
            .iter()
            .filter(|(_, item)| !matches!(item, ProjectItem::Exclusion))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    };
    let keeps_id = |p: &Project| match p.specifications.get(&"_id".to_string()) {
        Some(ProjectItem::Exclusion) | None => false,
        Some(_) => true,
    };
    let unchanged = next.specifications.iter().all(|(name, item)| match item {
        ProjectItem::Inclusion | ProjectItem::Exclusion => true,
        ProjectItem::Assignment(Expression::FieldPath(path)) => *path == format!("${name}"),
        ProjectItem::Assignment(_) => false,
    });
    let all_assigned_or_excluded = previous
        .specifications
        .values()
        .all(|item| !matches!(item, ProjectItem::Inclusion));
    unchanged
        && all_assigned_or_excluded
        && keeps_id(previous) == keeps_id(next)
        && outputs(previous) == outputs(next)
}
