use crate::{
    ast::{self, AccumulatorFunction, Expression, ProjectItem, SortSpecification, Stage},
    codegen::{Error, MqlCodeGenerator, Result},
};
use bson::{doc, Bson, Document};

impl MqlCodeGenerator {
    fn accumulator_name(function: AccumulatorFunction) -> &'static str {
        use AccumulatorFunction::*;
        match function {
            AddToSet => "$addToSet",
            Avg => "$avg",
            First => "$first",
            Last => "$last",
            Max => "$max",
            Min => "$min",
            Push => "$push",
            StdDevPop => "$stdDevPop",
            StdDevSamp => "$stdDevSamp",
            Sum => "$sum",
        }
    }

    pub fn codegen_stage(&self, stage: Stage) -> Result<Document> {
        match stage {
            Stage::Match(m) => Ok(doc! { "$match": self.codegen_filter(m.filter)? }),
            Stage::Project(p) => self.codegen_project(p),
            Stage::Group(g) => self.codegen_group(g),
            Stage::Sort(s) => self.codegen_sort(s),
            Stage::Unwind(u) => Ok(self.codegen_unwind(u)),
            Stage::Lookup(l) => Ok(doc! { "$lookup": {
                "from": l.from,
                "localField": l.local_field,
                "foreignField": l.foreign_field,
                "as": l.as_var,
            }}),
            Stage::Limit(l) => {
                if l.limit < 0 {
                    return Err(Error::NegativeValue {
                        stage: "$limit",
                        value: l.limit,
                    });
                }
                Ok(doc! { "$limit": Self::codegen_int(l.limit) })
            }
            Stage::Skip(s) => {
                if s.skip < 0 {
                    return Err(Error::NegativeValue {
                        stage: "$skip",
                        value: s.skip,
                    });
                }
                Ok(doc! { "$skip": Self::codegen_int(s.skip) })
            }
            Stage::UnionWith(u) => {
                let mut body = doc! { "coll": u.collection };
                if !u.pipeline.stages.is_empty() {
                    let stages = self.codegen_pipeline(u.pipeline)?;
                    body.insert("pipeline", stages);
                }
                Ok(doc! { "$unionWith": body })
            }
            Stage::Documents(d) => {
                let documents = d
                    .documents
                    .into_iter()
                    .map(|e| self.codegen_expression(e))
                    .collect::<Result<Vec<Bson>>>()?;
                Ok(doc! { "$documents": documents })
            }
            Stage::ReplaceRoot(r) => Ok(doc! { "$replaceRoot": {
                "newRoot": self.codegen_expression(r.new_root)?,
            }}),
        }
    }

    /// Numbers and booleans assigned in `$project` would be read as
    /// inclusion flags, so they are wrapped in `$literal`.
    fn codegen_project_value(&self, e: Expression) -> Result<Bson> {
        match e {
            Expression::Constant(
                b @ (Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Boolean(_) | Bson::Decimal128(_)),
            ) => Ok(Bson::Document(doc! { "$literal": b })),
            other => self.codegen_expression(other),
        }
    }

    fn codegen_project(&self, p: ast::Project) -> Result<Document> {
        if p.specifications.is_empty() {
            return Err(Error::EmptyProjection);
        }
        let mentions_id = p.specifications.contains_key(&"_id".to_string());
        let excludes_only = p
            .specifications
            .values()
            .all(|item| matches!(item, ProjectItem::Exclusion));
        let mut body = Document::new();
        for (name, item) in p.specifications {
            let value = match item {
                ProjectItem::Exclusion => Bson::Int32(0),
                ProjectItem::Inclusion => Bson::Int32(1),
                ProjectItem::Assignment(e) => self.codegen_project_value(e)?,
            };
            body.insert(name, value);
        }
        if !mentions_id && !excludes_only {
            body.insert("_id", 0);
        }
        Ok(doc! { "$project": body })
    }

    fn codegen_group(&self, g: ast::Group) -> Result<Document> {
        let mut body = doc! { "_id": self.codegen_expression(g.id)? };
        for field in g.fields {
            let arg = self.codegen_expression(field.arg)?;
            body.insert(
                field.name,
                doc! { Self::accumulator_name(field.function): arg },
            );
        }
        Ok(doc! { "$group": body })
    }

    fn codegen_sort(&self, s: ast::Sort) -> Result<Document> {
        if s.specs.is_empty() {
            return Err(Error::EmptySort);
        }
        let specs = s
            .specs
            .into_iter()
            .map(|spec| match spec {
                SortSpecification::Asc(key) => (key, Bson::Int32(1)),
                SortSpecification::Desc(key) => (key, Bson::Int32(-1)),
            })
            .collect::<Document>();
        Ok(doc! { "$sort": specs })
    }

    fn codegen_unwind(&self, u: ast::Unwind) -> Document {
        let path = format!("${}", u.path);
        if u.include_array_index.is_none() && !u.preserve_null_and_empty_arrays {
            return doc! { "$unwind": path };
        }
        let mut body = doc! { "path": path };
        if let Some(index) = u.include_array_index {
            body.insert("includeArrayIndex", index);
        }
        if u.preserve_null_and_empty_arrays {
            body.insert("preserveNullAndEmptyArrays", true);
        }
        doc! { "$unwind": body }
    }
}
