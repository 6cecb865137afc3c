use crate::{
    ast::{ComparisonOperator, FieldFilter, FieldOperation, Filter},
    codegen::{MqlCodeGenerator, Result},
};
use bson::{bson, doc, Bson, Document};

/// Field predicates inside `$elemMatch` may have no field name; their
/// operator document applies to the element itself.
macro_rules! possibly_nest_under_field {
    ($path:expr, $op:expr) => {{
        let path: String = $path;
        if path.is_empty() {
            match $op {
                Bson::Document(d) => d,
                other => doc! { "$eq": other },
            }
        } else {
            doc! { path: $op }
        }
    }};
}

impl MqlCodeGenerator {
    pub fn codegen_filter(&self, filter: Filter) -> Result<Document> {
        Ok(match filter {
            Filter::MatchAll => doc! {},
            Filter::MatchNothing => doc! { "_id": { "$type": -1 } },
            Filter::Field(f) => self.codegen_field_filter(f)?,
            Filter::And(fs) => self.codegen_and(fs)?,
            Filter::Or(fs) => doc! { "$or": self.codegen_filter_list(fs)? },
            Filter::Nor(fs) => doc! { "$nor": self.codegen_filter_list(fs)? },
            Filter::Expr(e) => doc! { "$expr": self.codegen_expression(e)? },
        })
    }

    fn codegen_filter_list(&self, filters: Vec<Filter>) -> Result<Vec<Bson>> {
        filters
            .into_iter()
            .map(|f| Ok(Bson::Document(self.codegen_filter(f)?)))
            .collect()
    }

    /// An `$and` whose operands touch disjoint keys renders as one document.
    fn codegen_and(&self, filters: Vec<Filter>) -> Result<Document> {
        let rendered = filters
            .into_iter()
            .map(|f| self.codegen_filter(f))
            .collect::<Result<Vec<Document>>>()?;
        let mergeable = {
            let mut seen = std::collections::HashSet::new();
            rendered
                .iter()
                .flat_map(|d| d.keys())
                .all(|k| !matches!(k.as_str(), "$and" | "$or" | "$nor" | "$expr") && seen.insert(k.clone()))
        };
        if mergeable {
            let mut merged = Document::new();
            for d in rendered {
                merged.extend(d);
            }
            Ok(merged)
        } else {
            Ok(doc! { "$and": rendered.into_iter().map(Bson::Document).collect::<Vec<_>>() })
        }
    }

    fn codegen_field_filter(&self, f: FieldFilter) -> Result<Document> {
        let op = match (f.path.is_empty(), f.operation) {
            (true, FieldOperation::Comparison(ComparisonOperator::Eq, v)) => bson!({ "$eq": v }),
            (true, FieldOperation::Regex(r)) => bson!({ "$regex": Bson::RegularExpression(r) }),
            (_, operation) => self.codegen_field_operation(operation)?,
        };
        Ok(possibly_nest_under_field!(f.path, op))
    }

    /// Equality is written as the bare value unless the value would be read
    /// as something else: a regular expression or an operator document.
    fn needs_explicit_eq(value: &Bson) -> bool {
        match value {
            Bson::RegularExpression(_) => true,
            Bson::Document(d) => d.keys().next().map_or(false, |k| k.starts_with('$')),
            _ => false,
        }
    }

    pub(crate) fn codegen_field_operation(&self, op: FieldOperation) -> Result<Bson> {
        Ok(match op {
            FieldOperation::Comparison(ComparisonOperator::Eq, v) if !Self::needs_explicit_eq(&v) => v,
            FieldOperation::Comparison(c, v) => bson!({ c.as_str(): v }),
            FieldOperation::In(vs) => bson!({ "$in": vs }),
            FieldOperation::Nin(vs) => bson!({ "$nin": vs }),
            FieldOperation::Exists(b) => bson!({ "$exists": b }),
            FieldOperation::Type(t) => bson!({ "$type": t }),
            FieldOperation::Size(n) => bson!({ "$size": Self::codegen_int(n) }),
            FieldOperation::Regex(r) => Bson::RegularExpression(r),
            FieldOperation::Mod { divisor, remainder } => {
                bson!({ "$mod": [Self::codegen_int(divisor), Self::codegen_int(remainder)] })
            }
            FieldOperation::ElemMatch(f) => bson!({ "$elemMatch": self.codegen_filter(*f)? }),
            FieldOperation::All(vs) => bson!({ "$all": vs }),
            FieldOperation::Not(inner) => {
                let inner = match *inner {
                    FieldOperation::Comparison(ComparisonOperator::Eq, v) => bson!({ "$eq": v }),
                    other => self.codegen_field_operation(other)?,
                };
                bson!({ "$not": inner })
            }
        })
    }

    /// Integers render as 32-bit when they fit, matching how literals are
    /// usually written.
    pub(crate) fn codegen_int(i: i64) -> Bson {
        match i32::try_from(i) {
            Ok(small) => Bson::Int32(small),
            Err(_) => Bson::Int64(i),
        }
    }
}
