use crate::{
    ast::{self, BsonType, DatePartKind, Expression, Op, TrimKind},
    codegen::{MqlCodeGenerator, Result},
};
use bson::{bson, doc, Bson, Document};

impl MqlCodeGenerator {
    fn op_name(op: Op) -> &'static str {
        use Op::*;
        match op {
            Add => "$add",
            Subtract => "$subtract",
            Multiply => "$multiply",
            Divide => "$divide",
            Mod => "$mod",
            Abs => "$abs",
            Ceil => "$ceil",
            Floor => "$floor",
            Round => "$round",
            Trunc => "$trunc",
            Pow => "$pow",
            Sqrt => "$sqrt",
            Exp => "$exp",
            Ln => "$ln",
            Log => "$log",
            Log10 => "$log10",
            Eq => "$eq",
            Ne => "$ne",
            Gt => "$gt",
            Gte => "$gte",
            Lt => "$lt",
            Lte => "$lte",
            Cmp => "$cmp",
            And => "$and",
            Or => "$or",
            Not => "$not",
            Concat => "$concat",
            ToLower => "$toLower",
            ToUpper => "$toUpper",
            StrLenCP => "$strLenCP",
            SubstrCP => "$substrCP",
            IndexOfCP => "$indexOfCP",
            Split => "$split",
            StrCaseCmp => "$strcasecmp",
            Size => "$size",
            ArrayElemAt => "$arrayElemAt",
            ConcatArrays => "$concatArrays",
            In => "$in",
            Slice => "$slice",
            Range => "$range",
            ReverseArray => "$reverseArray",
            AllElementsTrue => "$allElementsTrue",
            AnyElementTrue => "$anyElementTrue",
            SetUnion => "$setUnion",
            SetIntersection => "$setIntersection",
            SetDifference => "$setDifference",
            SetIsSubset => "$setIsSubset",
            ObjectToArray => "$objectToArray",
            ArrayToObject => "$arrayToObject",
            First => "$first",
            Last => "$last",
            Sum => "$sum",
            Avg => "$avg",
            Max => "$max",
            Min => "$min",
            IfNull => "$ifNull",
            Type => "$type",
            IsArray => "$isArray",
            IsNumber => "$isNumber",
            MergeObjects => "$mergeObjects",
            BitAnd => "$bitAnd",
            BitOr => "$bitOr",
            BitXor => "$bitXor",
            Literal => "$literal",
        }
    }

    /// Operators rendered as `{ $op : arg }` rather than `{ $op : [arg] }`
    /// when they have a single argument.
    fn renders_unary(op: Op) -> bool {
        use Op::*;
        matches!(
            op,
            Abs | Ceil
                | Floor
                | Round
                | Trunc
                | Sqrt
                | Exp
                | Ln
                | Log10
                | Not
                | ToLower
                | ToUpper
                | StrLenCP
                | Size
                | ReverseArray
                | AllElementsTrue
                | AnyElementTrue
                | ObjectToArray
                | ArrayToObject
                | First
                | Last
                | Sum
                | Avg
                | Max
                | Min
                | Type
                | IsArray
                | IsNumber
                | Literal
                | MergeObjects
        )
    }

    fn convert_shorthand(to: BsonType) -> Option<&'static str> {
        Some(match to {
            BsonType::Int => "$toInt",
            BsonType::Long => "$toLong",
            BsonType::Double => "$toDouble",
            BsonType::Decimal => "$toDecimal",
            BsonType::String => "$toString",
            BsonType::Bool => "$toBool",
            BsonType::Date => "$toDate",
            BsonType::ObjectId => "$toObjectId",
            _ => return None,
        })
    }

    fn date_part_name(part: DatePartKind) -> &'static str {
        match part {
            DatePartKind::Year => "$year",
            DatePartKind::Month => "$month",
            DatePartKind::DayOfMonth => "$dayOfMonth",
            DatePartKind::DayOfWeek => "$dayOfWeek",
            DatePartKind::DayOfYear => "$dayOfYear",
            DatePartKind::Hour => "$hour",
            DatePartKind::Minute => "$minute",
            DatePartKind::Second => "$second",
            DatePartKind::Millisecond => "$millisecond",
            DatePartKind::Week => "$week",
        }
    }

    /// Literal values that the server would otherwise interpret: strings that
    /// look like field paths and documents with operator keys.
    pub(crate) fn codegen_constant(&self, value: Bson) -> Bson {
        match value {
            Bson::String(s) if s.starts_with('$') => bson!({ "$literal": s }),
            Bson::Document(d) if d.keys().any(|k| k.starts_with('$')) => {
                bson!({ "$literal": d })
            }
            Bson::Array(items) => {
                Bson::Array(items.into_iter().map(|i| self.codegen_constant(i)).collect())
            }
            other => other,
        }
    }

    fn codegen_boxed(&self, e: Box<Expression>) -> Result<Bson> {
        self.codegen_expression(*e)
    }

    pub fn codegen_expression(&self, expr: Expression) -> Result<Bson> {
        Ok(match expr {
            Expression::Constant(b) => self.codegen_constant(b),
            Expression::FieldPath(p) => Bson::String(p),
            Expression::Operator(o) => {
                let name = Self::op_name(o.op);
                if o.args.len() == 1 && Self::renders_unary(o.op) {
                    let arg = o.args.into_iter().next().map(|a| self.codegen_expression(a));
                    bson!({ name: arg.transpose()?.unwrap_or(Bson::Null) })
                } else {
                    let args = o
                        .args
                        .into_iter()
                        .map(|a| self.codegen_expression(a))
                        .collect::<Result<Vec<Bson>>>()?;
                    bson!({ name: args })
                }
            }
            Expression::Cond(c) => bson!({ "$cond": {
                "if": self.codegen_boxed(c.condition)?,
                "then": self.codegen_boxed(c.then)?,
                "else": self.codegen_boxed(c.otherwise)?,
            }}),
            Expression::Switch(s) => {
                let branches = s
                    .branches
                    .into_iter()
                    .map(|(case, then)| {
                        Ok(bson!({
                            "case": self.codegen_expression(case)?,
                            "then": self.codegen_expression(then)?,
                        }))
                    })
                    .collect::<Result<Vec<Bson>>>()?;
                bson!({ "$switch": {
                    "branches": branches,
                    "default": self.codegen_boxed(s.default)?,
                }})
            }
            Expression::Let(l) => {
                let vars = l
                    .vars
                    .into_iter()
                    .map(|v| Ok((v.name, self.codegen_boxed(v.expr)?)))
                    .collect::<Result<Document>>()?;
                bson!({ "$let": { "vars": vars, "in": self.codegen_boxed(l.inside)? } })
            }
            Expression::Map(m) => bson!({ "$map": {
                "input": self.codegen_boxed(m.input)?,
                "as": m.as_var,
                "in": self.codegen_boxed(m.inside)?,
            }}),
            Expression::Filter(f) => {
                let mut body = doc! {
                    "input": self.codegen_boxed(f.input)?,
                    "as": f.as_var,
                    "cond": self.codegen_boxed(f.cond)?,
                };
                if let Some(limit) = f.limit {
                    body.insert("limit", self.codegen_boxed(limit)?);
                }
                bson!({ "$filter": body })
            }
            Expression::Reduce(r) => bson!({ "$reduce": {
                "input": self.codegen_boxed(r.input)?,
                "initialValue": self.codegen_boxed(r.initial_value)?,
                "in": self.codegen_boxed(r.inside)?,
            }}),
            Expression::Document(d) => Bson::Document(
                d.into_iter()
                    .map(|(k, v)| Ok((k, self.codegen_expression(v)?)))
                    .collect::<Result<Document>>()?,
            ),
            Expression::Array(items) => Bson::Array(
                items
                    .into_iter()
                    .map(|i| self.codegen_expression(i))
                    .collect::<Result<Vec<Bson>>>()?,
            ),
            Expression::Convert(c) => self.codegen_convert(c)?,
            Expression::DateAdd(d) => {
                let mut body = doc! {
                    "startDate": self.codegen_boxed(d.start_date)?,
                    "unit": d.unit.as_str(),
                    "amount": self.codegen_boxed(d.amount)?,
                };
                if let Some(tz) = d.timezone {
                    body.insert("timezone", self.codegen_boxed(tz)?);
                }
                bson!({ "$dateAdd": body })
            }
            Expression::DatePart(d) => {
                let name = Self::date_part_name(d.part);
                let date = self.codegen_boxed(d.date)?;
                match d.timezone {
                    None => bson!({ name: date }),
                    Some(tz) => bson!({ name: { "date": date, "timezone": self.codegen_boxed(tz)? } }),
                }
            }
            Expression::RegexMatch(r) => bson!({ "$regexMatch": {
                "input": self.codegen_boxed(r.input)?,
                "regex": Bson::RegularExpression(bson::Regex {
                    pattern: r.regex,
                    options: r.options,
                }),
            }}),
            Expression::GetField(g) => bson!({ "$getField": {
                "field": g.field,
                "input": self.codegen_boxed(g.input)?,
            }}),
            Expression::Trim(t) => {
                let name = match t.kind {
                    TrimKind::Both => "$trim",
                    TrimKind::Start => "$ltrim",
                    TrimKind::End => "$rtrim",
                };
                let mut body = doc! { "input": self.codegen_boxed(t.input)? };
                if let Some(chars) = t.chars {
                    body.insert("chars", self.codegen_boxed(chars)?);
                }
                bson!({ name: body })
            }
            Expression::ReplaceAll(r) => bson!({ "$replaceAll": {
                "input": self.codegen_boxed(r.input)?,
                "find": self.codegen_boxed(r.find)?,
                "replacement": self.codegen_boxed(r.replacement)?,
            }}),
            Expression::SortArray(s) => bson!({ "$sortArray": {
                "input": self.codegen_boxed(s.input)?,
                "sortBy": s.sort_by,
            }}),
        })
    }

    fn codegen_convert(&self, c: ast::Convert) -> Result<Bson> {
        let input = self.codegen_boxed(c.input)?;
        if c.on_error.is_none() && c.on_null.is_none() {
            if let Some(name) = Self::convert_shorthand(c.to) {
                return Ok(bson!({ name: input }));
            }
        }
        let mut body = doc! { "input": input, "to": c.to.as_str() };
        if let Some(on_error) = c.on_error {
            body.insert("onError", self.codegen_boxed(on_error)?);
        }
        if let Some(on_null) = c.on_null {
            body.insert("onNull", self.codegen_boxed(on_null)?);
        }
        Ok(bson!({ "$convert": body }))
    }
}
