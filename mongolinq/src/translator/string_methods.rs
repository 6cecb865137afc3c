use crate::{
    ast::{self, Op, RegexMatch, ReplaceAll, Trim, TrimKind},
    expression::{Expression, Method, MethodCall, StringComparison, Type, Value},
    translator::{
        conversions::convert_to, filters::call_operands, not_supported, unsupported,
        QueryTranslator, Result, TranslatedExpression,
    },
};

fn regex_match(input: ast::Expression, regex: String, options: &str) -> ast::Expression {
    ast::Expression::RegexMatch(RegexMatch {
        input: Box::new(input),
        regex,
        options: options.to_string(),
    })
}

impl QueryTranslator {
    /// A string operand. Characters and parameter-free expressions become
    /// string constants rather than their stored encodings.
    fn string_operand(&self, expr: &Expression) -> Result<ast::Expression> {
        if !expr.is_closed() {
            let translated = self.translate_expression(expr)?;
            return Ok(match expr.ty().non_nullable() {
                Type::String => translated.ast,
                _ => convert_to(translated.ast, ast::BsonType::String),
            });
        }
        Ok(match self.evaluate_closed(expr)? {
            Value::String(s) => ast::Expression::constant(s),
            Value::Char(c) => ast::Expression::constant(c.to_string()),
            Value::Null => ast::Expression::null(),
            Value::Array(chars) => ast::Expression::constant(
                chars
                    .iter()
                    .filter_map(|c| match c {
                        Value::Char(c) => Some(*c),
                        _ => None,
                    })
                    .collect::<String>(),
            ),
            other => ast::Expression::constant(other.to_string()),
        })
    }

    fn literal_string(&self, expr: &Expression) -> Result<Option<String>> {
        if !expr.is_closed() {
            return Ok(None);
        }
        Ok(match self.evaluate_closed(expr)? {
            Value::String(s) => Some(s),
            Value::Char(c) => Some(c.to_string()),
            _ => None,
        })
    }

    fn ignores_case(&self, argument: Option<&Expression>) -> Result<bool> {
        match argument {
            Some(a) if a.is_closed() => Ok(StringComparison::from_value(&self.evaluate_closed(a)?)
                .map_or(false, |c| c.ignore_case())),
            Some(a) => Err(not_supported(a, "the comparison type must be a constant")),
            None => Ok(false),
        }
    }

    pub(crate) fn translate_string_method(
        &self,
        expr: &Expression,
        c: &MethodCall,
    ) -> Result<TranslatedExpression> {
        let string = self.serializer_for(&Type::String)?;
        let boolean = self.serializer_for(&Type::Boolean)?;
        let int = self.serializer_for(&Type::Int32)?;
        let (source, rest) = call_operands(c).ok_or_else(|| unsupported(expr))?;
        let ast = match c.method {
            Method::ToLower | Method::ToLowerInvariant => {
                return Ok(TranslatedExpression::new(
                    ast::Expression::unary(Op::ToLower, self.string_operand(source)?),
                    string,
                ))
            }
            Method::ToUpper | Method::ToUpperInvariant => {
                return Ok(TranslatedExpression::new(
                    ast::Expression::unary(Op::ToUpper, self.string_operand(source)?),
                    string,
                ))
            }
            Method::StringContains | Method::StartsWith | Method::EndsWith => {
                let value = rest.first().ok_or_else(|| unsupported(expr))?;
                self.translate_substring_test(c.method, source, value, rest.get(1))?
            }
            Method::IsNullOrEmpty => ast::Expression::op(
                Op::In,
                vec![
                    self.string_operand(source)?,
                    ast::Expression::constant(bson::bson!([null, ""])),
                ],
            ),
            Method::IsNullOrWhiteSpace => {
                let s = self.string_operand(source)?;
                ast::Expression::op(
                    Op::Or,
                    vec![
                        ast::Expression::op(Op::Eq, vec![s.clone(), ast::Expression::null()]),
                        ast::Expression::op(
                            Op::Eq,
                            vec![
                                ast::Expression::Trim(Trim {
                                    kind: TrimKind::Both,
                                    input: Box::new(s),
                                    chars: None,
                                }),
                                ast::Expression::constant(""),
                            ],
                        ),
                    ],
                )
            }
            Method::Substring => {
                let s = self.string_operand(source)?;
                let start = self
                    .translate_expression(rest.first().ok_or_else(|| unsupported(expr))?)?
                    .ast;
                let length = match rest.get(1) {
                    Some(length) => self.translate_expression(length)?.ast,
                    None => ast::Expression::op(
                        Op::Subtract,
                        vec![ast::Expression::unary(Op::StrLenCP, s.clone()), start.clone()],
                    ),
                };
                return Ok(TranslatedExpression::new(
                    ast::Expression::op(Op::SubstrCP, vec![s, start, length]),
                    string,
                ));
            }
            Method::Trim | Method::TrimStart | Method::TrimEnd => {
                let kind = match c.method {
                    Method::TrimStart => TrimKind::Start,
                    Method::TrimEnd => TrimKind::End,
                    _ => TrimKind::Both,
                };
                let chars = match rest.first() {
                    Some(chars) => Some(Box::new(self.string_operand(chars)?)),
                    None => None,
                };
                return Ok(TranslatedExpression::new(
                    ast::Expression::Trim(Trim {
                        kind,
                        input: Box::new(self.string_operand(source)?),
                        chars,
                    }),
                    string,
                ));
            }
            Method::IndexOf => {
                let mut args = vec![
                    self.string_operand(source)?,
                    self.string_operand(rest.first().ok_or_else(|| unsupported(expr))?)?,
                ];
                if let Some(start) = rest.get(1) {
                    args.push(self.translate_expression(start)?.ast);
                }
                return Ok(TranslatedExpression::new(
                    ast::Expression::op(Op::IndexOfCP, args),
                    int,
                ));
            }
            Method::Split => {
                let separator = rest.first().ok_or_else(|| unsupported(expr))?;
                return Ok(TranslatedExpression::new(
                    ast::Expression::op(
                        Op::Split,
                        vec![self.string_operand(source)?, self.string_operand(separator)?],
                    ),
                    self.serializer_for(&Type::array(Type::String))?,
                ));
            }
            Method::Replace => {
                let (find, replacement) = match rest {
                    [find, replacement] => (find, replacement),
                    _ => return Err(unsupported(expr)),
                };
                return Ok(TranslatedExpression::new(
                    ast::Expression::ReplaceAll(ReplaceAll {
                        input: Box::new(self.string_operand(source)?),
                        find: Box::new(self.string_operand(find)?),
                        replacement: Box::new(self.string_operand(replacement)?),
                    }),
                    string,
                ));
            }
            Method::StringConcat => {
                let args = c
                    .arguments
                    .iter()
                    .map(|a| self.string_operand(a))
                    .collect::<Result<Vec<_>>>()?;
                return Ok(TranslatedExpression::new(
                    super::expressions::flatten(Op::Concat, args),
                    string,
                ));
            }
            Method::StringEquals => {
                let other = rest.first().ok_or_else(|| unsupported(expr))?;
                let (l, r) = (self.string_operand(source)?, self.string_operand(other)?);
                if self.ignores_case(rest.get(1))? {
                    ast::Expression::op(
                        Op::Eq,
                        vec![
                            ast::Expression::op(Op::StrCaseCmp, vec![l, r]),
                            ast::Expression::constant(0),
                        ],
                    )
                } else {
                    ast::Expression::op(Op::Eq, vec![l, r])
                }
            }
            Method::RegexIsMatch => {
                let pattern = rest
                    .first()
                    .and_then(|p| self.literal_string(p).transpose())
                    .transpose()?
                    .ok_or_else(|| not_supported(expr, "the pattern must be a constant"))?;
                regex_match(self.string_operand(source)?, pattern, "")
            }
            Method::ToString => {
                return Ok(TranslatedExpression::new(
                    self.string_operand(source)?,
                    string,
                ))
            }
            _ => return Err(unsupported(expr)),
        };
        Ok(TranslatedExpression::new(ast, boolean))
    }

    /// Constant needles become anchored regular expressions; anything else is
    /// located with `$indexOfCP`.
    fn translate_substring_test(
        &self,
        method: Method,
        source: &Expression,
        value: &Expression,
        comparison: Option<&Expression>,
    ) -> Result<ast::Expression> {
        let ignore_case = self.ignores_case(comparison)?;
        let s = self.string_operand(source)?;
        if let Some(literal) = self.literal_string(value)? {
            let escaped = regex::escape(&literal);
            let pattern = match method {
                Method::StartsWith => format!("^{escaped}"),
                Method::EndsWith => format!("{escaped}$"),
                _ => escaped,
            };
            return Ok(regex_match(s, pattern, if ignore_case { "is" } else { "s" }));
        }
        let mut v = self.string_operand(value)?;
        let mut s = s;
        if ignore_case {
            s = ast::Expression::unary(Op::ToLower, s);
            v = ast::Expression::unary(Op::ToLower, v);
        }
        Ok(match method {
            Method::StartsWith => ast::Expression::op(
                Op::Eq,
                vec![
                    ast::Expression::op(Op::IndexOfCP, vec![s, v]),
                    ast::Expression::constant(0),
                ],
            ),
            Method::EndsWith => {
                let start = ast::Expression::op(
                    Op::Subtract,
                    vec![
                        ast::Expression::unary(Op::StrLenCP, s.clone()),
                        ast::Expression::unary(Op::StrLenCP, v.clone()),
                    ],
                );
                ast::Expression::let_in(
                    vec![("start", start)],
                    ast::Expression::op(
                        Op::And,
                        vec![
                            ast::Expression::op(
                                Op::Gte,
                                vec![ast::Expression::var("start", ""), ast::Expression::constant(0)],
                            ),
                            ast::Expression::op(
                                Op::Eq,
                                vec![
                                    ast::Expression::op(
                                        Op::IndexOfCP,
                                        vec![s, v, ast::Expression::var("start", "")],
                                    ),
                                    ast::Expression::var("start", ""),
                                ],
                            ),
                        ],
                    ),
                )
            }
            _ => ast::Expression::op(
                Op::Ne,
                vec![
                    ast::Expression::op(Op::IndexOfCP, vec![s, v]),
                    ast::Expression::constant(-1),
                ],
            ),
        })
    }
}
