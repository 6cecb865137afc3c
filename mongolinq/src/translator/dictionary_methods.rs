use crate::{
    ast::{self, GetField, Op},
    expression::{Expression, Method, MethodCall, Type, Value},
    options::Feature,
    serialization::{
        shared, ArraySerializer, DictionaryInfo, Representation, KEY_ELEMENT, VALUE_ELEMENT,
    },
    translator::{
        filters::call_operands, not_supported, unsupported, QueryTranslator, Result,
        TranslatedExpression,
    },
};

/// Names that can be written as a field path.
fn is_simple_field_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('$') && !name.contains('.')
}

impl QueryTranslator {
    fn dictionary_info_of(
        &self,
        expr: &Expression,
        dictionary: &TranslatedExpression,
    ) -> Result<DictionaryInfo> {
        dictionary
            .serializer
            .dictionary_info()
            .ok_or_else(|| not_supported(expr, "the source is not a dictionary"))
    }

    /// The stored pairs of a dictionary as an array, and how to read the key
    /// or value of a pair bound to `variable`.
    fn dictionary_entries(
        &self,
        info: &DictionaryInfo,
        dictionary: ast::Expression,
    ) -> (ast::Expression, fn(&str, bool) -> ast::Expression) {
        fn named(variable: &str, key: bool) -> ast::Expression {
            ast::Expression::var(variable, if key { KEY_ELEMENT } else { VALUE_ELEMENT })
        }
        fn positional(variable: &str, key: bool) -> ast::Expression {
            ast::Expression::op(
                Op::ArrayElemAt,
                vec![
                    ast::Expression::var(variable, ""),
                    ast::Expression::constant(if key { 0 } else { 1 }),
                ],
            )
        }
        match info.representation {
            Representation::Document => (
                ast::Expression::unary(Op::ObjectToArray, dictionary),
                named,
            ),
            Representation::ArrayOfArrays => (dictionary, positional),
            _ => (dictionary, named),
        }
    }

    pub(crate) fn translate_dictionary_member(
        &self,
        expr: &Expression,
        dictionary: TranslatedExpression,
        member: &str,
    ) -> Result<TranslatedExpression> {
        let info = self.dictionary_info_of(expr, &dictionary)?;
        let (entries, read) = self.dictionary_entries(&info, dictionary.ast);
        match member {
            "Count" => Ok(TranslatedExpression::new(
                ast::Expression::unary(Op::Size, entries),
                self.serializer_for(&Type::Int32)?,
            )),
            "Keys" | "Values" => {
                let key = member == "Keys";
                let variable = self.context.names().variable_for("kvp");
                let item = if key { info.key } else { info.value };
                Ok(TranslatedExpression::new(
                    ast::Expression::map(entries, &variable, read(&variable, key)),
                    shared(ArraySerializer::new(
                        Type::enumerable(item.value_type()),
                        item,
                    )),
                ))
            }
            _ => Err(not_supported(
                expr,
                format!("{member} is not a serialized member of a dictionary"),
            )),
        }
    }

    pub(crate) fn translate_dictionary_index(
        &self,
        expr: &Expression,
        dictionary: TranslatedExpression,
        index: &Expression,
    ) -> Result<TranslatedExpression> {
        let info = self.dictionary_info_of(expr, &dictionary)?;
        if info.representation == Representation::Document && index.is_closed() {
            let key = info.key.serialize(&self.evaluate_closed(index)?)?;
            let bson::Bson::String(key) = key else {
                return Err(not_supported(expr, "dictionary keys must serialize as strings"));
            };
            if is_simple_field_name(&key) {
                return Ok(TranslatedExpression::new(
                    dictionary.ast.sub_field(&key),
                    info.value,
                ));
            }
            self.require(Feature::GetField, expr)?;
            return Ok(TranslatedExpression::new(
                ast::Expression::GetField(GetField {
                    field: key,
                    input: Box::new(dictionary.ast),
                }),
                info.value,
            ));
        }
        let key = self.translate_with_serializer(index, &info.key)?.ast;
        let (entries, read) = self.dictionary_entries(&info, dictionary.ast);
        let variable = self.context.names().variable_for("kvp");
        let limit = self
            .options
            .supports(Feature::FilterLimit)
            .then(|| ast::Expression::constant(1));
        let matching = ast::Expression::filter(
            entries,
            &variable,
            ast::Expression::op(Op::Eq, vec![read(&variable, true), key]),
            limit,
        );
        let entry = ast::Expression::op(
            Op::ArrayElemAt,
            vec![matching, ast::Expression::constant(0)],
        );
        Ok(TranslatedExpression::new(
            ast::Expression::let_in(vec![(variable.as_str(), entry)], read(&variable, false)),
            info.value,
        ))
    }

    pub(crate) fn translate_dictionary_method(
        &self,
        expr: &Expression,
        c: &MethodCall,
    ) -> Result<TranslatedExpression> {
        let Some((source, [argument])) = call_operands(c) else {
            return Err(unsupported(expr));
        };
        let dictionary = self.translate_expression(source)?;
        let info = self.dictionary_info_of(expr, &dictionary)?;
        let boolean = self.serializer_for(&Type::Boolean)?;
        let key = c.method == Method::ContainsKey;
        if key && info.representation == Representation::Document && argument.is_closed() {
            if let Value::String(name) = self.evaluate_closed(argument)? {
                if is_simple_field_name(&name) {
                    return Ok(TranslatedExpression::new(
                        ast::Expression::op(
                            Op::Ne,
                            vec![
                                ast::Expression::unary(Op::Type, dictionary.ast.sub_field(&name)),
                                ast::Expression::constant("missing"),
                            ],
                        ),
                        boolean,
                    ));
                }
            }
        }
        let target = if key { &info.key } else { &info.value };
        let argument = self.translate_with_serializer(argument, target)?.ast;
        let (entries, read) = self.dictionary_entries(&info, dictionary.ast);
        let variable = self.context.names().variable_for("kvp");
        Ok(TranslatedExpression::new(
            ast::Expression::unary(
                Op::AnyElementTrue,
                ast::Expression::map(
                    entries,
                    &variable,
                    ast::Expression::op(Op::Eq, vec![read(&variable, key), argument]),
                ),
            ),
            boolean,
        ))
    }
}
