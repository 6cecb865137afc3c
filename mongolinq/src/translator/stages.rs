use crate::{
    ast::{
        self, AccumulatorField, AccumulatorFunction, Group, Limit, Lookup, Project, ProjectItem,
        ReplaceRoot, Skip, Sort, SortSpecification, Stage, UnionWith, Unwind,
    },
    client_side::{ClientSideProjection, ClientSideProjectionSerializer},
    expression::{
        transparent_identifiers::rewrite_transparent_identifiers, Expression, Lambda, Method,
        MethodCall, Type, Value,
    },
    serialization::{
        shared, ArraySerializer, GroupingSerializer, SerializerRef,
        WrappedValueSerializer, GROUPING_ELEMENTS_ELEMENT, GROUPING_KEY_ELEMENT,
        WRAPPED_VALUE_FIELD,
    },
    translator::{
        is_identity, lambda_argument, not_supported, unsupported, Error, QueryTranslator, Result,
        ResultOperator, Symbol, TranslatedExpression, TranslatedQuery,
    },
    util::{join_path, unique_linked_hash_map::UniqueLinkedHashMap},
};
use tracing::{event, Level};

const OUTER_FIELD: &str = "_outer";
const INNER_FIELD: &str = "_inner";
const SORTED_DOCUMENT_FIELD: &str = "_document";

/// The pipeline being planned and where its current element lives.
#[derive(Debug, Clone)]
pub(crate) struct PipelineState {
    pub collection: String,
    pub stages: Vec<Stage>,
    /// Decodes the current element.
    pub element: SerializerRef,
    /// Where each document holds the element; empty when the element is the
    /// document itself.
    pub path: String,
    pub client_side_projection: Option<ClientSideProjection>,
}

impl PipelineState {
    fn new(collection: &str, element: SerializerRef) -> Self {
        Self {
            collection: collection.to_string(),
            stages: vec![],
            element,
            path: String::new(),
            client_side_projection: None,
        }
    }

    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    /// A symbol for a lambda parameter bound to the current element.
    pub fn element_symbol(&self, name: &str) -> Symbol {
        Symbol::current(name, &self.path, self.element.clone())
    }

    pub fn element_ast(&self) -> ast::Expression {
        if self.path.is_empty() {
            ast::Expression::root()
        } else {
            ast::Expression::field(&self.path)
        }
    }

    /// Decodes each document the pipeline returns.
    pub fn output_serializer(&self) -> SerializerRef {
        if let Some(projection) = &self.client_side_projection {
            return shared(ClientSideProjectionSerializer::new(projection.clone()));
        }
        match self.path.as_str() {
            WRAPPED_VALUE_FIELD => shared(WrappedValueSerializer::new(self.element.clone())),
            _ => self.element.clone(),
        }
    }

    pub fn into_query(self, result_operator: Option<ResultOperator>) -> TranslatedQuery {
        TranslatedQuery {
            output_serializer: self.output_serializer(),
            collection: self.collection,
            pipeline: ast::Pipeline::new(self.stages),
            result_operator,
            client_side_projection: self.client_side_projection,
        }
    }
}

/// Names a sort key either by field path or by the index of a computed key.
enum SortKey {
    Field(String),
    Computed(usize),
}

/// True when a two-parameter selector returns its second parameter.
fn returns_second(lambda: &Lambda) -> bool {
    matches!(
        (&*lambda.body, lambda.parameters.as_slice()),
        (Expression::Parameter(p), [_, second]) if p.name == second.name
    )
}

impl QueryTranslator {
    /// Lowers a whole query to a pipeline over its source collection.
    pub fn translate_query(&self, expr: &Expression) -> Result<TranslatedQuery> {
        let rewritten;
        let expr = if self.options.rewrite_transparent_identifiers {
            rewritten = rewrite_transparent_identifiers(expr.clone());
            &rewritten
        } else {
            expr
        };
        match expr {
            Expression::Call(c) if c.method.is_terminal() => {
                self.translate_result_operator(expr, c)
            }
            _ => Ok(self.translate_pipeline(expr)?.into_query(None)),
        }
    }

    /// Plans the stages of a sequence-valued query expression.
    pub(crate) fn translate_pipeline(&self, expr: &Expression) -> Result<PipelineState> {
        let c = match expr {
            Expression::Source(source) => {
                return Ok(PipelineState::new(
                    &source.collection,
                    self.serializer_for(&source.document_type)?,
                ))
            }
            Expression::Call(c) => c,
            _ => return Err(not_supported(expr, "it is not a query operator")),
        };
        if matches!(
            c.method,
            Method::OrderBy | Method::OrderByDescending | Method::ThenBy | Method::ThenByDescending
        ) {
            return self.translate_order_by(expr, c);
        }
        let (source, rest) = c.arguments.split_first().ok_or_else(|| unsupported(expr))?;
        let mut state = self.translate_pipeline(source)?;
        if state.client_side_projection.is_some() {
            return Err(not_supported(
                expr,
                "it follows a projection evaluated on the client",
            ));
        }
        event!(Level::TRACE, operator = ?c.method, path = %state.path, "planning stage");
        match (c.method, rest.len()) {
            (Method::AsQueryable | Method::AsEnumerable | Method::ToList | Method::ToArray, 0) => {}
            (Method::Where, 1) => self.apply_where(&mut state, lambda_argument(c, 1, expr)?)?,
            (Method::Select, 1) => self.apply_select(expr, &mut state, lambda_argument(c, 1, expr)?)?,
            (Method::SelectMany, 1) => {
                self.apply_select_many(expr, &mut state, lambda_argument(c, 1, expr)?, None)?
            }
            (Method::SelectMany, 2) => self.apply_select_many(
                expr,
                &mut state,
                lambda_argument(c, 1, expr)?,
                Some(lambda_argument(c, 2, expr)?),
            )?,
            (Method::GroupBy, 1) => {
                self.apply_group_by(expr, &mut state, lambda_argument(c, 1, expr)?, None)?
            }
            (Method::GroupBy, 2) => self.apply_group_by(
                expr,
                &mut state,
                lambda_argument(c, 1, expr)?,
                Some(lambda_argument(c, 2, expr)?),
            )?,
            (Method::Join | Method::GroupJoin, 4) => self.apply_join(expr, c, &mut state)?,
            (Method::Skip, 1) => {
                let skip = self.constant_count(expr, &rest[0])?;
                state.push(Stage::Skip(Skip { skip }));
            }
            (Method::Take, 1) => {
                let limit = self.constant_count(expr, &rest[0])?;
                state.push(Stage::Limit(Limit { limit }));
            }
            (Method::Distinct, 0) => self.apply_distinct(&mut state),
            (Method::OfType, 1) => {
                let Value::Type(target) = self.evaluate_closed(&rest[0])? else {
                    return Err(not_supported(expr, "the target type must be a constant"));
                };
                let filter = self.discriminator_filter(
                    expr,
                    &state.path,
                    &state.element.value_type(),
                    &target,
                    false,
                )?;
                state.push(Stage::Match(ast::Match { filter }));
                state.element = self.serializer_for(&target)?;
            }
            (Method::Concat | Method::Union, 1) => {
                let other = self.translate_pipeline(&rest[0])?;
                if other.client_side_projection.is_some() || other.path != state.path {
                    return Err(not_supported(
                        expr,
                        "both sequences must produce documents of the same shape",
                    ));
                }
                state.push(Stage::UnionWith(UnionWith {
                    collection: other.collection,
                    pipeline: ast::Pipeline::new(other.stages),
                }));
                if c.method == Method::Union {
                    self.apply_distinct(&mut state);
                }
            }
            _ => return Err(unsupported(expr)),
        }
        Ok(state)
    }

    /// A `$match` on the predicate.
    pub(crate) fn apply_where(&self, state: &mut PipelineState, predicate: &Lambda) -> Result<()> {
        let [parameter] = predicate.parameters.as_slice() else {
            return Err(not_supported(
                &Expression::Lambda(predicate.clone()),
                "a predicate takes one parameter",
            ));
        };
        let filter = self
            .with_symbol(state.element_symbol(&parameter.name))
            .translate_filter(&predicate.body)?;
        state.push(Stage::Match(ast::Match { filter }));
        Ok(())
    }

    /// Translates a lambda with every parameter bound to the current element.
    fn translate_over_element(
        &self,
        state: &PipelineState,
        lambda: &Lambda,
    ) -> Result<TranslatedExpression> {
        let symbols = lambda
            .parameters
            .iter()
            .map(|p| state.element_symbol(&p.name))
            .collect();
        self.bind(lambda, symbols).translate_expression(&lambda.body)
    }

    /// Makes `value` the new element. A constructed document becomes the
    /// projected document; any other value is wrapped in `_v`.
    fn project_value(&self, state: &mut PipelineState, value: TranslatedExpression) -> Result<()> {
        let mut specifications = UniqueLinkedHashMap::new();
        match value.ast {
            ast::Expression::Document(fields) if !fields.is_empty() => {
                for (name, field) in fields {
                    specifications.insert(name, ProjectItem::Assignment(field))?;
                }
                state.path = String::new();
            }
            other => {
                specifications.insert(
                    WRAPPED_VALUE_FIELD.to_string(),
                    ProjectItem::Assignment(other),
                )?;
                state.path = WRAPPED_VALUE_FIELD.to_string();
            }
        }
        state.push(Stage::Project(Project { specifications }));
        state.element = value.serializer;
        Ok(())
    }

    fn apply_select(
        &self,
        expr: &Expression,
        state: &mut PipelineState,
        selector: &Lambda,
    ) -> Result<()> {
        if selector.parameters.len() != 1 {
            return Err(not_supported(expr, "the selector must take one parameter"));
        }
        if is_identity(selector) {
            return Ok(());
        }
        match self.translate_over_element(state, selector) {
            Ok(value) => self.project_value(state, value),
            Err(e @ (Error::ExpressionNotSupported { .. } | Error::RepresentationConflict { .. }))
                if self.options.enable_client_side_projections =>
            {
                event!(Level::DEBUG, error = %e, "projecting on the client");
                state.client_side_projection = Some(ClientSideProjection::new(
                    state.output_serializer(),
                    selector.clone(),
                ));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// `$project` of the collection into `_v` and `$unwind` of it. A result
    /// selector is applied to each item with `$map` before unwinding.
    fn apply_select_many(
        &self,
        expr: &Expression,
        state: &mut PipelineState,
        collection: &Lambda,
        result: Option<&Lambda>,
    ) -> Result<()> {
        let items = self.translate_over_element(state, collection)?;
        let (array, item) = self.sequence_of(expr, items)?;
        let (value, element) = match result {
            Some(result) if !returns_second(result) => {
                let [source, inner] = result.parameters.as_slice() else {
                    return Err(not_supported(expr, "the result selector takes two parameters"));
                };
                let variable = self.context.names().variable_for(&inner.name);
                let body = self
                    .bind(
                        result,
                        vec![
                            state.element_symbol(&source.name),
                            Symbol::variable(&inner.name, &variable, item),
                        ],
                    )
                    .translate_expression(&result.body)?;
                (
                    ast::Expression::map(array, &variable, body.ast),
                    body.serializer,
                )
            }
            _ => (array, item),
        };
        let mut specifications = UniqueLinkedHashMap::new();
        specifications.insert(
            WRAPPED_VALUE_FIELD.to_string(),
            ProjectItem::Assignment(value),
        )?;
        state.push(Stage::Project(Project { specifications }));
        state.push(Stage::Unwind(Unwind {
            path: WRAPPED_VALUE_FIELD.to_string(),
            include_array_index: None,
            preserve_null_and_empty_arrays: false,
        }));
        state.element = element;
        state.path = WRAPPED_VALUE_FIELD.to_string();
        Ok(())
    }

    /// `$group` pushing each element to `_elements`. A two-parameter selector
    /// is a result selector over the key and the group; a one-parameter
    /// selector chooses what is pushed.
    fn apply_group_by(
        &self,
        expr: &Expression,
        state: &mut PipelineState,
        key: &Lambda,
        selector: Option<&Lambda>,
    ) -> Result<()> {
        let key = self.translate_over_element(state, key)?;
        let (pushed, element) = match selector {
            Some(s) if s.parameters.len() == 1 => {
                let value = self.translate_over_element(state, s)?;
                (value.ast, value.serializer)
            }
            _ => (state.element_ast(), state.element.clone()),
        };
        state.push(Stage::Group(Group {
            id: key.ast,
            fields: vec![AccumulatorField {
                name: GROUPING_ELEMENTS_ELEMENT.to_string(),
                function: AccumulatorFunction::Push,
                arg: pushed,
            }],
        }));
        state.element = shared(GroupingSerializer::new(key.serializer.clone(), element));
        state.path = String::new();
        match selector {
            Some(result) if result.parameters.len() == 2 => {
                let [key_parameter, group] = result.parameters.as_slice() else {
                    return Err(unsupported(expr));
                };
                let symbols = vec![
                    Symbol::current(&key_parameter.name, GROUPING_KEY_ELEMENT, key.serializer),
                    state.element_symbol(&group.name),
                ];
                let value = self
                    .bind(result, symbols)
                    .translate_expression(&result.body)?;
                self.project_value(state, value)
            }
            Some(s) if s.parameters.len() != 1 => Err(unsupported(expr)),
            _ => Ok(()),
        }
    }

    /// `$lookup` of the inner collection by key equality, with the outer
    /// element moved to `_outer` and the matches to `_inner`. Join unwinds
    /// the matches; GroupJoin keeps them as an array.
    fn apply_join(&self, expr: &Expression, c: &MethodCall, state: &mut PipelineState) -> Result<()> {
        let inner = self.translate_pipeline(&c.arguments[1])?;
        if !inner.stages.is_empty() || !inner.path.is_empty() {
            return Err(not_supported(
                expr,
                "the inner sequence of a join must be a collection",
            ));
        }
        let outer_key = lambda_argument(c, 2, expr)?;
        let inner_key = lambda_argument(c, 3, expr)?;
        let result = lambda_argument(c, 4, expr)?;
        let (
            [outer_parameter],
            [inner_parameter],
            [result_outer, result_inner],
        ) = (
            outer_key.parameters.as_slice(),
            inner_key.parameters.as_slice(),
            result.parameters.as_slice(),
        )
        else {
            return Err(not_supported(expr, "the key and result selectors have the wrong arity"));
        };
        let local_field = self
            .with_symbol(Symbol::current(
                &outer_parameter.name,
                OUTER_FIELD,
                state.element.clone(),
            ))
            .try_translate_field(&outer_key.body)?
            .ok_or_else(|| not_supported(expr, "the outer key must be a field"))?;
        let foreign_field = self
            .with_symbol(Symbol::current(
                &inner_parameter.name,
                "",
                inner.element.clone(),
            ))
            .try_translate_field(&inner_key.body)?
            .filter(|f| !f.path.is_empty())
            .ok_or_else(|| not_supported(expr, "the inner key must be a field"))?;
        let mut specifications = UniqueLinkedHashMap::new();
        specifications.insert(
            OUTER_FIELD.to_string(),
            ProjectItem::Assignment(state.element_ast()),
        )?;
        specifications.insert("_id".to_string(), ProjectItem::Exclusion)?;
        state.push(Stage::Project(Project { specifications }));
        state.push(Stage::Lookup(Lookup {
            from: inner.collection,
            local_field: local_field.path,
            foreign_field: foreign_field.path,
            as_var: INNER_FIELD.to_string(),
        }));
        let inner_element = match c.method {
            Method::Join => {
                state.push(Stage::Unwind(Unwind {
                    path: INNER_FIELD.to_string(),
                    include_array_index: None,
                    preserve_null_and_empty_arrays: false,
                }));
                inner.element
            }
            _ => shared(ArraySerializer::new(
                Type::enumerable(inner.element.value_type()),
                inner.element,
            )),
        };
        let symbols = vec![
            Symbol::current(&result_outer.name, OUTER_FIELD, state.element.clone()),
            Symbol::current(&result_inner.name, INNER_FIELD, inner_element),
        ];
        let value = self
            .bind(result, symbols)
            .translate_expression(&result.body)?;
        self.project_value(state, value)
    }

    /// `$group` on the whole document, then the group key back as the root.
    fn apply_distinct(&self, state: &mut PipelineState) {
        state.push(Stage::Group(Group {
            id: ast::Expression::root(),
            fields: vec![],
        }));
        state.push(Stage::ReplaceRoot(ReplaceRoot {
            new_root: ast::Expression::field(GROUPING_KEY_ELEMENT),
        }));
    }

    /// An `OrderBy` and the `ThenBy` calls on top of it become one `$sort`.
    /// Keys that are not stored fields are computed next to the document
    /// first.
    fn translate_order_by(&self, expr: &Expression, c: &MethodCall) -> Result<PipelineState> {
        let mut keys = vec![];
        let mut current = c;
        let source = loop {
            let [source, key] = current.arguments.as_slice() else {
                return Err(unsupported(expr));
            };
            let key = key
                .as_lambda()
                .ok_or_else(|| not_supported(expr, "the sort key must be a lambda"))?;
            let descending = matches!(
                current.method,
                Method::OrderByDescending | Method::ThenByDescending
            );
            keys.push((key, descending));
            match (current.method, source) {
                (Method::OrderBy | Method::OrderByDescending, _) => break source,
                (_, Expression::Call(inner))
                    if matches!(
                        inner.method,
                        Method::OrderBy
                            | Method::OrderByDescending
                            | Method::ThenBy
                            | Method::ThenByDescending
                    ) =>
                {
                    current = inner
                }
                _ => return Err(not_supported(expr, "ThenBy must follow OrderBy")),
            }
        };
        keys.reverse();
        let mut state = self.translate_pipeline(source)?;
        if state.client_side_projection.is_some() {
            return Err(not_supported(
                expr,
                "it follows a projection evaluated on the client",
            ));
        }
        event!(Level::TRACE, keys = keys.len(), "planning sort");
        let mut sort_keys: Vec<(SortKey, bool)> = vec![];
        let mut computed = vec![];
        for (key, descending) in keys {
            let [parameter] = key.parameters.as_slice() else {
                return Err(not_supported(expr, "a sort key takes one parameter"));
            };
            let translator = self.with_symbol(state.element_symbol(&parameter.name));
            match translator
                .try_translate_field(&key.body)?
                .filter(|f| !f.path.is_empty())
            {
                Some(field) => {
                    let seen = sort_keys
                        .iter()
                        .any(|(k, _)| matches!(k, SortKey::Field(p) if *p == field.path));
                    if !seen {
                        sort_keys.push((SortKey::Field(field.path), descending));
                    }
                }
                None => {
                    computed.push(translator.translate_expression(&key.body)?.ast);
                    sort_keys.push((SortKey::Computed(computed.len()), descending));
                }
            }
        }
        let prefix = if computed.is_empty() {
            ""
        } else {
            SORTED_DOCUMENT_FIELD
        };
        let specs = sort_keys
            .into_iter()
            .map(|(key, descending)| {
                let path = match key {
                    SortKey::Field(path) => join_path(prefix, &path),
                    SortKey::Computed(n) => format!("_key{n}"),
                };
                match descending {
                    true => SortSpecification::Desc(path),
                    false => SortSpecification::Asc(path),
                }
            })
            .collect();
        if computed.is_empty() {
            state.push(Stage::Sort(Sort { specs }));
            return Ok(state);
        }
        let mut specifications = UniqueLinkedHashMap::new();
        specifications.insert(
            SORTED_DOCUMENT_FIELD.to_string(),
            ProjectItem::Assignment(ast::Expression::root()),
        )?;
        for (n, value) in computed.into_iter().enumerate() {
            specifications.insert(format!("_key{}", n + 1), ProjectItem::Assignment(value))?;
        }
        state.push(Stage::Project(Project { specifications }));
        state.push(Stage::Sort(Sort { specs }));
        state.push(Stage::ReplaceRoot(ReplaceRoot {
            new_root: ast::Expression::field(SORTED_DOCUMENT_FIELD),
        }));
        Ok(state)
    }
}
