use crate::{ast, serialization::SerializerRef};
use std::{cell::Cell, rc::Rc};

/// A lambda parameter bound during translation.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    /// How aggregation expressions refer to the value.
    pub ast: ast::Expression,
    /// The field path of the value within the document being matched, when
    /// it has one. The empty path is the document (or array element) itself.
    pub field_path: Option<String>,
    pub serializer: SerializerRef,
    /// Bound to the element flowing through the pipeline.
    pub is_current: bool,
}

impl Symbol {
    /// The pipeline element, stored at `path` of each document (the document
    /// itself when `path` is empty).
    pub fn current(name: &str, path: &str, serializer: SerializerRef) -> Self {
        let ast = if path.is_empty() {
            ast::Expression::root()
        } else {
            ast::Expression::field(path)
        };
        Symbol {
            name: name.to_string(),
            ast,
            field_path: Some(path.to_string()),
            serializer,
            is_current: true,
        }
    }

    /// A value held in an aggregation variable such as the `as` of `$map`.
    pub fn variable(name: &str, variable: &str, serializer: SerializerRef) -> Self {
        Symbol {
            name: name.to_string(),
            ast: ast::Expression::var(variable, ""),
            field_path: None,
            serializer,
            is_current: false,
        }
    }

    /// The implied element of an `$elemMatch`. Predicates that cannot be
    /// written as a query fall back to `$expr` over `variable`.
    pub fn element(name: &str, variable: &str, serializer: SerializerRef) -> Self {
        Symbol {
            field_path: Some(String::new()),
            ..Symbol::variable(name, variable, serializer)
        }
    }
}

/// The symbols in scope, extended by copy when a lambda is entered.
#[derive(Debug, Clone, Default)]
pub struct TranslationContext {
    symbols: Vec<Symbol>,
    /// Inside an `$elemMatch` only the element has a usable field path.
    in_elem_match: bool,
    names: Rc<NameGenerator>,
}

impl TranslationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbol(&self, symbol: Symbol) -> Self {
        let mut context = self.clone();
        context.symbols.push(symbol);
        context
    }

    /// A scope for the predicate of an `$elemMatch` over elements bound to
    /// `element`. Outer symbols stay visible to aggregation expressions but
    /// lose their field paths.
    pub fn elem_match_scope(&self, element: Symbol) -> Self {
        let mut context = self.clone();
        for symbol in context.symbols.iter_mut() {
            symbol.field_path = None;
        }
        context.symbols.push(element);
        context.in_elem_match = true;
        context
    }

    pub fn in_elem_match(&self) -> bool {
        self.in_elem_match
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().rev().find(|s| s.name == name)
    }

    pub fn names(&self) -> &NameGenerator {
        &self.names
    }
}

/// Allocates translator-private names for one translation.
#[derive(Debug, Default)]
pub struct NameGenerator {
    variables: Cell<u32>,
}

impl NameGenerator {
    /// A name for an aggregation variable. Lambda parameter names are kept
    /// when they are valid variable names so the pipeline reads like the
    /// query.
    pub fn variable_for(&self, parameter: &str) -> String {
        let mut chars = parameter.chars();
        let valid = matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !matches!(parameter, "this" | "value");
        if valid {
            return parameter.to_string();
        }
        let n = self.variables.get();
        self.variables.set(n + 1);
        format!("v__{n}")
    }
}
