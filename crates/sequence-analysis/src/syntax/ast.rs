//! Syntax tree produced by the module parser.

/// A parsed module: import bindings plus the top-level expressions found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub imports: Vec<ImportBinding>,
    pub body: Vec<Expr>,
}

/// One local name introduced by an import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    /// The exported name, `*` for namespace imports, `default` for default imports.
    pub imported: String,
    /// The local name the binding is available under.
    pub local: String,
    /// Module specifier.
    pub source: String,
}

impl ImportBinding {
    pub fn is_namespace(&self) -> bool {
        self.imported == "*"
    }
}

/// Expressions the analyzer can reason about. Everything else is `Opaque`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Ident(String),
    Member {
        object: Box<Expr>,
        property: String,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Object(Vec<Property>),
    Array(Vec<Expr>),
    Element(Element),
    /// Unmodelled code; holds nested expressions so elements inside stay reachable.
    Opaque(Vec<Expr>),
}

/// A `key: value` entry of an object literal. Spreads and methods are opaque values.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: Option<String>,
    pub value: Expr,
}

/// An element node (`<Name attr={..}>children</Name>`).
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: ElementName,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Expr>,
    /// 1-based line of the opening `<`.
    pub line: u32,
}

/// Tag name of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementName {
    Fragment,
    Ident(String),
    /// `A.B.C`
    Member(Vec<String>),
    /// `ns:name`
    Namespaced { namespace: String, name: String },
}

impl ElementName {
    /// Source spelling of the tag name.
    pub fn display(&self) -> String {
        match self {
            ElementName::Fragment => String::new(),
            ElementName::Ident(name) => name.clone(),
            ElementName::Member(parts) => parts.join("."),
            ElementName::Namespaced { namespace, name } => format!("{namespace}:{name}"),
        }
    }
}

/// An element attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Named {
        name: String,
        /// `None` for value-less boolean attributes.
        value: Option<AttrValue>,
        line: u32,
    },
    Spread(Expr),
}

/// The value side of `name=value`.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    Expr(Expr),
}

impl Element {
    /// Look up a named attribute. The last occurrence wins, as in the runtime.
    pub fn attribute(&self, wanted: &str) -> Option<&Attribute> {
        self.attributes.iter().rev().find(|attr| match attr {
            Attribute::Named { name, .. } => name == wanted,
            Attribute::Spread(_) => false,
        })
    }
}

impl Expr {
    /// Visit every direct child expression.
    pub fn for_each_child<'a>(&'a self, mut f: impl FnMut(&'a Expr)) {
        match self {
            Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Ident(_) => {}
            Expr::Member { object, .. } => f(object),
            Expr::Call { callee, args } => {
                f(callee);
                args.iter().for_each(f);
            }
            Expr::Object(props) => props.iter().for_each(|p| f(&p.value)),
            Expr::Array(items) | Expr::Opaque(items) => items.iter().for_each(f),
            Expr::Element(element) => {
                for attr in &element.attributes {
                    match attr {
                        Attribute::Named {
                            value: Some(AttrValue::Expr(expr)),
                            ..
                        } => f(expr),
                        Attribute::Spread(expr) => f(expr),
                        _ => {}
                    }
                }
                element.children.iter().for_each(f);
            }
        }
    }

    /// Dotted path of an identifier or member chain (`a.b.c`), if that is all it is.
    pub fn path(&self) -> Option<String> {
        match self {
            Expr::Ident(name) => Some(name.clone()),
            Expr::Member { object, property } => Some(format!("{}.{property}", object.path()?)),
            _ => None,
        }
    }

    /// Look up `key` on an object literal.
    pub fn object_field(&self, key: &str) -> Option<&Expr> {
        match self {
            Expr::Object(props) => props
                .iter()
                .rev()
                .find(|p| p.key.as_deref() == Some(key))
                .map(|p| &p.value),
            _ => None,
        }
    }
}
