use std::fmt;
use std::sync::Arc;

use compact_str::CompactString;

use crate::value::Value;

/// Stable identity of a logical query source within one query model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceHandle(pub(crate) u32);

impl SourceHandle {
    /// Member access on this source.
    pub fn member(self, name: impl Into<CompactString>) -> Expr {
        Expr::Member {
            source: self,
            name: name.into(),
        }
    }

    /// The whole entity this source ranges over.
    pub fn entity(self) -> Expr {
        Expr::Source(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub const fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

/// String methods with a server translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    StartsWith,
    EndsWith,
    Contains,
    ToUpper,
    ToLower,
    Length,
    Trim,
}

impl Method {
    pub const fn arity(self) -> usize {
        match self {
            Method::StartsWith | Method::EndsWith | Method::Contains => 1,
            Method::ToUpper | Method::ToLower | Method::Length | Method::Trim => 0,
        }
    }
}

/// Opaque host function. Never translated to SQL.
#[derive(Clone)]
pub struct ClientFn {
    name: CompactString,
    f: Arc<dyn Fn(&[Value]) -> Value + Send + Sync>,
}

impl ClientFn {
    pub fn new(
        name: impl Into<CompactString>,
        f: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.f)(args)
    }
}

impl fmt::Debug for ClientFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClientFn").field(&self.name).finish()
    }
}

impl PartialEq for ClientFn {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.f, &other.f)
    }
}

/// Expression tree of the query model.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Source(SourceHandle),
    Member {
        source: SourceHandle,
        name: CompactString,
    },
    Constant(Value),
    Parameter(CompactString),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    In {
        operand: Box<Expr>,
        values: Vec<Value>,
        negated: bool,
    },
    Call {
        method: Method,
        target: Box<Expr>,
        args: Vec<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Client {
        function: ClientFn,
        args: Vec<Expr>,
    },
    Tuple(Vec<Expr>),
}

/// Constant expression.
pub fn constant(value: impl Into<Value>) -> Expr {
    Expr::Constant(value.into())
}

/// Named parameter resolved at execution time.
pub fn param(name: impl Into<CompactString>) -> Expr {
    Expr::Parameter(name.into())
}

/// `CASE WHEN test THEN then ELSE otherwise END`.
pub fn condition(test: Expr, then: impl Into<Expr>, otherwise: impl Into<Expr>) -> Expr {
    Expr::Conditional {
        test: Box::new(test),
        then: Box::new(then.into()),
        otherwise: Box::new(otherwise.into()),
    }
}

/// Host function over evaluated arguments.
pub fn client(function: ClientFn, args: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Client {
        function,
        args: args.into_iter().collect(),
    }
}

pub fn tuple(items: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Tuple(items.into_iter().collect())
}

macro_rules! impl_constant_from {
    ($($ty:ty),*) => { $(
        impl From<$ty> for Expr {
            #[inline]
            fn from(value: $ty) -> Self {
                Expr::Constant(Value::from(value))
            }
        }
    )* }
}

impl_constant_from!(Value, i32, i64, f64, bool, &str, String, Vec<u8>);

impl<T: Into<Value>> From<Option<T>> for Expr {
    fn from(value: Option<T>) -> Self {
        Expr::Constant(value.into())
    }
}

macro_rules! binary_builders {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            pub fn $name(self, other: impl Into<Expr>) -> Expr {
                self.binary(BinaryOp::$op, other.into())
            }
        )*
    };
}

macro_rules! method_builders {
    ($($name:ident => $method:ident),* $(,)?) => {
        $(
            pub fn $name(self) -> Expr {
                self.call(Method::$method, Vec::new())
            }
        )*
    };
}

impl Expr {
    pub fn binary(self, op: BinaryOp, other: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    binary_builders! {
        eq => Eq,
        ne => Ne,
        lt => Lt,
        le => Le,
        gt => Gt,
        ge => Ge,
        and => And,
        or => Or,
        add => Add,
        sub => Sub,
        mul => Mul,
        div => Div,
    }

    method_builders! {
        to_upper => ToUpper,
        to_lower => ToLower,
        length => Length,
        trim => Trim,
    }

    pub fn is_null(self) -> Expr {
        self.eq(Value::Null)
    }

    pub fn is_not_null(self) -> Expr {
        self.ne(Value::Null)
    }

    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    pub fn in_list(self, values: impl IntoIterator<Item = impl Into<Value>>) -> Expr {
        Expr::In {
            operand: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in_list(self, values: impl IntoIterator<Item = impl Into<Value>>) -> Expr {
        Expr::In {
            operand: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn call(self, method: Method, args: Vec<Expr>) -> Expr {
        Expr::Call {
            method,
            target: Box::new(self),
            args,
        }
    }

    pub fn starts_with(self, prefix: impl Into<Expr>) -> Expr {
        self.call(Method::StartsWith, vec![prefix.into()])
    }

    pub fn ends_with(self, suffix: impl Into<Expr>) -> Expr {
        self.call(Method::EndsWith, vec![suffix.into()])
    }

    pub fn contains(self, needle: impl Into<Expr>) -> Expr {
        self.call(Method::Contains, vec![needle.into()])
    }

    pub(crate) fn is_null_constant(&self) -> bool {
        matches!(self, Expr::Constant(Value::Null))
    }

    /// Visits this expression and every sub-expression, parents first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Source(_) | Expr::Member { .. } | Expr::Constant(_) | Expr::Parameter(_) => {}
            Expr::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::Not(inner) => inner.walk(visit),
            Expr::In { operand, .. } => operand.walk(visit),
            Expr::Call { target, args, .. } => {
                target.walk(visit);
                args.iter().for_each(|a| a.walk(visit));
            }
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => {
                test.walk(visit);
                then.walk(visit);
                otherwise.walk(visit);
            }
            Expr::Client { args, .. } | Expr::Tuple(args) => {
                args.iter().for_each(|a| a.walk(visit));
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl Direction {
    pub const fn reversed(self) -> Self {
        match self {
            Direction::Ascending => Direction::Descending,
            Direction::Descending => Direction::Ascending,
        }
    }
}

/// One ordering key.
#[derive(Debug, Clone, PartialEq)]
pub struct Ordering {
    pub expr: Expr,
    pub direction: Direction,
}

impl Ordering {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            direction: Direction::Ascending,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            direction: Direction::Descending,
        }
    }
}
