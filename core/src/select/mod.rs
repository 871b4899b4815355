//! Relational algebra tree.
//!
//! Every node of one compilation lives in a [`QueryArena`] and is addressed by
//! index: [`ExprId`] for scalar expressions, [`SelectId`] for `SELECT`s.
//! Expressions are immutable once added; selects are mutated by the visitor
//! and the result operator handler until the command is generated.

use compact_str::{CompactString, format_compact};
use hashbrown::HashSet;

use crate::command::ParamSlot;
use crate::metadata::TableName;
use crate::model::{BinaryOp, Direction, Method, SourceHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SelectId(u32);

/// Scalar SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    Column {
        table: CompactString,
        name: CompactString,
        nullable: bool,
    },
    Parameter(ParamSlot),
    /// Integer literal emitted by the compiler, never user data.
    Number(i64),
    Binary {
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
    },
    Not(ExprId),
    IsNull(ExprId),
    IsNotNull(ExprId),
    In {
        operand: ExprId,
        values: Vec<ExprId>,
        negated: bool,
    },
    InSubquery {
        operand: ExprId,
        select: SelectId,
    },
    Exists(SelectId),
    /// Plain function call: aggregates, `upper`, `length`, ...
    Function {
        name: &'static str,
        args: Vec<ExprId>,
    },
    /// Substring test rendered per dialect (`starts_with`, `ends_with`, `contains`).
    Match {
        method: Method,
        target: ExprId,
        pattern: ExprId,
    },
    CountStar,
    Case {
        whens: Vec<(ExprId, ExprId)>,
        otherwise: Option<ExprId>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableKind {
    Table(TableName),
    Subquery(SelectId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JoinKind {
    From,
    Cross,
    Inner(ExprId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSource {
    pub alias: CompactString,
    pub kind: TableKind,
    pub join: JoinKind,
}

/// One projected output expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionItem {
    pub expr: ExprId,
    /// Output name; set when the select becomes a derived table.
    pub alias: Option<CompactString>,
    /// Query source member this column carries, if any.
    pub origin: Option<(SourceHandle, CompactString)>,
}

impl ProjectionItem {
    pub fn new(expr: ExprId) -> Self {
        Self {
            expr,
            alias: None,
            origin: None,
        }
    }

    pub fn member(expr: ExprId, source: SourceHandle, member: impl Into<CompactString>) -> Self {
        Self {
            expr,
            alias: None,
            origin: Some((source, member.into())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SqlOrdering {
    pub expr: ExprId,
    pub direction: Direction,
}

/// One SQL `SELECT`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectExpression {
    pub tables: Vec<TableSource>,
    pub projection: Vec<ProjectionItem>,
    pub predicate: Option<ExprId>,
    pub orderings: Vec<SqlOrdering>,
    pub limit: Option<ExprId>,
    pub offset: Option<ExprId>,
    pub is_distinct: bool,
}

impl SelectExpression {
    pub fn has_limit_or_offset(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }

    pub fn alias_in_scope(&self, alias: &str) -> bool {
        self.tables.iter().any(|t| t.alias == alias)
    }
}

// =============================================================================
// QueryArena
// =============================================================================

/// Per-compilation node storage.
#[derive(Debug, Clone, Default)]
pub struct QueryArena {
    exprs: Vec<SqlExpr>,
    selects: Vec<SelectExpression>,
}

impl QueryArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, expr: SqlExpr) -> ExprId {
        self.exprs.push(expr);
        ExprId((self.exprs.len() - 1) as u32)
    }

    #[inline]
    pub fn expr(&self, id: ExprId) -> &SqlExpr {
        &self.exprs[id.0 as usize]
    }

    pub fn add_select(&mut self, select: SelectExpression) -> SelectId {
        self.selects.push(select);
        SelectId((self.selects.len() - 1) as u32)
    }

    #[inline]
    pub fn select(&self, id: SelectId) -> &SelectExpression {
        &self.selects[id.0 as usize]
    }

    #[inline]
    pub fn select_mut(&mut self, id: SelectId) -> &mut SelectExpression {
        &mut self.selects[id.0 as usize]
    }

    /// Copies a select into a new slot. Sub-nodes are shared.
    pub fn clone_select(&mut self, id: SelectId) -> SelectId {
        let copy = self.select(id).clone();
        self.add_select(copy)
    }

    // ==================== node helpers ====================

    pub fn column(
        &mut self,
        table: impl Into<CompactString>,
        name: impl Into<CompactString>,
        nullable: bool,
    ) -> ExprId {
        self.add(SqlExpr::Column {
            table: table.into(),
            name: name.into(),
            nullable,
        })
    }

    pub fn binary(&mut self, op: BinaryOp, left: ExprId, right: ExprId) -> ExprId {
        self.add(SqlExpr::Binary { op, left, right })
    }

    pub fn and(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.binary(BinaryOp::And, left, right)
    }

    pub fn or(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.binary(BinaryOp::Or, left, right)
    }

    /// ANDs `predicate` into the select's WHERE clause.
    pub fn and_where(&mut self, select: SelectId, predicate: ExprId) {
        let combined = match self.select(select).predicate {
            Some(existing) => self.and(existing, predicate),
            None => predicate,
        };
        self.select_mut(select).predicate = Some(combined);
    }

    /// Whether the expression can evaluate to NULL.
    pub fn is_nullable(&self, id: ExprId) -> bool {
        match self.expr(id) {
            SqlExpr::Column { nullable, .. } => *nullable,
            SqlExpr::Parameter(ParamSlot::Constant(v)) => v.is_null(),
            SqlExpr::Parameter(ParamSlot::Named { .. }) => true,
            SqlExpr::Number(_)
            | SqlExpr::IsNull(_)
            | SqlExpr::IsNotNull(_)
            | SqlExpr::Exists(_)
            | SqlExpr::CountStar => false,
            SqlExpr::Binary { left, right, .. } => {
                self.is_nullable(*left) || self.is_nullable(*right)
            }
            SqlExpr::Not(inner) => self.is_nullable(*inner),
            SqlExpr::In {
                operand, values, ..
            } => self.is_nullable(*operand) || values.iter().any(|v| self.is_nullable(*v)),
            SqlExpr::InSubquery { .. } => true,
            // aggregates are NULL over empty input
            SqlExpr::Function { name, args } => {
                matches!(*name, "MIN" | "MAX" | "SUM" | "AVG")
                    || args.iter().any(|a| self.is_nullable(*a))
            }
            SqlExpr::Match {
                target, pattern, ..
            } => self.is_nullable(*target) || self.is_nullable(*pattern),
            SqlExpr::Case { whens, otherwise } => {
                whens.iter().any(|(_, then)| self.is_nullable(*then))
                    || otherwise.is_none_or(|o| self.is_nullable(o))
            }
        }
    }

    /// Deep structural equality of two expressions.
    pub fn same(&self, a: ExprId, b: ExprId) -> bool {
        if a == b {
            return true;
        }
        let same_all = |xs: &[ExprId], ys: &[ExprId]| {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| self.same(*x, *y))
        };
        match (self.expr(a), self.expr(b)) {
            (
                SqlExpr::Column {
                    table: t1, name: n1, ..
                },
                SqlExpr::Column {
                    table: t2, name: n2, ..
                },
            ) => t1 == t2 && n1 == n2,
            (
                SqlExpr::Binary {
                    op: o1,
                    left: l1,
                    right: r1,
                },
                SqlExpr::Binary {
                    op: o2,
                    left: l2,
                    right: r2,
                },
            ) => o1 == o2 && self.same(*l1, *l2) && self.same(*r1, *r2),
            (SqlExpr::Not(x), SqlExpr::Not(y))
            | (SqlExpr::IsNull(x), SqlExpr::IsNull(y))
            | (SqlExpr::IsNotNull(x), SqlExpr::IsNotNull(y)) => self.same(*x, *y),
            (
                SqlExpr::Function { name: n1, args: a1 },
                SqlExpr::Function { name: n2, args: a2 },
            ) => n1 == n2 && same_all(a1, a2),
            (
                SqlExpr::Match {
                    method: m1,
                    target: t1,
                    pattern: p1,
                },
                SqlExpr::Match {
                    method: m2,
                    target: t2,
                    pattern: p2,
                },
            ) => m1 == m2 && self.same(*t1, *t2) && self.same(*p1, *p2),
            (x, y) => x == y,
        }
    }

    // ==================== subquery push-down ====================

    /// Turns `inner` into a derived table of a new outer select.
    ///
    /// Inner projection items get unique output names; the outer select
    /// projects each of them through `alias`. Orderings move to the outer
    /// select; the inner keeps them only while a limit or offset depends on
    /// them. An ordering that is not projected is added as a hidden inner
    /// column, or dropped when the inner select is distinct.
    pub fn push_down(&mut self, inner: SelectId, alias: CompactString) -> SelectId {
        let visible = self.select(inner).projection.len();
        let mut used: HashSet<CompactString> = HashSet::new();
        for i in 0..visible {
            let item = &self.select(inner).projection[i];
            let hint = item.alias.clone().unwrap_or_else(|| self.name_hint(item.expr));
            let name = unique_name(&mut used, hint);
            self.select_mut(inner).projection[i].alias = Some(name);
        }

        let orderings = std::mem::take(&mut self.select_mut(inner).orderings);
        let keeps_window = self.select(inner).has_limit_or_offset();
        let is_distinct = self.select(inner).is_distinct;
        let mut lifted = Vec::with_capacity(orderings.len());
        for ordering in &orderings {
            let existing = self
                .select(inner)
                .projection
                .iter()
                .find(|item| self.same(item.expr, ordering.expr))
                .and_then(|item| item.alias.clone());
            let name = match existing {
                Some(name) => name,
                None if !is_distinct => {
                    let name = unique_name(&mut used, self.name_hint(ordering.expr));
                    let mut item = ProjectionItem::new(ordering.expr);
                    item.alias = Some(name.clone());
                    self.select_mut(inner).projection.push(item);
                    name
                }
                None => continue,
            };
            let nullable = self.is_nullable(ordering.expr);
            lifted.push((name, nullable, ordering.direction));
        }
        if keeps_window {
            self.select_mut(inner).orderings = orderings;
        }

        let mut outer = SelectExpression {
            tables: vec![TableSource {
                alias: alias.clone(),
                kind: TableKind::Subquery(inner),
                join: JoinKind::From,
            }],
            ..SelectExpression::default()
        };
        for i in 0..visible {
            let item = self.select(inner).projection[i].clone();
            let name = item.alias.clone().unwrap_or_default();
            let nullable = self.is_nullable(item.expr);
            let expr = self.column(alias.clone(), name, nullable);
            outer.projection.push(ProjectionItem {
                expr,
                alias: None,
                origin: item.origin,
            });
        }
        for (name, nullable, direction) in lifted {
            let expr = self.column(alias.clone(), name, nullable);
            outer.orderings.push(SqlOrdering { expr, direction });
        }
        self.add_select(outer)
    }

    fn name_hint(&self, id: ExprId) -> CompactString {
        match self.expr(id) {
            SqlExpr::Column { name, .. } => name.clone(),
            _ => CompactString::from("c"),
        }
    }
}

pub(crate) fn unique_name(used: &mut HashSet<CompactString>, hint: CompactString) -> CompactString {
    let mut name = hint.clone();
    let mut counter = 0usize;
    while used.contains(&name) {
        name = format_compact!("{hint}{counter}");
        counter += 1;
    }
    used.insert(name.clone());
    name
}
