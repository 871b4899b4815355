//! Renders a select tree into command text.
//!
//! Rendering order is fixed:
//! `SELECT [DISTINCT] projection FROM tables [WHERE] [ORDER BY] [LIMIT/OFFSET]`.
//! Values only ever reach the text as placeholders.

use crate::command::Command;
use crate::dialect::Dialect;
use crate::model::{BinaryOp, Direction, Method};
use crate::select::{ExprId, JoinKind, QueryArena, SelectId, SqlExpr, TableKind, TableSource};
use crate::sql::{Sql, Token};

/// Precedence levels, loosest first.
const PREC_OR: u8 = 1;
const PREC_AND: u8 = 2;
const PREC_NOT: u8 = 3;
const PREC_COMPARE: u8 = 4;
const PREC_ADD: u8 = 5;
const PREC_MUL: u8 = 6;
const PREC_PRIMARY: u8 = 7;

pub struct SqlGenerator<'a> {
    arena: &'a QueryArena,
    dialect: Dialect,
}

impl<'a> SqlGenerator<'a> {
    pub fn new(arena: &'a QueryArena, dialect: Dialect) -> Self {
        Self { arena, dialect }
    }

    /// Renders `select` into a command. Pure: the arena is not modified.
    pub fn generate(&self, select: SelectId) -> Command {
        crate::quarry_profile_scope!("sql_render", "generate");
        let (sql, slots) = self.select_sql(select).build(self.dialect);
        crate::quarry_trace_query!(sql, slots.len());
        Command::new(sql, slots, self.dialect)
    }

    pub fn select_sql(&self, id: SelectId) -> Sql {
        let select = self.arena.select(id);
        let mut sql = Sql::token(Token::SELECT);
        if select.is_distinct {
            sql.push_mut(Token::DISTINCT);
        }

        if select.projection.is_empty() {
            sql.append_mut(Sql::number(1));
        } else {
            sql.append_mut(Sql::join(
                select.projection.iter().map(|item| {
                    let expr = self.expr_sql(item.expr);
                    match &item.alias {
                        Some(alias) => expr.alias(alias.clone()),
                        None => expr,
                    }
                }),
                Token::COMMA,
            ));
        }

        for (i, table) in select.tables.iter().enumerate() {
            if i == 0 {
                sql.push_mut(Token::FROM);
                sql.append_mut(self.table_sql(table));
                continue;
            }
            match table.join {
                JoinKind::From | JoinKind::Cross => {
                    sql.push_mut(Token::CROSS);
                    sql.push_mut(Token::JOIN);
                    sql.append_mut(self.table_sql(table));
                }
                JoinKind::Inner(on) => {
                    sql.push_mut(Token::INNER);
                    sql.push_mut(Token::JOIN);
                    sql.append_mut(self.table_sql(table));
                    sql.push_mut(Token::ON);
                    sql.append_mut(self.expr_sql(on));
                }
            }
        }

        if let Some(predicate) = select.predicate {
            sql.push_mut(Token::WHERE);
            sql.append_mut(self.expr_sql(predicate));
        }

        if !select.orderings.is_empty() {
            sql.push_mut(Token::ORDER);
            sql.push_mut(Token::BY);
            sql.append_mut(Sql::join(
                select.orderings.iter().map(|o| {
                    let expr = self.expr_sql(o.expr);
                    match o.direction {
                        Direction::Ascending => expr,
                        Direction::Descending => expr.push(Token::DESC),
                    }
                }),
                Token::COMMA,
            ));
        }

        match (select.limit, select.offset) {
            (None, None) => {}
            (Some(limit), offset) => {
                sql.push_mut(Token::LIMIT);
                sql.append_mut(self.expr_sql(limit));
                if let Some(offset) = offset {
                    sql.push_mut(Token::OFFSET);
                    sql.append_mut(self.expr_sql(offset));
                }
            }
            (None, Some(offset)) => {
                if let Some(unbounded) = self.dialect.unbounded_limit() {
                    sql.push_mut(Token::LIMIT);
                    sql.append_mut(Sql::number(unbounded));
                }
                sql.push_mut(Token::OFFSET);
                sql.append_mut(self.expr_sql(offset));
            }
        }
        sql
    }

    fn table_sql(&self, table: &TableSource) -> Sql {
        let source = match &table.kind {
            TableKind::Table(name) => match &name.schema {
                Some(schema) => Sql::qualified(schema.clone(), name.name.clone()),
                None => Sql::ident(name.name.clone()),
            },
            TableKind::Subquery(select) => self.select_sql(*select).parens(),
        };
        source.alias(table.alias.clone())
    }

    // ==================== expressions ====================

    fn precedence(&self, id: ExprId) -> u8 {
        match self.arena.expr(id) {
            SqlExpr::Binary { op, .. } => match op {
                BinaryOp::Or => PREC_OR,
                BinaryOp::And => PREC_AND,
                BinaryOp::Add | BinaryOp::Sub => PREC_ADD,
                BinaryOp::Mul | BinaryOp::Div => PREC_MUL,
                _ => PREC_COMPARE,
            },
            SqlExpr::Not(_) => PREC_NOT,
            SqlExpr::IsNull(_)
            | SqlExpr::IsNotNull(_)
            | SqlExpr::In { .. }
            | SqlExpr::InSubquery { .. }
            | SqlExpr::Match { .. } => PREC_COMPARE,
            // a negative literal renders with a leading minus
            SqlExpr::Number(n) if *n < 0 => PREC_ADD,
            _ => PREC_PRIMARY,
        }
    }

    /// Renders an operand, parenthesized when it binds looser than its parent.
    fn operand(&self, id: ExprId, parent: u8, strict: bool) -> Sql {
        let prec = self.precedence(id);
        let sql = self.expr_sql(id);
        if prec < parent || (strict && prec == parent) {
            sql.parens()
        } else {
            sql
        }
    }

    pub fn expr_sql(&self, id: ExprId) -> Sql {
        match self.arena.expr(id) {
            SqlExpr::Column { table, name, .. } => Sql::qualified(table.clone(), name.clone()),
            SqlExpr::Parameter(slot) => Sql::param(slot.clone()),
            SqlExpr::Number(n) => Sql::number(*n),
            SqlExpr::Binary { op, left, right } => self.binary_sql(*op, *left, *right),
            SqlExpr::Not(inner) => {
                let inner_sql = match self.arena.expr(*inner) {
                    SqlExpr::Exists(_) => self.expr_sql(*inner),
                    _ => self.operand(*inner, PREC_PRIMARY, false),
                };
                Sql::token(Token::NOT).append(inner_sql)
            }
            SqlExpr::IsNull(inner) => self
                .operand(*inner, PREC_COMPARE, true)
                .push(Token::IS)
                .push(Token::NULL),
            SqlExpr::IsNotNull(inner) => self
                .operand(*inner, PREC_COMPARE, true)
                .push(Token::IS)
                .push(Token::NOT)
                .push(Token::NULL),
            SqlExpr::In {
                operand,
                values,
                negated,
            } => {
                if values.is_empty() {
                    // x IN () is always false, x NOT IN () always true
                    let rhs = if *negated { 1 } else { 0 };
                    return Sql::number(1).push(Token::EQ).append(Sql::number(rhs));
                }
                let mut sql = self.operand(*operand, PREC_COMPARE, true);
                if *negated {
                    sql.push_mut(Token::NOT);
                }
                sql.push_mut(Token::IN);
                let list = Sql::join(values.iter().map(|v| self.expr_sql(*v)), Token::COMMA);
                sql.append(list.parens())
            }
            SqlExpr::InSubquery { operand, select } => self
                .operand(*operand, PREC_COMPARE, true)
                .push(Token::IN)
                .append(self.select_sql(*select).parens()),
            SqlExpr::Exists(select) => {
                Sql::token(Token::EXISTS).append(self.select_sql(*select).parens())
            }
            SqlExpr::Function { name, args } => Sql::func(
                *name,
                Sql::join(args.iter().map(|a| self.expr_sql(*a)), Token::COMMA),
            ),
            SqlExpr::Match {
                method,
                target,
                pattern,
            } => self.match_sql(*method, *target, *pattern),
            SqlExpr::CountStar => Sql::func("COUNT", Sql::token(Token::STAR)),
            SqlExpr::Case { whens, otherwise } => {
                let mut sql = Sql::token(Token::CASE);
                for (test, then) in whens {
                    sql.push_mut(Token::WHEN);
                    sql.append_mut(self.expr_sql(*test));
                    sql.push_mut(Token::THEN);
                    sql.append_mut(self.expr_sql(*then));
                }
                if let Some(otherwise) = otherwise {
                    sql.push_mut(Token::ELSE);
                    sql.append_mut(self.expr_sql(*otherwise));
                }
                sql.push(Token::END)
            }
        }
    }

    fn binary_sql(&self, op: BinaryOp, left: ExprId, right: ExprId) -> Sql {
        let (token, prec) = match op {
            BinaryOp::Eq => (Token::EQ, PREC_COMPARE),
            BinaryOp::Ne => (Token::NE, PREC_COMPARE),
            BinaryOp::Lt => (Token::LT, PREC_COMPARE),
            BinaryOp::Le => (Token::LE, PREC_COMPARE),
            BinaryOp::Gt => (Token::GT, PREC_COMPARE),
            BinaryOp::Ge => (Token::GE, PREC_COMPARE),
            BinaryOp::And => (Token::AND, PREC_AND),
            BinaryOp::Or => (Token::OR, PREC_OR),
            BinaryOp::Add => (Token::PLUS, PREC_ADD),
            BinaryOp::Sub => (Token::MINUS, PREC_ADD),
            BinaryOp::Mul => (Token::STAR, PREC_MUL),
            BinaryOp::Div => (Token::SLASH, PREC_MUL),
        };
        // comparisons do not chain; subtraction and division are left-associative
        let strict_left = op.is_comparison();
        let strict_right = !op.is_logical() && !matches!(op, BinaryOp::Add | BinaryOp::Mul);
        self.operand(left, prec, strict_left)
            .push(token)
            .append(self.operand(right, prec, strict_right))
    }

    fn match_sql(&self, method: Method, target: ExprId, pattern: ExprId) -> Sql {
        let target_sql = self.expr_sql(target);
        let pattern_sql = self.expr_sql(pattern);
        let position = |t: Sql, p: Sql| {
            Sql::func(
                self.dialect.position_function(),
                t.push(Token::COMMA).append(p),
            )
        };
        match method {
            Method::StartsWith => position(target_sql, pattern_sql)
                .push(Token::EQ)
                .append(Sql::number(1)),
            Method::Contains => position(target_sql, pattern_sql)
                .push(Token::GT)
                .append(Sql::number(0)),
            Method::EndsWith => match self.dialect {
                Dialect::SQLite => {
                    // substr(t, length(t) - length(p) + 1) = p
                    let start = Sql::func("length", target_sql.clone())
                        .push(Token::MINUS)
                        .append(Sql::func("length", pattern_sql.clone()))
                        .push(Token::PLUS)
                        .append(Sql::number(1));
                    Sql::func("substr", target_sql.push(Token::COMMA).append(start))
                        .push(Token::EQ)
                        .append(pattern_sql)
                }
                Dialect::PostgreSQL => {
                    let len = Sql::func("length", pattern_sql.clone());
                    Sql::func("right", target_sql.push(Token::COMMA).append(len))
                        .push(Token::EQ)
                        .append(pattern_sql)
                }
            },
            // non-predicate methods are plain functions
            Method::ToUpper | Method::ToLower | Method::Length | Method::Trim => target_sql,
        }
    }
}
