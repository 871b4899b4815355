use compact_str::CompactString;
use hashbrown::HashMap;

use crate::client::{BodyStage, ClientPlan};
use crate::command::Command;
use crate::dialect::Dialect;
use crate::error::{QuarryError, Result};
use crate::generator::SqlGenerator;
use crate::include::IncludePlan;
use crate::metadata::MetadataLookup;
use crate::model::{
    BinaryOp, BodyClause, Expr, FromClause, Include, Ordering, QueryModel, ResultOperator,
    SourceHandle,
};
use crate::query::ResultShape;
use crate::select::{
    JoinKind, ProjectionItem, SelectExpression, SqlOrdering, TableKind, TableSource,
};

use super::binding::member_property;
use super::{ResultOperatorHandler, TranslationContext, optimize_equality};

/// Output of translating one query model.
#[derive(Debug, Clone)]
pub struct Translation {
    pub command: Command,
    pub plan: ClientPlan,
    pub shape: ResultShape,
    pub includes: Vec<IncludePlan>,
}

/// Walks a query model and produces the server command plus the client plan.
pub struct QueryModelVisitor<'m> {
    metadata: &'m dyn MetadataLookup,
    dialect: Dialect,
}

impl<'m> QueryModelVisitor<'m> {
    pub fn new(metadata: &'m dyn MetadataLookup, dialect: Dialect) -> Self {
        Self { metadata, dialect }
    }

    pub fn visit(&self, model: &QueryModel) -> Result<Translation> {
        crate::quarry_profile_scope!("translate", "visit");
        self.validate(model)?;

        let mut ctx = TranslationContext::new(self.metadata, model.selector.clone());
        ctx.add_source(&model.main, JoinKind::From)?;
        for clause in &model.body {
            self.visit_body(&mut ctx, clause)?;
        }
        if !model.includes.is_empty() {
            self.order_by_key(&mut ctx, model)?;
        }
        ctx.refresh_projection()?;

        let mut handler = ResultOperatorHandler::new(&mut ctx);
        for op in &model.result_operators {
            handler.handle(&mut ctx, op)?;
        }
        handler.finish();

        ctx.refresh_projection()?;
        let plan = if ctx.projection_final {
            ClientPlan::server(ctx.terminal.clone())
        } else if ctx.env_mode() {
            ClientPlan {
                layout: Some(ctx.row_layout()),
                body: std::mem::take(&mut ctx.body),
                projector: Some(ctx.selector.clone()),
                results: std::mem::take(&mut ctx.results),
                terminal: ctx.terminal.clone(),
            }
        } else {
            ClientPlan {
                layout: None,
                body: Vec::new(),
                projector: None,
                results: std::mem::take(&mut ctx.results),
                terminal: ctx.terminal.clone(),
            }
        };

        let includes = if ctx.shape == ResultShape::Scalar {
            Vec::new()
        } else {
            model
                .includes
                .iter()
                .map(|include| self.include_plan(&mut ctx, &model.main, include))
                .collect::<Result<Vec<_>>>()?
        };

        let command = SqlGenerator::new(&ctx.arena, self.dialect).generate(ctx.current);
        Ok(Translation {
            command,
            plan,
            shape: ctx.shape,
            includes,
        })
    }

    /// Resolves every source, member, type and navigation up front, so
    /// mapping errors surface before anything executes.
    fn validate(&self, model: &QueryModel) -> Result<()> {
        let mut entities: HashMap<SourceHandle, &str> = HashMap::new();
        for from in model.sources() {
            self.metadata.resolve_table(&from.entity)?;
            if entities.insert(from.source, from.entity.as_str()).is_some() {
                return Err(QuarryError::InvalidQuery(format!(
                    "source {} declared twice",
                    from.source.0
                )));
            }
        }

        let mut error = None;
        for expr in model.expressions() {
            expr.walk(&mut |e| {
                if error.is_some() {
                    return;
                }
                let checked = match e {
                    Expr::Source(source) => entities
                        .get(source)
                        .map(|_| ())
                        .ok_or_else(|| unknown_source(*source)),
                    Expr::Member { source, name } => match entities.get(source) {
                        Some(entity) => member_property(self.metadata, entity, name).map(|_| ()),
                        None => Err(unknown_source(*source)),
                    },
                    _ => Ok(()),
                };
                error = checked.err();
            });
        }
        if let Some(error) = error {
            return Err(error);
        }

        for op in &model.result_operators {
            if let ResultOperator::OfType(entity) = op {
                self.metadata.require_entity(entity)?;
            }
        }
        for include in &model.includes {
            if model.selector != Expr::Source(model.main.source) {
                return Err(QuarryError::InvalidQuery(
                    "include requires the main entity as selector".into(),
                ));
            }
            self.metadata
                .navigation(&model.main.entity, &include.navigation)?;
        }
        Ok(())
    }

    fn visit_body(&self, ctx: &mut TranslationContext<'_>, clause: &BodyClause) -> Result<()> {
        match clause {
            BodyClause::Where(predicate) => {
                if !ctx.requires_client_eval {
                    let optimized = optimize_equality(predicate.clone());
                    if let Some(id) = ctx.translate(&optimized)? {
                        ctx.arena.and_where(ctx.current, id);
                        return Ok(());
                    }
                    crate::quarry_trace_fallback!("where", "untranslatable predicate");
                    ctx.requires_client_eval = true;
                }
                ctx.body.push(BodyStage::Filter(predicate.clone()));
            }
            BodyClause::OrderBy(orderings) => {
                if !ctx.requires_client_eval {
                    if let Some(translated) = self.translate_orderings(ctx, orderings)? {
                        ctx.select_mut().orderings = translated;
                        return Ok(());
                    }
                    crate::quarry_trace_fallback!("order_by", "untranslatable ordering");
                    ctx.requires_client_eval = true;
                }
                ctx.body.push(BodyStage::OrderBy(orderings.clone()));
            }
            BodyClause::Join {
                from,
                outer_key,
                inner_key,
            } => {
                let outer = if ctx.requires_client_eval {
                    None
                } else {
                    ctx.translate(outer_key)?
                };
                ctx.add_source(from, JoinKind::Cross)?;
                let on = match outer {
                    Some(outer) => ctx
                        .translate(inner_key)?
                        .map(|inner| ctx.arena.binary(BinaryOp::Eq, outer, inner)),
                    None => None,
                };
                match on {
                    Some(on) => {
                        if let Some(table) = ctx.select_mut().tables.last_mut() {
                            table.join = JoinKind::Inner(on);
                        }
                    }
                    None => {
                        if !ctx.requires_client_eval {
                            crate::quarry_trace_fallback!("join", "untranslatable join key");
                            ctx.requires_client_eval = true;
                        }
                        ctx.body.push(BodyStage::JoinFilter {
                            outer: outer_key.clone(),
                            inner: inner_key.clone(),
                        });
                    }
                }
            }
            BodyClause::AdditionalFrom(from) => ctx.add_source(from, JoinKind::Cross)?,
        }
        Ok(())
    }

    fn translate_orderings(
        &self,
        ctx: &mut TranslationContext<'_>,
        orderings: &[Ordering],
    ) -> Result<Option<Vec<SqlOrdering>>> {
        let mut out = Vec::with_capacity(orderings.len());
        for ordering in orderings {
            let Some(expr) = ctx.translate(&ordering.expr)? else {
                return Ok(None);
            };
            out.push(SqlOrdering {
                expr,
                direction: ordering.direction,
            });
        }
        Ok(Some(out))
    }

    /// Appends the main source key to the ordering so parents come out in a
    /// total order that the include queries can repeat.
    fn order_by_key(&self, ctx: &mut TranslationContext<'_>, model: &QueryModel) -> Result<()> {
        if ctx.requires_client_eval {
            return Ok(());
        }
        for member in self.metadata.key_properties(&model.main.entity)? {
            let Some(column) =
                ctx.bindings
                    .column(ctx.metadata, &mut ctx.arena, model.main.source, &member)?
            else {
                continue;
            };
            let present = ctx
                .select()
                .orderings
                .iter()
                .any(|o| ctx.arena.same(o.expr, column));
            if !present {
                ctx.select_mut().orderings.push(SqlOrdering {
                    expr: column,
                    direction: Default::default(),
                });
            }
        }
        Ok(())
    }

    /// Builds the dependent query of one include.
    ///
    /// The primary select is reused as a derived table of parent keys, so the
    /// dependents follow the parents' filter, window and order:
    /// `SELECT child.* FROM child INNER JOIN (primary) AS t ON child.fk = t.key
    /// ORDER BY <primary ordering>, t.key`.
    fn include_plan(
        &self,
        ctx: &mut TranslationContext<'_>,
        main: &FromClause,
        include: &Include,
    ) -> Result<IncludePlan> {
        let navigation = self.metadata.navigation(&main.entity, &include.navigation)?;
        let parent_members = ctx.bindings.entity_members(self.metadata, main.source)?;
        let parent_key = positions(&parent_members, &navigation.principal_key, &main.entity)?;

        let primary = ctx.arena.clone_select(ctx.current);
        let parents_alias = ctx.aliases.next("t");
        let parents = ctx.arena.push_down(primary, parents_alias.clone());
        let parents = ctx.arena.select(parents).clone();

        let child_entity = navigation.target.clone();
        let child_alias = ctx.aliases.for_entity(&child_entity);
        let child_members: Vec<CompactString> = self
            .metadata
            .hierarchy_properties(&child_entity)?
            .into_iter()
            .map(|p| p.name.clone())
            .collect();
        let child_key = positions(&child_members, &navigation.foreign_key, &child_entity)?;

        let mut on = None;
        let mut key_columns = Vec::with_capacity(navigation.principal_key.len());
        for (fk, pk) in navigation.foreign_key.iter().zip(&navigation.principal_key) {
            let key = parents
                .projection
                .iter()
                .find(|item| {
                    item.origin
                        .as_ref()
                        .is_some_and(|(h, m)| *h == main.source && m == pk)
                })
                .map(|item| item.expr)
                .ok_or_else(|| {
                    QuarryError::InvalidQuery(format!("include key `{pk}` is not projected"))
                })?;
            let column = member_property(self.metadata, &child_entity, fk)?.column.clone();
            let fk_column = ctx.arena.column(child_alias.clone(), column.name, column.nullable);
            let eq = ctx.arena.binary(BinaryOp::Eq, fk_column, key);
            on = Some(match on {
                Some(prev) => ctx.arena.and(prev, eq),
                None => eq,
            });
            key_columns.push(key);
        }
        let on = on.ok_or_else(|| {
            QuarryError::InvalidQuery(format!("navigation `{}` has no key", include.navigation))
        })?;

        let mut projection = Vec::with_capacity(child_members.len());
        for member in &child_members {
            let column = member_property(self.metadata, &child_entity, member)?.column.clone();
            let expr = ctx.arena.column(child_alias.clone(), column.name, column.nullable);
            projection.push(ProjectionItem::new(expr));
        }

        let mut orderings = parents.orderings.clone();
        for key in key_columns {
            if !orderings.iter().any(|o| ctx.arena.same(o.expr, key)) {
                orderings.push(SqlOrdering {
                    expr: key,
                    direction: Default::default(),
                });
            }
        }

        let Some(TableSource {
            kind: TableKind::Subquery(parent_rows),
            ..
        }) = parents.tables.first().cloned()
        else {
            return Err(QuarryError::InvalidQuery("include over a non-derived parent".into()));
        };
        let table = self.metadata.resolve_table(&child_entity)?;
        let mut predicate = None;
        let root = self.metadata.root_type(&child_entity)?;
        if root.name != child_entity
            && let Some((member, values)) = ctx.type_filter(&child_entity)?
        {
            let column = member_property(self.metadata, &child_entity, &member)?.column.clone();
            let operand = ctx.arena.column(child_alias.clone(), column.name, column.nullable);
            predicate = Some(ctx.in_values(operand, &values));
        }

        let select = ctx.arena.add_select(SelectExpression {
            tables: vec![
                TableSource {
                    alias: child_alias,
                    kind: TableKind::Table(table),
                    join: JoinKind::From,
                },
                TableSource {
                    alias: parents_alias,
                    kind: TableKind::Subquery(parent_rows),
                    join: JoinKind::Inner(on),
                },
            ],
            projection,
            predicate,
            orderings,
            ..SelectExpression::default()
        });

        Ok(IncludePlan {
            navigation: include.navigation.clone(),
            command: SqlGenerator::new(&ctx.arena, self.dialect).generate(select),
            parent_key,
            child_key,
        })
    }
}

fn unknown_source(source: SourceHandle) -> QuarryError {
    QuarryError::InvalidQuery(format!("source {} is not part of the query", source.0))
}

fn positions(
    members: &[CompactString],
    wanted: &[CompactString],
    entity: &str,
) -> Result<Vec<usize>> {
    wanted
        .iter()
        .map(|w| {
            members
                .iter()
                .position(|m| m == w)
                .ok_or_else(|| QuarryError::unmapped_member(entity, w))
        })
        .collect()
}
