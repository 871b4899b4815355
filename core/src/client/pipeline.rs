use std::collections::VecDeque;

use hashbrown::HashSet;

use crate::command::Parameters;
use crate::error::Result;
use crate::model::Direction;
use crate::row::ValueRow;
use crate::value::Value;

use super::{Aggregator, BodyStage, ClientPlan, Evaluator, ResultStage};

/// Running state of one [`ResultStage`].
#[derive(Debug)]
enum StageState {
    Skip(usize),
    Take(usize),
    Distinct(HashSet<ValueRow>),
    OfType {
        position: Option<usize>,
        values: Vec<Value>,
    },
}

/// Push-based executor for a [`ClientPlan`].
///
/// Server rows go in through [`push`](Self::push); results come out of
/// [`pop`](Self::pop). Order-by stages buffer until [`finish`](Self::finish).
#[derive(Debug)]
pub struct ClientPipeline<'p> {
    plan: &'p ClientPlan,
    eval: Evaluator<'p>,
    buffers: Vec<Vec<ValueRow>>,
    stages: Vec<StageState>,
    terminal: Aggregator,
    output: VecDeque<ValueRow>,
    saturated: bool,
    finished: bool,
}

impl<'p> ClientPipeline<'p> {
    pub fn new(plan: &'p ClientPlan, params: &'p Parameters) -> Result<Self> {
        let eval = Evaluator::new(plan.layout.as_ref(), params);
        let mut stages = Vec::with_capacity(plan.results.len());
        for stage in &plan.results {
            stages.push(match stage {
                ResultStage::Skip(count) => StageState::Skip(eval.count(count)?),
                ResultStage::Take(count) => StageState::Take(eval.count(count)?),
                ResultStage::Distinct => StageState::Distinct(HashSet::new()),
                ResultStage::OfType {
                    source,
                    discriminator,
                    values,
                } => StageState::OfType {
                    position: match (discriminator, &plan.layout) {
                        (Some(member), Some(layout)) => layout.position(*source, member),
                        _ => None,
                    },
                    values: values.clone(),
                },
            });
        }
        let terminal = Aggregator::new(&plan.terminal, &eval)?;
        let mut pipeline = Self {
            plan,
            eval,
            buffers: vec![Vec::new(); plan.body.len()],
            stages,
            terminal,
            output: VecDeque::new(),
            saturated: false,
            finished: false,
        };
        pipeline.saturated = pipeline
            .stages
            .iter()
            .any(|s| matches!(s, StageState::Take(0)));
        Ok(pipeline)
    }

    /// Whether further server rows can no longer change the results.
    pub fn is_saturated(&self) -> bool {
        self.saturated
    }

    pub fn push(&mut self, row: ValueRow) -> Result<()> {
        if self.saturated {
            return Ok(());
        }
        self.push_body(0, row)
    }

    /// Flushes buffered stages and emits the terminal result.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let plan = self.plan;
        for i in 0..plan.body.len() {
            let BodyStage::OrderBy(orderings) = &plan.body[i] else {
                continue;
            };
            let rows = std::mem::take(&mut self.buffers[i]);
            let mut keyed = Vec::with_capacity(rows.len());
            for row in rows {
                let key = orderings
                    .iter()
                    .map(|o| self.eval.eval(&o.expr, &row))
                    .collect::<Result<Vec<_>>>()?;
                keyed.push((key, row));
            }
            // stable, so earlier orderings survive as tie breakers
            keyed.sort_by(|(a, _), (b, _)| {
                for ((x, y), o) in a.iter().zip(b).zip(orderings) {
                    let ord = x.sql_cmp(y);
                    let ord = match o.direction {
                        Direction::Ascending => ord,
                        Direction::Descending => ord.reverse(),
                    };
                    if ord.is_ne() {
                        return ord;
                    }
                }
                core::cmp::Ordering::Equal
            });
            for (_, row) in keyed {
                if self.saturated {
                    break;
                }
                self.push_body(i + 1, row)?;
            }
        }
        self.terminal.finish(&mut self.output)
    }

    pub fn pop(&mut self) -> Option<ValueRow> {
        self.output.pop_front()
    }

    fn push_body(&mut self, from: usize, row: ValueRow) -> Result<()> {
        let plan = self.plan;
        for i in from..plan.body.len() {
            match &plan.body[i] {
                BodyStage::Filter(predicate) => {
                    if !self.eval.eval(predicate, &row)?.is_truthy() {
                        return Ok(());
                    }
                }
                BodyStage::JoinFilter { outer, inner } => {
                    let l = self.eval.eval(outer, &row)?;
                    let r = self.eval.eval(inner, &row)?;
                    if l.is_null() || r.is_null() || l != r {
                        return Ok(());
                    }
                }
                BodyStage::OrderBy(_) => {
                    self.buffers[i].push(row);
                    return Ok(());
                }
            }
        }

        let out = match &plan.projector {
            Some(selector) => {
                let mut out = ValueRow::new();
                self.eval.project(selector, &row, &mut out)?;
                out
            }
            None => row.clone(),
        };
        self.push_result(&row, out)
    }

    fn push_result(&mut self, env: &[Value], out: ValueRow) -> Result<()> {
        for stage in &mut self.stages {
            match stage {
                StageState::Skip(remaining) => {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Ok(());
                    }
                }
                StageState::Take(remaining) => {
                    if *remaining == 0 {
                        self.saturated = true;
                        return Ok(());
                    }
                    *remaining -= 1;
                    if *remaining == 0 {
                        self.saturated = true;
                    }
                }
                StageState::Distinct(seen) => {
                    if !seen.insert(out.clone()) {
                        return Ok(());
                    }
                }
                StageState::OfType { position, values } => {
                    if let Some(position) = position {
                        let kind = env.get(*position).cloned().unwrap_or_default();
                        if !values.contains(&kind) {
                            return Ok(());
                        }
                    }
                }
            }
        }
        if self
            .terminal
            .push(&self.eval, env, out, &mut self.output)?
        {
            self.saturated = true;
        }
        Ok(())
    }
}
