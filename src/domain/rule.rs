//! Filter rule AST.
//!
//! Filter expressions are parsed once at configuration time into these
//! structured values:
//! - `FilterRule`: percentile cutoff, absolute comparison or category exclusion
//! - `FilterTarget`: what a rule is applied to (composite, factor, raw field)
//! - `FilterDefinition`: target + optional ordering hint + rule

use std::collections::BTreeSet;
use std::fmt;

use crate::domain::factor::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
            CompareOp::Gt => left > right,
            CompareOp::Ge => left >= right,
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        }
    }
}

/// Which end of the ordered survivor set a percentile rule keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PercentileSide {
    /// `pct:<=p`: the first ⌊p·n⌋ survivors.
    Head,
    /// `pct:>=p`: the last ⌊(1-p)·n⌋ survivors.
    Tail,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterRule {
    Percentile { side: PercentileSide, threshold: f64 },
    Absolute { op: CompareOp, threshold: f64 },
    CategoryExclude(BTreeSet<String>),
}

impl fmt::Display for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterRule::Percentile { side, threshold } => {
                let op = match side {
                    PercentileSide::Head => "<=",
                    PercentileSide::Tail => ">=",
                };
                write!(f, "pct:{}{}", op, threshold)
            }
            FilterRule::Absolute { op, threshold } => write!(f, "val:{}{}", op.symbol(), threshold),
            FilterRule::CategoryExclude(labels) => {
                let joined: Vec<&str> = labels.iter().map(String::as_str).collect();
                write!(f, "cat:exclude({})", joined.join(","))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterTarget {
    Composite,
    Factor(String),
    /// Raw panel field, or a category dimension for exclusion rules.
    Field(String),
}

impl FilterTarget {
    pub const COMPOSITE: &'static str = "composite";

    /// `composite` names the composite score, a known factor name resolves to
    /// that factor, anything else is a raw panel field.
    pub fn resolve(name: &str, is_factor: impl Fn(&str) -> bool) -> Self {
        if name.eq_ignore_ascii_case(Self::COMPOSITE) {
            FilterTarget::Composite
        } else if is_factor(name) {
            FilterTarget::Factor(name.to_string())
        } else {
            FilterTarget::Field(name.to_string())
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FilterTarget::Composite => Self::COMPOSITE,
            FilterTarget::Factor(name) | FilterTarget::Field(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterDefinition {
    pub target: FilterTarget,
    /// Ordering used by percentile rules on raw fields.
    pub weighting_hint: Option<Direction>,
    pub rule: FilterRule,
}

impl fmt::Display for FilterDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.weighting_hint {
            Some(hint) => write!(f, "{}|{}|{}", self.target.name(), hint, self.rule),
            None => write!(f, "{}|{}", self.target.name(), self.rule),
        }
    }
}
