use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::database::{Database, DbFile, DbResult};
use crate::record::{Field, FieldType, Tuple};

/// Comparison operator for filter and join predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// One `field op literal` condition
#[derive(Debug, Clone)]
pub struct FilterPredicate {
    pub field: String,
    pub op: PredicateOp,
    pub value: Field,
}

impl FilterPredicate {
    pub fn new(field: impl Into<String>, op: PredicateOp, value: impl Into<Field>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }
}

/// A `left_field op right_field` join condition
#[derive(Debug, Clone)]
pub struct JoinPredicate {
    pub left: String,
    pub op: PredicateOp,
    pub right: String,
}

impl JoinPredicate {
    pub fn new(left: impl Into<String>, op: PredicateOp, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            op,
            right: right.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// An aggregation over one column, optionally grouped by another
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub op: AggregateOp,
    pub field: String,
    pub group: Option<String>,
}

impl Aggregate {
    pub fn new(op: AggregateOp, field: impl Into<String>) -> Self {
        Self {
            op,
            field: field.into(),
            group: None,
        }
    }

    pub fn grouped_by(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

/// Evaluate `lhs op rhs`. Values of mismatched types compare false, except
/// INT against DOUBLE, which compares after promoting the INT.
pub fn compare(lhs: &Field, rhs: &Field, op: PredicateOp) -> bool {
    match (lhs, rhs) {
        (Field::Int(a), Field::Int(b)) => ordered(a.cmp(b), op),
        (Field::Char(a), Field::Char(b)) => ordered(a.cmp(b), op),
        (Field::Double(a), Field::Double(b)) => partial(a.partial_cmp(b), op),
        (Field::Int(a), Field::Double(b)) => partial((*a as f64).partial_cmp(b), op),
        (Field::Double(a), Field::Int(b)) => partial(a.partial_cmp(&(*b as f64)), op),
        _ => false,
    }
}

fn ordered(ord: Ordering, op: PredicateOp) -> bool {
    match op {
        PredicateOp::Eq => ord == Ordering::Equal,
        PredicateOp::Ne => ord != Ordering::Equal,
        PredicateOp::Lt => ord == Ordering::Less,
        PredicateOp::Le => ord != Ordering::Greater,
        PredicateOp::Gt => ord == Ordering::Greater,
        PredicateOp::Ge => ord != Ordering::Less,
    }
}

fn partial(ord: Option<Ordering>, op: PredicateOp) -> bool {
    ord.is_some_and(|ord| ordered(ord, op))
}

/// Group key with a total order, so grouped output is emitted in ascending
/// group-value order
#[derive(Debug, Clone, PartialEq)]
struct GroupKey(Field);

impl Eq for GroupKey {}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        fn rank(f: &Field) -> u8 {
            match f {
                Field::Int(_) => 0,
                Field::Double(_) => 1,
                Field::Char(_) => 2,
            }
        }
        match (&self.0, &other.0) {
            (Field::Int(a), Field::Int(b)) => a.cmp(b),
            (Field::Double(a), Field::Double(b)) => a.total_cmp(b),
            (Field::Char(a), Field::Char(b)) => a.cmp(b),
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }
}

/// Running state for one group
struct Accumulator {
    count: i32,
    sum: f64,
    min: Option<Field>,
    max: Option<Field>,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: None,
            max: None,
        }
    }

    fn add(&mut self, value: &Field) {
        self.count += 1;
        self.sum += match value {
            Field::Int(v) => *v as f64,
            Field::Double(v) => *v,
            Field::Char(_) => 0.0,
        };
        if !self
            .min
            .as_ref()
            .is_some_and(|min| compare(min, value, PredicateOp::Le))
        {
            self.min = Some(value.clone());
        }
        if !self
            .max
            .as_ref()
            .is_some_and(|max| compare(max, value, PredicateOp::Ge))
        {
            self.max = Some(value.clone());
        }
    }

    fn result(&self, op: AggregateOp, int_source: bool) -> Field {
        match op {
            AggregateOp::Count => Field::Int(self.count),
            AggregateOp::Avg => Field::Double(if self.count == 0 {
                0.0
            } else {
                self.sum / self.count as f64
            }),
            // SUM keeps the input column's numeric type
            AggregateOp::Sum => {
                if int_source {
                    Field::Int(self.sum as i32)
                } else {
                    Field::Double(self.sum)
                }
            }
            AggregateOp::Min => self.min.clone().unwrap_or(Field::Int(0)),
            AggregateOp::Max => self.max.clone().unwrap_or(Field::Int(0)),
        }
    }
}

/// Append each input tuple's named columns, in the order named, to `out`.
/// Duplicate names are allowed.
pub fn projection(
    db: &mut Database,
    input: &dyn DbFile,
    out: &dyn DbFile,
    field_names: &[&str],
) -> DbResult<()> {
    let td = input.desc();
    let indices: Vec<usize> = field_names
        .iter()
        .map(|name| td.index_of(name))
        .collect::<Result<_, _>>()?;

    let mut it = input.begin(db)?;
    while it != input.end() {
        let tuple = input.tuple_at(db, &it)?;
        let fields = indices.iter().map(|&i| tuple.field(i).clone()).collect();
        out.insert(db, &Tuple::new(fields))?;
        input.advance(db, &mut it)?;
    }

    Ok(())
}

/// Append the input tuples satisfying every predicate to `out`
pub fn filter(
    db: &mut Database,
    input: &dyn DbFile,
    out: &dyn DbFile,
    predicates: &[FilterPredicate],
) -> DbResult<()> {
    let td = input.desc();
    let resolved: Vec<(usize, PredicateOp, &Field)> = predicates
        .iter()
        .map(|p| Ok((td.index_of(&p.field)?, p.op, &p.value)))
        .collect::<DbResult<_>>()?;

    let mut it = input.begin(db)?;
    while it != input.end() {
        let tuple = input.tuple_at(db, &it)?;
        let satisfied = resolved
            .iter()
            .all(|&(i, op, value)| compare(tuple.field(i), value, op));
        if satisfied {
            out.insert(db, &tuple)?;
        }
        input.advance(db, &mut it)?;
    }

    Ok(())
}

/// Aggregate one column of the input into `out`.
///
/// With a group column, one output row per group in ascending group-value
/// order: `(group_value, aggregate)`. Without one, a single row; an empty
/// input still yields one row whose zero value matches the aggregated
/// column's type (COUNT is an int zero and AVG a double zero regardless).
pub fn aggregate(
    db: &mut Database,
    input: &dyn DbFile,
    out: &dyn DbFile,
    agg: &Aggregate,
) -> DbResult<()> {
    let td = input.desc();
    let field_idx = td.index_of(&agg.field)?;
    let int_source = td.field_type(field_idx) == FieldType::Int;
    let group_idx = match &agg.group {
        Some(name) => Some(td.index_of(name)?),
        None => None,
    };

    let mut groups: BTreeMap<GroupKey, Accumulator> = BTreeMap::new();

    let mut it = input.begin(db)?;
    while it != input.end() {
        let tuple = input.tuple_at(db, &it)?;
        let key = match group_idx {
            Some(i) => tuple.field(i).clone(),
            None => Field::Int(0),
        };
        groups
            .entry(GroupKey(key))
            .or_insert_with(Accumulator::new)
            .add(tuple.field(field_idx));
        input.advance(db, &mut it)?;
    }

    if groups.is_empty() && group_idx.is_none() {
        let zero = match agg.op {
            AggregateOp::Count => Field::Int(0),
            AggregateOp::Avg => Field::Double(0.0),
            _ if int_source => Field::Int(0),
            _ => Field::Double(0.0),
        };
        out.insert(db, &Tuple::new(vec![zero]))?;
        return Ok(());
    }

    for (key, acc) in &groups {
        let mut fields = Vec::with_capacity(2);
        if group_idx.is_some() {
            fields.push(key.0.clone());
        }
        fields.push(acc.result(agg.op, int_source));
        out.insert(db, &Tuple::new(fields))?;
    }

    Ok(())
}

/// Nested-loop join of `left` and `right` into `out`.
///
/// Matching rows are emitted as the left tuple followed by the right
/// tuple; an equality join drops the right key column so the join key
/// appears once.
pub fn join(
    db: &mut Database,
    left: &dyn DbFile,
    right: &dyn DbFile,
    out: &dyn DbFile,
    pred: &JoinPredicate,
) -> DbResult<()> {
    let left_idx = left.desc().index_of(&pred.left)?;
    let right_idx = right.desc().index_of(&pred.right)?;

    let mut left_it = left.begin(db)?;
    while left_it != left.end() {
        let left_tuple = left.tuple_at(db, &left_it)?;
        let left_value = left_tuple.field(left_idx).clone();

        let mut right_it = right.begin(db)?;
        while right_it != right.end() {
            let right_tuple = right.tuple_at(db, &right_it)?;

            if compare(&left_value, right_tuple.field(right_idx), pred.op) {
                let mut fields: Vec<Field> = left_tuple.fields().to_vec();
                for (i, field) in right_tuple.fields().iter().enumerate() {
                    if pred.op == PredicateOp::Eq && i == right_idx {
                        continue;
                    }
                    fields.push(field.clone());
                }
                out.insert(db, &Tuple::new(fields))?;
            }

            right.advance(db, &mut right_it)?;
        }

        left.advance(db, &mut left_it)?;
    }

    Ok(())
}
