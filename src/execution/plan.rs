use super::ExecutionError;
use crate::catalog::{ColumnEntry, IndexEntry};
use crate::datum::Datum;
use crate::expr::{compare_datums, literal_to_datum};
use crate::sql::ast::{BinaryOp, ColumnRef, Expression, Literal};
use itertools::Itertools;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Per-column conjunctive constraints gathered from the WHERE tree.
#[derive(Debug, Default, Clone)]
pub struct ColumnPredicate {
    pub equality: Option<Datum>,
    pub lower: Option<(Datum, bool)>,
    pub upper: Option<(Datum, bool)>,
}

#[derive(Debug, Default)]
pub struct PredicateSet {
    pub by_column: HashMap<u32, ColumnPredicate>,
    /// the conjunction can never be True; the statement yields zero rows
    pub contradictory: bool,
}

/// How the executor reaches the table's rows.
#[derive(Debug)]
pub enum AccessPath {
    SeqScan,
    IndexEqual {
        entry: IndexEntry,
        values: Vec<Datum>,
    },
    IndexRange {
        entry: IndexEntry,
        lower: Option<(Datum, bool)>,
        upper: Option<(Datum, bool)>,
    },
    /// index scan chosen purely for its output order
    IndexOrdered { entry: IndexEntry, reverse: bool },
}

/// Walk AND-connected comparisons with a column on one side and a
/// literal of the column's type on the other. Anything else is left for
/// row-at-a-time evaluation.
pub fn extract_predicates(
    where_clause: Option<&Expression>,
    columns: &[ColumnEntry],
    table: &str,
    alias: Option<&str>,
) -> PredicateSet {
    let mut set = PredicateSet::default();
    if let Some(expr) = where_clause {
        visit_conjunct(expr, columns, table, alias, &mut set);
    }
    for predicate in set.by_column.values() {
        if contradicts(predicate) {
            set.contradictory = true;
        }
    }
    set
}

fn visit_conjunct(
    expr: &Expression,
    columns: &[ColumnEntry],
    table: &str,
    alias: Option<&str>,
    set: &mut PredicateSet,
) {
    match expr {
        Expression::Binary {
            op: BinaryOp::And,
            lhs,
            rhs,
        } => {
            visit_conjunct(lhs, columns, table, alias, set);
            visit_conjunct(rhs, columns, table, alias, set);
        }
        Expression::Binary { op, lhs, rhs } => {
            let comparison = match (lhs.as_ref(), rhs.as_ref()) {
                (Expression::Column(column), Expression::Literal(literal)) => {
                    Some((column, literal, *op))
                }
                (Expression::Literal(literal), Expression::Column(column)) => {
                    mirror(*op).map(|op| (column, literal, op))
                }
                _ => None,
            };
            if let Some((column_ref, literal, op)) = comparison {
                apply_comparison(column_ref, literal, op, columns, table, alias, set);
            }
        }
        _ => {}
    }
}

fn mirror(op: BinaryOp) -> Option<BinaryOp> {
    match op {
        BinaryOp::Eq => Some(BinaryOp::Eq),
        BinaryOp::Lt => Some(BinaryOp::Gt),
        BinaryOp::LtEq => Some(BinaryOp::GtEq),
        BinaryOp::Gt => Some(BinaryOp::Lt),
        BinaryOp::GtEq => Some(BinaryOp::LtEq),
        _ => None,
    }
}

fn resolve_column<'a>(
    column_ref: &ColumnRef,
    columns: &'a [ColumnEntry],
    table: &str,
    alias: Option<&str>,
) -> Option<&'a ColumnEntry> {
    if let Some(qualifier) = &column_ref.table {
        let matches_table = qualifier.eq_ignore_ascii_case(table)
            || alias.map_or(false, |a| qualifier.eq_ignore_ascii_case(a));
        if !matches_table {
            return None;
        }
    }
    columns
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(&column_ref.column))
}

fn apply_comparison(
    column_ref: &ColumnRef,
    literal: &Literal,
    op: BinaryOp,
    columns: &[ColumnEntry],
    table: &str,
    alias: Option<&str>,
    set: &mut PredicateSet,
) {
    let column = match resolve_column(column_ref, columns, table, alias) {
        Some(column) => column,
        None => return,
    };
    let value = match literal_to_datum(literal, Some(column.data_type)) {
        Ok(value) => value,
        Err(_) => return,
    };
    if value.is_null() {
        // a NULL comparison is never True
        set.contradictory = true;
        return;
    }
    let predicate = set.by_column.entry(column.column_id).or_default();
    match op {
        BinaryOp::Eq => match &predicate.equality {
            Some(existing) => {
                if !matches!(
                    compare_datums(existing, &value),
                    Ok(Some(Ordering::Equal))
                ) {
                    set.contradictory = true;
                }
            }
            None => predicate.equality = Some(value),
        },
        BinaryOp::Lt => tighten_upper(predicate, value, false),
        BinaryOp::LtEq => tighten_upper(predicate, value, true),
        BinaryOp::Gt => tighten_lower(predicate, value, false),
        BinaryOp::GtEq => tighten_lower(predicate, value, true),
        _ => {}
    }
}

fn tighten_lower(predicate: &mut ColumnPredicate, value: Datum, inclusive: bool) {
    let replace = match &predicate.lower {
        Some((current, current_inclusive)) => match compare_datums(&value, current) {
            Ok(Some(Ordering::Greater)) => true,
            Ok(Some(Ordering::Equal)) => *current_inclusive && !inclusive,
            _ => false,
        },
        None => true,
    };
    if replace {
        predicate.lower = Some((value, inclusive));
    }
}

fn tighten_upper(predicate: &mut ColumnPredicate, value: Datum, inclusive: bool) {
    let replace = match &predicate.upper {
        Some((current, current_inclusive)) => match compare_datums(&value, current) {
            Ok(Some(Ordering::Less)) => true,
            Ok(Some(Ordering::Equal)) => *current_inclusive && !inclusive,
            _ => false,
        },
        None => true,
    };
    if replace {
        predicate.upper = Some((value, inclusive));
    }
}

fn contradicts(predicate: &ColumnPredicate) -> bool {
    if let (Some((lower, lower_inclusive)), Some((upper, upper_inclusive))) =
        (&predicate.lower, &predicate.upper)
    {
        match compare_datums(lower, upper) {
            Ok(Some(Ordering::Greater)) => return true,
            Ok(Some(Ordering::Equal)) if !(*lower_inclusive && *upper_inclusive) => return true,
            _ => {}
        }
    }
    if let Some(equality) = &predicate.equality {
        if let Some((lower, inclusive)) = &predicate.lower {
            match compare_datums(equality, lower) {
                Ok(Some(Ordering::Less)) => return true,
                Ok(Some(Ordering::Equal)) if !inclusive => return true,
                _ => {}
            }
        }
        if let Some((upper, inclusive)) = &predicate.upper {
            match compare_datums(equality, upper) {
                Ok(Some(Ordering::Greater)) => return true,
                Ok(Some(Ordering::Equal)) if !inclusive => return true,
                _ => {}
            }
        }
    }
    false
}

/// Pick the access path: widest index fully covered by equality
/// predicates, then a single-column equality, then a single-column
/// range, then an order-matching index scan, then the sequential scan.
pub fn select_access_path(
    predicates: &PredicateSet,
    indexes: &[IndexEntry],
    order_by: &[(u32, bool)],
) -> Result<AccessPath, ExecutionError> {
    let equality_covered = indexes
        .iter()
        .filter(|index| {
            !index.column_ids.is_empty()
                && index.column_ids.iter().all(|column_id| {
                    predicates
                        .by_column
                        .get(column_id)
                        .map_or(false, |p| p.equality.is_some())
                })
        })
        .max_by_key(|index| index.column_ids.len());
    if let Some(entry) = equality_covered {
        let values = entry
            .column_ids
            .iter()
            .map(|column_id| {
                predicates.by_column[column_id]
                    .equality
                    .clone()
                    .ok_or_else(|| ExecutionError::Internal("lost equality predicate".to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(AccessPath::IndexEqual {
            entry: entry.clone(),
            values,
        });
    }
    for index in indexes {
        if index.column_ids.len() != 1 {
            continue;
        }
        if let Some(predicate) = predicates.by_column.get(&index.column_ids[0]) {
            if predicate.lower.is_some() || predicate.upper.is_some() {
                return Ok(AccessPath::IndexRange {
                    entry: index.clone(),
                    lower: predicate.lower.clone(),
                    upper: predicate.upper.clone(),
                });
            }
        }
    }
    if !order_by.is_empty() {
        let all_asc = order_by.iter().all(|(_, desc)| !desc);
        let all_desc = order_by.iter().all(|(_, desc)| *desc);
        if all_asc || all_desc {
            let wanted = order_by.iter().map(|(column_id, _)| *column_id).collect_vec();
            for index in indexes {
                if index.column_ids.len() >= wanted.len()
                    && index.column_ids[..wanted.len()] == wanted[..]
                {
                    return Ok(AccessPath::IndexOrdered {
                        entry: index.clone(),
                        reverse: all_desc,
                    });
                }
            }
        }
    }
    Ok(AccessPath::SeqScan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnConstraint;
    use crate::datum::DataType;
    use crate::sql::ast::Statement;
    use crate::sql::parse;
    use crate::storage::INVALID_PAGE_ID;

    fn columns() -> Vec<ColumnEntry> {
        [
            ("id", DataType::Int, 1u32),
            ("name", DataType::Varchar(32), 2),
            ("age", DataType::Int, 3),
        ]
        .into_iter()
        .enumerate()
        .map(|(idx, (name, data_type, column_id))| ColumnEntry {
            table_id: 1,
            column_id,
            ordinal_position: idx as u16,
            schema_version: 1,
            is_dropped: false,
            name: name.to_string(),
            data_type,
            constraint: ColumnConstraint::default(),
        })
        .collect()
    }

    fn index(name: &str, column_ids: Vec<u32>) -> IndexEntry {
        IndexEntry {
            index_id: 1,
            table_id: 1,
            name: name.to_string(),
            column_ids,
            is_unique: false,
            is_primary: false,
            root_page_id: INVALID_PAGE_ID,
            create_sql: String::new(),
        }
    }

    fn where_of(sql: &str) -> Option<Expression> {
        match parse(sql).unwrap() {
            Statement::Select(select) => select.where_clause,
            _ => panic!(),
        }
    }

    fn extract(sql: &str) -> PredicateSet {
        extract_predicates(where_of(sql).as_ref(), &columns(), "t", None)
    }

    #[test]
    fn equality_and_bounds() {
        let set = extract("SELECT id FROM t WHERE id = 5 AND age > 30 AND age <= 40");
        assert!(!set.contradictory);
        assert_eq!(set.by_column[&1].equality, Some(Datum::Int(Some(5))));
        assert_eq!(set.by_column[&3].lower, Some((Datum::Int(Some(30)), false)));
        assert_eq!(set.by_column[&3].upper, Some((Datum::Int(Some(40)), true)));
    }

    #[test]
    fn mirrored_and_tightened() {
        let set = extract("SELECT id FROM t WHERE 10 < age AND age > 20 AND 50 >= age");
        let predicate = &set.by_column[&3];
        assert_eq!(predicate.lower, Some((Datum::Int(Some(20)), false)));
        assert_eq!(predicate.upper, Some((Datum::Int(Some(50)), true)));
    }

    #[test]
    fn contradictions_short_circuit() {
        assert!(extract("SELECT id FROM t WHERE id = 5 AND id = 6").contradictory);
        assert!(extract("SELECT id FROM t WHERE age > 10 AND age < 5").contradictory);
        assert!(extract("SELECT id FROM t WHERE age > 10 AND age = 3").contradictory);
        assert!(extract("SELECT id FROM t WHERE id = NULL").contradictory);
        assert!(!extract("SELECT id FROM t WHERE age >= 10 AND age <= 10").contradictory);
    }

    #[test]
    fn or_trees_are_not_extracted() {
        let set = extract("SELECT id FROM t WHERE id = 5 OR age > 30");
        assert!(set.by_column.is_empty());
    }

    #[test]
    fn widest_equality_index_wins() {
        let set = extract("SELECT id FROM t WHERE id = 5 AND age = 30");
        let indexes = vec![index("idx_id", vec![1]), index("idx_id_age", vec![1, 3])];
        match select_access_path(&set, &indexes, &[]).unwrap() {
            AccessPath::IndexEqual { entry, values } => {
                assert_eq!(entry.name, "idx_id_age");
                assert_eq!(values.len(), 2);
            }
            other => panic!("unexpected path {:?}", other),
        }
    }

    #[test]
    fn range_falls_back_to_single_column() {
        let set = extract("SELECT id FROM t WHERE age > 30");
        let indexes = vec![index("idx_age", vec![3])];
        match select_access_path(&set, &indexes, &[]).unwrap() {
            AccessPath::IndexRange { entry, lower, upper } => {
                assert_eq!(entry.name, "idx_age");
                assert!(lower.is_some() && upper.is_none());
            }
            other => panic!("unexpected path {:?}", other),
        }
    }

    #[test]
    fn order_by_drives_index_when_no_predicate() {
        let set = extract("SELECT id FROM t");
        let indexes = vec![index("idx_id", vec![1])];
        match select_access_path(&set, &indexes, &[(1, false)]).unwrap() {
            AccessPath::IndexOrdered { entry, reverse } => {
                assert_eq!(entry.name, "idx_id");
                assert!(!reverse);
            }
            other => panic!("unexpected path {:?}", other),
        }
        match select_access_path(&set, &indexes, &[(1, true)]).unwrap() {
            AccessPath::IndexOrdered { reverse, .. } => assert!(reverse),
            other => panic!("unexpected path {:?}", other),
        }
        // mixed directions cannot ride the index
        assert!(matches!(
            select_access_path(&set, &index_pair(), &[(1, false), (3, true)]).unwrap(),
            AccessPath::SeqScan
        ));
    }

    fn index_pair() -> Vec<IndexEntry> {
        vec![index("idx_id_age", vec![1, 3])]
    }

    #[test]
    fn no_index_means_seq_scan() {
        let set = extract("SELECT id FROM t WHERE name = 'amy'");
        assert!(matches!(
            select_access_path(&set, &[], &[]).unwrap(),
            AccessPath::SeqScan
        ));
    }
}
