use crate::catalog::ColumnEntry;
use crate::datum::{DataType, Datum};
use crate::sql::ast::{BinaryOp, ColumnRef, Expression, Literal};
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;

/// Three-valued predicate logic. `Unknown` never widens to a boolean
/// until the final WHERE/JOIN admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriBool {
    False,
    True,
    Unknown,
}

impl TriBool {
    pub fn from_bool(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }
    pub fn not(self) -> Self {
        match self {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Unknown => Self::Unknown,
        }
    }
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::False, _) | (_, Self::False) => Self::False,
            (Self::True, Self::True) => Self::True,
            _ => Self::Unknown,
        }
    }
    pub fn or(self, other: Self) -> Self {
        match (self, other) {
            (Self::True, _) | (_, Self::True) => Self::True,
            (Self::False, Self::False) => Self::False,
            _ => Self::Unknown,
        }
    }
    /// the admission decision: a row passes only on `True`
    pub fn is_true(self) -> bool {
        self == Self::True
    }
}

#[derive(Debug, Clone, Copy)]
struct ColumnBinding {
    index: usize,
    data_type: DataType,
    ambiguous: bool,
}

/// Maps every usable column spelling (`col`, `table.col`, `alias.col`)
/// to a row index and type. Duplicate spellings from distinct sources
/// are marked ambiguous and rejected only when actually referenced.
pub struct Evaluator {
    bindings: HashMap<String, ColumnBinding>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    pub fn from_columns(columns: &[ColumnEntry], table: &str, alias: Option<&str>) -> Self {
        let mut evaluator = Self::new();
        evaluator.add_source(columns, table, alias, 0);
        evaluator
    }

    /// register one table's columns starting at `base` in the flat row
    pub fn add_source(
        &mut self,
        columns: &[ColumnEntry],
        table: &str,
        alias: Option<&str>,
        base: usize,
    ) {
        for (offset, column) in columns.iter().enumerate() {
            let index = base + offset;
            self.register(&column.name, index, column.data_type);
            self.register(&format!("{}.{}", table, column.name), index, column.data_type);
            if let Some(alias) = alias {
                self.register(&format!("{}.{}", alias, column.name), index, column.data_type);
            }
        }
    }

    fn register(&mut self, key: &str, index: usize, data_type: DataType) {
        let key = key.to_ascii_lowercase();
        match self.bindings.get_mut(&key) {
            Some(binding) => binding.ambiguous = true,
            None => {
                self.bindings.insert(
                    key,
                    ColumnBinding {
                        index,
                        data_type,
                        ambiguous: false,
                    },
                );
            }
        }
    }

    pub fn resolve(&self, column: &ColumnRef) -> Result<(usize, DataType), ExprError> {
        let key = match &column.table {
            Some(table) => format!("{}.{}", table, column.column),
            None => column.column.clone(),
        }
        .to_ascii_lowercase();
        let binding = self
            .bindings
            .get(&key)
            .ok_or_else(|| ExprError::ColumnNotFound(display_ref(column)))?;
        if binding.ambiguous {
            return Err(ExprError::AmbiguousColumn(display_ref(column)));
        }
        Ok((binding.index, binding.data_type))
    }

    /// static type of an expression when it is a plain column reference
    fn column_type(&self, expr: &Expression) -> Option<DataType> {
        match expr {
            Expression::Column(column) => self.resolve(column).ok().map(|(_, t)| t),
            _ => None,
        }
    }

    pub fn eval_scalar(
        &self,
        expr: &Expression,
        row: &[Datum],
        hint: Option<DataType>,
    ) -> Result<Datum, ExprError> {
        match expr {
            Expression::Literal(literal) => literal_to_datum(literal, hint),
            Expression::Column(column) => {
                let (index, _) = self.resolve(column)?;
                row.get(index).cloned().ok_or_else(|| {
                    ExprError::Internal(format!("row has no value at index {}", index))
                })
            }
            Expression::Not(_) | Expression::Binary { .. } | Expression::NullTest { .. } => {
                Ok(match self.eval_predicate(expr, row)? {
                    TriBool::True => Datum::Bool(Some(true)),
                    TriBool::False => Datum::Bool(Some(false)),
                    TriBool::Unknown => Datum::Bool(None),
                })
            }
        }
    }

    pub fn eval_predicate(&self, expr: &Expression, row: &[Datum]) -> Result<TriBool, ExprError> {
        match expr {
            Expression::Not(operand) => Ok(self.eval_predicate(operand, row)?.not()),
            Expression::NullTest { operand, negated } => {
                let value = self.eval_scalar(operand, row, None)?;
                let is_null = value.is_null();
                Ok(TriBool::from_bool(is_null != *negated))
            }
            Expression::Binary { op, lhs, rhs } => match op {
                BinaryOp::And => {
                    let lhs = self.eval_predicate(lhs, row)?;
                    if lhs == TriBool::False {
                        return Ok(TriBool::False);
                    }
                    Ok(lhs.and(self.eval_predicate(rhs, row)?))
                }
                BinaryOp::Or => {
                    let lhs = self.eval_predicate(lhs, row)?;
                    if lhs == TriBool::True {
                        return Ok(TriBool::True);
                    }
                    Ok(lhs.or(self.eval_predicate(rhs, row)?))
                }
                _ => self.eval_comparison(*op, lhs, rhs, row),
            },
            Expression::Literal(_) | Expression::Column(_) => {
                let value = self.eval_scalar(expr, row, Some(DataType::Bool))?;
                match value {
                    Datum::Bool(Some(value)) => Ok(TriBool::from_bool(value)),
                    Datum::Bool(None) => Ok(TriBool::Unknown),
                    other if other.is_null() => Ok(TriBool::Unknown),
                    other => Err(ExprError::TypeError(format!(
                        "predicate must be boolean, got {}",
                        other
                    ))),
                }
            }
        }
    }

    fn eval_comparison(
        &self,
        op: BinaryOp,
        lhs: &Expression,
        rhs: &Expression,
        row: &[Datum],
    ) -> Result<TriBool, ExprError> {
        // a literal opposite a column is coerced toward the column type
        let lhs_value = self.eval_scalar(lhs, row, self.column_type(rhs))?;
        let rhs_value = self.eval_scalar(rhs, row, self.column_type(lhs))?;
        let ordering = match compare_datums(&lhs_value, &rhs_value)? {
            Some(ordering) => ordering,
            None => return Ok(TriBool::Unknown),
        };
        let result = match op {
            BinaryOp::Eq => ordering == Ordering::Equal,
            BinaryOp::NotEq => ordering != Ordering::Equal,
            BinaryOp::Lt => ordering == Ordering::Less,
            BinaryOp::LtEq => ordering != Ordering::Greater,
            BinaryOp::Gt => ordering == Ordering::Greater,
            BinaryOp::GtEq => ordering != Ordering::Less,
            BinaryOp::And | BinaryOp::Or => {
                return Err(ExprError::Internal("logical op in comparison".to_string()))
            }
        };
        Ok(TriBool::from_bool(result))
    }
}

fn display_ref(column: &ColumnRef) -> String {
    match &column.table {
        Some(table) => format!("{}.{}", table, column.column),
        None => column.column.clone(),
    }
}

/// Interpret a literal against an optional target type.
pub fn literal_to_datum(literal: &Literal, hint: Option<DataType>) -> Result<Datum, ExprError> {
    match (literal, hint) {
        (Literal::Null, Some(target)) => Ok(Datum::null_of(target)),
        (Literal::Null, None) => Ok(Datum::Text(None)),
        (Literal::Bool(value), Some(DataType::Bool) | None) => Ok(Datum::Bool(Some(*value))),
        (Literal::Integer(value), Some(DataType::Bool)) => Ok(Datum::Bool(Some(*value != 0))),
        (Literal::Integer(value), Some(DataType::Int)) => {
            i32::try_from(*value)
                .map(|v| Datum::Int(Some(v)))
                .map_err(|_| ExprError::TypeError(format!("{} does not fit INTEGER", value)))
        }
        (Literal::Integer(value), Some(DataType::BigInt) | None) => Ok(Datum::BigInt(Some(*value))),
        (Literal::Integer(value), Some(DataType::Date)) => Ok(Datum::Date(Some(*value))),
        (Literal::Integer(value), Some(DataType::Timestamp)) => {
            Ok(Datum::Timestamp(Some(*value)))
        }
        (Literal::Integer(value), Some(DataType::Float)) => {
            Ok(Datum::Float(Some(*value as f32)))
        }
        (Literal::Integer(value), Some(DataType::Double)) => {
            Ok(Datum::Double(Some(*value as f64)))
        }
        (Literal::Decimal(value), Some(DataType::Float)) => Ok(Datum::Float(Some(*value as f32))),
        (Literal::Decimal(value), Some(DataType::Double) | None) => {
            Ok(Datum::Double(Some(*value)))
        }
        (Literal::String(value), Some(DataType::Varchar(_))) => {
            Ok(Datum::Varchar(Some(value.clone())))
        }
        (Literal::String(value), Some(DataType::Text) | None) => {
            Ok(Datum::Text(Some(value.clone())))
        }
        (Literal::String(value), Some(DataType::Date)) => match Datum::parse_date(value) {
            Some(days) => Ok(Datum::Date(Some(days))),
            None => Err(ExprError::TypeError(format!(
                "'{}' is not a YYYY-MM-DD date",
                value
            ))),
        },
        (Literal::String(value), Some(DataType::Bool)) => match value.to_ascii_uppercase().as_str()
        {
            "TRUE" => Ok(Datum::Bool(Some(true))),
            "FALSE" => Ok(Datum::Bool(Some(false))),
            _ => Err(ExprError::TypeError(format!(
                "'{}' is not a boolean",
                value
            ))),
        },
        (literal, Some(target)) => Err(ExprError::TypeError(format!(
            "literal {:?} is not compatible with {}",
            literal, target
        ))),
    }
}

/// `None` means the comparison involved NULL and is Unknown.
pub fn compare_datums(lhs: &Datum, rhs: &Datum) -> Result<Option<Ordering>, ExprError> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(None);
    }
    match (lhs, rhs) {
        (Datum::Bool(Some(a)), Datum::Bool(Some(b))) => Ok(Some(a.cmp(b))),
        (Datum::Date(Some(a)), Datum::Date(Some(b))) => Ok(Some(a.cmp(b))),
        (Datum::Timestamp(Some(a)), Datum::Timestamp(Some(b))) => Ok(Some(a.cmp(b))),
        (Datum::Date(_), _) | (_, Datum::Date(_)) => Err(ExprError::TypeError(
            "DATE compares only with DATE".to_string(),
        )),
        (Datum::Timestamp(_), _) | (_, Datum::Timestamp(_)) => Err(ExprError::TypeError(
            "TIMESTAMP compares only with TIMESTAMP".to_string(),
        )),
        _ => {
            if let (Some(a), Some(b)) = (lhs.as_str(), rhs.as_str()) {
                return Ok(Some(a.cmp(b)));
            }
            // INTEGER widens to BIGINT, both widen to DOUBLE
            if matches!(lhs, Datum::Int(_) | Datum::BigInt(_))
                && matches!(rhs, Datum::Int(_) | Datum::BigInt(_))
            {
                let (a, b) = (lhs.as_i64(), rhs.as_i64());
                if let (Some(a), Some(b)) = (a, b) {
                    return Ok(Some(a.cmp(&b)));
                }
            }
            match (lhs.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => Ok(Some(a.partial_cmp(&b).unwrap_or(Ordering::Equal))),
                _ => Err(ExprError::TypeError(format!(
                    "cannot compare {} with {}",
                    lhs, rhs
                ))),
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum ExprError {
    #[error("column '{0}' not found")]
    ColumnNotFound(String),
    #[error("ambiguous column '{0}'")]
    AmbiguousColumn(String),
    #[error("type error: {0}")]
    TypeError(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnConstraint;
    use crate::sql::parse;
    use crate::sql::ast::Statement;

    fn column_entry(name: &str, data_type: DataType) -> ColumnEntry {
        ColumnEntry {
            table_id: 1,
            column_id: 0,
            ordinal_position: 0,
            schema_version: 1,
            is_dropped: false,
            name: name.to_string(),
            data_type,
            constraint: ColumnConstraint::default(),
        }
    }

    fn where_expr(sql: &str) -> Expression {
        match parse(sql).unwrap() {
            Statement::Select(select) => select.where_clause.unwrap(),
            _ => panic!("expected SELECT"),
        }
    }

    fn employees_evaluator() -> Evaluator {
        Evaluator::from_columns(
            &[
                column_entry("id", DataType::Int),
                column_entry("name", DataType::Varchar(32)),
                column_entry("active", DataType::Bool),
                column_entry("age", DataType::Int),
                column_entry("joined", DataType::Date),
            ],
            "employees",
            Some("e"),
        )
    }

    fn sample_row() -> Vec<Datum> {
        vec![
            Datum::Int(Some(1)),
            Datum::Varchar(Some("amy".to_string())),
            Datum::Bool(Some(true)),
            Datum::Int(None),
            Datum::Date(Datum::parse_date("2023-05-01")),
        ]
    }

    #[test]
    fn tribool_kernels() {
        use TriBool::*;
        assert_eq!(True.and(Unknown), Unknown);
        assert_eq!(False.and(Unknown), False);
        assert_eq!(True.or(Unknown), True);
        assert_eq!(False.or(Unknown), Unknown);
        assert_eq!(Unknown.not(), Unknown);
        assert!(!Unknown.is_true());
    }

    #[test]
    fn null_comparisons_are_unknown() {
        let evaluator = employees_evaluator();
        let row = sample_row();
        // age is NULL
        let expr = where_expr("SELECT id FROM employees WHERE age >= 30");
        assert_eq!(evaluator.eval_predicate(&expr, &row).unwrap(), TriBool::Unknown);
        let expr = where_expr("SELECT id FROM employees WHERE active OR age >= 30");
        assert_eq!(evaluator.eval_predicate(&expr, &row).unwrap(), TriBool::True);
        let expr = where_expr("SELECT id FROM employees WHERE NOT age >= 30");
        assert_eq!(evaluator.eval_predicate(&expr, &row).unwrap(), TriBool::Unknown);
    }

    #[test]
    fn null_test() {
        let evaluator = employees_evaluator();
        let row = sample_row();
        let expr = where_expr("SELECT id FROM employees WHERE age IS NULL");
        assert_eq!(evaluator.eval_predicate(&expr, &row).unwrap(), TriBool::True);
        let expr = where_expr("SELECT id FROM employees WHERE name IS NOT NULL");
        assert_eq!(evaluator.eval_predicate(&expr, &row).unwrap(), TriBool::True);
        let expr = where_expr("SELECT id FROM employees WHERE NULL IS NULL");
        assert_eq!(evaluator.eval_predicate(&expr, &row).unwrap(), TriBool::True);
    }

    #[test]
    fn date_coercion_in_comparison() {
        let evaluator = employees_evaluator();
        let row = sample_row();
        let expr = where_expr("SELECT id FROM employees WHERE joined = '2023-05-01'");
        assert_eq!(evaluator.eval_predicate(&expr, &row).unwrap(), TriBool::True);
        let expr = where_expr("SELECT id FROM employees WHERE joined < '2020-01-01'");
        assert_eq!(evaluator.eval_predicate(&expr, &row).unwrap(), TriBool::False);
        let expr = where_expr("SELECT id FROM employees WHERE joined = 'nonsense'");
        assert!(evaluator.eval_predicate(&expr, &row).is_err());
    }

    #[test]
    fn qualified_and_alias_lookup() {
        let evaluator = employees_evaluator();
        let row = sample_row();
        for spelling in ["id", "employees.id", "e.id"] {
            let expr = where_expr(&format!("SELECT id FROM employees WHERE {} = 1", spelling));
            assert_eq!(evaluator.eval_predicate(&expr, &row).unwrap(), TriBool::True);
        }
        let expr = where_expr("SELECT id FROM employees WHERE missing = 1");
        assert!(matches!(
            evaluator.eval_predicate(&expr, &row),
            Err(ExprError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn ambiguity_detected_only_when_referenced() {
        let mut evaluator = Evaluator::new();
        evaluator.add_source(&[column_entry("id", DataType::Int)], "a", None, 0);
        evaluator.add_source(&[column_entry("id", DataType::Int)], "b", None, 1);
        let row = vec![Datum::Int(Some(1)), Datum::Int(Some(2))];
        let expr = where_expr("SELECT id FROM a WHERE id = 1");
        assert!(matches!(
            evaluator.eval_predicate(&expr, &row),
            Err(ExprError::AmbiguousColumn(_))
        ));
        let expr = where_expr("SELECT id FROM a WHERE a.id = 1");
        assert_eq!(evaluator.eval_predicate(&expr, &row).unwrap(), TriBool::True);
        let expr = where_expr("SELECT id FROM a WHERE b.id = 2");
        assert_eq!(evaluator.eval_predicate(&expr, &row).unwrap(), TriBool::True);
    }

    #[test]
    fn numeric_widening() {
        let mut evaluator = Evaluator::new();
        evaluator.add_source(
            &[
                column_entry("small", DataType::Int),
                column_entry("big", DataType::BigInt),
                column_entry("ratio", DataType::Double),
            ],
            "t",
            None,
            0,
        );
        let row = vec![
            Datum::Int(Some(2)),
            Datum::BigInt(Some(1 << 40)),
            Datum::Double(Some(2.0)),
        ];
        let expr = where_expr("SELECT small FROM t WHERE small < big");
        assert_eq!(evaluator.eval_predicate(&expr, &row).unwrap(), TriBool::True);
        let expr = where_expr("SELECT small FROM t WHERE small = ratio");
        assert_eq!(evaluator.eval_predicate(&expr, &row).unwrap(), TriBool::True);
    }

    #[test]
    fn int_overflow_is_type_error() {
        let evaluator = employees_evaluator();
        let row = sample_row();
        let expr = where_expr("SELECT id FROM employees WHERE id = 3000000000");
        assert!(matches!(
            evaluator.eval_predicate(&expr, &row),
            Err(ExprError::TypeError(_))
        ));
    }
}
