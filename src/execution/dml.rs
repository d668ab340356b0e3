use super::plan::{extract_predicates, select_access_path, AccessPath};
use super::{decode_row, encode_row, load_index_contexts, ExecutionError, IndexContext};
use crate::catalog::{CatalogManagerRef, ColumnEntry, IndexEntry, TableEntry};
use crate::datum::{DataType, Datum};
use crate::expr::{literal_to_datum, Evaluator};
use crate::index::IndexManager;
use crate::record;
use crate::sql::ast::{
    AggregateCall, AggregateFunc, ColumnRef, DeleteStmt, Expression, InsertStmt, SelectItem,
    SelectStmt, TableRef, TruncateStmt, UpdateStmt,
};
use crate::storage::{location_of, record_id_of, PageManagerRef, RecordId};
use crate::table::TableHeap;
use itertools::Itertools;
use log::{debug, info};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

/// Invoked once per statement that probed an index, with the record ids
/// the probe matched. Tests use it to assert the chosen access path.
pub type IndexUsageObserver = Rc<RefCell<dyn FnMut(&IndexEntry, &[RecordId])>>;

/// Typed SELECT result; the session layer renders display strings.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectOutput {
    pub column_names: Vec<String>,
    pub rows: Vec<Vec<Datum>>,
}

pub struct DmlExecutor {
    pm: PageManagerRef,
    catalog: CatalogManagerRef,
    indexes: Rc<IndexManager>,
    observer: Option<IndexUsageObserver>,
}

struct MatchedRows {
    rows: Vec<(crate::storage::RowLocation, Vec<Datum>)>,
    /// the access path already delivered the requested order
    ordered_by_index: bool,
}

impl DmlExecutor {
    pub fn new(
        pm: PageManagerRef,
        catalog: CatalogManagerRef,
        indexes: Rc<IndexManager>,
        observer: Option<IndexUsageObserver>,
    ) -> Self {
        Self {
            pm,
            catalog,
            indexes,
            observer,
        }
    }

    fn table_named(&self, name: &str) -> Result<TableEntry, ExecutionError> {
        self.catalog
            .borrow_mut()
            .table_by_name(name)?
            .ok_or_else(|| ExecutionError::TableNotFound(name.to_string()))
    }

    fn notify_index_use(&self, entry: &IndexEntry, rids: &[RecordId]) {
        if let Some(observer) = &self.observer {
            (observer.borrow_mut())(entry, rids);
        }
    }

    // INSERT

    pub fn insert(&mut self, stmt: &InsertStmt) -> Result<usize, ExecutionError> {
        let table = self.table_named(&stmt.table)?;
        let columns = self.catalog.borrow_mut().columns_of(table.id)?;
        let reorder = self.column_list_mapping(&stmt.columns, &columns)?;
        let mut heap = TableHeap::open(self.pm.clone(), table.root_page_id);
        let index_entries = self.catalog.borrow_mut().indexes_of(table.id)?;
        let mut contexts = load_index_contexts(&self.indexes, index_entries, &columns)?;

        let mut inserted = 0usize;
        for row in &stmt.rows {
            if row.len() != columns.len() {
                return Err(ExecutionError::SchemaMismatch(format!(
                    "{} values for {} columns",
                    row.len(),
                    columns.len()
                )));
            }
            let values = columns
                .iter()
                .enumerate()
                .map(|(ordinal, column)| {
                    let literal = match &reorder {
                        Some(map) => &row[map[ordinal]],
                        None => &row[ordinal],
                    };
                    literal_to_datum(literal, Some(column.data_type))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let payload = encode_row(&columns, &values)?;
            // uniqueness is validated before the heap is touched
            for context in &mut contexts {
                if !context.entry.is_unique {
                    continue;
                }
                let key = context.key_for(&columns, &values)?;
                if context.handle.tree().search(&key)?.is_some() {
                    return Err(ExecutionError::Index(
                        crate::index::IndexError::DuplicateKey(format!(
                            "unique index '{}'",
                            context.entry.name
                        )),
                    ));
                }
            }
            let loc = heap.insert(&payload)?;
            let rid = record_id_of(loc);
            for context in &mut contexts {
                let key = context.key_for(&columns, &values)?;
                context.handle.tree().insert(&key, rid)?;
                self.sync_index_root(context)?;
            }
            inserted += 1;
        }
        info!("dml: inserted {} rows into '{}'", inserted, stmt.table);
        Ok(inserted)
    }

    /// Map table ordinals to positions in the statement's column list.
    /// Partial lists are rejected: the count must match and every table
    /// column must appear.
    fn column_list_mapping(
        &self,
        listed: &[String],
        columns: &[ColumnEntry],
    ) -> Result<Option<Vec<usize>>, ExecutionError> {
        if listed.is_empty() {
            return Ok(None);
        }
        if listed.len() != columns.len() {
            return Err(ExecutionError::SchemaMismatch(format!(
                "INSERT lists {} columns, table has {}",
                listed.len(),
                columns.len()
            )));
        }
        let map = columns
            .iter()
            .map(|column| {
                listed
                    .iter()
                    .position(|name| name.eq_ignore_ascii_case(&column.name))
                    .ok_or_else(|| {
                        ExecutionError::SchemaMismatch(format!(
                            "column '{}' missing from INSERT column list",
                            column.name
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(map))
    }

    /// Tree writes persist their root to the catalog immediately, so a
    /// failed statement cannot leave the catalog pointing below a new
    /// root.
    fn sync_index_root(&self, context: &mut IndexContext) -> Result<(), ExecutionError> {
        let root = context.handle.tree_ref().root_page_id();
        if root != context.entry.root_page_id {
            self.catalog
                .borrow_mut()
                .set_index_root(context.entry.index_id, root)?;
            context.entry.root_page_id = root;
        }
        Ok(())
    }

    // row collection shared by single-table SELECT/UPDATE/DELETE

    fn collect_rows(
        &mut self,
        table: &TableEntry,
        columns: &[ColumnEntry],
        alias: Option<&str>,
        where_clause: Option<&Expression>,
        evaluator: &Evaluator,
        order_by: &[(u32, bool)],
    ) -> Result<MatchedRows, ExecutionError> {
        let predicates = extract_predicates(where_clause, columns, &table.name, alias);
        if predicates.contradictory {
            debug!("dml: contradictory predicates on '{}'", table.name);
            return Ok(MatchedRows {
                rows: vec![],
                ordered_by_index: false,
            });
        }
        let indexes = self.catalog.borrow_mut().indexes_of(table.id)?;
        let path = select_access_path(&predicates, &indexes, order_by)?;
        let heap = TableHeap::open(self.pm.clone(), table.root_page_id);
        let mut ordered_by_index = false;

        let candidates: Vec<(crate::storage::RowLocation, Vec<Datum>)> = match path {
            AccessPath::SeqScan => {
                let mut rows = vec![];
                for row in heap.iter() {
                    let (loc, payload) = row?;
                    rows.push((loc, decode_row(columns, &payload)?));
                }
                rows
            }
            AccessPath::IndexEqual { entry, values } => {
                let key = self.index_key(&entry, columns, &values)?;
                let mut handle = self.indexes.open_index(&entry)?;
                let rids = handle.tree().scan_equal(&key)?;
                self.notify_index_use(&entry, &rids);
                self.fetch_by_rids(&heap, columns, &rids)?
            }
            AccessPath::IndexRange {
                entry,
                lower,
                upper,
            } => {
                let lower_key = match &lower {
                    Some((value, _)) => Some(self.index_key(&entry, columns, &[value.clone()])?),
                    None => None,
                };
                let upper_key = match &upper {
                    Some((value, _)) => Some(self.index_key(&entry, columns, &[value.clone()])?),
                    None => None,
                };
                let mut handle = self.indexes.open_index(&entry)?;
                let rids = handle.tree().scan_range(
                    lower_key.as_deref(),
                    lower.map_or(true, |(_, inclusive)| inclusive),
                    upper_key.as_deref(),
                    upper.map_or(true, |(_, inclusive)| inclusive),
                )?;
                self.notify_index_use(&entry, &rids);
                self.fetch_by_rids(&heap, columns, &rids)?
            }
            AccessPath::IndexOrdered { entry, reverse } => {
                let mut handle = self.indexes.open_index(&entry)?;
                let mut rids = handle.tree().scan_range(None, true, None, true)?;
                if reverse {
                    rids.reverse();
                }
                self.notify_index_use(&entry, &rids);
                ordered_by_index = true;
                self.fetch_by_rids(&heap, columns, &rids)?
            }
        };

        let mut rows = vec![];
        for (loc, values) in candidates {
            let admitted = match where_clause {
                Some(expr) => evaluator.eval_predicate(expr, &values)?.is_true(),
                None => true,
            };
            if admitted {
                rows.push((loc, values));
            }
        }
        Ok(MatchedRows {
            rows,
            ordered_by_index,
        })
    }

    fn index_key(
        &self,
        entry: &IndexEntry,
        columns: &[ColumnEntry],
        values: &[Datum],
    ) -> Result<Vec<u8>, ExecutionError> {
        let types = entry
            .column_ids
            .iter()
            .map(|column_id| {
                columns
                    .iter()
                    .find(|c| c.column_id == *column_id)
                    .map(|c| c.data_type)
                    .ok_or_else(|| {
                        ExecutionError::Internal(format!(
                            "index '{}' references missing column {}",
                            entry.name, column_id
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(record::encode(&values[..types.len()], &types)?)
    }

    fn fetch_by_rids(
        &self,
        heap: &TableHeap,
        columns: &[ColumnEntry],
        rids: &[RecordId],
    ) -> Result<Vec<(crate::storage::RowLocation, Vec<Datum>)>, ExecutionError> {
        let mut rows = vec![];
        for &rid in rids {
            let loc = location_of(rid);
            let payload = heap.read(loc)?;
            rows.push((loc, decode_row(columns, &payload)?));
        }
        Ok(rows)
    }

    // SELECT

    pub fn select(&mut self, stmt: &SelectStmt) -> Result<SelectOutput, ExecutionError> {
        // bind FROM and JOIN tables into one flat row layout
        let mut sources: Vec<(TableEntry, Vec<ColumnEntry>, TableRef)> = vec![];
        for table_ref in std::iter::once(&stmt.from).chain(stmt.joins.iter().map(|j| &j.table)) {
            let table = self.table_named(&table_ref.name)?;
            let columns = self.catalog.borrow_mut().columns_of(table.id)?;
            sources.push((table, columns, table_ref.clone()));
        }
        let mut evaluator = Evaluator::new();
        let mut base = 0usize;
        for (table, columns, table_ref) in &sources {
            evaluator.add_source(columns, &table.name, table_ref.alias.as_deref(), base);
            base += columns.len();
        }

        let has_aggregate = stmt
            .items
            .iter()
            .any(|item| matches!(item, SelectItem::Aggregate(_)));
        let has_plain = stmt
            .items
            .iter()
            .any(|item| !matches!(item, SelectItem::Aggregate(_)));
        if has_aggregate && has_plain {
            return Err(ExecutionError::InvalidArgument(
                "cannot mix aggregates and plain columns without GROUP BY".to_string(),
            ));
        }

        // resolve ORDER BY before touching any rows
        let order_keys = stmt
            .order_by
            .iter()
            .map(|term| {
                let (index, _) = evaluator.resolve(&term.column)?;
                Ok((index, term.descending))
            })
            .collect::<Result<Vec<_>, ExecutionError>>()?;

        let (mut rows, ordered_by_index) = if sources.len() == 1 {
            let (table, columns, table_ref) = &sources[0];
            // only a single-direction prefix can ride an index for order
            let order_ids = order_keys
                .iter()
                .filter_map(|(index, desc)| {
                    columns.get(*index).map(|c| (c.column_id, *desc))
                })
                .collect_vec();
            let order_ids = if order_ids.len() == order_keys.len() {
                order_ids
            } else {
                vec![]
            };
            let matched = self.collect_rows(
                table,
                columns,
                table_ref.alias.as_deref(),
                stmt.where_clause.as_ref(),
                &evaluator,
                &order_ids,
            )?;
            (
                matched.rows.into_iter().map(|(_, values)| values).collect_vec(),
                matched.ordered_by_index,
            )
        } else {
            (self.nested_loop_join(stmt, &sources, &evaluator)?, false)
        };

        if has_aggregate {
            let output = self.aggregate(stmt, &evaluator, &rows)?;
            let limited = match stmt.limit {
                Some(limit) => output.rows.into_iter().take(limit as usize).collect_vec(),
                None => output.rows,
            };
            return Ok(SelectOutput {
                column_names: output.column_names,
                rows: limited,
            });
        }

        if !order_keys.is_empty() && !ordered_by_index {
            rows.sort_by(|a, b| {
                for (index, descending) in &order_keys {
                    let (lhs, rhs) = (&a[*index], &b[*index]);
                    // NULL sorts after every value, in either direction
                    match (lhs.is_null(), rhs.is_null()) {
                        (true, true) => continue,
                        (true, false) => return std::cmp::Ordering::Greater,
                        (false, true) => return std::cmp::Ordering::Less,
                        (false, false) => {}
                    }
                    let ordering = lhs.sort_cmp(rhs);
                    let ordering = if *descending { ordering.reverse() } else { ordering };
                    if ordering != std::cmp::Ordering::Equal {
                        return ordering;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        // projection
        let multi_table = sources.len() > 1;
        let mut names = vec![];
        let mut positions = vec![];
        for item in &stmt.items {
            match item {
                SelectItem::Star => {
                    let mut base = 0usize;
                    for (table, columns, table_ref) in &sources {
                        let qualifier = table_ref.alias.clone().unwrap_or_else(|| table.name.clone());
                        for (offset, column) in columns.iter().enumerate() {
                            names.push(if multi_table {
                                format!("{}.{}", qualifier, column.name)
                            } else {
                                column.name.clone()
                            });
                            positions.push(base + offset);
                        }
                        base += columns.len();
                    }
                }
                SelectItem::Column(column_ref) => {
                    let (index, _) = evaluator.resolve(column_ref)?;
                    names.push(render_column_ref(column_ref));
                    positions.push(index);
                }
                SelectItem::Aggregate(_) => unreachable!(),
            }
        }
        let mut projected = rows
            .iter()
            .map(|row| positions.iter().map(|&index| row[index].clone()).collect_vec())
            .collect_vec();

        if stmt.distinct {
            let mut seen = HashSet::new();
            projected.retain(|row| {
                seen.insert(row.iter().map(|value| value.signature()).join("\u{1f}"))
            });
        }
        if let Some(limit) = stmt.limit {
            projected.truncate(limit as usize);
        }
        Ok(SelectOutput {
            column_names: names,
            rows: projected,
        })
    }

    /// Left-deep nested loop inner join. The ON predicate of each join is
    /// checked as soon as its table joins, the WHERE predicate at the
    /// outermost level.
    fn nested_loop_join(
        &mut self,
        stmt: &SelectStmt,
        sources: &[(TableEntry, Vec<ColumnEntry>, TableRef)],
        evaluator: &Evaluator,
    ) -> Result<Vec<Vec<Datum>>, ExecutionError> {
        let mut acc: Vec<Vec<Datum>> = vec![];
        let (table, columns, _) = &sources[0];
        let heap = TableHeap::open(self.pm.clone(), table.root_page_id);
        for row in heap.iter() {
            let (_, payload) = row?;
            acc.push(decode_row(columns, &payload)?);
        }
        for (join, (table, columns, _)) in stmt.joins.iter().zip(sources[1..].iter()) {
            let heap = TableHeap::open(self.pm.clone(), table.root_page_id);
            let mut inner_rows = vec![];
            for row in heap.iter() {
                let (_, payload) = row?;
                inner_rows.push(decode_row(columns, &payload)?);
            }
            let mut next = vec![];
            for outer in &acc {
                for inner in &inner_rows {
                    let mut combined = outer.clone();
                    combined.extend(inner.iter().cloned());
                    if evaluator.eval_predicate(&join.on, &combined)?.is_true() {
                        next.push(combined);
                    }
                }
            }
            acc = next;
        }
        if let Some(where_clause) = &stmt.where_clause {
            let mut admitted = vec![];
            for row in acc {
                if evaluator.eval_predicate(where_clause, &row)?.is_true() {
                    admitted.push(row);
                }
            }
            return Ok(admitted);
        }
        Ok(acc)
    }

    // aggregation

    fn aggregate(
        &self,
        stmt: &SelectStmt,
        evaluator: &Evaluator,
        rows: &[Vec<Datum>],
    ) -> Result<SelectOutput, ExecutionError> {
        let mut names = vec![];
        let mut accumulators = vec![];
        for item in &stmt.items {
            let call = match item {
                SelectItem::Aggregate(call) => call,
                _ => unreachable!(),
            };
            names.push(render_aggregate(call));
            accumulators.push(Accumulator::bind(call, evaluator)?);
        }
        for row in rows {
            for accumulator in &mut accumulators {
                accumulator.feed(row)?;
            }
        }
        let row = accumulators
            .into_iter()
            .map(|accumulator| accumulator.finish())
            .collect_vec();
        Ok(SelectOutput {
            column_names: names,
            rows: vec![row],
        })
    }

    // UPDATE

    pub fn update(&mut self, stmt: &UpdateStmt) -> Result<usize, ExecutionError> {
        let table = self.table_named(&stmt.table)?;
        let columns = self.catalog.borrow_mut().columns_of(table.id)?;
        let evaluator = Evaluator::from_columns(&columns, &table.name, None);
        let assignments = stmt
            .assignments
            .iter()
            .map(|(name, expr)| {
                let position = columns
                    .iter()
                    .position(|c| c.name.eq_ignore_ascii_case(name))
                    .ok_or_else(|| ExecutionError::ColumnNotFound(name.clone()))?;
                Ok((position, columns[position].data_type, expr))
            })
            .collect::<Result<Vec<(usize, DataType, &Expression)>, ExecutionError>>()?;

        let matched = self.collect_rows(
            &table,
            &columns,
            None,
            stmt.where_clause.as_ref(),
            &evaluator,
            &[],
        )?;
        let index_entries = self.catalog.borrow_mut().indexes_of(table.id)?;
        let mut contexts = load_index_contexts(&self.indexes, index_entries, &columns)?;
        let mut heap = TableHeap::open(self.pm.clone(), table.root_page_id);

        let mut updated = 0usize;
        for (loc, values) in matched.rows {
            // SET expressions see the pre-update row
            let mut new_values = values.clone();
            for (position, data_type, expr) in &assignments {
                new_values[*position] =
                    evaluator.eval_scalar(expr, &values, Some(*data_type))?;
            }
            let payload = encode_row(&columns, &new_values)?;
            let old_rid = record_id_of(loc);
            // validate unique keys before any mutation
            for context in &mut contexts {
                if !context.entry.is_unique {
                    continue;
                }
                let old_key = context.key_for(&columns, &values)?;
                let new_key = context.key_for(&columns, &new_values)?;
                if new_key != old_key && context.handle.tree().search(&new_key)?.is_some() {
                    return Err(ExecutionError::Index(
                        crate::index::IndexError::DuplicateKey(format!(
                            "unique index '{}'",
                            context.entry.name
                        )),
                    ));
                }
            }
            let new_loc = heap.update(loc, &payload)?;
            let new_rid = record_id_of(new_loc);
            for context in &mut contexts {
                let old_key = context.key_for(&columns, &values)?;
                let new_key = context.key_for(&columns, &new_values)?;
                if old_key != new_key || old_rid != new_rid {
                    context.handle.tree().remove(&old_key, old_rid)?;
                    context.handle.tree().insert(&new_key, new_rid)?;
                    self.sync_index_root(context)?;
                }
            }
            updated += 1;
        }
        info!("dml: updated {} rows in '{}'", updated, stmt.table);
        Ok(updated)
    }

    // DELETE

    pub fn delete(&mut self, stmt: &DeleteStmt) -> Result<usize, ExecutionError> {
        let table = self.table_named(&stmt.table)?;
        let columns = self.catalog.borrow_mut().columns_of(table.id)?;
        let evaluator = Evaluator::from_columns(&columns, &table.name, None);
        let matched = self.collect_rows(
            &table,
            &columns,
            None,
            stmt.where_clause.as_ref(),
            &evaluator,
            &[],
        )?;
        let index_entries = self.catalog.borrow_mut().indexes_of(table.id)?;
        let mut contexts = load_index_contexts(&self.indexes, index_entries, &columns)?;
        let mut heap = TableHeap::open(self.pm.clone(), table.root_page_id);

        let mut deleted = 0usize;
        for (loc, values) in matched.rows {
            heap.erase(loc)?;
            deleted += 1;
            let rid = record_id_of(loc);
            for context in &mut contexts {
                let key = context.key_for(&columns, &values)?;
                context.handle.tree().remove(&key, rid)?;
            }
        }
        info!("dml: deleted {} rows from '{}'", deleted, stmt.table);
        Ok(deleted)
    }

    // TRUNCATE

    /// Reset the heap and rebuild every index empty, so no stale entries
    /// survive.
    pub fn truncate(&mut self, stmt: &TruncateStmt) -> Result<(), ExecutionError> {
        let table = self.table_named(&stmt.table)?;
        let mut heap = TableHeap::open(self.pm.clone(), table.root_page_id);
        heap.truncate()?;
        let index_entries = self.catalog.borrow_mut().indexes_of(table.id)?;
        for entry in index_entries {
            let handle = self.indexes.create_index(&entry)?;
            let root = handle.tree_ref().root_page_id();
            if root != entry.root_page_id {
                self.catalog.borrow_mut().set_index_root(entry.index_id, root)?;
            }
        }
        info!("dml: truncated '{}'", stmt.table);
        Ok(())
    }
}

fn render_column_ref(column_ref: &ColumnRef) -> String {
    match &column_ref.table {
        Some(table) => format!("{}.{}", table, column_ref.column),
        None => column_ref.column.clone(),
    }
}

fn render_aggregate(call: &AggregateCall) -> String {
    let func = match call.func {
        AggregateFunc::Count => "COUNT",
        AggregateFunc::Sum => "SUM",
        AggregateFunc::Avg => "AVG",
        AggregateFunc::Min => "MIN",
        AggregateFunc::Max => "MAX",
    };
    match &call.arg {
        None => format!("{}(*)", func),
        Some(arg) => {
            let distinct = if call.distinct { "DISTINCT " } else { "" };
            format!("{}({}{})", func, distinct, render_column_ref(arg))
        }
    }
}

/// One aggregate item's running state.
struct Accumulator {
    func: AggregateFunc,
    distinct: bool,
    /// row index of the argument; `None` is `COUNT(*)`
    arg: Option<(usize, DataType)>,
    seen: HashSet<String>,
    count: u64,
    int_sum: i64,
    float_sum: f64,
    non_null: u64,
    best: Option<Datum>,
}

impl Accumulator {
    fn bind(call: &AggregateCall, evaluator: &Evaluator) -> Result<Self, ExecutionError> {
        let arg = match &call.arg {
            Some(column_ref) => {
                let (index, data_type) = evaluator.resolve(column_ref)?;
                if matches!(call.func, AggregateFunc::Sum | AggregateFunc::Avg)
                    && !data_type.is_numeric()
                {
                    return Err(ExecutionError::TypeError(format!(
                        "{} needs a numeric column",
                        render_aggregate(call)
                    )));
                }
                Some((index, data_type))
            }
            None => None,
        };
        Ok(Self {
            func: call.func,
            distinct: call.distinct,
            arg,
            seen: HashSet::new(),
            count: 0,
            int_sum: 0,
            float_sum: 0.0,
            non_null: 0,
            best: None,
        })
    }

    fn feed(&mut self, row: &[Datum]) -> Result<(), ExecutionError> {
        let value = match self.arg {
            None => {
                self.count += 1;
                return Ok(());
            }
            Some((index, _)) => &row[index],
        };
        if value.is_null() {
            return Ok(());
        }
        if self.distinct && !self.seen.insert(value.signature()) {
            return Ok(());
        }
        self.non_null += 1;
        match self.func {
            AggregateFunc::Count => self.count += 1,
            AggregateFunc::Sum | AggregateFunc::Avg => {
                match value.as_i64() {
                    Some(int) if matches!(value, Datum::Int(_) | Datum::BigInt(_)) => {
                        self.int_sum += int;
                        self.float_sum += int as f64;
                    }
                    _ => match value.as_f64() {
                        Some(float) => self.float_sum += float,
                        None => {
                            return Err(ExecutionError::TypeError(format!(
                                "cannot sum {}",
                                value
                            )))
                        }
                    },
                }
            }
            AggregateFunc::Min => {
                let replace = self
                    .best
                    .as_ref()
                    .map_or(true, |best| value.sort_cmp(best) == std::cmp::Ordering::Less);
                if replace {
                    self.best = Some(value.clone());
                }
            }
            AggregateFunc::Max => {
                let replace = self
                    .best
                    .as_ref()
                    .map_or(true, |best| value.sort_cmp(best) == std::cmp::Ordering::Greater);
                if replace {
                    self.best = Some(value.clone());
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> Datum {
        match self.func {
            AggregateFunc::Count => Datum::BigInt(Some(self.count as i64)),
            AggregateFunc::Sum => {
                if self.non_null == 0 {
                    return Datum::BigInt(None);
                }
                match self.arg {
                    Some((_, DataType::Float)) | Some((_, DataType::Double)) => {
                        Datum::Double(Some(self.float_sum))
                    }
                    _ => Datum::BigInt(Some(self.int_sum)),
                }
            }
            AggregateFunc::Avg => {
                if self.non_null == 0 {
                    Datum::Double(None)
                } else {
                    Datum::Double(Some(self.float_sum / self.non_null as f64))
                }
            }
            AggregateFunc::Min | AggregateFunc::Max => match (self.best, self.arg) {
                (Some(best), _) => best,
                (None, Some((_, data_type))) => Datum::null_of(data_type),
                (None, None) => Datum::BigInt(None),
            },
        }
    }
}
