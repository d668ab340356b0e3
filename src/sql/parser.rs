use super::ast::*;
use super::token::{tokenize, Symbol, Token, TokenKind};
use super::SyntaxError;
use crate::datum::DataType;

/// words that terminate a bare table alias
const RESERVED: &[&str] = &[
    "SELECT", "FROM", "WHERE", "ORDER", "BY", "LIMIT", "INNER", "JOIN", "ON", "AND", "OR", "NOT",
    "AS", "SET", "VALUES", "INSERT", "UPDATE", "DELETE", "TRUNCATE", "CREATE", "DROP", "ALTER",
    "TABLE", "INDEX", "IS", "NULL", "ASC", "DESC", "DISTINCT", "INTO", "CASCADE", "IF", "EXISTS",
    "GROUP",
];

pub struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

pub fn parse(input: &str) -> Result<Statement, SyntaxError> {
    let tokens = tokenize(input);
    if tokens.is_empty() {
        return Err(SyntaxError {
            input: input.to_string(),
            offset: 0,
            expected: "a well-formed SQL statement".to_string(),
        });
    }
    let mut parser = Parser {
        input,
        tokens,
        pos: 0,
    };
    let statement = parser.parse_statement()?;
    parser.accept_symbol(Symbol::Semicolon);
    parser.expect_end()?;
    Ok(statement)
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }
    fn peek_at(&self, ahead: usize) -> &Token {
        &self.tokens[(self.pos + ahead).min(self.tokens.len() - 1)]
    }
    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }
    fn error(&self, expected: impl Into<String>) -> SyntaxError {
        SyntaxError {
            input: self.input.to_string(),
            offset: self.peek().offset,
            expected: expected.into(),
        }
    }
    fn accept_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }
    fn expect_keyword(&mut self, keyword: &str) -> Result<(), SyntaxError> {
        if self.accept_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(keyword))
        }
    }
    fn accept_symbol(&mut self, symbol: Symbol) -> bool {
        if self.peek().is_symbol(symbol) {
            self.advance();
            true
        } else {
            false
        }
    }
    fn expect_symbol(&mut self, symbol: Symbol) -> Result<(), SyntaxError> {
        if self.accept_symbol(symbol) {
            Ok(())
        } else {
            Err(self.error(format!("'{}'", symbol)))
        }
    }
    fn expect_identifier(&mut self, what: &str) -> Result<String, SyntaxError> {
        if self.peek().kind == TokenKind::Identifier
            && !RESERVED.contains(&self.peek().upper.as_str())
        {
            Ok(self.advance().text)
        } else {
            Err(self.error(what))
        }
    }
    fn expect_end(&mut self) -> Result<(), SyntaxError> {
        if self.peek().kind == TokenKind::End {
            Ok(())
        } else {
            Err(self.error("end of statement"))
        }
    }

    fn parse_statement(&mut self) -> Result<Statement, SyntaxError> {
        if self.accept_keyword("CREATE") {
            if self.accept_keyword("TABLE") {
                return self.parse_create_table();
            }
            let unique = self.accept_keyword("UNIQUE");
            if self.accept_keyword("INDEX") {
                return self.parse_create_index(unique);
            }
            return Err(self.error("TABLE or [UNIQUE] INDEX"));
        }
        if self.accept_keyword("DROP") {
            if self.accept_keyword("TABLE") {
                return self.parse_drop_table();
            }
            if self.accept_keyword("INDEX") {
                return self.parse_drop_index();
            }
            return Err(self.error("TABLE or INDEX"));
        }
        if self.accept_keyword("ALTER") {
            return self.parse_alter_table();
        }
        if self.accept_keyword("INSERT") {
            return self.parse_insert();
        }
        if self.accept_keyword("SELECT") {
            return self.parse_select();
        }
        if self.accept_keyword("UPDATE") {
            return self.parse_update();
        }
        if self.accept_keyword("DELETE") {
            return self.parse_delete();
        }
        if self.accept_keyword("TRUNCATE") {
            self.accept_keyword("TABLE");
            let table = self.expect_identifier("table name")?;
            return Ok(Statement::Truncate(TruncateStmt { table }));
        }
        Err(self.error("a SQL statement"))
    }

    // DDL

    fn parse_create_table(&mut self) -> Result<Statement, SyntaxError> {
        let name = self.expect_identifier("table name")?;
        self.expect_symbol(Symbol::LParen)?;
        let mut columns = vec![self.parse_column_def()?];
        while self.accept_symbol(Symbol::Comma) {
            columns.push(self.parse_column_def()?);
        }
        self.expect_symbol(Symbol::RParen)?;
        Ok(Statement::CreateTable(CreateTableStmt { name, columns }))
    }

    fn parse_column_def(&mut self) -> Result<ColumnDef, SyntaxError> {
        let name = self.expect_identifier("column name")?;
        let data_type = self.parse_type()?;
        let mut def = ColumnDef {
            name,
            data_type,
            not_null: false,
            primary_key: false,
            unique: false,
            default: None,
        };
        loop {
            if self.accept_keyword("NOT") {
                self.expect_keyword("NULL")?;
                def.not_null = true;
            } else if self.accept_keyword("PRIMARY") {
                self.expect_keyword("KEY")?;
                def.primary_key = true;
            } else if self.accept_keyword("UNIQUE") {
                def.unique = true;
            } else if self.accept_keyword("DEFAULT") {
                def.default = Some(self.parse_literal()?);
            } else {
                break;
            }
        }
        Ok(def)
    }

    fn parse_type(&mut self) -> Result<DataType, SyntaxError> {
        let token = self.peek().clone();
        if token.kind != TokenKind::Identifier {
            return Err(self.error("a type name"));
        }
        self.advance();
        match token.upper.as_str() {
            "BOOLEAN" | "BOOL" => Ok(DataType::Bool),
            "INTEGER" | "INT" => Ok(DataType::Int),
            "BIGINT" => Ok(DataType::BigInt),
            "FLOAT" => Ok(DataType::Float),
            "DOUBLE" => Ok(DataType::Double),
            "DATE" => Ok(DataType::Date),
            "TIMESTAMP" => Ok(DataType::Timestamp),
            "TEXT" => Ok(DataType::Text),
            "VARCHAR" => {
                self.expect_symbol(Symbol::LParen)?;
                let length = match self.peek().kind {
                    TokenKind::Integer(value) if value > 0 && value <= u16::MAX as i64 => {
                        self.advance();
                        value as u16
                    }
                    _ => return Err(self.error("a VARCHAR length")),
                };
                self.expect_symbol(Symbol::RParen)?;
                Ok(DataType::Varchar(length))
            }
            _ => Err(self.error("a type name")),
        }
    }

    fn parse_literal(&mut self) -> Result<Literal, SyntaxError> {
        let token = self.peek().clone();
        let literal = match &token.kind {
            TokenKind::Integer(value) => Literal::Integer(*value),
            TokenKind::Decimal(value) => Literal::Decimal(*value),
            TokenKind::String(value) => Literal::String(value.clone()),
            TokenKind::Identifier => match token.upper.as_str() {
                "NULL" => Literal::Null,
                "TRUE" => Literal::Bool(true),
                "FALSE" => Literal::Bool(false),
                _ => return Err(self.error("a literal")),
            },
            _ => return Err(self.error("a literal")),
        };
        self.advance();
        Ok(literal)
    }

    fn parse_create_index(&mut self, unique: bool) -> Result<Statement, SyntaxError> {
        let name = self.expect_identifier("index name")?;
        self.expect_keyword("ON")?;
        let table = self.expect_identifier("table name")?;
        self.expect_symbol(Symbol::LParen)?;
        let mut columns = vec![self.expect_identifier("column name")?];
        while self.accept_symbol(Symbol::Comma) {
            columns.push(self.expect_identifier("column name")?);
        }
        self.expect_symbol(Symbol::RParen)?;
        Ok(Statement::CreateIndex(CreateIndexStmt {
            name,
            table,
            columns,
            unique,
        }))
    }

    fn parse_drop_table(&mut self) -> Result<Statement, SyntaxError> {
        let if_exists = self.parse_if_exists()?;
        let name = self.expect_identifier("table name")?;
        let cascade = self.accept_keyword("CASCADE");
        Ok(Statement::DropTable(DropTableStmt {
            name,
            if_exists,
            cascade,
        }))
    }

    fn parse_drop_index(&mut self) -> Result<Statement, SyntaxError> {
        let if_exists = self.parse_if_exists()?;
        let name = self.expect_identifier("index name")?;
        Ok(Statement::DropIndex(DropIndexStmt { name, if_exists }))
    }

    fn parse_if_exists(&mut self) -> Result<bool, SyntaxError> {
        if self.accept_keyword("IF") {
            self.expect_keyword("EXISTS")?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn parse_alter_table(&mut self) -> Result<Statement, SyntaxError> {
        self.expect_keyword("TABLE")?;
        let table = self.expect_identifier("table name")?;
        if self.accept_keyword("ADD") {
            self.expect_keyword("COLUMN")?;
            let def = self.parse_column_def()?;
            return Ok(Statement::AlterTable(AlterTableStmt {
                table,
                action: AlterAction::AddColumn(def),
            }));
        }
        if self.accept_keyword("DROP") {
            self.expect_keyword("COLUMN")?;
            let column = self.expect_identifier("column name")?;
            return Ok(Statement::AlterTable(AlterTableStmt {
                table,
                action: AlterAction::DropColumn(column),
            }));
        }
        Err(self.error("ADD COLUMN or DROP COLUMN"))
    }

    // DML

    fn parse_insert(&mut self) -> Result<Statement, SyntaxError> {
        self.expect_keyword("INTO")?;
        let table = self.expect_identifier("table name")?;
        let mut columns = vec![];
        if self.accept_symbol(Symbol::LParen) {
            columns.push(self.expect_identifier("column name")?);
            while self.accept_symbol(Symbol::Comma) {
                columns.push(self.expect_identifier("column name")?);
            }
            self.expect_symbol(Symbol::RParen)?;
        }
        self.expect_keyword("VALUES")?;
        let mut rows = vec![self.parse_value_row()?];
        while self.accept_symbol(Symbol::Comma) {
            rows.push(self.parse_value_row()?);
        }
        Ok(Statement::Insert(InsertStmt {
            table,
            columns,
            rows,
        }))
    }

    fn parse_value_row(&mut self) -> Result<Vec<Literal>, SyntaxError> {
        self.expect_symbol(Symbol::LParen)?;
        let mut row = vec![self.parse_literal()?];
        while self.accept_symbol(Symbol::Comma) {
            row.push(self.parse_literal()?);
        }
        self.expect_symbol(Symbol::RParen)?;
        Ok(row)
    }

    fn parse_select(&mut self) -> Result<Statement, SyntaxError> {
        let distinct = self.accept_keyword("DISTINCT");
        let mut items = vec![self.parse_select_item()?];
        while self.accept_symbol(Symbol::Comma) {
            items.push(self.parse_select_item()?);
        }
        self.expect_keyword("FROM")?;
        let from = self.parse_table_ref()?;
        let mut joins = vec![];
        loop {
            let inner = self.accept_keyword("INNER");
            if self.accept_keyword("JOIN") {
                let table = self.parse_table_ref()?;
                self.expect_keyword("ON")?;
                let on = self.parse_expression()?;
                joins.push(JoinClause { table, on });
            } else if inner {
                return Err(self.error("JOIN"));
            } else {
                break;
            }
        }
        let where_clause = if self.accept_keyword("WHERE") {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let mut order_by = vec![];
        if self.accept_keyword("ORDER") {
            self.expect_keyword("BY")?;
            order_by.push(self.parse_order_term()?);
            while self.accept_symbol(Symbol::Comma) {
                order_by.push(self.parse_order_term()?);
            }
        }
        let limit = if self.accept_keyword("LIMIT") {
            match self.peek().kind {
                TokenKind::Integer(value) if value >= 0 => {
                    self.advance();
                    Some(value as u64)
                }
                _ => return Err(self.error("a non-negative LIMIT count")),
            }
        } else {
            None
        };
        Ok(Statement::Select(SelectStmt {
            distinct,
            items,
            from,
            joins,
            where_clause,
            order_by,
            limit,
        }))
    }

    fn parse_select_item(&mut self) -> Result<SelectItem, SyntaxError> {
        if self.accept_symbol(Symbol::Star) {
            return Ok(SelectItem::Star);
        }
        let token = self.peek().clone();
        if token.kind == TokenKind::Identifier && self.peek_at(1).is_symbol(Symbol::LParen) {
            let func = match token.upper.as_str() {
                "COUNT" => Some(AggregateFunc::Count),
                "SUM" => Some(AggregateFunc::Sum),
                "AVG" => Some(AggregateFunc::Avg),
                "MIN" => Some(AggregateFunc::Min),
                "MAX" => Some(AggregateFunc::Max),
                _ => None,
            };
            if let Some(func) = func {
                self.advance();
                self.expect_symbol(Symbol::LParen)?;
                let distinct = self.accept_keyword("DISTINCT");
                let arg = if func == AggregateFunc::Count && self.accept_symbol(Symbol::Star) {
                    if distinct {
                        return Err(self.error("a column name after DISTINCT"));
                    }
                    None
                } else {
                    Some(self.parse_column_ref()?)
                };
                self.expect_symbol(Symbol::RParen)?;
                return Ok(SelectItem::Aggregate(AggregateCall {
                    func,
                    distinct,
                    arg,
                }));
            }
            return Err(self.error("an aggregate function"));
        }
        Ok(SelectItem::Column(self.parse_column_ref()?))
    }

    fn parse_column_ref(&mut self) -> Result<ColumnRef, SyntaxError> {
        let first = self.expect_identifier("column name")?;
        if self.accept_symbol(Symbol::Dot) {
            let column = self.expect_identifier("column name")?;
            return Ok(ColumnRef {
                table: Some(first),
                column,
            });
        }
        Ok(ColumnRef {
            table: None,
            column: first,
        })
    }

    fn parse_table_ref(&mut self) -> Result<TableRef, SyntaxError> {
        let name = self.expect_identifier("table name")?;
        if self.accept_keyword("AS") {
            let alias = self.expect_identifier("alias")?;
            return Ok(TableRef {
                name,
                alias: Some(alias),
            });
        }
        let next = self.peek();
        if next.kind == TokenKind::Identifier && !RESERVED.contains(&next.upper.as_str()) {
            let alias = self.advance().text;
            return Ok(TableRef {
                name,
                alias: Some(alias),
            });
        }
        Ok(TableRef { name, alias: None })
    }

    fn parse_order_term(&mut self) -> Result<OrderByTerm, SyntaxError> {
        let column = self.parse_column_ref()?;
        let descending = if self.accept_keyword("DESC") {
            true
        } else {
            self.accept_keyword("ASC");
            false
        };
        Ok(OrderByTerm { column, descending })
    }

    fn parse_update(&mut self) -> Result<Statement, SyntaxError> {
        let table = self.expect_identifier("table name")?;
        self.expect_keyword("SET")?;
        let mut assignments = vec![self.parse_assignment()?];
        while self.accept_symbol(Symbol::Comma) {
            assignments.push(self.parse_assignment()?);
        }
        let where_clause = if self.accept_keyword("WHERE") {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(Statement::Update(UpdateStmt {
            table,
            assignments,
            where_clause,
        }))
    }

    fn parse_assignment(&mut self) -> Result<(String, Expression), SyntaxError> {
        let column = self.expect_identifier("column name")?;
        self.expect_symbol(Symbol::Eq)?;
        let value = self.parse_expression()?;
        Ok((column, value))
    }

    fn parse_delete(&mut self) -> Result<Statement, SyntaxError> {
        self.expect_keyword("FROM")?;
        let table = self.expect_identifier("table name")?;
        let where_clause = if self.accept_keyword("WHERE") {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(Statement::Delete(DeleteStmt {
            table,
            where_clause,
        }))
    }

    // expressions, lowest precedence first

    pub fn parse_expression(&mut self) -> Result<Expression, SyntaxError> {
        self.parse_or()
    }
    fn parse_or(&mut self) -> Result<Expression, SyntaxError> {
        let mut lhs = self.parse_and()?;
        while self.accept_keyword("OR") {
            let rhs = self.parse_and()?;
            lhs = Expression::Binary {
                op: BinaryOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }
    fn parse_and(&mut self) -> Result<Expression, SyntaxError> {
        let mut lhs = self.parse_not()?;
        while self.accept_keyword("AND") {
            let rhs = self.parse_not()?;
            lhs = Expression::Binary {
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }
    fn parse_not(&mut self) -> Result<Expression, SyntaxError> {
        if self.accept_keyword("NOT") {
            let operand = self.parse_not()?;
            return Ok(Expression::Not(Box::new(operand)));
        }
        self.parse_comparison()
    }
    fn parse_comparison(&mut self) -> Result<Expression, SyntaxError> {
        let lhs = self.parse_primary()?;
        let op = match self.peek().kind {
            TokenKind::Symbol(Symbol::Eq) => Some(BinaryOp::Eq),
            TokenKind::Symbol(Symbol::NotEq) => Some(BinaryOp::NotEq),
            TokenKind::Symbol(Symbol::Lt) => Some(BinaryOp::Lt),
            TokenKind::Symbol(Symbol::LtEq) => Some(BinaryOp::LtEq),
            TokenKind::Symbol(Symbol::Gt) => Some(BinaryOp::Gt),
            TokenKind::Symbol(Symbol::GtEq) => Some(BinaryOp::GtEq),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let rhs = self.parse_primary()?;
            return Ok(Expression::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }
        Ok(lhs)
    }
    fn parse_primary(&mut self) -> Result<Expression, SyntaxError> {
        let mut expr = if self.peek().is_symbol(Symbol::LParen) {
            if self.peek_at(1).is_keyword("SELECT") {
                return Err(self.error("an expression, subqueries are not supported"));
            }
            self.advance();
            let inner = self.parse_expression()?;
            self.expect_symbol(Symbol::RParen)?;
            inner
        } else {
            let token = self.peek().clone();
            match token.kind {
                TokenKind::Integer(_) | TokenKind::Decimal(_) | TokenKind::String(_) => {
                    Expression::Literal(self.parse_literal()?)
                }
                TokenKind::Identifier
                    if matches!(token.upper.as_str(), "NULL" | "TRUE" | "FALSE") =>
                {
                    Expression::Literal(self.parse_literal()?)
                }
                TokenKind::Identifier => Expression::Column(self.parse_column_ref()?),
                _ => return Err(self.error("an expression")),
            }
        };
        while self.peek().is_keyword("IS") {
            self.advance();
            let negated = self.accept_keyword("NOT");
            self.expect_keyword("NULL")?;
            expr = Expression::NullTest {
                operand: Box::new(expr),
                negated,
            };
        }
        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(sql: &str) -> Statement {
        parse(sql).unwrap()
    }

    #[test]
    fn create_table_with_constraints() {
        let stmt = parse_ok(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name VARCHAR(32) NOT NULL, age INTEGER DEFAULT 0);",
        );
        let create = match stmt {
            Statement::CreateTable(create) => create,
            other => panic!("unexpected statement {:?}", other),
        };
        assert_eq!(create.name, "users");
        assert_eq!(create.columns.len(), 3);
        assert!(create.columns[0].primary_key);
        assert_eq!(create.columns[1].data_type, DataType::Varchar(32));
        assert!(create.columns[1].not_null);
        assert_eq!(create.columns[2].default, Some(Literal::Integer(0)));
    }

    #[test]
    fn constraint_order_is_free() {
        let stmt = parse_ok("CREATE TABLE t (v INTEGER DEFAULT 3 NOT NULL UNIQUE)");
        if let Statement::CreateTable(create) = stmt {
            let column = &create.columns[0];
            assert!(column.not_null && column.unique);
            assert_eq!(column.default, Some(Literal::Integer(3)));
        } else {
            panic!();
        }
    }

    #[test]
    fn create_and_drop_index() {
        let stmt = parse_ok("CREATE UNIQUE INDEX idx_users_name ON users(name)");
        if let Statement::CreateIndex(create) = stmt {
            assert!(create.unique);
            assert_eq!(create.table, "users");
            assert_eq!(create.columns, vec!["name".to_string()]);
        } else {
            panic!();
        }
        let stmt = parse_ok("DROP INDEX IF EXISTS idx_users_name;");
        assert_eq!(
            stmt,
            Statement::DropIndex(DropIndexStmt {
                name: "idx_users_name".to_string(),
                if_exists: true,
            })
        );
    }

    #[test]
    fn alter_table_actions() {
        let stmt = parse_ok("ALTER TABLE users ADD COLUMN status BOOLEAN DEFAULT TRUE");
        if let Statement::AlterTable(alter) = stmt {
            assert_eq!(alter.table, "users");
            match alter.action {
                AlterAction::AddColumn(def) => {
                    assert_eq!(def.name, "status");
                    assert_eq!(def.default, Some(Literal::Bool(true)));
                }
                other => panic!("unexpected action {:?}", other),
            }
        } else {
            panic!();
        }
        let stmt = parse_ok("ALTER TABLE users DROP COLUMN age");
        assert_eq!(
            stmt,
            Statement::AlterTable(AlterTableStmt {
                table: "users".to_string(),
                action: AlterAction::DropColumn("age".to_string()),
            })
        );
    }

    #[test]
    fn insert_multi_row() {
        let stmt = parse_ok("INSERT INTO users (id,name,age) VALUES (1,'alice',30),(2,'bob',40)");
        if let Statement::Insert(insert) = stmt {
            assert_eq!(insert.columns.len(), 3);
            assert_eq!(insert.rows.len(), 2);
            assert_eq!(insert.rows[0][1], Literal::String("alice".to_string()));
            assert_eq!(insert.rows[1][2], Literal::Integer(40));
        } else {
            panic!();
        }
    }

    #[test]
    fn select_with_everything() {
        let stmt = parse_ok(
            "SELECT DISTINCT e.name, b.badge FROM employees e INNER JOIN badges b ON e.id = b.employee_id WHERE e.active AND b.badge != 'none' ORDER BY e.id DESC, b.badge LIMIT 10",
        );
        let select = match stmt {
            Statement::Select(select) => select,
            other => panic!("unexpected statement {:?}", other),
        };
        assert!(select.distinct);
        assert_eq!(select.items.len(), 2);
        assert_eq!(select.from.alias.as_deref(), Some("e"));
        assert_eq!(select.joins.len(), 1);
        assert_eq!(select.joins[0].table.name, "badges");
        assert!(select.where_clause.is_some());
        assert_eq!(select.order_by.len(), 2);
        assert!(select.order_by[0].descending);
        assert!(!select.order_by[1].descending);
        assert_eq!(select.limit, Some(10));
    }

    #[test]
    fn aggregates() {
        let stmt = parse_ok(
            "SELECT COUNT(*), COUNT(nickname), SUM(age), AVG(age), MIN(name), MAX(joined) FROM employees",
        );
        if let Statement::Select(select) = stmt {
            assert_eq!(select.items.len(), 6);
            assert_eq!(
                select.items[0],
                SelectItem::Aggregate(AggregateCall {
                    func: AggregateFunc::Count,
                    distinct: false,
                    arg: None,
                })
            );
            if let SelectItem::Aggregate(call) = &select.items[2] {
                assert_eq!(call.func, AggregateFunc::Sum);
                assert_eq!(call.arg.as_ref().unwrap().column, "age");
            } else {
                panic!();
            }
        } else {
            panic!();
        }
        let stmt = parse_ok("SELECT COUNT(DISTINCT nickname) FROM employees");
        if let Statement::Select(select) = stmt {
            assert_eq!(
                select.items[0],
                SelectItem::Aggregate(AggregateCall {
                    func: AggregateFunc::Count,
                    distinct: true,
                    arg: Some(ColumnRef {
                        table: None,
                        column: "nickname".to_string(),
                    }),
                })
            );
        } else {
            panic!();
        }
    }

    #[test]
    fn is_null_and_not() {
        let stmt = parse_ok("SELECT id FROM employees WHERE NOT nickname IS NOT NULL");
        if let Statement::Select(select) = stmt {
            match select.where_clause.unwrap() {
                Expression::Not(inner) => match *inner {
                    Expression::NullTest { negated, .. } => assert!(negated),
                    other => panic!("unexpected expr {:?}", other),
                },
                other => panic!("unexpected expr {:?}", other),
            }
        } else {
            panic!();
        }
    }

    #[test]
    fn update_and_delete() {
        let stmt = parse_ok("UPDATE users SET age = 31, name = 'amy' WHERE id = 1");
        if let Statement::Update(update) = stmt {
            assert_eq!(update.assignments.len(), 2);
            assert!(update.where_clause.is_some());
        } else {
            panic!();
        }
        let stmt = parse_ok("DELETE FROM users");
        assert_eq!(
            stmt,
            Statement::Delete(DeleteStmt {
                table: "users".to_string(),
                where_clause: None,
            })
        );
    }

    #[test]
    fn syntax_errors_carry_position() {
        let err = parse("SELECT FROM users").unwrap_err();
        assert_eq!(err.offset, 7);
        let err = parse("CREATE TABLE t (v INTEGER").unwrap_err();
        assert!(err.expected.contains(")"));
        let err = parse("SELECT 'unterminated FROM t").unwrap_err();
        assert_eq!(err.offset, 0);
        assert!(parse("SELECT * FROM t; garbage").is_err());
    }

    #[test]
    fn subqueries_rejected() {
        assert!(parse("SELECT * FROM t WHERE id = (SELECT id FROM t)").is_err());
    }

    #[test]
    fn keyword_case_insensitive() {
        assert!(parse("select * from t where a >= 1 order by a asc limit 3").is_ok());
        assert!(parse("Truncate Table t").is_ok());
    }
}
